use std::{
	fs,
	path::{Path, PathBuf},
	sync::Arc,
};

use clap::{Parser, Subcommand};
use color_eyre::eyre::WrapErr;
use serde::{Serialize, de::DeserializeOwned};
use tracing_subscriber::EnvFilter;

use qmatch_domain::abbreviation::AbbreviationExpander;
use qmatch_providers::embedding::HttpEmbedder;
use qmatch_service::{
	CanonicalInput, EmbeddingClient, EmbeddingPolicy, IncomingQuestion, LibraryIngestor,
	MatchOrchestrator, MatchSettings, PgRepository, Repository, search,
};
use qmatch_storage::db::Db;

#[derive(Debug, Parser)]
#[command(
	version = qmatch_cli::VERSION,
	rename_all = "kebab",
	styles = qmatch_cli::styles(),
)]
pub struct Args {
	#[arg(long, short = 'c', value_name = "FILE")]
	pub config: PathBuf,
	/// Pretty-print the JSON written to stdout.
	#[arg(long, global = true)]
	pub pretty: bool,
	#[command(subcommand)]
	pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
	/// Upsert canonical entries from a JSON array and embed questions whose text changed.
	Ingest {
		#[arg(long)]
		tenant: String,
		#[arg(long, value_name = "FILE")]
		input: PathBuf,
	},
	/// Match a JSON array of incoming questions against the tenant library.
	Match {
		#[arg(long)]
		tenant: String,
		#[arg(long, value_name = "FILE")]
		input: PathBuf,
	},
	/// Embed canonical entries that have no vector yet.
	Refresh {
		#[arg(long)]
		tenant: String,
	},
}

pub async fn run(args: Args) -> color_eyre::Result<()> {
	let config = qmatch_config::load(&args.config)?;

	init_tracing(&config);

	let db = Db::connect(&config.storage.postgres).await?;
	let repo: Arc<dyn Repository> = Arc::new(PgRepository::bootstrap(db).await?);
	let embedder = HttpEmbedder::new(&config.providers.embedding)?;

	tracing::info!(
		provider_id = embedder.provider_id(),
		dimensions = embedder.dimensions(),
		"Embedding provider configured."
	);

	let embedding =
		EmbeddingClient::new(Arc::new(embedder), EmbeddingPolicy::from_config(&config.embedding));
	let output = match args.command {
		Command::Ingest { tenant, input } => {
			let entries: Vec<CanonicalInput> = read_json(&input)?;
			let ingestor = LibraryIngestor::new(
				repo,
				embedding,
				AbbreviationExpander::from_config(&config.normalization),
			);
			let report = ingestor.ingest_canonical(&tenant, &entries).await?;

			render_json(&report, args.pretty)?
		},
		Command::Match { tenant, input } => {
			let questions: Vec<IncomingQuestion> = read_json(&input)?;
			let searcher = search::build_searcher(repo.clone(), &config.storage.vector_search)?;
			let orchestrator = MatchOrchestrator::new(
				repo,
				embedding,
				searcher,
				MatchSettings::from_config(&config),
			);
			let batch = orchestrator.match_batch(&tenant, &questions).await;

			render_json(&batch, args.pretty)?
		},
		Command::Refresh { tenant } => {
			let ingestor = LibraryIngestor::new(
				repo,
				embedding,
				AbbreviationExpander::from_config(&config.normalization),
			);
			let report = ingestor.refresh_embeddings(&tenant).await?;

			render_json(&report, args.pretty)?
		},
	};

	println!("{output}");

	Ok(())
}

pub fn read_json<T>(path: &Path) -> color_eyre::Result<T>
where
	T: DeserializeOwned,
{
	let raw = fs::read_to_string(path)
		.wrap_err_with(|| format!("Failed to read {}.", path.display()))?;

	serde_json::from_str(&raw).wrap_err_with(|| format!("Failed to parse {}.", path.display()))
}

pub fn render_json<T>(value: &T, pretty: bool) -> color_eyre::Result<String>
where
	T: Serialize,
{
	let rendered =
		if pretty { serde_json::to_string_pretty(value)? } else { serde_json::to_string(value)? };

	Ok(rendered)
}

// Stdout carries the JSON result, so logs go to stderr.
fn init_tracing(config: &qmatch_config::Config) {
	let filter =
		EnvFilter::try_new(&config.service.log_level).unwrap_or_else(|_| EnvFilter::new("info"));

	tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}
