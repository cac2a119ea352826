use clap::Parser;

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
	color_eyre::install()?;

	let args = qmatch::Args::parse();

	qmatch::run(args).await
}
