pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Invalid request: {message}")]
	InvalidRequest { message: String },
	#[error("Embedding unavailable after {provider_calls} provider calls: {message}")]
	EmbeddingUnavailable { message: String, provider_calls: usize },
	#[error("Storage error: {message}")]
	Storage { message: String },
	#[error("Configuration error: {message}")]
	Config { message: String },
}
impl From<sqlx::Error> for Error {
	fn from(err: sqlx::Error) -> Self {
		Self::Storage { message: err.to_string() }
	}
}

impl From<qmatch_storage::Error> for Error {
	fn from(err: qmatch_storage::Error) -> Self {
		match err {
			qmatch_storage::Error::Sqlx(inner) => Self::Storage { message: inner.to_string() },
			qmatch_storage::Error::InvalidArgument(message) => Self::InvalidRequest { message },
		}
	}
}
