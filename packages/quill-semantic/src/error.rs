pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Caller-facing failure classes. Configuration problems surface as
/// `FailedPrecondition` so clients can render guidance instead of a generic
/// failure; provider and storage failures keep their origin for logs.
#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Invalid argument: {message}")]
	InvalidArgument { message: String },
	#[error("Failed precondition: {message}")]
	FailedPrecondition { message: String },
	#[error("Already exists: {message}")]
	AlreadyExists { message: String },
	#[error("Internal error: {message}")]
	Internal { message: String },
	#[error("Provider error: {message}")]
	Provider { message: String },
	#[error("Storage error: {message}")]
	Storage { message: String },
}

impl From<quill_store::Error> for Error {
	fn from(err: quill_store::Error) -> Self {
		match err {
			quill_store::Error::Unsupported { message } => Self::FailedPrecondition { message },
			quill_store::Error::InvalidArgument { message } => Self::InvalidArgument { message },
			other => Self::Storage { message: other.to_string() },
		}
	}
}

impl From<quill_providers::Error> for Error {
	fn from(err: quill_providers::Error) -> Self {
		Self::Provider { message: err.to_string() }
	}
}

impl From<quill_config::Error> for Error {
	fn from(err: quill_config::Error) -> Self {
		Self::FailedPrecondition { message: format!("semantic search is not configured: {err}") }
	}
}
