pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error(transparent)]
	Reqwest(#[from] reqwest::Error),
	#[error(transparent)]
	InvalidHeaderValue(#[from] reqwest::header::InvalidHeaderValue),
	#[error("Embedding text cannot be empty.")]
	EmptyInput,
	#[error("Embedding request failed with status {status}: {message}")]
	Api { status: u16, message: String },
	#[error("Embedding response is invalid: {message}")]
	InvalidResponse { message: String },
}

impl Error {
	/// Transient failures worth retrying: transport errors and the
	/// rate-limit/server-side status classes (408, 429, 5xx). Client errors
	/// and malformed responses are permanent.
	pub fn is_retryable(&self) -> bool {
		match self {
			Self::Reqwest(_) => true,
			Self::Api { status, .. } => is_retryable_status(*status),
			Self::InvalidHeaderValue(_) | Self::EmptyInput | Self::InvalidResponse { .. } => false,
		}
	}
}

pub(crate) fn is_retryable_status(status: u16) -> bool {
	status == 408 || status == 429 || status >= 500
}
