pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Unsupported: {message}")]
	Unsupported { message: String },
	#[error("Invalid argument: {message}")]
	InvalidArgument { message: String },
	#[error("Not found: {message}")]
	NotFound { message: String },
	#[error("Backend error: {message}")]
	Backend { message: String },
}
