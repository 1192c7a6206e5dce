pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("OpenAI API key is not configured.")]
	MissingApiKey,
}
