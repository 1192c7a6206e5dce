mod error;
mod types;

pub use error::{Error, Result};
pub use types::{AiSetting, EmbeddingDefaults, EmbeddingProviderConfig, ReindexState};

use std::{env, time::Duration};

use tracing::warn;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";
pub const DEFAULT_MAX_RETRY: u32 = 2;
pub const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_millis(100);
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_EMBEDDING_CONCURRENCY: usize = 8;

const BASE_URL_ENV: &str = "QUILL_OPENAI_BASE_URL";
const API_KEY_ENV: &str = "QUILL_OPENAI_API_KEY";
const EMBEDDING_MODEL_ENV: &str = "QUILL_OPENAI_EMBEDDING_MODEL";
const MAX_RETRY_ENV: &str = "QUILL_OPENAI_EMBEDDING_MAX_RETRY";
const RETRY_BACKOFF_MS_ENV: &str = "QUILL_OPENAI_EMBEDDING_RETRY_BACKOFF_MS";
const CONCURRENCY_ENV: &str = "QUILL_SEMANTIC_EMBEDDING_CONCURRENCY";

/// Resolves the effective provider configuration from the admin setting and
/// the process-level fallbacks. The admin value wins wherever it is set; a
/// configuration without an API key from either source is unusable.
///
/// `api_key` is the admin key already decrypted by the caller; decryption is
/// the secret collaborator's job, not this crate's.
pub fn resolve_embedding_config(
	setting: &AiSetting,
	api_key: Option<String>,
	defaults: &EmbeddingDefaults,
) -> Result<EmbeddingProviderConfig> {
	let api_key = api_key
		.map(|key| key.trim().to_owned())
		.filter(|key| !key.is_empty())
		.unwrap_or_else(|| defaults.api_key.trim().to_owned());

	if api_key.is_empty() {
		return Err(Error::MissingApiKey);
	}

	let mut base_url = setting.openai_base_url.trim();

	if base_url.is_empty() {
		base_url = defaults.base_url.trim();
	}

	let mut model = setting.openai_embedding_model.trim();

	if model.is_empty() {
		model = defaults.model.trim();
	}
	if model.is_empty() {
		model = DEFAULT_EMBEDDING_MODEL;
	}

	Ok(EmbeddingProviderConfig {
		base_url: normalize_base_url(base_url),
		api_key,
		model: model.to_owned(),
		max_retry: setting.embedding_max_retry.unwrap_or(defaults.max_retry),
		retry_backoff: setting
			.embedding_retry_backoff_ms
			.filter(|ms| *ms > 0)
			.map(Duration::from_millis)
			.unwrap_or(defaults.retry_backoff),
		timeout: DEFAULT_REQUEST_TIMEOUT,
	})
}

/// Normalizes an operator-entered base URL: trims whitespace, assumes
/// `https://` when no scheme is present, and strips trailing slashes. An
/// explicit `http://` scheme is preserved for self-hosted providers.
pub fn normalize_base_url(raw: &str) -> String {
	let mut base_url = raw.trim().to_owned();

	if base_url.is_empty() {
		base_url = DEFAULT_BASE_URL.to_owned();
	}
	if !base_url.contains("://") {
		base_url = format!("https://{base_url}");
	}

	base_url.trim_end_matches('/').to_owned()
}

impl Default for EmbeddingDefaults {
	fn default() -> Self {
		Self {
			base_url: String::new(),
			api_key: String::new(),
			model: String::new(),
			max_retry: DEFAULT_MAX_RETRY,
			retry_backoff: DEFAULT_RETRY_BACKOFF,
			concurrency: DEFAULT_EMBEDDING_CONCURRENCY,
		}
	}
}

impl EmbeddingDefaults {
	/// Reads the process-level fallbacks from the environment. This is the
	/// only place the subsystem touches environment state.
	pub fn from_env() -> Self {
		Self {
			base_url: env_trimmed(BASE_URL_ENV),
			api_key: env_trimmed(API_KEY_ENV),
			model: env_trimmed(EMBEDDING_MODEL_ENV),
			max_retry: parse_max_retry(&env_trimmed(MAX_RETRY_ENV)),
			retry_backoff: parse_retry_backoff(&env_trimmed(RETRY_BACKOFF_MS_ENV)),
			concurrency: parse_concurrency(&env_trimmed(CONCURRENCY_ENV)),
		}
	}
}

fn env_trimmed(name: &str) -> String {
	env::var(name).map(|value| value.trim().to_owned()).unwrap_or_default()
}

fn parse_max_retry(raw: &str) -> u32 {
	if raw.is_empty() {
		return DEFAULT_MAX_RETRY;
	}

	match raw.parse::<u32>() {
		Ok(value) => value,
		Err(_) => {
			warn!(env = MAX_RETRY_ENV, value = raw, "Invalid embedding max retry, falling back to default.");

			DEFAULT_MAX_RETRY
		},
	}
}

fn parse_retry_backoff(raw: &str) -> Duration {
	if raw.is_empty() {
		return DEFAULT_RETRY_BACKOFF;
	}

	match raw.parse::<u64>() {
		Ok(value) if value > 0 => Duration::from_millis(value),
		_ => {
			warn!(env = RETRY_BACKOFF_MS_ENV, value = raw, "Invalid embedding retry backoff, falling back to default.");

			DEFAULT_RETRY_BACKOFF
		},
	}
}

fn parse_concurrency(raw: &str) -> usize {
	if raw.is_empty() {
		return DEFAULT_EMBEDDING_CONCURRENCY;
	}

	match raw.parse::<usize>() {
		Ok(value) if value > 0 => value,
		_ => {
			warn!(env = CONCURRENCY_ENV, value = raw, "Invalid embedding concurrency, falling back to default.");

			DEFAULT_EMBEDDING_CONCURRENCY
		},
	}
}
