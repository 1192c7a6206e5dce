use std::{fmt, time::Duration};

use serde::{Deserialize, Serialize};

/// Effective configuration for one call to the remote embedding provider.
///
/// Recomputed per call from the admin setting plus process-level fallbacks;
/// never persisted by the semantic subsystem itself.
#[derive(Clone, PartialEq)]
pub struct EmbeddingProviderConfig {
	pub base_url: String,
	pub api_key: String,
	pub model: String,
	pub max_retry: u32,
	pub retry_backoff: Duration,
	pub timeout: Duration,
}

// The API key must never leak into logs or error chains.
impl fmt::Debug for EmbeddingProviderConfig {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("EmbeddingProviderConfig")
			.field("base_url", &self.base_url)
			.field("api_key", &"[REDACTED]")
			.field("model", &self.model)
			.field("max_retry", &self.max_retry)
			.field("retry_backoff", &self.retry_backoff)
			.field("timeout", &self.timeout)
			.finish()
	}
}

/// Process-level fallback configuration, read from the environment once at
/// startup. Admin-provided settings always win over these values.
#[derive(Clone, Debug)]
pub struct EmbeddingDefaults {
	pub base_url: String,
	pub api_key: String,
	pub model: String,
	pub max_retry: u32,
	pub retry_backoff: Duration,
	pub concurrency: usize,
}

/// Admin-editable AI settings blob, persisted by the settings collaborator
/// as an opaque document. Unset knobs fall back to [`EmbeddingDefaults`].
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AiSetting {
	pub openai_base_url: String,
	pub openai_embedding_model: String,
	pub openai_api_key_encrypted: String,
	pub embedding_max_retry: Option<u32>,
	pub embedding_retry_backoff_ms: Option<u64>,
	pub embedding_concurrency: Option<u32>,
	pub reindex: ReindexState,
}

/// Progress snapshot of the most recent or ongoing full-corpus reindex.
/// Persisted inside [`AiSetting`] so progress survives process restarts.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReindexState {
	pub running: bool,
	pub total: i32,
	pub processed: i32,
	pub failed: i32,
	pub started_ts: i64,
	pub updated_ts: i64,
	pub model: String,
}
