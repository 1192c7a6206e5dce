pub mod indexing;
pub mod reindex;
pub mod search;

mod error;

pub use error::{Error, Result};
pub use indexing::HashCheck;
pub use search::{NoteView, SearchRequest, SearchResponse};

use std::{
	future::Future,
	pin::Pin,
	sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock},
};

use tokio::sync::Semaphore;
use tracing::warn;

use quill_config::{AiSetting, EmbeddingDefaults, EmbeddingProviderConfig};
use quill_store::{Note, NoteFind, NoteStore, SecretCipher, SettingsStore};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub(crate) const CANDIDATE_BATCH_SIZE: usize = 2000;

/// Narrow embedding capability: exactly one production implementation over
/// the HTTP provider, plus test-injectable implementations. The model
/// identifier travels in the resolved config.
pub trait EmbeddingClient
where
	Self: Send + Sync,
{
	fn embed<'a>(
		&'a self,
		cfg: &'a EmbeddingProviderConfig,
		text: &'a str,
	) -> BoxFuture<'a, quill_providers::Result<Vec<f32>>>;
}

struct HttpEmbeddingClient;

impl EmbeddingClient for HttpEmbeddingClient {
	fn embed<'a>(
		&'a self,
		cfg: &'a EmbeddingProviderConfig,
		text: &'a str,
	) -> BoxFuture<'a, quill_providers::Result<Vec<f32>>> {
		Box::pin(quill_providers::embedding::embed(cfg, text))
	}
}

/// Semantic retrieval core: keeps note embeddings in sync with content,
/// answers similarity queries, and runs full-corpus reindexes. Wrap it in
/// an [`Arc`]; the scheduling entry points spawn background work.
pub struct SemanticService {
	pub(crate) notes: Arc<dyn NoteStore>,
	pub(crate) settings: Arc<dyn SettingsStore>,
	pub(crate) cipher: Arc<dyn SecretCipher>,
	pub(crate) embedding: Arc<dyn EmbeddingClient>,
	pub(crate) defaults: EmbeddingDefaults,
	limiter: RwLock<Arc<Semaphore>>,
	reindex_running: Mutex<bool>,
}

impl SemanticService {
	pub fn new(
		notes: Arc<dyn NoteStore>,
		settings: Arc<dyn SettingsStore>,
		cipher: Arc<dyn SecretCipher>,
		defaults: EmbeddingDefaults,
	) -> Self {
		Self::with_embedding_client(notes, settings, cipher, defaults, Arc::new(HttpEmbeddingClient))
	}

	pub fn with_embedding_client(
		notes: Arc<dyn NoteStore>,
		settings: Arc<dyn SettingsStore>,
		cipher: Arc<dyn SecretCipher>,
		defaults: EmbeddingDefaults,
		embedding: Arc<dyn EmbeddingClient>,
	) -> Self {
		let limiter = Arc::new(Semaphore::new(defaults.concurrency.max(1)));

		Self {
			notes,
			settings,
			cipher,
			embedding,
			defaults,
			limiter: RwLock::new(limiter),
			reindex_running: Mutex::new(false),
		}
	}

	/// Startup reconciliation: clears a reindex `running` flag left behind
	/// by a crashed process and applies the persisted embedding
	/// concurrency for subsequently scheduled work.
	pub async fn startup(&self) {
		self.reset_stale_reindex_state().await;

		match self.settings.ai_setting().await {
			Ok(setting) =>
				if let Some(limit) = setting.embedding_concurrency.filter(|limit| *limit > 0) {
					self.set_embedding_concurrency(limit as usize);
				},
			Err(err) => {
				warn!(error = %err, "Failed to load AI setting for embedding concurrency.");
			},
		}
	}

	pub fn semantic_storage_enabled(&self) -> bool {
		self.notes.supports_semantic_storage()
	}

	pub async fn semantic_indexing_enabled(&self) -> bool {
		self.semantic_storage_enabled() && self.resolved_config().await.is_ok()
	}

	/// Effective provider configuration for one call: the persisted admin
	/// setting, with its API key decrypted, over process-level fallbacks.
	pub(crate) async fn resolved_config(&self) -> Result<EmbeddingProviderConfig> {
		let setting = self.settings.ai_setting().await?;
		let api_key = self.decrypted_api_key(&setting)?;

		Ok(quill_config::resolve_embedding_config(&setting, api_key, &self.defaults)?)
	}

	fn decrypted_api_key(&self, setting: &AiSetting) -> Result<Option<String>> {
		let encrypted = setting.openai_api_key_encrypted.trim();

		if encrypted.is_empty() {
			return Ok(None);
		}

		let api_key = self.cipher.decrypt(encrypted).map_err(|err| Error::FailedPrecondition {
			message: format!("failed to decrypt stored openai api key: {err}"),
		})?;

		Ok(Some(api_key))
	}

	pub(crate) fn limiter(&self) -> Arc<Semaphore> {
		self.limiter.read().unwrap_or_else(PoisonError::into_inner).clone()
	}

	/// Swaps in a fresh limiter for subsequently scheduled work; tasks
	/// already holding permits on the old limiter are unaffected.
	pub fn set_embedding_concurrency(&self, limit: usize) {
		let fresh = Arc::new(Semaphore::new(limit.max(1)));

		*self.limiter.write().unwrap_or_else(PoisonError::into_inner) = fresh;
	}

	pub(crate) fn reindex_flag(&self) -> MutexGuard<'_, bool> {
		self.reindex_running.lock().unwrap_or_else(PoisonError::into_inner)
	}

	/// Pages through the note store in fixed-size batches until exhausted.
	/// Ranking must consider every eligible note, not just one page.
	pub(crate) async fn list_all_notes(&self, base: &NoteFind) -> Result<Vec<Note>> {
		let mut all_notes = Vec::new();
		let mut offset = 0;

		loop {
			let mut find = base.clone();

			find.limit = Some(CANDIDATE_BATCH_SIZE);
			find.offset = Some(offset);

			let notes = self.notes.list_notes(&find).await?;

			if notes.is_empty() {
				break;
			}

			let count = notes.len();

			all_notes.extend(notes);

			if count < CANDIDATE_BATCH_SIZE {
				break;
			}

			offset += count;
		}

		Ok(all_notes)
	}
}

pub(crate) fn content_hash(content: &str) -> String {
	blake3::hash(content.as_bytes()).to_hex().to_string()
}
