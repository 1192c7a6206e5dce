//! Background embedding maintenance. Note writes call the `schedule_*`
//! entry points on their hot path; everything slow happens in spawned tasks
//! guarded by the shared concurrency limiter.

use std::{sync::Arc, time::Duration};

use time::OffsetDateTime;
use tracing::warn;

use crate::{Error, Result, SemanticService, content_hash};
use quill_store::NoteEmbedding;

pub(crate) const REFRESH_TIMEOUT: Duration = Duration::from_secs(45);
pub(crate) const DELETE_TIMEOUT: Duration = Duration::from_secs(10);

/// Whether a refresh may skip the provider call when the stored row already
/// matches the current content. Reindexing bypasses the check so a model
/// change re-embeds every note.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HashCheck {
	Enforce,
	Bypass,
}

impl SemanticService {
	/// Fire-and-forget embedding refresh after a note create or update.
	/// Cheap preconditions run synchronously so obviously dead work never
	/// spawns; configuration problems inside the task stay silent because
	/// the instance may simply have semantic search turned off.
	pub fn schedule_refresh(self: &Arc<Self>, note_id: i32, content: &str) {
		if !self.semantic_storage_enabled() || content.trim().is_empty() {
			return;
		}

		let service = self.clone();
		let content = content.to_owned();

		tokio::spawn(async move {
			if service.resolved_config().await.is_err() {
				return;
			}

			let refresh = service.refresh_embedding(note_id, &content, HashCheck::Enforce);

			match tokio::time::timeout(REFRESH_TIMEOUT, refresh).await {
				Ok(Ok(())) => (),
				Ok(Err(err)) => {
					warn!(note_id, error = %err, "Failed to refresh note embedding.");
				},
				Err(_) => {
					warn!(note_id, "Timed out refreshing note embedding.");
				},
			}
		});
	}

	/// Fire-and-forget embedding removal after a note delete. Deleting an
	/// absent row is a no-op at the store, so scheduling is unconditional
	/// beyond the backend check.
	pub fn schedule_delete(self: &Arc<Self>, note_id: i32) {
		if !self.semantic_storage_enabled() {
			return;
		}

		let service = self.clone();

		tokio::spawn(async move {
			let delete = service.notes.delete_embedding(note_id);

			match tokio::time::timeout(DELETE_TIMEOUT, delete).await {
				Ok(Ok(())) => (),
				Ok(Err(err)) => {
					warn!(note_id, error = %err, "Failed to delete note embedding.");
				},
				Err(_) => {
					warn!(note_id, "Timed out deleting note embedding.");
				},
			}
		});
	}

	/// Embed one note's content and upsert its row. With
	/// [`HashCheck::Enforce`], unchanged content returns without touching
	/// the provider. Holds one limiter permit across the provider call and
	/// the write.
	pub async fn refresh_embedding(
		&self,
		note_id: i32,
		content: &str,
		hash_check: HashCheck,
	) -> Result<()> {
		let cfg = self.resolved_config().await?;
		let content_hash = content_hash(content);

		if hash_check == HashCheck::Enforce
			&& self.notes.embedding_content_hash(note_id).await?.as_deref()
				== Some(content_hash.as_str())
		{
			return Ok(());
		}

		let _permit = self.limiter().acquire_owned().await.map_err(|err| Error::Internal {
			message: format!("embedding limiter closed: {err}"),
		})?;
		let vector = self.embedding.embed(&cfg, content).await?;

		self.notes
			.upsert_embedding(NoteEmbedding {
				note_id,
				model: cfg.model.clone(),
				dimension: vector.len() as i32,
				vector,
				content_hash,
				updated_at: OffsetDateTime::now_utc(),
			})
			.await?;

		Ok(())
	}
}
