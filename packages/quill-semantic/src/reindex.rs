//! Full-corpus reindex: a single background walk over every note that
//! re-embeds each one and persists progress so admins can watch it and a
//! restart can tell a dead run from a live one.

use std::sync::Arc;

use time::OffsetDateTime;
use tokio::time::Duration;
use tracing::{info, warn};

use crate::{Error, HashCheck, Result, SemanticService};
use quill_config::{EmbeddingProviderConfig, ReindexState};
use quill_store::{NoteFind, RowStatus};

/// Progress is persisted every this many processed notes, and once more at
/// the end.
pub(crate) const PROGRESS_FLUSH_STEP: i32 = 10;
pub(crate) const TASK_TIMEOUT: Duration = Duration::from_secs(12 * 60 * 60);

/// Clears the in-process running flag however the task ends, including
/// panics unwinding through the walk.
struct RunningGuard<'a> {
	service: &'a SemanticService,
}

impl Drop for RunningGuard<'_> {
	fn drop(&mut self) {
		*self.service.reindex_flag() = false;
	}
}

impl SemanticService {
	/// Starts a background reindex of every note, returning once the task
	/// is spawned. Both preconditions (semantic-capable backend, resolvable
	/// provider) are checked before the running slot is claimed. At most
	/// one reindex runs per process; a second start while one is live fails
	/// with [`Error::AlreadyExists`] and leaves the live run's progress
	/// untouched.
	pub async fn start_reindex(self: &Arc<Self>) -> Result<()> {
		if !self.semantic_storage_enabled() {
			return Err(Error::FailedPrecondition {
				message: "semantic search only supports the postgres backend".into(),
			});
		}

		let cfg = self.resolved_config().await?;

		{
			let mut running = self.reindex_flag();

			if *running {
				return Err(Error::AlreadyExists {
					message: "semantic reindex is already running".into(),
				});
			}

			*running = true;
		}

		let service = self.clone();

		tokio::spawn(async move {
			service.run_reindex_task(cfg).await;
		});

		Ok(())
	}

	async fn run_reindex_task(self: Arc<Self>, cfg: EmbeddingProviderConfig) {
		let _guard = RunningGuard { service: &self };

		if tokio::time::timeout(TASK_TIMEOUT, self.reindex_walk(cfg)).await.is_err() {
			warn!("Semantic reindex timed out; marking it stopped.");

			if let Err(err) = self.update_reindex_state(|state| state.running = false).await {
				warn!(error = %err, "Failed to persist reindex timeout state.");
			}
		}
	}

	async fn reindex_walk(&self, cfg: EmbeddingProviderConfig) {
		let started_ts = OffsetDateTime::now_utc().unix_timestamp();

		if let Err(err) = self
			.update_reindex_state(|state| {
				*state = ReindexState {
					running: true,
					total: 0,
					processed: 0,
					failed: 0,
					started_ts,
					updated_ts: started_ts,
					model: cfg.model.clone(),
				};
			})
			.await
		{
			warn!(error = %err, "Failed to persist initial reindex state.");

			return;
		}

		let mut notes = Vec::new();

		for row_status in [RowStatus::Normal, RowStatus::Archived] {
			let find = NoteFind { row_status: Some(row_status), ..Default::default() };

			match self.list_all_notes(&find).await {
				Ok(batch) => notes.extend(batch),
				Err(err) => {
					warn!(error = %err, "Failed to list notes for semantic reindex.");

					if let Err(err) = self.update_reindex_state(|state| state.running = false).await
					{
						warn!(error = %err, "Failed to persist reindex failure state.");
					}

					return;
				},
			}
		}

		let total = notes.len() as i32;

		if let Err(err) = self.update_reindex_state(|state| state.total = total).await {
			warn!(error = %err, "Failed to persist reindex total.");
		}

		info!(total, model = %cfg.model, "Semantic reindex started.");

		let mut processed = 0;
		let mut failed = 0;

		for note in &notes {
			if !note.content.trim().is_empty()
				&& let Err(err) =
					self.refresh_embedding(note.id, &note.content, HashCheck::Bypass).await
			{
				failed += 1;

				warn!(note_id = note.id, error = %err, "Semantic reindex failed for note.");
			}

			processed += 1;

			if processed % PROGRESS_FLUSH_STEP == 0
				&& let Err(err) = self
					.update_reindex_state(|state| {
						state.processed = processed;
						state.failed = failed;
						state.updated_ts = OffsetDateTime::now_utc().unix_timestamp();
					})
					.await
			{
				warn!(error = %err, "Failed to persist reindex progress.");
			}
		}

		if let Err(err) = self
			.update_reindex_state(|state| {
				state.running = false;
				state.processed = processed;
				state.failed = failed;
				state.updated_ts = OffsetDateTime::now_utc().unix_timestamp();
			})
			.await
		{
			warn!(error = %err, "Failed to persist final reindex state.");
		}

		info!(processed, failed, "Semantic reindex finished.");
	}

	/// Read-mutate-write of the persisted reindex progress inside the AI
	/// setting document.
	pub(crate) async fn update_reindex_state(
		&self,
		mutate: impl FnOnce(&mut ReindexState),
	) -> Result<()> {
		let mut setting = self.settings.ai_setting().await?;

		mutate(&mut setting.reindex);

		self.settings.upsert_ai_setting(setting).await?;

		Ok(())
	}

	/// A persisted `running = true` with no live task means a previous
	/// process died mid-reindex. Called once at startup, before any task of
	/// this process could have set the in-process flag.
	pub(crate) async fn reset_stale_reindex_state(&self) {
		let setting = match self.settings.ai_setting().await {
			Ok(setting) => setting,
			Err(err) => {
				warn!(error = %err, "Failed to load AI setting for reindex recovery.");

				return;
			},
		};

		if !setting.reindex.running {
			return;
		}

		warn!("Found stale reindex state from a previous run; marking it stopped.");

		if let Err(err) = self.update_reindex_state(|state| state.running = false).await {
			warn!(error = %err, "Failed to reset stale reindex state.");
		}
	}

	/// Current persisted reindex progress, for admin surfaces.
	pub async fn reindex_state(&self) -> Result<ReindexState> {
		Ok(self.settings.ai_setting().await?.reindex)
	}
}
