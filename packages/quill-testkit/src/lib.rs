//! In-memory collaborator implementations for tests. These mirror the
//! contract of the production stores closely enough that the semantic core
//! cannot tell the difference: visibility filtering, paging, and the
//! unsupported-backend behavior all match.

use std::{
	collections::HashMap,
	sync::{Mutex, MutexGuard, PoisonError},
};

use quill_config::AiSetting;
use quill_store::{
	BoxFuture, Error, Note, NoteEmbedding, NoteFind, NoteStore, Result, SecretCipher,
	SettingsStore, Visibility,
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
	mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Note store backed by plain collections. Construct with
/// [`MemoryNoteStore::new`] for the semantic-capable backend, or
/// [`MemoryNoteStore::without_semantic_storage`] to emulate a backend that
/// cannot hold vectors.
pub struct MemoryNoteStore {
	notes: Mutex<Vec<Note>>,
	embeddings: Mutex<HashMap<i32, NoteEmbedding>>,
	supports_semantic_storage: bool,
}

impl MemoryNoteStore {
	pub fn new(notes: Vec<Note>) -> Self {
		Self {
			notes: Mutex::new(notes),
			embeddings: Mutex::new(HashMap::new()),
			supports_semantic_storage: true,
		}
	}

	pub fn without_semantic_storage(notes: Vec<Note>) -> Self {
		Self { supports_semantic_storage: false, ..Self::new(notes) }
	}

	pub fn insert_note(&self, note: Note) {
		lock(&self.notes).push(note);
	}

	/// Seeds a stored embedding row directly, bypassing the pipeline.
	pub fn seed_embedding(&self, embedding: NoteEmbedding) {
		lock(&self.embeddings).insert(embedding.note_id, embedding);
	}

	pub fn stored_embedding(&self, note_id: i32) -> Option<NoteEmbedding> {
		lock(&self.embeddings).get(&note_id).cloned()
	}

	pub fn embedding_count(&self) -> usize {
		lock(&self.embeddings).len()
	}

	fn matches(note: &Note, find: &NoteFind) -> bool {
		if let Some(row_status) = find.row_status
			&& note.row_status != row_status
		{
			return false;
		}
		if let Some(visibilities) = &find.visibilities
			&& !visibilities.contains(&note.visibility)
		{
			return false;
		}
		if let Some(user_id) = find.visible_to
			&& note.creator_id != user_id
			&& note.visibility == Visibility::Private
		{
			return false;
		}
		if let Some(creator_id) = find.creator_id
			&& note.creator_id != creator_id
		{
			return false;
		}
		if let Some(filter) = &find.filter
			&& !note.content.contains(filter.as_str())
		{
			return false;
		}

		true
	}

	fn unsupported(&self) -> Result<()> {
		if self.supports_semantic_storage {
			Ok(())
		} else {
			Err(Error::Unsupported {
				message: "embedding storage is not available on this backend".to_owned(),
			})
		}
	}
}

impl NoteStore for MemoryNoteStore {
	fn supports_semantic_storage(&self) -> bool {
		self.supports_semantic_storage
	}

	fn list_notes<'a>(&'a self, find: &'a NoteFind) -> BoxFuture<'a, Result<Vec<Note>>> {
		Box::pin(async move {
			let mut notes = lock(&self.notes)
				.iter()
				.filter(|note| Self::matches(note, find))
				.cloned()
				.collect::<Vec<_>>();

			notes.sort_by_key(|note| note.id);

			let offset = find.offset.unwrap_or(0);
			let limit = find.limit.unwrap_or(usize::MAX);

			Ok(notes.into_iter().skip(offset).take(limit).collect())
		})
	}

	fn embedding_content_hash<'a>(
		&'a self,
		note_id: i32,
	) -> BoxFuture<'a, Result<Option<String>>> {
		Box::pin(async move {
			self.unsupported()?;

			Ok(lock(&self.embeddings).get(&note_id).map(|embedding| embedding.content_hash.clone()))
		})
	}

	fn upsert_embedding<'a>(&'a self, embedding: NoteEmbedding) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			self.unsupported()?;

			lock(&self.embeddings).insert(embedding.note_id, embedding);

			Ok(())
		})
	}

	fn delete_embedding<'a>(&'a self, note_id: i32) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			self.unsupported()?;

			lock(&self.embeddings).remove(&note_id);

			Ok(())
		})
	}

	fn list_embeddings<'a>(
		&'a self,
		note_ids: &'a [i32],
	) -> BoxFuture<'a, Result<HashMap<i32, Vec<f32>>>> {
		Box::pin(async move {
			self.unsupported()?;

			let embeddings = lock(&self.embeddings);

			Ok(note_ids
				.iter()
				.filter_map(|note_id| {
					embeddings.get(note_id).map(|embedding| (*note_id, embedding.vector.clone()))
				})
				.collect())
		})
	}
}

/// Settings store holding one AI setting document in memory.
pub struct MemorySettings {
	setting: Mutex<AiSetting>,
}

impl MemorySettings {
	pub fn new(setting: AiSetting) -> Self {
		Self { setting: Mutex::new(setting) }
	}

	pub fn current(&self) -> AiSetting {
		lock(&self.setting).clone()
	}
}

impl Default for MemorySettings {
	fn default() -> Self {
		Self::new(AiSetting::default())
	}
}

impl SettingsStore for MemorySettings {
	fn ai_setting<'a>(&'a self) -> BoxFuture<'a, Result<AiSetting>> {
		Box::pin(async move { Ok(self.current()) })
	}

	fn upsert_ai_setting<'a>(&'a self, setting: AiSetting) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			*lock(&self.setting) = setting;

			Ok(())
		})
	}
}

/// Identity cipher: ciphertext and plaintext are the same string. Tests
/// seed `openai_api_key_encrypted` with the literal key.
pub struct PlainCipher;

impl SecretCipher for PlainCipher {
	fn decrypt(&self, ciphertext: &str) -> Result<String> {
		Ok(ciphertext.to_owned())
	}
}
