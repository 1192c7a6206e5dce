pub mod models;

mod error;

pub use error::{Error, Result};
pub use models::{Note, NoteEmbedding, NoteFind, RowStatus, Visibility};

use std::{collections::HashMap, future::Future, pin::Pin};

use quill_config::AiSetting;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Note storage collaborator. Embedding persistence is only available on
/// one backend family; on any other backend every embedding operation must
/// fail fast with [`Error::Unsupported`] instead of partially working, and
/// `supports_semantic_storage` must return `false`.
pub trait NoteStore
where
	Self: Send + Sync,
{
	fn supports_semantic_storage(&self) -> bool;

	fn list_notes<'a>(&'a self, find: &'a NoteFind) -> BoxFuture<'a, Result<Vec<Note>>>;

	/// Content hash of the stored embedding row, or `None` when the note has
	/// not been embedded yet.
	fn embedding_content_hash<'a>(&'a self, note_id: i32)
	-> BoxFuture<'a, Result<Option<String>>>;

	/// Upsert keyed by note id; last write wins at the row level.
	fn upsert_embedding<'a>(&'a self, embedding: NoteEmbedding) -> BoxFuture<'a, Result<()>>;

	fn delete_embedding<'a>(&'a self, note_id: i32) -> BoxFuture<'a, Result<()>>;

	/// Bulk vector load for exactly the given note ids. Ids without a stored
	/// embedding are simply absent from the result.
	fn list_embeddings<'a>(
		&'a self,
		note_ids: &'a [i32],
	) -> BoxFuture<'a, Result<HashMap<i32, Vec<f32>>>>;
}

/// Settings collaborator. The AI setting is an opaque document from the
/// store's point of view; this core reads and writes it whole.
pub trait SettingsStore
where
	Self: Send + Sync,
{
	fn ai_setting<'a>(&'a self) -> BoxFuture<'a, Result<AiSetting>>;

	fn upsert_ai_setting<'a>(&'a self, setting: AiSetting) -> BoxFuture<'a, Result<()>>;
}

/// Decrypts stored provider credentials immediately before use. Plaintext
/// keys are never persisted by the semantic core.
pub trait SecretCipher
where
	Self: Send + Sync,
{
	fn decrypt(&self, ciphertext: &str) -> Result<String>;
}
