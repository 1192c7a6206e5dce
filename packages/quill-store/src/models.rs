use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Visibility {
	Private,
	Protected,
	Public,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RowStatus {
	Normal,
	Archived,
}

/// A note as the external store exposes it. The semantic core only reads
/// notes; all mutation happens in the owning storage engine.
#[derive(Clone, Debug)]
pub struct Note {
	pub id: i32,
	pub creator_id: i32,
	pub content: String,
	pub visibility: Visibility,
	pub row_status: RowStatus,
	pub created_at: OffsetDateTime,
	pub updated_at: OffsetDateTime,
}

/// Vector indexing row for one note. At most one row per note; the indexing
/// pipeline is the sole writer and overwrites in place on content change.
#[derive(Clone, Debug)]
pub struct NoteEmbedding {
	pub note_id: i32,
	pub model: String,
	pub dimension: i32,
	pub vector: Vec<f32>,
	pub content_hash: String,
	pub updated_at: OffsetDateTime,
}

/// Query shape for paged note listing. `visible_to` restricts results to
/// notes the given user may see (own notes plus public/protected ones);
/// `visibilities` restricts by visibility class directly, for anonymous
/// callers.
#[derive(Clone, Debug, Default)]
pub struct NoteFind {
	pub row_status: Option<RowStatus>,
	pub visibilities: Option<Vec<Visibility>>,
	pub visible_to: Option<i32>,
	pub creator_id: Option<i32>,
	pub filter: Option<String>,
	pub limit: Option<usize>,
	pub offset: Option<usize>,
}
