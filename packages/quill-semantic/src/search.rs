//! Similarity search over indexed notes: embed the query once, score every
//! visible candidate in memory, and page through the ranked list with an
//! opaque token.

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::{Error, Result, SemanticService};
use quill_store::{Note, NoteFind, RowStatus, Visibility};

pub const DEFAULT_PAGE_SIZE: usize = 10;
pub const MAX_PAGE_SIZE: usize = 1000;

#[derive(Clone, Debug)]
pub struct SearchRequest {
	pub query: String,
	/// Authenticated caller, or `None` for anonymous access.
	pub user_id: Option<i32>,
	pub state: RowStatus,
	/// Store-side candidate filter, passed through verbatim.
	pub filter: Option<String>,
	pub page_size: Option<usize>,
	pub page_token: Option<String>,
}

/// Read-only note projection returned to callers; scores stay internal.
#[derive(Clone, Debug, Serialize)]
pub struct NoteView {
	pub id: i32,
	pub creator_id: i32,
	pub content: String,
	pub visibility: Visibility,
	pub row_status: RowStatus,
	#[serde(with = "time::serde::rfc3339")]
	pub created_at: OffsetDateTime,
	#[serde(with = "time::serde::rfc3339")]
	pub updated_at: OffsetDateTime,
}

#[derive(Clone, Debug)]
pub struct SearchResponse {
	pub notes: Vec<NoteView>,
	/// Empty when the ranked list is exhausted.
	pub next_page_token: String,
}

/// Pagination cursor. Opaque to callers; the ranking is deterministic for a
/// fixed corpus, so a plain offset resumes exactly where the previous page
/// ended.
#[derive(Debug, Serialize, Deserialize)]
struct PageToken {
	limit: usize,
	offset: usize,
}

impl PageToken {
	fn encode(&self) -> String {
		// Serializing two usize fields cannot fail.
		let json = serde_json::to_vec(self).unwrap_or_default();

		URL_SAFE_NO_PAD.encode(json)
	}

	fn decode(token: &str) -> Result<Self> {
		let raw = URL_SAFE_NO_PAD
			.decode(token)
			.map_err(|err| Error::InvalidArgument { message: format!("invalid page token: {err}") })?;

		serde_json::from_slice(&raw)
			.map_err(|err| Error::InvalidArgument { message: format!("invalid page token: {err}") })
	}
}

struct ScoredNote {
	note: Note,
	score: f64,
}

impl From<Note> for NoteView {
	fn from(note: Note) -> Self {
		Self {
			id: note.id,
			creator_id: note.creator_id,
			content: note.content,
			visibility: note.visibility,
			row_status: note.row_status,
			created_at: note.created_at,
			updated_at: note.updated_at,
		}
	}
}

/// `None` when either vector is empty, the dimensions disagree, or either
/// norm is zero; such pairs are unscorable rather than zero-similarity.
pub(crate) fn cosine_similarity(a: &[f32], b: &[f32]) -> Option<f64> {
	if a.is_empty() || a.len() != b.len() {
		return None;
	}

	let mut dot = 0.;
	let mut norm_a = 0.;
	let mut norm_b = 0.;

	for (x, y) in a.iter().zip(b.iter()) {
		let (x, y) = (*x as f64, *y as f64);

		dot += x * y;
		norm_a += x * x;
		norm_b += y * y;
	}

	if norm_a == 0. || norm_b == 0. {
		return None;
	}

	Some(dot / (norm_a.sqrt() * norm_b.sqrt()))
}

/// Score descending, then update time descending, then id descending. Total
/// over distinct notes, so the ordering is reproducible across requests.
fn rank(scored: &mut [ScoredNote]) {
	scored.sort_by(|a, b| {
		b.score
			.total_cmp(&a.score)
			.then_with(|| b.note.updated_at.cmp(&a.note.updated_at))
			.then_with(|| b.note.id.cmp(&a.note.id))
	});
}

impl SemanticService {
	/// Ranked semantic search. Every eligible note is scored; pagination
	/// slices the full ranked list, so later pages never miss results that
	/// a partial scan would have skipped.
	pub async fn search(&self, request: SearchRequest) -> Result<SearchResponse> {
		if request.query.trim().is_empty() {
			return Err(Error::InvalidArgument { message: "query is required".into() });
		}
		if !self.semantic_storage_enabled() {
			return Err(Error::FailedPrecondition {
				message: "semantic search only supports the postgres backend".into(),
			});
		}

		let cfg = self.resolved_config().await?;
		let query_vector =
			self.embedding.embed(&cfg, &request.query).await.map_err(|err| Error::Internal {
				message: format!("failed to generate query embedding: {err}"),
			})?;
		let candidate_find = NoteFind {
			row_status: Some(request.state),
			visibilities: request.user_id.is_none().then(|| vec![Visibility::Public]),
			visible_to: request.user_id,
			filter: request.filter.clone(),
			..Default::default()
		};
		let notes = self.list_all_notes(&candidate_find).await?;

		if notes.is_empty() {
			return Ok(SearchResponse { notes: Vec::new(), next_page_token: String::new() });
		}

		let note_ids = notes.iter().map(|note| note.id).collect::<Vec<_>>();
		let vectors = self.notes.list_embeddings(&note_ids).await?;
		// Notes without a stored vector, or whose vector cannot be compared
		// against the query, are silently excluded.
		let mut scored = notes
			.into_iter()
			.filter_map(|note| {
				let vector = vectors.get(&note.id)?;
				let score = cosine_similarity(&query_vector, vector)?;

				Some(ScoredNote { note, score })
			})
			.collect::<Vec<_>>();

		rank(&mut scored);

		let (limit, offset) = match request.page_token.as_deref().filter(|token| !token.is_empty()) {
			Some(token) => {
				let token = PageToken::decode(token)?;

				(token.limit, token.offset)
			},
			None => {
				let limit = match request.page_size {
					Some(size) if size > 0 => size,
					_ => DEFAULT_PAGE_SIZE,
				};

				(limit, 0)
			},
		};
		// A forged or legacy token may carry a zero limit; treat it like an
		// unset page size so pagination always advances.
		let limit = if limit == 0 { DEFAULT_PAGE_SIZE } else { limit.min(MAX_PAGE_SIZE) };

		let total = scored.len();

		if offset >= total {
			return Ok(SearchResponse { notes: Vec::new(), next_page_token: String::new() });
		}

		let end = (offset + limit).min(total);
		let page = scored
			.into_iter()
			.skip(offset)
			.take(end - offset)
			.map(|scored| scored.note.into())
			.collect();
		let next_page_token =
			if end < total { PageToken { limit, offset: end }.encode() } else { String::new() };

		Ok(SearchResponse { notes: page, next_page_token })
	}
}
