use std::{collections::BTreeSet, sync::Arc};

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};

use quill_semantic::{Error, SearchRequest};
use quill_store::{RowStatus, Visibility};
use quill_testkit::MemoryNoteStore;

use super::suite::{StubEmbedding, build_service, configured_settings, note, stored_embedding};

fn request(query: &str, user_id: Option<i32>) -> SearchRequest {
	SearchRequest {
		query: query.to_owned(),
		user_id,
		state: RowStatus::Normal,
		filter: None,
		page_size: None,
		page_token: None,
	}
}

#[tokio::test]
async fn ranks_visible_notes_by_similarity() {
	let notes = Arc::new(MemoryNoteStore::new(vec![
		note(1, 1, Visibility::Private, "rust ownership notes"),
		note(2, 2, Visibility::Private, "someone else's draft"),
		note(3, 2, Visibility::Public, "gardening calendar"),
	]));

	notes.seed_embedding(stored_embedding(1, vec![1., 0.]));
	notes.seed_embedding(stored_embedding(2, vec![0.99, 0.01]));
	notes.seed_embedding(stored_embedding(3, vec![0.4, 0.6]));

	let service = build_service(
		notes,
		Arc::new(configured_settings()),
		Arc::new(StubEmbedding { vector: vec![1., 0.] }),
	);
	let response =
		service.search(request("ownership", Some(1))).await.expect("Expected search results.");
	let ids = response.notes.iter().map(|note| note.id).collect::<Vec<_>>();

	// User 2's private note is invisible to user 1 even though it scores
	// higher than the public one.
	assert_eq!(ids, vec![1, 3]);
	assert!(response.next_page_token.is_empty());
}

#[tokio::test]
async fn anonymous_callers_see_only_public_notes() {
	let notes = Arc::new(MemoryNoteStore::new(vec![
		note(1, 1, Visibility::Private, "private plan"),
		note(2, 1, Visibility::Protected, "workspace doc"),
		note(3, 1, Visibility::Public, "public announcement"),
	]));

	for id in 1..=3 {
		notes.seed_embedding(stored_embedding(id, vec![1., 0.]));
	}

	let service = build_service(
		notes,
		Arc::new(configured_settings()),
		Arc::new(StubEmbedding { vector: vec![1., 0.] }),
	);
	let response = service.search(request("hello", None)).await.expect("Expected search results.");
	let ids = response.notes.iter().map(|note| note.id).collect::<Vec<_>>();

	assert_eq!(ids, vec![3]);
}

#[tokio::test]
async fn authenticated_callers_see_protected_notes_of_others() {
	let notes = Arc::new(MemoryNoteStore::new(vec![
		note(1, 1, Visibility::Private, "private plan"),
		note(2, 1, Visibility::Protected, "workspace doc"),
		note(3, 1, Visibility::Public, "public announcement"),
	]));

	for id in 1..=3 {
		notes.seed_embedding(stored_embedding(id, vec![1., 0.]));
	}

	let service = build_service(
		notes,
		Arc::new(configured_settings()),
		Arc::new(StubEmbedding { vector: vec![1., 0.] }),
	);
	let response =
		service.search(request("hello", Some(2))).await.expect("Expected search results.");
	let ids = response.notes.iter().map(|note| note.id).collect::<BTreeSet<_>>();

	assert_eq!(ids, BTreeSet::from([2, 3]));
}

#[tokio::test]
async fn notes_without_embeddings_are_excluded() {
	let notes = Arc::new(MemoryNoteStore::new(vec![
		note(1, 1, Visibility::Public, "indexed note"),
		note(2, 1, Visibility::Public, "not yet indexed"),
	]));

	notes.seed_embedding(stored_embedding(1, vec![1., 0.]));

	let service = build_service(
		notes,
		Arc::new(configured_settings()),
		Arc::new(StubEmbedding { vector: vec![1., 0.] }),
	);
	let response = service.search(request("hello", Some(1))).await.expect("Expected results.");
	let ids = response.notes.iter().map(|note| note.id).collect::<Vec<_>>();

	assert_eq!(ids, vec![1]);
}

#[tokio::test]
async fn pagination_is_complete_and_deterministic() {
	let notes = Arc::new(MemoryNoteStore::new(
		(1..=5).map(|id| note(id, 1, Visibility::Public, "paged note")).collect(),
	));

	for id in 1..=5 {
		notes.seed_embedding(stored_embedding(id, vec![1., id as f32 / 10.]));
	}

	let service = build_service(
		notes,
		Arc::new(configured_settings()),
		Arc::new(StubEmbedding { vector: vec![1., 0.] }),
	);
	let walk = || async {
		let mut ids = Vec::new();
		let mut token = None;

		loop {
			let mut request = request("hello", Some(1));

			request.page_size = Some(2);
			request.page_token = token.clone();

			let response = service.search(request).await.expect("Expected a page.");

			ids.extend(response.notes.iter().map(|note| note.id));

			if response.next_page_token.is_empty() {
				break;
			}

			token = Some(response.next_page_token);
		}

		ids
	};
	let first_walk = walk().await;
	let second_walk = walk().await;

	assert_eq!(first_walk.len(), 5);
	assert_eq!(first_walk.iter().collect::<BTreeSet<_>>().len(), 5);
	assert_eq!(first_walk, second_walk);
}

#[tokio::test]
async fn zero_limit_page_token_falls_back_to_the_default_page_size() {
	let notes = Arc::new(MemoryNoteStore::new(
		(1..=3).map(|id| note(id, 1, Visibility::Public, "paged note")).collect(),
	));

	for id in 1..=3 {
		notes.seed_embedding(stored_embedding(id, vec![1., id as f32 / 10.]));
	}

	let service = build_service(
		notes,
		Arc::new(configured_settings()),
		Arc::new(StubEmbedding { vector: vec![1., 0.] }),
	);
	let mut zero_limit_request = request("hello", Some(1));

	zero_limit_request.page_token =
		Some(URL_SAFE_NO_PAD.encode(r#"{"limit":0,"offset":0}"#));

	let response = service.search(zero_limit_request).await.expect("Expected a page.");

	// A zero limit must not produce an empty page that re-issues the same
	// offset forever.
	assert_eq!(response.notes.len(), 3);
	assert!(response.next_page_token.is_empty());
}

#[tokio::test]
async fn blank_query_is_rejected() {
	let service = build_service(
		Arc::new(MemoryNoteStore::new(Vec::new())),
		Arc::new(configured_settings()),
		Arc::new(StubEmbedding { vector: vec![1., 0.] }),
	);
	let err = service.search(request("   ", Some(1))).await.expect_err("Expected rejection.");

	assert!(matches!(err, Error::InvalidArgument { .. }), "unexpected error: {err}");
}

#[tokio::test]
async fn malformed_page_token_is_rejected() {
	let notes = Arc::new(MemoryNoteStore::new(vec![note(1, 1, Visibility::Public, "note")]));

	notes.seed_embedding(stored_embedding(1, vec![1., 0.]));

	let service = build_service(
		notes,
		Arc::new(configured_settings()),
		Arc::new(StubEmbedding { vector: vec![1., 0.] }),
	);
	let mut bad_request = request("hello", Some(1));

	bad_request.page_token = Some("???not-a-token".to_owned());

	let err = service.search(bad_request).await.expect_err("Expected rejection.");

	assert!(matches!(err, Error::InvalidArgument { .. }), "unexpected error: {err}");
}

#[tokio::test]
async fn unsupported_backend_is_a_precondition_failure() {
	let service = build_service(
		Arc::new(MemoryNoteStore::without_semantic_storage(Vec::new())),
		Arc::new(configured_settings()),
		Arc::new(StubEmbedding { vector: vec![1., 0.] }),
	);
	let err = service.search(request("hello", Some(1))).await.expect_err("Expected rejection.");

	assert!(matches!(err, Error::FailedPrecondition { .. }), "unexpected error: {err}");
}

#[tokio::test]
async fn missing_api_key_is_a_precondition_failure() {
	let service = build_service(
		Arc::new(MemoryNoteStore::new(Vec::new())),
		Arc::new(quill_testkit::MemorySettings::default()),
		Arc::new(StubEmbedding { vector: vec![1., 0.] }),
	);
	let err = service.search(request("hello", Some(1))).await.expect_err("Expected rejection.");

	assert!(matches!(err, Error::FailedPrecondition { .. }), "unexpected error: {err}");
}
