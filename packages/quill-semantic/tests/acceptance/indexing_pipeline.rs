use std::sync::{
	Arc,
	atomic::{AtomicUsize, Ordering},
};

use quill_semantic::{Error, HashCheck};
use quill_store::Visibility;
use quill_testkit::MemoryNoteStore;

use super::suite::{
	FailingEmbedding, SpyEmbedding, build_service, configured_settings, note, stored_embedding,
	wait_until,
};

#[tokio::test]
async fn refresh_stores_model_dimension_and_hash() {
	let notes = Arc::new(MemoryNoteStore::new(Vec::new()));
	let calls = Arc::new(AtomicUsize::new(0));
	let service = build_service(
		notes.clone(),
		Arc::new(configured_settings()),
		Arc::new(SpyEmbedding { vector: vec![0.1, 0.2, 0.3], calls: calls.clone() }),
	);

	service
		.refresh_embedding(7, "hello world", HashCheck::Enforce)
		.await
		.expect("Expected refresh to succeed.");

	let stored = notes.stored_embedding(7).expect("Expected stored embedding.");

	assert_eq!(stored.model, quill_config::DEFAULT_EMBEDDING_MODEL);
	assert_eq!(stored.dimension, 3);
	assert_eq!(stored.vector, vec![0.1, 0.2, 0.3]);
	assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn unchanged_content_skips_the_provider() {
	let notes = Arc::new(MemoryNoteStore::new(Vec::new()));
	let calls = Arc::new(AtomicUsize::new(0));
	let service = build_service(
		notes.clone(),
		Arc::new(configured_settings()),
		Arc::new(SpyEmbedding { vector: vec![0.1, 0.2], calls: calls.clone() }),
	);

	service
		.refresh_embedding(7, "same content", HashCheck::Enforce)
		.await
		.expect("Expected first refresh to succeed.");
	service
		.refresh_embedding(7, "same content", HashCheck::Enforce)
		.await
		.expect("Expected second refresh to succeed.");

	assert_eq!(calls.load(Ordering::SeqCst), 1);
	assert_eq!(notes.embedding_count(), 1);
}

#[tokio::test]
async fn changed_content_replaces_the_stored_row() {
	let notes = Arc::new(MemoryNoteStore::new(Vec::new()));
	let calls = Arc::new(AtomicUsize::new(0));
	let service = build_service(
		notes.clone(),
		Arc::new(configured_settings()),
		Arc::new(SpyEmbedding { vector: vec![0.1, 0.2], calls: calls.clone() }),
	);

	service
		.refresh_embedding(7, "first draft", HashCheck::Enforce)
		.await
		.expect("Expected first refresh to succeed.");

	let first_hash = notes.stored_embedding(7).expect("Expected stored embedding.").content_hash;

	service
		.refresh_embedding(7, "second draft", HashCheck::Enforce)
		.await
		.expect("Expected second refresh to succeed.");

	let second_hash = notes.stored_embedding(7).expect("Expected stored embedding.").content_hash;

	assert_ne!(first_hash, second_hash);
	assert_eq!(calls.load(Ordering::SeqCst), 2);
	assert_eq!(notes.embedding_count(), 1);
}

#[tokio::test]
async fn bypass_re_embeds_unchanged_content() {
	let notes = Arc::new(MemoryNoteStore::new(Vec::new()));
	let calls = Arc::new(AtomicUsize::new(0));
	let service = build_service(
		notes.clone(),
		Arc::new(configured_settings()),
		Arc::new(SpyEmbedding { vector: vec![0.1, 0.2], calls: calls.clone() }),
	);

	service
		.refresh_embedding(7, "same content", HashCheck::Enforce)
		.await
		.expect("Expected first refresh to succeed.");
	service
		.refresh_embedding(7, "same content", HashCheck::Bypass)
		.await
		.expect("Expected bypass refresh to succeed.");

	assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn provider_failure_surfaces_and_leaves_no_row() {
	let notes = Arc::new(MemoryNoteStore::new(Vec::new()));
	let service =
		build_service(notes.clone(), Arc::new(configured_settings()), Arc::new(FailingEmbedding));
	let err = service
		.refresh_embedding(7, "hello", HashCheck::Enforce)
		.await
		.expect_err("Expected provider failure.");

	assert!(matches!(err, Error::Provider { .. }), "unexpected error: {err}");
	assert_eq!(notes.embedding_count(), 0);
}

#[tokio::test]
async fn scheduled_refresh_runs_in_the_background() {
	let notes = Arc::new(MemoryNoteStore::new(Vec::new()));
	let calls = Arc::new(AtomicUsize::new(0));
	let service = build_service(
		notes.clone(),
		Arc::new(configured_settings()),
		Arc::new(SpyEmbedding { vector: vec![0.5, 0.5], calls }),
	);

	service.schedule_refresh(7, "scheduled content");

	wait_until("scheduled refresh to store an embedding", || notes.embedding_count() == 1).await;
}

#[tokio::test]
async fn blank_content_is_never_scheduled() {
	let notes = Arc::new(MemoryNoteStore::new(Vec::new()));
	let calls = Arc::new(AtomicUsize::new(0));
	let service = build_service(
		notes.clone(),
		Arc::new(configured_settings()),
		Arc::new(SpyEmbedding { vector: vec![0.5, 0.5], calls: calls.clone() }),
	);

	service.schedule_refresh(7, "   \n\t  ");
	// Give a wrongly spawned task a chance to run before asserting.
	tokio::time::sleep(std::time::Duration::from_millis(50)).await;

	assert_eq!(calls.load(Ordering::SeqCst), 0);
	assert_eq!(notes.embedding_count(), 0);
}

#[tokio::test]
async fn scheduled_delete_removes_the_stored_row() {
	let notes = Arc::new(MemoryNoteStore::new(vec![note(7, 1, Visibility::Public, "doomed")]));

	notes.seed_embedding(stored_embedding(7, vec![1., 0.]));

	let calls = Arc::new(AtomicUsize::new(0));
	let service = build_service(
		notes.clone(),
		Arc::new(configured_settings()),
		Arc::new(SpyEmbedding { vector: vec![0.5, 0.5], calls }),
	);

	service.schedule_delete(7);

	wait_until("scheduled delete to remove the embedding", || notes.embedding_count() == 0).await;
}

#[tokio::test]
async fn indexing_is_disabled_without_an_api_key() {
	let configured = build_service(
		Arc::new(MemoryNoteStore::new(Vec::new())),
		Arc::new(configured_settings()),
		Arc::new(FailingEmbedding),
	);
	let unconfigured = build_service(
		Arc::new(MemoryNoteStore::new(Vec::new())),
		Arc::new(quill_testkit::MemorySettings::default()),
		Arc::new(FailingEmbedding),
	);

	assert!(configured.semantic_indexing_enabled().await);
	assert!(!unconfigured.semantic_indexing_enabled().await);
}
