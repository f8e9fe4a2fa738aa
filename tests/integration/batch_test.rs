//! Integration tests for chunked batch creates, updates and deletes.

mod helpers;

use serde_json::{Value, json};

use docrepo_core::config::repository::RepositoryConfig;
use docrepo_core::error::ErrorKind;
use docrepo_core::traits::entity::Entity;
use docrepo_core::types::id::DocumentId;
use docrepo_repository::{FindByIdOptions, UpdateOptions};

use helpers::{Product, TestContext, item_id, product};

fn payloads(n: usize) -> Vec<Value> {
    (0..n).map(|i| product(&format!("item {i}"), "bulk", i as i64)).collect()
}

fn chunked(chunk_size: usize) -> RepositoryConfig {
    let mut config = RepositoryConfig::default();
    config.batch.chunk_size = chunk_size;
    config
}

#[tokio::test]
async fn test_500_items_commit_in_one_chunk() {
    let ctx = TestContext::new();
    let created = ctx.products.create_batch(&payloads(500)).await.unwrap();

    assert_eq!(created.len(), 500);
    assert_eq!(ctx.store.call_counts().batch_commits, 1);
    assert_eq!(ctx.store.document_count(Product::COLLECTION).await, 500);
    assert_eq!(ctx.products.stats().writes, 500);
}

#[tokio::test]
async fn test_501_items_commit_in_two_chunks() {
    let ctx = TestContext::new();
    let created = ctx.products.create_batch(&payloads(501)).await.unwrap();

    assert_eq!(created.len(), 501);
    assert_eq!(ctx.store.call_counts().batch_commits, 2);
    assert_eq!(ctx.store.document_count(Product::COLLECTION).await, 501);
}

#[tokio::test]
async fn test_configured_chunk_size() {
    let ctx = TestContext::with_config(chunked(10));
    ctx.products.create_batch(&payloads(25)).await.unwrap();

    assert_eq!(ctx.store.call_counts().batch_commits, 3);
    assert_eq!(ctx.store.document_count(Product::COLLECTION).await, 25);
}

#[tokio::test]
async fn test_created_batch_is_cached_with_metadata() {
    let ctx = TestContext::new();
    let created = ctx.products.create_batch(&payloads(3)).await.unwrap();

    for entity in &created {
        assert_eq!(entity.meta.version, 1);
        assert_eq!(entity.meta.created_at, ctx.now());
        assert!(!entity.meta.is_deleted);
    }
    assert_eq!(ctx.products.cache_len(), 3);

    let found = ctx
        .products
        .find_by_id(created[1].id(), FindByIdOptions::default())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(found.name, "item 1");
    assert_eq!(ctx.store.call_counts().gets, 0);
}

#[tokio::test]
async fn test_empty_batch_is_a_no_op() {
    let ctx = TestContext::new();
    let created = ctx.products.create_batch::<Value>(&[]).await.unwrap();

    assert!(created.is_empty());
    assert_eq!(ctx.store.call_counts().batch_commits, 0);
}

#[tokio::test]
async fn test_invalid_item_rejects_whole_batch() {
    let ctx = TestContext::new();
    let mut items = payloads(4);
    items[2] = json!({"category": "bulk"});

    let err = ctx.products.create_batch(&items).await.unwrap_err();

    assert_eq!(err.kind, ErrorKind::Validation);
    assert_eq!(ctx.store.call_counts().batch_commits, 0);
    assert_eq!(ctx.store.document_count(Product::COLLECTION).await, 0);
}

#[tokio::test]
async fn test_partial_failure_reports_failed_chunk() {
    let ctx = TestContext::with_config(chunked(5));
    ctx.store.fail_writes_to(Product::COLLECTION, &item_id(7));

    let items: Vec<(DocumentId, Value)> = (0..12)
        .map(|i| (item_id(i), product(&format!("item {i}"), "bulk", 0)))
        .collect();
    let err = ctx.products.create_batch_with_ids(&items).await.unwrap_err();

    assert_eq!(err.kind, ErrorKind::PartialBatchFailure);
    let report = err.batch_report().unwrap();
    assert_eq!(report.attempted, 12);
    assert_eq!(report.chunk_count, 3);
    assert_eq!(report.written_count, 7);
    assert!(report.is_partial());
    let failed: Vec<usize> = report.failures.iter().map(|f| f.index).collect();
    assert_eq!(failed, vec![5, 6, 7, 8, 9]);
    assert!(report.failed_ids().contains(&&item_id(7)));

    assert_eq!(ctx.store.document_count(Product::COLLECTION).await, 7);
    assert_eq!(ctx.products.stats().writes, 7);
    assert_eq!(ctx.products.cache_len(), 0);
    assert_eq!(
        ctx.products.last_error().unwrap().kind,
        ErrorKind::PartialBatchFailure
    );

    let committed = ctx
        .products
        .find_by_id(&item_id(10), FindByIdOptions::default())
        .await
        .unwrap();
    assert!(committed.is_some());
    let rolled_back = ctx
        .products
        .find_by_id(&item_id(6), FindByIdOptions::default())
        .await
        .unwrap();
    assert!(rolled_back.is_none());
}

#[tokio::test]
async fn test_total_failure_keeps_store_error_kind() {
    let ctx = TestContext::new();
    ctx.store.fail_writes_to(Product::COLLECTION, &item_id(1));

    let items: Vec<(DocumentId, Value)> = (0..3)
        .map(|i| (item_id(i), product(&format!("item {i}"), "bulk", 0)))
        .collect();
    let err = ctx.products.create_batch_with_ids(&items).await.unwrap_err();

    assert_eq!(err.kind, ErrorKind::BackingStore);
    let report = err.batch_report().unwrap();
    assert!(report.nothing_committed());
    assert_eq!(report.failures.len(), 3);
    assert_eq!(ctx.store.document_count(Product::COLLECTION).await, 0);
}

#[tokio::test]
async fn test_update_many_bumps_versions_and_invalidates_cache() {
    let ctx = TestContext::new();
    ctx.seed_ranked(4).await;
    ctx.advance(10);

    let ids: Vec<_> = (0..4).map(item_id).collect();
    let outcome = ctx
        .products
        .update_many(&ids, &json!({"category": "sale"}), UpdateOptions::default())
        .await
        .unwrap();
    assert_eq!(outcome.written_count, 4);
    assert_eq!(ctx.products.stats().writes, 8);

    for id in &ids {
        let product = ctx
            .products
            .find_by_id(id, FindByIdOptions::default())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(product.category, "sale");
        assert_eq!(product.meta.version, 2);
        assert_eq!(product.meta.updated_at, ctx.now());
    }
    assert_eq!(ctx.store.call_counts().gets, 4);
}

#[tokio::test]
async fn test_update_many_applies_duplicate_ids_once() {
    let ctx = TestContext::new();
    ctx.seed_ranked(2).await;

    let outcome = ctx
        .products
        .update_many(
            &[item_id(0), item_id(0), item_id(1)],
            &json!({"priceCents": 10}),
            UpdateOptions::default(),
        )
        .await
        .unwrap();
    assert_eq!(outcome.attempted, 2);

    let product = ctx
        .products
        .find_by_id(&item_id(0), FindByIdOptions::default())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(product.meta.version, 2);
}

#[tokio::test]
async fn test_update_many_with_missing_id_fails_its_chunk() {
    let ctx = TestContext::new();
    ctx.seed_ranked(2).await;

    let ids = vec![item_id(0), DocumentId::parse("absent").unwrap()];
    let err = ctx
        .products
        .update_many(&ids, &json!({"priceCents": 10}), UpdateOptions::default())
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::NotFound);
    assert!(err.batch_report().unwrap().nothing_committed());

    let untouched = ctx
        .products
        .find_by_id(&item_id(0), FindByIdOptions::default())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(untouched.meta.version, 1);
}

#[tokio::test]
async fn test_update_many_rejects_invalid_requests() {
    let ctx = TestContext::new();
    ctx.seed_ranked(1).await;

    let err = ctx
        .products
        .update_many(&[], &json!({"priceCents": 1}), UpdateOptions::default())
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::Validation);

    let err = ctx
        .products
        .update_many(
            &[item_id(0)],
            &json!({"priceCents": 1}),
            UpdateOptions::expecting_version(1),
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::Validation);
    assert_eq!(ctx.store.call_counts().batch_commits, 1);
}
