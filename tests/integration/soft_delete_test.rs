//! Integration tests for soft delete, restore and hard delete.

mod helpers;

use serde_json::json;

use docrepo_core::config::repository::RepositoryConfig;
use docrepo_core::error::ErrorKind;
use docrepo_core::traits::entity::Entity;
use docrepo_repository::{DeleteOptions, FindByIdOptions, FindByIdsOptions, FindOptions, UpdateOptions};

use helpers::{Product, TestContext, item_id};

#[tokio::test]
async fn test_soft_deleted_entity_hidden_from_default_reads() {
    let ctx = TestContext::new();
    let a = ctx.create_product("A", "tools", 1).await;
    let b = ctx.create_product("B", "tools", 2).await;

    ctx.advance(30);
    ctx.products.delete(a.id(), DeleteOptions::default()).await.unwrap();

    let hidden = ctx
        .products
        .find_by_id(a.id(), FindByIdOptions::default())
        .await
        .unwrap();
    assert!(hidden.is_none());

    let kept = ctx
        .products
        .find_by_id(a.id(), FindByIdOptions::include_deleted())
        .await
        .unwrap()
        .unwrap();
    assert!(kept.meta.is_deleted);
    assert_eq!(kept.meta.deleted_at, Some(ctx.now()));
    assert_eq!(kept.meta.updated_at, ctx.now());
    assert_eq!(kept.meta.version, 1);

    let live = ctx.products.find(FindOptions::new()).await.unwrap();
    assert_eq!(live.len(), 1);
    assert_eq!(live[0].id(), b.id());

    assert_eq!(ctx.products.count(&FindOptions::new()).await.unwrap(), 1);
    assert_eq!(
        ctx.products
            .count(&FindOptions::new().with_deleted())
            .await
            .unwrap(),
        2
    );

    let ids = [a.id().clone(), b.id().clone()];
    let found = ctx
        .products
        .find_by_ids(&ids, FindByIdsOptions::default())
        .await
        .unwrap();
    assert_eq!(found.len(), 1);
    let found = ctx
        .products
        .find_by_ids(&ids, FindByIdsOptions { include_deleted: true })
        .await
        .unwrap();
    assert_eq!(found.len(), 2);

    assert_eq!(ctx.store.document_count(Product::COLLECTION).await, 2);
}

#[tokio::test]
async fn test_required_lookup_of_soft_deleted_is_not_found() {
    let ctx = TestContext::new();
    let a = ctx.create_product("A", "tools", 1).await;
    ctx.products.delete(a.id(), DeleteOptions::default()).await.unwrap();

    let err = ctx
        .products
        .find_by_id(a.id(), FindByIdOptions::required())
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::NotFound);
}

#[tokio::test]
async fn test_update_of_soft_deleted_requires_bypass() {
    let ctx = TestContext::new();
    let a = ctx.create_product("A", "tools", 1).await;
    ctx.products.delete(a.id(), DeleteOptions::default()).await.unwrap();

    let err = ctx
        .products
        .update(a.id(), &json!({"priceCents": 5}), UpdateOptions::default())
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::SoftDeleted);

    let updated = ctx
        .products
        .update(a.id(), &json!({"priceCents": 5}), UpdateOptions::bypass_soft_delete())
        .await
        .unwrap();
    assert_eq!(updated.price_cents, 5);
    assert_eq!(updated.meta.version, 2);
    assert!(updated.meta.is_deleted);
}

#[tokio::test]
async fn test_restore_through_bypassed_update() {
    let ctx = TestContext::new();
    let a = ctx.create_product("A", "tools", 1).await;
    ctx.products.delete(a.id(), DeleteOptions::default()).await.unwrap();

    let restored = ctx
        .products
        .update(
            a.id(),
            &json!({"isDeleted": false, "deletedAt": null}),
            UpdateOptions {
                bypass_soft_delete_check: true,
                sanitize: false,
                ..UpdateOptions::default()
            },
        )
        .await
        .unwrap();
    assert!(!restored.meta.is_deleted);
    assert_eq!(restored.meta.deleted_at, None);

    let visible = ctx
        .products
        .find_by_id(a.id(), FindByIdOptions::default())
        .await
        .unwrap();
    assert!(visible.is_some());
    assert_eq!(ctx.products.count(&FindOptions::new()).await.unwrap(), 1);
}

#[tokio::test]
async fn test_repeated_soft_delete() {
    let ctx = TestContext::new();
    let a = ctx.create_product("A", "tools", 1).await;
    ctx.products.delete(a.id(), DeleteOptions::default()).await.unwrap();

    let err = ctx
        .products
        .delete(a.id(), DeleteOptions::default())
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::SoftDeleted);

    ctx.advance(60);
    ctx.products
        .delete(
            a.id(),
            DeleteOptions {
                bypass_soft_delete_check: true,
                ..DeleteOptions::default()
            },
        )
        .await
        .unwrap();

    let kept = ctx
        .products
        .find_by_id(a.id(), FindByIdOptions::include_deleted())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(kept.meta.deleted_at, Some(ctx.now()));
    assert_eq!(kept.meta.created_at, a.meta.created_at);
    assert_eq!(kept.meta.version, 1);
}

#[tokio::test]
async fn test_hard_delete_removes_document() {
    let ctx = TestContext::new();
    let a = ctx.create_product("A", "tools", 1).await;

    ctx.products.delete(a.id(), DeleteOptions::hard()).await.unwrap();

    assert_eq!(ctx.store.document_count(Product::COLLECTION).await, 0);
    let gone = ctx
        .products
        .find_by_id(a.id(), FindByIdOptions::include_deleted())
        .await
        .unwrap();
    assert!(gone.is_none());
}

#[tokio::test]
async fn test_delete_without_soft_delete_removes_document() {
    let config = RepositoryConfig {
        soft_delete: false,
        ..RepositoryConfig::default()
    };
    let ctx = TestContext::with_config(config);
    let a = ctx.create_product("A", "tools", 1).await;

    ctx.products.delete(a.id(), DeleteOptions::default()).await.unwrap();
    assert_eq!(ctx.store.document_count(Product::COLLECTION).await, 0);

    let err = ctx
        .products
        .delete(a.id(), DeleteOptions::default())
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::NotFound);
}

#[tokio::test]
async fn test_delete_many_soft_deletes_each() {
    let ctx = TestContext::new();
    ctx.seed_ranked(5).await;

    let ids: Vec<_> = (0..3).map(item_id).collect();
    let outcome = ctx
        .products
        .delete_many(&ids, DeleteOptions::default())
        .await
        .unwrap();
    assert_eq!(outcome.written_count, 3);
    assert_eq!(outcome.chunk_count, 1);

    assert_eq!(ctx.products.count(&FindOptions::new()).await.unwrap(), 2);
    assert_eq!(
        ctx.products
            .count(&FindOptions::new().with_deleted())
            .await
            .unwrap(),
        5
    );
    let hidden = ctx
        .products
        .find_by_id(&item_id(0), FindByIdOptions::default())
        .await
        .unwrap();
    assert!(hidden.is_none());
}

#[tokio::test]
async fn test_delete_many_hard_removes_each() {
    let ctx = TestContext::new();
    ctx.seed_ranked(4).await;

    let ids: Vec<_> = (0..4).map(item_id).collect();
    ctx.products
        .delete_many(&ids, DeleteOptions::hard())
        .await
        .unwrap();
    assert_eq!(ctx.store.document_count(Product::COLLECTION).await, 0);
    assert_eq!(ctx.products.cache_len(), 0);
}
