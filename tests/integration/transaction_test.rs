//! Integration tests for transactions and optimistic version checks.

mod helpers;

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use serde_json::json;

use docrepo_core::config::repository::RepositoryConfig;
use docrepo_core::error::{AppError, ErrorKind};
use docrepo_core::traits::entity::Entity;
use docrepo_repository::{CreateOptions, FindByIdOptions, UpdateOptions};

use helpers::{Order, Product, TestContext};

#[tokio::test]
async fn test_transaction_commits_across_collections() {
    let ctx = TestContext::new();
    let orders = ctx.repository::<Order>(RepositoryConfig::default());
    let widget = ctx.create_product("Widget", "tools", 100).await;

    let products = ctx.products.clone();
    let orders_tx = orders.clone();
    let id = widget.id().clone();
    let order = ctx
        .products
        .run_transaction(move |tx| {
            let products = products.clone();
            let orders = orders_tx.clone();
            let id = id.clone();
            Box::pin(async move {
                let product = products
                    .in_tx(tx)
                    .find_by_id(&id, FindByIdOptions::required())
                    .await?
                    .ok_or_else(|| AppError::not_found("product"))?;
                products
                    .in_tx(tx)
                    .update(&id, &json!({"rank": product.rank + 1}), UpdateOptions::default())
                    .await?;
                let order = orders
                    .in_tx(tx)
                    .create(
                        &json!({"productId": id.as_str(), "quantity": 2}),
                        CreateOptions::default(),
                    )
                    .await?;
                Ok(order)
            })
        })
        .await
        .unwrap();

    assert_eq!(order.quantity, 2);
    assert_eq!(ctx.store.document_count(Order::COLLECTION).await, 1);
    let stored = orders
        .find_by_id(order.id(), FindByIdOptions::default())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.product_id, widget.id().as_str());

    let widget = ctx
        .products
        .find_by_id(widget.id(), FindByIdOptions::default())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(widget.rank, 1);
    assert_eq!(widget.meta.version, 2);
    assert_eq!(ctx.store.call_counts().transaction_commits, 1);
}

#[tokio::test]
async fn test_failed_work_writes_nothing() {
    let ctx = TestContext::new();
    let widget = ctx.create_product("Widget", "tools", 100).await;

    let products = ctx.products.clone();
    let id = widget.id().clone();
    let err = ctx
        .products
        .run_transaction(move |tx| {
            let products = products.clone();
            let id = id.clone();
            Box::pin(async move {
                let mut repo = products.in_tx(tx);
                repo.update(&id, &json!({"priceCents": 0}), UpdateOptions::default())
                    .await?;
                repo.create(&json!({"name": "Ghost"}), CreateOptions::default())
                    .await?;
                Err::<(), _>(AppError::validation("insufficient stock"))
            })
        })
        .await
        .unwrap_err();

    assert_eq!(err.kind, ErrorKind::Validation);
    assert_eq!(err.message, "insufficient stock");
    assert_eq!(ctx.store.document_count(Product::COLLECTION).await, 1);
    assert_eq!(ctx.store.call_counts().transaction_rollbacks, 1);

    ctx.products.clear_cache();
    let widget = ctx
        .products
        .find_by_id(widget.id(), FindByIdOptions::default())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(widget.price_cents, 100);
    assert_eq!(widget.meta.version, 1);
}

#[tokio::test]
async fn test_contention_reruns_work() {
    let ctx = TestContext::new();
    let widget = ctx.create_product("Widget", "tools", 100).await;

    let runs = Arc::new(AtomicU32::new(0));
    let products = ctx.products.clone();
    let id = widget.id().clone();
    let counter = Arc::clone(&runs);
    let attempts = ctx
        .products
        .run_transaction(move |tx| {
            let products = products.clone();
            let id = id.clone();
            let counter = Arc::clone(&counter);
            Box::pin(async move {
                counter.fetch_add(1, Ordering::SeqCst);
                let mut repo = products.in_tx(tx);
                repo.find_by_id(&id, FindByIdOptions::required()).await?;
                let attempt = repo.attempt();
                if attempt == 1 {
                    products
                        .update(&id, &json!({"priceCents": 500}), UpdateOptions::default())
                        .await?;
                }
                repo.update(&id, &json!({"name": "Renamed"}), UpdateOptions::default())
                    .await?;
                Ok(attempt)
            })
        })
        .await
        .unwrap();

    assert_eq!(attempts, 2);
    assert_eq!(runs.load(Ordering::SeqCst), 2);

    let widget = ctx
        .products
        .find_by_id(widget.id(), FindByIdOptions::default())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(widget.name, "Renamed");
    assert_eq!(widget.price_cents, 500);
    assert_eq!(widget.meta.version, 3);
}

#[tokio::test]
async fn test_contention_gives_up_after_max_attempts() {
    let mut config = RepositoryConfig::default();
    config.transaction.max_attempts = 2;
    let ctx = TestContext::with_config(config);
    let widget = ctx.create_product("Widget", "tools", 100).await;

    let runs = Arc::new(AtomicU32::new(0));
    let products = ctx.products.clone();
    let id = widget.id().clone();
    let counter = Arc::clone(&runs);
    let err = ctx
        .products
        .run_transaction(move |tx| {
            let products = products.clone();
            let id = id.clone();
            let counter = Arc::clone(&counter);
            Box::pin(async move {
                let run = counter.fetch_add(1, Ordering::SeqCst) + 1;
                let mut repo = products.in_tx(tx);
                repo.find_by_id(&id, FindByIdOptions::required()).await?;
                products
                    .update(&id, &json!({"priceCents": run}), UpdateOptions::default())
                    .await?;
                repo.update(&id, &json!({"name": "Lost"}), UpdateOptions::default())
                    .await?;
                Ok(())
            })
        })
        .await
        .unwrap_err();

    assert_eq!(err.kind, ErrorKind::Contention);
    assert_eq!(runs.load(Ordering::SeqCst), 2);
    assert_eq!(ctx.products.last_error().unwrap().kind, ErrorKind::Contention);

    let widget = ctx
        .products
        .find_by_id(widget.id(), FindByIdOptions::default())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(widget.name, "Widget");
    assert_eq!(widget.price_cents, 2);
}

#[tokio::test]
async fn test_expected_version_guards_update() {
    let ctx = TestContext::new();
    let widget = ctx.create_product("Widget", "tools", 100).await;

    let updated = ctx
        .products
        .update(
            widget.id(),
            &json!({"priceCents": 150}),
            UpdateOptions::expecting_version(1),
        )
        .await
        .unwrap();
    assert_eq!(updated.meta.version, 2);

    let err = ctx
        .products
        .update(
            widget.id(),
            &json!({"priceCents": 175}),
            UpdateOptions::expecting_version(1),
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::VersionConflict);

    ctx.products.clear_cache();
    let stored = ctx
        .products
        .find_by_id(widget.id(), FindByIdOptions::default())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.price_cents, 150);
    assert_eq!(stored.meta.version, 2);
}

#[tokio::test]
async fn test_work_error_kind_is_preserved() {
    let ctx = TestContext::new();
    let products = ctx.products.clone();
    let err = ctx
        .products
        .run_transaction(move |tx| {
            let products = products.clone();
            Box::pin(async move {
                let id = docrepo_core::types::id::DocumentId::parse("absent")?;
                products
                    .in_tx(tx)
                    .find_by_id(&id, FindByIdOptions::required())
                    .await?;
                Ok(())
            })
        })
        .await
        .unwrap_err();

    assert_eq!(err.kind, ErrorKind::NotFound);
    assert_eq!(ctx.store.call_counts().transaction_commits, 0);
}

#[tokio::test]
async fn test_repeated_updates_in_one_transaction_bump_version_each_time() {
    let ctx = TestContext::new();
    let widget = ctx.create_product("Widget", "tools", 100).await;

    let products = ctx.products.clone();
    let id = widget.id().clone();
    let last = ctx
        .products
        .run_transaction(move |tx| {
            let products = products.clone();
            let id = id.clone();
            Box::pin(async move {
                let mut repo = products.in_tx(tx);
                repo.update(&id, &json!({"priceCents": 150}), UpdateOptions::default())
                    .await?;
                let last = repo
                    .update(&id, &json!({"name": "Gadget"}), UpdateOptions::expecting_version(2))
                    .await?;
                Ok(last)
            })
        })
        .await
        .unwrap();

    assert_eq!(last.meta.version, 3);
    assert_eq!(last.price_cents, 150);

    let stored = ctx
        .products
        .find_by_id(widget.id(), FindByIdOptions::default())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.name, "Gadget");
    assert_eq!(stored.price_cents, 150);
    assert_eq!(stored.meta.version, 3);
}
