//! Integration tests for page arithmetic and paged queries.

mod helpers;

use docrepo_core::config::repository::RepositoryConfig;
use docrepo_core::traits::entity::Entity;
use docrepo_core::types::sorting::SortField;
use docrepo_repository::{DeleteOptions, FindOptions, PaginateOptions};

use helpers::{TestContext, item_id};

fn by_rank() -> FindOptions {
    FindOptions::new().order_by(SortField::asc("rank"))
}

#[tokio::test]
async fn test_pages_over_23_items() {
    let ctx = TestContext::new();
    ctx.seed_ranked(23).await;

    let first = ctx
        .products
        .paginate(PaginateOptions::new(by_rank(), 1, 10))
        .await
        .unwrap();
    assert_eq!(first.items.len(), 10);
    assert_eq!(first.total, 23);
    assert_eq!(first.total_pages, 3);
    assert!(first.has_next);
    assert!(!first.has_previous);
    assert_eq!(first.items[0].rank, 0);

    let last = ctx
        .products
        .paginate(PaginateOptions::new(by_rank(), 3, 10))
        .await
        .unwrap();
    let ranks: Vec<i64> = last.items.iter().map(|p| p.rank).collect();
    assert_eq!(ranks, vec![20, 21, 22]);
    assert_eq!(last.page, 3);
    assert!(!last.has_next);
    assert!(last.has_previous);
}

#[tokio::test]
async fn test_empty_collection_has_no_pages() {
    let ctx = TestContext::new();

    let page = ctx
        .products
        .paginate(PaginateOptions::new(by_rank(), 1, 10))
        .await
        .unwrap();
    assert!(page.items.is_empty());
    assert_eq!(page.total, 0);
    assert_eq!(page.total_pages, 0);
    assert!(!page.has_next);
    assert!(!page.has_previous);
}

#[tokio::test]
async fn test_page_past_the_end_is_empty() {
    let ctx = TestContext::new();
    ctx.seed_ranked(5).await;

    let page = ctx
        .products
        .paginate(PaginateOptions::new(by_rank(), 4, 2))
        .await
        .unwrap();
    assert!(page.items.is_empty());
    assert_eq!(page.total, 5);
    assert_eq!(page.total_pages, 3);
    assert!(!page.has_next);
    assert!(page.has_previous);
}

#[tokio::test]
async fn test_page_size_is_capped() {
    let mut config = RepositoryConfig::default();
    config.query.max_page_size = 5;
    let ctx = TestContext::with_config(config);
    ctx.seed_ranked(23).await;

    let page = ctx
        .products
        .paginate(PaginateOptions::new(by_rank(), 1, 50))
        .await
        .unwrap();
    assert_eq!(page.page_size, 5);
    assert_eq!(page.items.len(), 5);
    assert_eq!(page.total_pages, 5);
}

#[tokio::test]
async fn test_pagination_excludes_soft_deleted() {
    let ctx = TestContext::new();
    ctx.seed_ranked(12).await;
    for i in 0..3 {
        ctx.products
            .delete(&item_id(i), DeleteOptions::default())
            .await
            .unwrap();
    }

    let page = ctx
        .products
        .paginate(PaginateOptions::new(by_rank(), 1, 5))
        .await
        .unwrap();
    assert_eq!(page.total, 9);
    assert_eq!(page.total_pages, 2);
    assert_eq!(page.items[0].id(), &item_id(3));

    let with_deleted = ctx
        .products
        .paginate(PaginateOptions::new(by_rank().with_deleted(), 1, 5))
        .await
        .unwrap();
    assert_eq!(with_deleted.total, 12);
}

#[tokio::test]
async fn test_pagination_respects_filters() {
    let ctx = TestContext::new();
    for i in 0..6 {
        let category = if i % 2 == 0 { "even" } else { "odd" };
        ctx.create_product(&format!("p{i}"), category, i).await;
    }

    let page = ctx
        .products
        .paginate(PaginateOptions::new(
            FindOptions::new()
                .where_eq("category", "odd")
                .order_by(SortField::desc("priceCents")),
            1,
            2,
        ))
        .await
        .unwrap();
    assert_eq!(page.total, 3);
    assert_eq!(page.total_pages, 2);
    let prices: Vec<i64> = page.items.iter().map(|p| p.price_cents).collect();
    assert_eq!(prices, vec![5, 3]);
}

#[tokio::test]
async fn test_pagination_issues_one_count_and_one_query() {
    let ctx = TestContext::new();
    ctx.seed_ranked(8).await;

    ctx.products
        .paginate(PaginateOptions::new(by_rank(), 2, 3))
        .await
        .unwrap();

    let counts = ctx.store.call_counts();
    assert_eq!(counts.counts, 1);
    assert_eq!(counts.queries, 1);
    assert_eq!(ctx.products.stats().reads, 2);
}
