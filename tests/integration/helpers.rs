//! Shared test helpers for integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use docrepo_core::config::repository::RepositoryConfig;
use docrepo_core::traits::clock::ManualClock;
use docrepo_core::traits::entity::{Entity, EntityMetadata};
use docrepo_core::traits::store::StoreCapabilities;
use docrepo_core::types::id::DocumentId;
use docrepo_repository::{CreateOptions, DocumentRepository};
use docrepo_store::MemoryDocumentStore;

/// Product entity used across the integration suites.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    #[serde(flatten)]
    pub meta: EntityMetadata,
    pub name: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub price_cents: i64,
    #[serde(default)]
    pub rank: i64,
}

impl Entity for Product {
    const COLLECTION: &'static str = "products";
    const REQUIRED_FIELDS: &'static [&'static str] = &["name"];

    fn metadata(&self) -> &EntityMetadata {
        &self.meta
    }
}

/// Order entity, used for cross-collection transactions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    #[serde(flatten)]
    pub meta: EntityMetadata,
    pub product_id: String,
    pub quantity: i64,
}

impl Entity for Order {
    const COLLECTION: &'static str = "orders";
    const REQUIRED_FIELDS: &'static [&'static str] = &["productId", "quantity"];

    fn metadata(&self) -> &EntityMetadata {
        &self.meta
    }
}

/// Test context: one in-memory store, one manual clock, one product repository.
pub struct TestContext {
    /// The backing store, for fault injection and call counters
    pub store: MemoryDocumentStore,
    /// Clock shared by the repository and the store
    pub clock: Arc<ManualClock>,
    /// Product repository under test
    pub products: DocumentRepository<Product>,
}

impl TestContext {
    /// Create a context with the default repository configuration.
    pub fn new() -> Self {
        Self::with_config(RepositoryConfig::default())
    }

    /// Create a context with a custom repository configuration.
    pub fn with_config(config: RepositoryConfig) -> Self {
        Self::build(MemoryDocumentStore::new(), config)
    }

    /// Create a context whose store advertises the given capabilities.
    pub fn with_capabilities(capabilities: StoreCapabilities, config: RepositoryConfig) -> Self {
        Self::build(MemoryDocumentStore::with_capabilities(capabilities), config)
    }

    fn build(store: MemoryDocumentStore, config: RepositoryConfig) -> Self {
        let clock = Arc::new(ManualClock::new(start_time()));
        let store = store.with_clock(clock.clone());
        let products = DocumentRepository::with_clock(Arc::new(store.clone()), config, clock.clone())
            .expect("Failed to build product repository");
        Self {
            store,
            clock,
            products,
        }
    }

    /// A second repository over the same store and clock.
    pub fn repository<E: Entity>(&self, config: RepositoryConfig) -> DocumentRepository<E> {
        DocumentRepository::with_clock(Arc::new(self.store.clone()), config, self.clock.clone())
            .expect("Failed to build repository")
    }

    /// Move the shared clock forward by `seconds`.
    pub fn advance(&self, seconds: i64) {
        self.clock.advance(TimeDelta::seconds(seconds));
    }

    /// Current time on the shared clock.
    pub fn now(&self) -> DateTime<Utc> {
        use docrepo_core::traits::clock::Clock;
        self.clock.now()
    }

    /// Create one product and return it.
    pub async fn create_product(&self, name: &str, category: &str, price_cents: i64) -> Product {
        self.products
            .create(&product(name, category, price_cents), CreateOptions::default())
            .await
            .expect("Failed to create product")
    }

    /// Create `n` products with caller-assigned ids `item-0000`, `item-0001`, ...
    /// and `rank` equal to their position.
    pub async fn seed_ranked(&self, n: usize) -> Vec<Product> {
        let items: Vec<(DocumentId, Value)> = (0..n)
            .map(|i| {
                (
                    item_id(i),
                    json!({"name": format!("item {i}"), "category": "seed", "rank": i}),
                )
            })
            .collect();
        self.products
            .create_batch_with_ids(&items)
            .await
            .expect("Failed to seed products")
    }
}

/// Fixed start instant for every test clock.
pub fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0)
        .single()
        .expect("valid start time")
}

/// Product creation payload.
pub fn product(name: &str, category: &str, price_cents: i64) -> Value {
    json!({
        "name": name,
        "category": category,
        "priceCents": price_cents,
    })
}

/// Deterministic id for the `i`-th seeded item.
pub fn item_id(i: usize) -> DocumentId {
    DocumentId::parse(format!("item-{i:04}")).expect("valid item id")
}
