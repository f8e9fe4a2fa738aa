//! Store manager that dispatches to the configured provider.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::info;

use docrepo_core::config::store::StoreConfig;
use docrepo_core::error::AppError;
use docrepo_core::result::AppResult;
use docrepo_core::traits::store::{DocumentStore, StoreCapabilities, StoreQuery, StoreTransaction};
use docrepo_core::types::batch::WriteBatch;
use docrepo_core::types::document::{Document, DocumentPatch, StoredDocument};
use docrepo_core::types::filter::FilterField;
use docrepo_core::types::id::DocumentId;

/// Store manager that wraps the configured document store.
///
/// The provider is selected at construction time based on configuration.
#[derive(Debug, Clone)]
pub struct StoreManager {
    inner: Arc<dyn DocumentStore>,
}

impl StoreManager {
    /// Create a new store manager from configuration.
    pub fn new(config: &StoreConfig) -> AppResult<Self> {
        let inner: Arc<dyn DocumentStore> = match config.provider.as_str() {
            "memory" => {
                info!(
                    batch_limit = config.batch_limit,
                    native_count = config.native_count,
                    multi_get = config.multi_get,
                    "Initializing in-memory document store"
                );
                Arc::new(crate::memory::MemoryDocumentStore::from_config(config))
            }
            other => {
                return Err(AppError::configuration(format!(
                    "Unknown store provider: '{other}'. Supported: memory"
                )));
            }
        };

        Ok(Self { inner })
    }

    /// Create a store manager from an existing provider (for testing).
    pub fn from_provider(provider: Arc<dyn DocumentStore>) -> Self {
        Self { inner: provider }
    }

    /// Get a reference to the inner provider.
    pub fn provider(&self) -> &dyn DocumentStore {
        self.inner.as_ref()
    }
}

#[async_trait]
impl DocumentStore for StoreManager {
    fn provider_type(&self) -> &str {
        self.inner.provider_type()
    }

    fn capabilities(&self) -> StoreCapabilities {
        self.inner.capabilities()
    }

    fn generate_id(&self) -> DocumentId {
        self.inner.generate_id()
    }

    async fn server_time(&self) -> AppResult<DateTime<Utc>> {
        self.inner.server_time().await
    }

    async fn health_check(&self) -> AppResult<bool> {
        self.inner.health_check().await
    }

    async fn get(&self, collection: &str, id: &DocumentId) -> AppResult<Option<Document>> {
        self.inner.get(collection, id).await
    }

    async fn query(&self, collection: &str, query: &StoreQuery) -> AppResult<Vec<StoredDocument>> {
        self.inner.query(collection, query).await
    }

    async fn count(&self, collection: &str, filters: &[FilterField]) -> AppResult<u64> {
        self.inner.count(collection, filters).await
    }

    async fn multi_get(&self, collection: &str, ids: &[DocumentId]) -> AppResult<Vec<StoredDocument>> {
        self.inner.multi_get(collection, ids).await
    }

    async fn write(&self, collection: &str, id: &DocumentId, document: Document) -> AppResult<()> {
        self.inner.write(collection, id, document).await
    }

    async fn update(&self, collection: &str, id: &DocumentId, patch: &DocumentPatch) -> AppResult<()> {
        self.inner.update(collection, id, patch).await
    }

    async fn remove(&self, collection: &str, id: &DocumentId) -> AppResult<()> {
        self.inner.remove(collection, id).await
    }

    async fn commit_batch(&self, batch: WriteBatch) -> AppResult<usize> {
        self.inner.commit_batch(batch).await
    }

    async fn begin_transaction(&self) -> AppResult<Box<dyn StoreTransaction>> {
        self.inner.begin_transaction().await
    }
}
