//! In-memory document store implementation.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::debug;

use docrepo_core::config::store::StoreConfig;
use docrepo_core::error::AppError;
use docrepo_core::result::AppResult;
use docrepo_core::traits::clock::{Clock, SystemClock};
use docrepo_core::traits::store::{DocumentStore, StoreCapabilities, StoreQuery, StoreTransaction};
use docrepo_core::types::batch::{BatchOperation, WriteBatch};
use docrepo_core::types::document::{Document, DocumentPatch, StoredDocument, apply_patch};
use docrepo_core::types::filter::FilterField;
use docrepo_core::types::id::DocumentId;

use super::query;
use super::transaction::MemoryTransaction;

/// A document body and the revision it was last written at.
#[derive(Debug, Clone)]
pub(crate) struct Revisioned {
    pub(crate) data: Document,
    pub(crate) revision: u64,
}

/// All collections plus the revision counter.
#[derive(Debug, Default)]
pub(crate) struct State {
    pub(crate) collections: HashMap<String, BTreeMap<DocumentId, Revisioned>>,
    next_revision: u64,
}

impl State {
    pub(crate) fn lookup(&self, collection: &str, id: &DocumentId) -> Option<&Revisioned> {
        self.collections.get(collection)?.get(id)
    }

    pub(crate) fn revision_of(&self, collection: &str, id: &DocumentId) -> Option<u64> {
        self.lookup(collection, id).map(|doc| doc.revision)
    }

    fn put(&mut self, collection: &str, id: DocumentId, data: Document) {
        self.next_revision += 1;
        let revision = self.next_revision;
        self.collections
            .entry(collection.to_string())
            .or_default()
            .insert(id, Revisioned { data, revision });
    }

    fn take(&mut self, collection: &str, id: &DocumentId) {
        if let Some(docs) = self.collections.get_mut(collection) {
            docs.remove(id);
        }
    }

    /// Apply operations all-or-nothing. Returns the number applied.
    ///
    /// Operations are first replayed against an overlay so that a failing
    /// operation (an update of a missing document) leaves the state untouched.
    pub(crate) fn apply_atomically(&mut self, operations: &[BatchOperation]) -> AppResult<usize> {
        let mut overlay: HashMap<(String, DocumentId), Option<Document>> = HashMap::new();
        let mut order: Vec<(String, DocumentId)> = Vec::new();

        for operation in operations {
            let key = (operation.collection().to_string(), operation.id().clone());
            let current = match overlay.get(&key) {
                Some(staged) => staged.clone(),
                None => self.lookup(&key.0, &key.1).map(|doc| doc.data.clone()),
            };
            let next = match operation {
                BatchOperation::Set { document, .. } => Some(document.clone()),
                BatchOperation::Update { patch, .. } => {
                    let mut doc = current.ok_or_else(|| {
                        AppError::not_found(format!(
                            "Document {}/{} not found for update",
                            key.0, key.1
                        ))
                    })?;
                    apply_patch(&mut doc, patch);
                    Some(doc)
                }
                BatchOperation::Delete { .. } => None,
            };
            if !overlay.contains_key(&key) {
                order.push(key.clone());
            }
            overlay.insert(key, next);
        }

        for key in order {
            match overlay.remove(&key) {
                Some(Some(doc)) => self.put(&key.0, key.1, doc),
                Some(None) => self.take(&key.0, &key.1),
                None => {}
            }
        }
        Ok(operations.len())
    }
}

/// Counters of store calls, for verifying access patterns.
#[derive(Debug, Default)]
pub(crate) struct CallCounters {
    gets: AtomicU64,
    multi_gets: AtomicU64,
    queries: AtomicU64,
    counts: AtomicU64,
    writes: AtomicU64,
    batch_commits: AtomicU64,
    pub(crate) transaction_commits: AtomicU64,
    pub(crate) transaction_rollbacks: AtomicU64,
}

/// Snapshot of [`MemoryDocumentStore`] call counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreCallCounts {
    /// Single-document gets (including transactional gets).
    pub gets: u64,
    /// Multi-get calls.
    pub multi_gets: u64,
    /// Queries (including transactional queries).
    pub queries: u64,
    /// Native count calls.
    pub counts: u64,
    /// Single-document writes, updates and removals.
    pub writes: u64,
    /// Batch commits attempted.
    pub batch_commits: u64,
    /// Transactions committed.
    pub transaction_commits: u64,
    /// Transactions rolled back or failed at commit.
    pub transaction_rollbacks: u64,
}

pub(crate) struct Inner {
    pub(crate) state: RwLock<State>,
    capabilities: StoreCapabilities,
    clock: Arc<dyn Clock>,
    pub(crate) counters: CallCounters,
    faults: Mutex<HashSet<(String, DocumentId)>>,
}

impl Inner {
    pub(crate) fn record_get(&self) {
        self.counters.gets.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_query(&self) {
        self.counters.queries.fetch_add(1, Ordering::Relaxed);
    }

    /// Fail if any operation targets a document marked as failing.
    pub(crate) fn check_faults(&self, operations: &[BatchOperation]) -> AppResult<()> {
        let faults = self.faults.lock().unwrap_or_else(PoisonError::into_inner);
        if faults.is_empty() {
            return Ok(());
        }
        for operation in operations {
            let key = (operation.collection().to_string(), operation.id().clone());
            if faults.contains(&key) {
                return Err(AppError::backing_store(format!(
                    "Write to {}/{} rejected by store",
                    key.0, key.1
                )));
            }
        }
        Ok(())
    }
}

/// In-process document store.
///
/// Clones share the same data.
#[derive(Clone)]
pub struct MemoryDocumentStore {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for MemoryDocumentStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryDocumentStore")
            .field("capabilities", &self.inner.capabilities)
            .finish_non_exhaustive()
    }
}

impl Default for MemoryDocumentStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryDocumentStore {
    /// Create a store with native count, multi-get and the default batch limit.
    pub fn new() -> Self {
        Self::with_capabilities(StoreCapabilities {
            native_count: true,
            multi_get: true,
            ..StoreCapabilities::default()
        })
    }

    /// Create a store from configuration.
    pub fn from_config(config: &StoreConfig) -> Self {
        Self::with_capabilities(StoreCapabilities {
            native_count: config.native_count,
            multi_get: config.multi_get,
            batch_limit: config.batch_limit.max(1),
        })
    }

    /// Create a store advertising the given capabilities.
    pub fn with_capabilities(capabilities: StoreCapabilities) -> Self {
        Self::build(capabilities, Arc::new(SystemClock))
    }

    /// Replace the clock used for server timestamps.
    pub fn with_clock(self, clock: Arc<dyn Clock>) -> Self {
        Self::build(self.inner.capabilities, clock)
    }

    fn build(capabilities: StoreCapabilities, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: RwLock::new(State::default()),
                capabilities,
                clock,
                counters: CallCounters::default(),
                faults: Mutex::new(HashSet::new()),
            }),
        }
    }

    /// Make every write touching `collection/id` fail until cleared.
    pub fn fail_writes_to(&self, collection: &str, id: &DocumentId) {
        self.inner
            .faults
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert((collection.to_string(), id.clone()));
    }

    /// Remove every injected write failure.
    pub fn clear_faults(&self) {
        self.inner
            .faults
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Snapshot of call counters.
    pub fn call_counts(&self) -> StoreCallCounts {
        let c = &self.inner.counters;
        StoreCallCounts {
            gets: c.gets.load(Ordering::Relaxed),
            multi_gets: c.multi_gets.load(Ordering::Relaxed),
            queries: c.queries.load(Ordering::Relaxed),
            counts: c.counts.load(Ordering::Relaxed),
            writes: c.writes.load(Ordering::Relaxed),
            batch_commits: c.batch_commits.load(Ordering::Relaxed),
            transaction_commits: c.transaction_commits.load(Ordering::Relaxed),
            transaction_rollbacks: c.transaction_rollbacks.load(Ordering::Relaxed),
        }
    }

    /// Number of documents in a collection, deleted or not.
    pub async fn document_count(&self, collection: &str) -> usize {
        self.inner
            .state
            .read()
            .await
            .collections
            .get(collection)
            .map_or(0, BTreeMap::len)
    }

    fn validate_filters(filters: &[FilterField]) -> AppResult<()> {
        filters.iter().try_for_each(FilterField::validate)
    }

    async fn write_single(&self, operation: BatchOperation) -> AppResult<()> {
        self.inner.counters.writes.fetch_add(1, Ordering::Relaxed);
        let operations = [operation];
        self.inner.check_faults(&operations)?;
        self.inner
            .state
            .write()
            .await
            .apply_atomically(&operations)
            .map(|_| ())
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    fn provider_type(&self) -> &str {
        "memory"
    }

    fn capabilities(&self) -> StoreCapabilities {
        self.inner.capabilities
    }

    async fn server_time(&self) -> AppResult<DateTime<Utc>> {
        Ok(self.inner.clock.now())
    }

    async fn health_check(&self) -> AppResult<bool> {
        Ok(true)
    }

    async fn get(&self, collection: &str, id: &DocumentId) -> AppResult<Option<Document>> {
        self.inner.record_get();
        let state = self.inner.state.read().await;
        Ok(state.lookup(collection, id).map(|doc| doc.data.clone()))
    }

    async fn query(&self, collection: &str, query: &StoreQuery) -> AppResult<Vec<StoredDocument>> {
        self.inner.record_query();
        Self::validate_filters(&query.filters)?;
        let state = self.inner.state.read().await;
        let rows = match state.collections.get(collection) {
            Some(docs) => query::execute(docs.iter().map(|(id, doc)| (id, &doc.data)), query),
            None => Vec::new(),
        };
        debug!(collection, rows = rows.len(), "Memory store query");
        Ok(rows)
    }

    async fn count(&self, collection: &str, filters: &[FilterField]) -> AppResult<u64> {
        if !self.inner.capabilities.native_count {
            return Err(AppError::not_implemented(format!(
                "memory store configured without native count for '{collection}'"
            )));
        }
        self.inner.counters.counts.fetch_add(1, Ordering::Relaxed);
        Self::validate_filters(filters)?;
        let state = self.inner.state.read().await;
        let count = state.collections.get(collection).map_or(0, |docs| {
            docs.values()
                .filter(|doc| filters.iter().all(|f| query::matches(&doc.data, f)))
                .count()
        });
        Ok(count as u64)
    }

    async fn multi_get(&self, collection: &str, ids: &[DocumentId]) -> AppResult<Vec<StoredDocument>> {
        if !self.inner.capabilities.multi_get {
            return Err(AppError::not_implemented(format!(
                "memory store configured without multi-get for '{collection}'"
            )));
        }
        self.inner.counters.multi_gets.fetch_add(1, Ordering::Relaxed);
        let state = self.inner.state.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| {
                state
                    .lookup(collection, id)
                    .map(|doc| StoredDocument::new(id.clone(), doc.data.clone()))
            })
            .collect())
    }

    async fn write(&self, collection: &str, id: &DocumentId, document: Document) -> AppResult<()> {
        self.write_single(BatchOperation::Set {
            collection: collection.to_string(),
            id: id.clone(),
            document,
        })
        .await
    }

    async fn update(&self, collection: &str, id: &DocumentId, patch: &DocumentPatch) -> AppResult<()> {
        self.write_single(BatchOperation::Update {
            collection: collection.to_string(),
            id: id.clone(),
            patch: patch.clone(),
        })
        .await
    }

    async fn remove(&self, collection: &str, id: &DocumentId) -> AppResult<()> {
        self.write_single(BatchOperation::Delete {
            collection: collection.to_string(),
            id: id.clone(),
        })
        .await
    }

    async fn commit_batch(&self, batch: WriteBatch) -> AppResult<usize> {
        self.inner.counters.batch_commits.fetch_add(1, Ordering::Relaxed);
        let limit = self.inner.capabilities.batch_limit;
        if batch.len() > limit {
            return Err(AppError::validation(format!(
                "Batch of {} operations exceeds the store limit of {limit}",
                batch.len()
            )));
        }
        let operations = batch.into_operations();
        self.inner.check_faults(&operations)?;
        let written = self.inner.state.write().await.apply_atomically(&operations)?;
        debug!(written, "Memory store batch committed");
        Ok(written)
    }

    async fn begin_transaction(&self) -> AppResult<Box<dyn StoreTransaction>> {
        Ok(Box::new(MemoryTransaction::new(Arc::clone(&self.inner))))
    }
}
