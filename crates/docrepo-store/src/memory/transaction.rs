//! Optimistic transactions over the in-memory store.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::Ordering;

use async_trait::async_trait;
use tracing::debug;

use docrepo_core::error::AppError;
use docrepo_core::result::AppResult;
use docrepo_core::traits::store::{StoreQuery, StoreTransaction};
use docrepo_core::types::batch::BatchOperation;
use docrepo_core::types::document::{Document, DocumentPatch, StoredDocument};
use docrepo_core::types::filter::FilterField;
use docrepo_core::types::id::DocumentId;

use super::query;
use super::store::Inner;

type DocKey = (String, DocumentId);

/// A transaction that records the revision of every document it reads and
/// stages writes until commit.
///
/// Commit fails with `Contention` when any document read inside the
/// transaction changed since it was read.
pub struct MemoryTransaction {
    inner: Arc<Inner>,
    reads: HashMap<DocKey, Option<u64>>,
    staged: Vec<BatchOperation>,
}

impl MemoryTransaction {
    pub(crate) fn new(inner: Arc<Inner>) -> Self {
        Self {
            inner,
            reads: HashMap::new(),
            staged: Vec::new(),
        }
    }

    /// Number of staged writes.
    pub fn staged_len(&self) -> usize {
        self.staged.len()
    }

    fn remember(&mut self, collection: &str, id: &DocumentId, revision: Option<u64>) {
        self.reads
            .entry((collection.to_string(), id.clone()))
            .or_insert(revision);
    }
}

#[async_trait]
impl StoreTransaction for MemoryTransaction {
    async fn get(&mut self, collection: &str, id: &DocumentId) -> AppResult<Option<Document>> {
        self.inner.record_get();
        let (revision, data) = {
            let state = self.inner.state.read().await;
            match state.lookup(collection, id) {
                Some(doc) => (Some(doc.revision), Some(doc.data.clone())),
                None => (None, None),
            }
        };
        self.remember(collection, id, revision);
        Ok(data)
    }

    async fn query(&mut self, collection: &str, query: &StoreQuery) -> AppResult<Vec<StoredDocument>> {
        self.inner.record_query();
        query.filters.iter().try_for_each(FilterField::validate)?;
        let (rows, revisions) = {
            let state = self.inner.state.read().await;
            let Some(docs) = state.collections.get(collection) else {
                return Ok(Vec::new());
            };
            let rows = query::execute(docs.iter().map(|(id, doc)| (id, &doc.data)), query);
            let revisions: Vec<Option<u64>> = rows
                .iter()
                .map(|row| docs.get(&row.id).map(|doc| doc.revision))
                .collect();
            (rows, revisions)
        };
        for (row, revision) in rows.iter().zip(revisions) {
            self.remember(collection, &row.id, revision);
        }
        Ok(rows)
    }

    fn set(&mut self, collection: &str, id: &DocumentId, document: Document) {
        self.staged.push(BatchOperation::Set {
            collection: collection.to_string(),
            id: id.clone(),
            document,
        });
    }

    fn update(&mut self, collection: &str, id: &DocumentId, patch: DocumentPatch) {
        self.staged.push(BatchOperation::Update {
            collection: collection.to_string(),
            id: id.clone(),
            patch,
        });
    }

    fn delete(&mut self, collection: &str, id: &DocumentId) {
        self.staged.push(BatchOperation::Delete {
            collection: collection.to_string(),
            id: id.clone(),
        });
    }

    async fn commit(self: Box<Self>) -> AppResult<usize> {
        let this = *self;
        let counters = &this.inner.counters;
        let result = async {
            this.inner.check_faults(&this.staged)?;
            let mut state = this.inner.state.write().await;
            for ((collection, id), seen) in &this.reads {
                if state.revision_of(collection, id) != *seen {
                    return Err(AppError::contention(format!(
                        "Document {collection}/{id} changed during transaction"
                    )));
                }
            }
            state.apply_atomically(&this.staged)
        }
        .await;

        match &result {
            Ok(written) => {
                counters.transaction_commits.fetch_add(1, Ordering::Relaxed);
                debug!(written, reads = this.reads.len(), "Memory transaction committed");
            }
            Err(e) => {
                counters.transaction_rollbacks.fetch_add(1, Ordering::Relaxed);
                debug!(error = %e, "Memory transaction failed at commit");
            }
        }
        result
    }

    async fn rollback(self: Box<Self>) -> AppResult<()> {
        self.inner
            .counters
            .transaction_rollbacks
            .fetch_add(1, Ordering::Relaxed);
        debug!(discarded = self.staged.len(), "Memory transaction rolled back");
        Ok(())
    }
}
