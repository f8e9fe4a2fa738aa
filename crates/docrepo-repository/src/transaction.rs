//! Unit-of-work execution inside store-native transactions.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use docrepo_core::config::repository::TransactionConfig;
use docrepo_core::error::AppError;
use docrepo_core::result::AppResult;
use docrepo_core::traits::store::{DocumentStore, StoreQuery, StoreTransaction};
use docrepo_core::types::document::{Document, DocumentPatch, StoredDocument, apply_patch};
use docrepo_core::types::id::DocumentId;

/// Future returned by a unit of work borrowing its [`TransactionContext`].
pub type TxFuture<'c, T> = Pin<Box<dyn Future<Output = AppResult<T>> + Send + 'c>>;

/// What later reads of one document see after writes staged in this attempt.
#[derive(Debug, Clone)]
enum Staged {
    /// Set (`Some`) or deleted (`None`) outright.
    Replaced(Option<Document>),
    /// Patched on top of the committed document.
    Patched(Vec<DocumentPatch>),
}

impl Staged {
    fn resolve(&self, committed: Option<Document>) -> Option<Document> {
        match self {
            Self::Replaced(doc) => doc.clone(),
            Self::Patched(patches) => committed.map(|mut doc| {
                for patch in patches {
                    apply_patch(&mut doc, patch);
                }
                doc
            }),
        }
    }
}

/// Handle to one attempt of a running transaction.
///
/// Writes are staged and the ids they touch are recorded so the caller can
/// invalidate caches after commit. `get` sees this attempt's own staged
/// writes on top of committed state. `query` only sees committed state, so
/// it is rejected for a collection already written in this attempt.
pub struct TransactionContext {
    tx: Box<dyn StoreTransaction>,
    attempt: u32,
    touched: Vec<(String, DocumentId)>,
    staged: HashMap<(String, DocumentId), Staged>,
}

impl std::fmt::Debug for TransactionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionContext")
            .field("attempt", &self.attempt)
            .field("touched", &self.touched)
            .finish_non_exhaustive()
    }
}

impl TransactionContext {
    fn new(tx: Box<dyn StoreTransaction>, attempt: u32) -> Self {
        Self {
            tx,
            attempt,
            touched: Vec::new(),
            staged: HashMap::new(),
        }
    }

    /// 1-based attempt number.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Ids written so far in this attempt, in write order.
    pub fn touched(&self) -> &[(String, DocumentId)] {
        &self.touched
    }

    /// Read a document, including writes staged earlier in this attempt.
    pub async fn get(&mut self, collection: &str, id: &DocumentId) -> AppResult<Option<Document>> {
        let committed = self.tx.get(collection, id).await?;
        Ok(match self.staged.get(&(collection.to_string(), id.clone())) {
            Some(staged) => staged.resolve(committed),
            None => committed,
        })
    }

    /// Query committed state. Fails with `Validation` once this attempt has
    /// written to `collection`.
    pub async fn query(&mut self, collection: &str, query: &StoreQuery) -> AppResult<Vec<StoredDocument>> {
        if self.touched.iter().any(|(c, _)| c == collection) {
            return Err(AppError::validation(format!(
                "Cannot query '{collection}' after writing to it in the same transaction"
            )));
        }
        self.tx.query(collection, query).await
    }

    pub fn set(&mut self, collection: &str, id: &DocumentId, document: Document) {
        self.touch(collection, id);
        self.staged.insert(
            (collection.to_string(), id.clone()),
            Staged::Replaced(Some(document.clone())),
        );
        self.tx.set(collection, id, document);
    }

    pub fn update(&mut self, collection: &str, id: &DocumentId, patch: DocumentPatch) {
        self.touch(collection, id);
        match self.staged.entry((collection.to_string(), id.clone())) {
            Entry::Occupied(mut entry) => match entry.get_mut() {
                Staged::Replaced(Some(doc)) => apply_patch(doc, &patch),
                Staged::Replaced(None) => {}
                Staged::Patched(patches) => patches.push(patch.clone()),
            },
            Entry::Vacant(entry) => {
                entry.insert(Staged::Patched(vec![patch.clone()]));
            }
        }
        self.tx.update(collection, id, patch);
    }

    pub fn delete(&mut self, collection: &str, id: &DocumentId) {
        self.touch(collection, id);
        self.staged
            .insert((collection.to_string(), id.clone()), Staged::Replaced(None));
        self.tx.delete(collection, id);
    }

    fn touch(&mut self, collection: &str, id: &DocumentId) {
        if !self
            .touched
            .iter()
            .any(|(c, existing)| c == collection && existing == id)
        {
            self.touched.push((collection.to_string(), id.clone()));
        }
    }
}

/// Result of a committed transaction.
#[derive(Debug, Clone)]
pub struct TransactionOutcome<T> {
    /// Value returned by the unit of work.
    pub value: T,
    /// Ids written by the committed attempt.
    pub touched: Vec<(String, DocumentId)>,
    /// Number of attempts used.
    pub attempts: u32,
    /// Number of staged writes committed.
    pub written: usize,
}

/// Runs units of work inside store transactions, committing on success,
/// rolling back on error and retrying when commit reports contention.
#[derive(Debug, Clone)]
pub struct TransactionCoordinator {
    store: Arc<dyn DocumentStore>,
    max_attempts: u32,
}

impl TransactionCoordinator {
    /// Create a coordinator.
    pub fn new(store: Arc<dyn DocumentStore>, config: &TransactionConfig) -> Self {
        Self {
            store,
            max_attempts: config.max_attempts.max(1),
        }
    }

    /// Maximum number of attempts per transaction.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Execute `work` in a transaction.
    ///
    /// An error from `work` rolls the attempt back and is returned unchanged.
    /// A `Contention` error from commit starts a fresh attempt until
    /// `max_attempts` is reached, so `work` may run more than once.
    pub async fn run<T, F>(&self, mut work: F) -> AppResult<TransactionOutcome<T>>
    where
        F: for<'c> FnMut(&'c mut TransactionContext) -> TxFuture<'c, T> + Send,
        T: Send,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let tx = self.store.begin_transaction().await?;
            let mut ctx = TransactionContext::new(tx, attempt);

            let result = work(&mut ctx).await;
            let TransactionContext { tx, touched, .. } = ctx;

            let value = match result {
                Ok(value) => value,
                Err(e) => {
                    if let Err(rollback_err) = tx.rollback().await {
                        error!(error = %rollback_err, "Transaction rollback failed");
                    }
                    debug!(attempt, error = %e, "Transaction rolled back");
                    return Err(e);
                }
            };

            match tx.commit().await {
                Ok(written) => {
                    info!(attempt, written, "Transaction committed");
                    return Ok(TransactionOutcome {
                        value,
                        touched,
                        attempts: attempt,
                        written,
                    });
                }
                Err(e) if e.is_retryable() && attempt < self.max_attempts => {
                    warn!(attempt, max_attempts = self.max_attempts, error = %e, "Transaction contention, retrying");
                }
                Err(e) => return Err(e),
            }
        }
    }
}
