//! Batch write operations and the failure report for partially applied batches.

use serde::Serialize;

use crate::error::AppError;
use crate::result::AppResult;
use crate::types::document::{Document, DocumentPatch};
use crate::types::id::DocumentId;

/// Maximum number of operations a store accepts in one atomic batch.
pub const MAX_BATCH_SIZE: usize = 500;

/// Kind of a batch write operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchOperationKind {
    /// Create or overwrite a document.
    Set,
    /// Patch an existing document.
    Update,
    /// Remove a document.
    Delete,
}

/// A single write operation staged into a batch.
#[derive(Debug, Clone, PartialEq)]
pub enum BatchOperation {
    /// Create or overwrite a document.
    Set {
        /// Target collection.
        collection: String,
        /// Target document id.
        id: DocumentId,
        /// Full document body.
        document: Document,
    },
    /// Patch an existing document. Fails if the document does not exist.
    Update {
        /// Target collection.
        collection: String,
        /// Target document id.
        id: DocumentId,
        /// Fields to set and increment.
        patch: DocumentPatch,
    },
    /// Remove a document.
    Delete {
        /// Target collection.
        collection: String,
        /// Target document id.
        id: DocumentId,
    },
}

impl BatchOperation {
    /// Return the operation kind.
    pub fn kind(&self) -> BatchOperationKind {
        match self {
            Self::Set { .. } => BatchOperationKind::Set,
            Self::Update { .. } => BatchOperationKind::Update,
            Self::Delete { .. } => BatchOperationKind::Delete,
        }
    }

    /// Return the target collection.
    pub fn collection(&self) -> &str {
        match self {
            Self::Set { collection, .. }
            | Self::Update { collection, .. }
            | Self::Delete { collection, .. } => collection,
        }
    }

    /// Return the target document id.
    pub fn id(&self) -> &DocumentId {
        match self {
            Self::Set { id, .. } | Self::Update { id, .. } | Self::Delete { id, .. } => id,
        }
    }
}

/// A bounded group of write operations committed atomically by the store.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteBatch {
    operations: Vec<BatchOperation>,
    limit: usize,
}

impl WriteBatch {
    /// Create an empty batch accepting at most `limit` operations.
    pub fn new(limit: usize) -> Self {
        Self {
            operations: Vec::new(),
            limit: limit.max(1),
        }
    }

    /// Stage a full-document write.
    pub fn set(&mut self, collection: &str, id: DocumentId, document: Document) -> AppResult<()> {
        self.push(BatchOperation::Set {
            collection: collection.to_string(),
            id,
            document,
        })
    }

    /// Stage a patch of an existing document.
    pub fn update(&mut self, collection: &str, id: DocumentId, patch: DocumentPatch) -> AppResult<()> {
        self.push(BatchOperation::Update {
            collection: collection.to_string(),
            id,
            patch,
        })
    }

    /// Stage a document removal.
    pub fn delete(&mut self, collection: &str, id: DocumentId) -> AppResult<()> {
        self.push(BatchOperation::Delete {
            collection: collection.to_string(),
            id,
        })
    }

    /// Stage an operation, rejecting it once the batch is full.
    pub fn push(&mut self, operation: BatchOperation) -> AppResult<()> {
        if self.operations.len() >= self.limit {
            return Err(AppError::validation(format!(
                "Batch is limited to {} operations",
                self.limit
            )));
        }
        self.operations.push(operation);
        Ok(())
    }

    /// Number of staged operations.
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    /// Whether nothing is staged.
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Staged operations in input order.
    pub fn operations(&self) -> &[BatchOperation] {
        &self.operations
    }

    /// Consume the batch, returning its operations.
    pub fn into_operations(self) -> Vec<BatchOperation> {
        self.operations
    }
}

/// One failed operation of a batch.
#[derive(Debug, Clone)]
pub struct BatchFailure {
    /// Position of the operation in the caller's input.
    pub index: usize,
    /// Operation kind.
    pub kind: BatchOperationKind,
    /// Target collection.
    pub collection: String,
    /// Target document id.
    pub id: DocumentId,
    /// Why it failed.
    pub error: AppError,
}

/// Aggregated outcome of a batch in which at least one chunk failed.
#[derive(Debug, Clone)]
pub struct BatchFailureReport {
    /// Number of operations submitted.
    pub attempted: usize,
    /// Number of operations durably written by committed chunks.
    pub written_count: usize,
    /// Number of chunks the batch was split into.
    pub chunk_count: usize,
    /// Every failed operation, in input order.
    pub failures: Vec<BatchFailure>,
}

impl BatchFailureReport {
    /// Whether no chunk committed at all.
    pub fn nothing_committed(&self) -> bool {
        self.written_count == 0
    }

    /// Whether some chunks committed while others failed.
    pub fn is_partial(&self) -> bool {
        self.written_count > 0 && !self.failures.is_empty()
    }

    /// Ids of every failed operation.
    pub fn failed_ids(&self) -> Vec<&DocumentId> {
        self.failures.iter().map(|f| &f.id).collect()
    }
}
