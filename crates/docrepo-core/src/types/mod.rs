//! Core type definitions used across the docrepo workspace.

pub mod batch;
pub mod cursor;
pub mod document;
pub mod filter;
pub mod id;
pub mod pagination;
pub mod sorting;

pub use batch::{
    BatchFailure, BatchFailureReport, BatchOperation, BatchOperationKind, MAX_BATCH_SIZE,
    WriteBatch,
};
pub use cursor::{CursorBound, CursorPosition};
pub use document::{Document, DocumentPatch, StoredDocument};
pub use filter::{FilterField, FilterOp};
pub use id::DocumentId;
pub use pagination::{PageRequest, PageResponse};
pub use sorting::{SortDirection, SortField};
