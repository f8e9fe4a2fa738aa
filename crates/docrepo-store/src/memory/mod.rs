//! In-process document store.

mod query;
mod store;
mod transaction;

pub use store::{MemoryDocumentStore, StoreCallCounts};
pub use transaction::MemoryTransaction;
