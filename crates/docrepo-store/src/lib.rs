//! # docrepo-store
//!
//! Document store providers for docrepo. Supports:
//!
//! - **memory**: an in-process store with query evaluation, cursor bounds,
//!   atomic bounded batches and optimistic transactions
//!
//! The provider is selected at runtime based on configuration through
//! [`StoreManager`].

pub mod memory;
pub mod provider;

pub use memory::{MemoryDocumentStore, StoreCallCounts};
pub use provider::StoreManager;
