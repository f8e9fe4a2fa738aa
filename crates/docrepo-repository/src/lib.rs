//! # docrepo-repository
//!
//! Generic, typed document repository. [`DocumentRepository`] composes a
//! per-instance TTL cache, a stats tracker, the entity codec, the chunking
//! batch writer and the transaction coordinator on top of any
//! [`DocumentStore`](docrepo_core::traits::store::DocumentStore).

pub mod batch;
pub mod codec;
pub mod options;
pub mod repository;
pub mod stats;
pub mod transaction;
pub mod tx_repository;

pub use batch::{BatchOutcome, BatchWriter};
pub use codec::EntityCodec;
pub use options::{
    CreateOptions, DeleteOptions, FindByIdOptions, FindByIdsOptions, FindOptions,
    PaginateOptions, UpdateOptions,
};
pub use repository::DocumentRepository;
pub use stats::{RecordedError, RepositoryStats, StatsSnapshot};
pub use transaction::{TransactionContext, TransactionCoordinator, TransactionOutcome, TxFuture};
pub use tx_repository::TxRepository;
