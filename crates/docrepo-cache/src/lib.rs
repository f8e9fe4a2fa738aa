//! # docrepo-cache
//!
//! In-process read cache for docrepo repositories. Each repository owns
//! one [`TtlCache`]: a key/value map whose entries expire a fixed TTL after
//! they were written and which holds at most a configured number of
//! entries.
//!
//! The cache is a performance layer only. A miss is never an error, and a
//! disabled cache turns every call into a no-op.

#[cfg(feature = "memory")]
pub mod memory;

#[cfg(feature = "memory")]
pub use memory::TtlCache;
