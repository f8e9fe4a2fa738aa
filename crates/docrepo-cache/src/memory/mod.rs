//! In-memory cache backed by [`dashmap`].

mod store;

pub use store::TtlCache;
