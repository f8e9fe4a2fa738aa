//! Core traits defined in `docrepo-core` and implemented by other crates
//! or by the application's entity types.

pub mod clock;
pub mod entity;
pub mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use entity::{Entity, EntityMetadata};
pub use store::{DocumentStore, StoreCapabilities, StoreQuery, StoreTransaction};
