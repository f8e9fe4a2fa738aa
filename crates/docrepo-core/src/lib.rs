//! # docrepo-core
//!
//! Core crate for docrepo. Contains the seam traits (`Entity`,
//! `DocumentStore`, `Clock`), configuration schemas, typed identifiers,
//! filter/sort/pagination types, batch types, and the unified error system.
//!
//! This crate has **no** internal dependencies on other docrepo crates.

pub mod config;
pub mod error;
pub mod result;
pub mod traits;
pub mod types;

pub use error::{AppError, ErrorKind};
pub use result::AppResult;
