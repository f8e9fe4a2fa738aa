//! Generic repository behaviour configuration.

use serde::{Deserialize, Serialize};

use super::cache::CacheConfig;
use crate::error::AppError;
use crate::types::batch::MAX_BATCH_SIZE;

/// Where creation and update timestamps come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimestampSource {
    /// The repository's injected clock.
    #[default]
    Client,
    /// The backing store's clock.
    Server,
}

/// Settings shared by every repository instance built from configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepositoryConfig {
    /// Mark documents deleted instead of removing them.
    #[serde(default = "default_true")]
    pub soft_delete: bool,
    /// Maintain a version counter incremented on every update.
    #[serde(default = "default_true")]
    pub versioning: bool,
    /// Timestamp source for `createdAt`/`updatedAt`.
    #[serde(default)]
    pub timestamps: TimestampSource,
    /// Read cache settings.
    #[serde(default)]
    pub cache: CacheConfig,
    /// Batch writer settings.
    #[serde(default)]
    pub batch: BatchConfig,
    /// Query settings.
    #[serde(default)]
    pub query: QueryConfig,
    /// Transaction settings.
    #[serde(default)]
    pub transaction: TransactionConfig,
}

/// Batch writer configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Operations per chunk; clamped to the store's batch limit.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Number of chunks committed concurrently.
    #[serde(default = "default_concurrent_chunks")]
    pub max_concurrent_chunks: usize,
}

/// Query configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryConfig {
    /// `find` results are cache-filled only when at most this many rows return.
    #[serde(default = "default_cache_fill_threshold")]
    pub cache_fill_threshold: usize,
    /// Largest page size `paginate` accepts.
    #[serde(default = "default_max_page_size")]
    pub max_page_size: u64,
}

/// Transaction configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionConfig {
    /// Attempts made when a commit reports contention.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

impl RepositoryConfig {
    /// Check value ranges.
    pub fn validate(&self) -> Result<(), AppError> {
        if self.cache.enabled && self.cache.ttl_seconds == 0 {
            return Err(AppError::configuration(
                "repository.cache.ttl_seconds must be positive when caching is enabled",
            ));
        }
        if self.cache.enabled && self.cache.max_entries == 0 {
            return Err(AppError::configuration(
                "repository.cache.max_entries must be positive when caching is enabled",
            ));
        }
        if self.batch.chunk_size == 0 {
            return Err(AppError::configuration(
                "repository.batch.chunk_size must be at least 1",
            ));
        }
        if self.batch.max_concurrent_chunks == 0 {
            return Err(AppError::configuration(
                "repository.batch.max_concurrent_chunks must be at least 1",
            ));
        }
        if self.query.max_page_size == 0 {
            return Err(AppError::configuration(
                "repository.query.max_page_size must be at least 1",
            ));
        }
        if self.transaction.max_attempts == 0 {
            return Err(AppError::configuration(
                "repository.transaction.max_attempts must be at least 1",
            ));
        }
        Ok(())
    }
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            soft_delete: true,
            versioning: true,
            timestamps: TimestampSource::default(),
            cache: CacheConfig::default(),
            batch: BatchConfig::default(),
            query: QueryConfig::default(),
            transaction: TransactionConfig::default(),
        }
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            max_concurrent_chunks: default_concurrent_chunks(),
        }
    }
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            cache_fill_threshold: default_cache_fill_threshold(),
            max_page_size: default_max_page_size(),
        }
    }
}

impl Default for TransactionConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_chunk_size() -> usize {
    MAX_BATCH_SIZE
}

fn default_concurrent_chunks() -> usize {
    1
}

fn default_cache_fill_threshold() -> usize {
    100
}

fn default_max_page_size() -> u64 {
    500
}

fn default_max_attempts() -> u32 {
    5
}
