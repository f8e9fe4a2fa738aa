//! Backing store configuration.

use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::types::batch::MAX_BATCH_SIZE;

/// Document store provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Store provider type. Supported: `"memory"`.
    #[serde(default = "default_provider")]
    pub provider: String,
    /// Maximum number of operations in one atomic batch.
    #[serde(default = "default_batch_limit")]
    pub batch_limit: usize,
    /// Whether the store exposes a native count primitive.
    #[serde(default = "default_true")]
    pub native_count: bool,
    /// Whether the store exposes a multi-get primitive.
    #[serde(default = "default_true")]
    pub multi_get: bool,
}

impl StoreConfig {
    /// Check value ranges.
    pub fn validate(&self) -> Result<(), AppError> {
        if self.batch_limit == 0 {
            return Err(AppError::configuration("store.batch_limit must be at least 1"));
        }
        Ok(())
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            batch_limit: default_batch_limit(),
            native_count: default_true(),
            multi_get: default_true(),
        }
    }
}

fn default_provider() -> String {
    "memory".to_string()
}

fn default_batch_limit() -> usize {
    MAX_BATCH_SIZE
}

fn default_true() -> bool {
    true
}
