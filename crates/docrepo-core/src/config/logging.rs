//! Logging configuration.

use serde::{Deserialize, Serialize};

/// Tracing subscriber settings for binaries embedding docrepo.
///
/// `RUST_LOG` takes precedence over `level` when set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive, e.g. `"info"` or `"docrepo_repository=debug"`.
    #[serde(default = "default_level")]
    pub level: String,
    /// `"json"` for one object per event, anything else for pretty output.
    #[serde(default = "default_format")]
    pub format: String,
    /// Include the emitting module in each event.
    #[serde(default = "default_with_target")]
    pub with_target: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            format: default_format(),
            with_target: default_with_target(),
        }
    }
}

fn default_level() -> String {
    "info".to_string()
}

fn default_format() -> String {
    "pretty".to_string()
}

fn default_with_target() -> bool {
    true
}
