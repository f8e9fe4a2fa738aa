//! Cursor bounds for native cursor pagination.
//!
//! A bound holds one value per ordering field of the query, in the same
//! order as the query's `order_by` list.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Where a cursor bound sits relative to the referenced position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CursorPosition {
    /// Include documents at or after the position.
    StartAt,
    /// Include documents strictly after the position.
    StartAfter,
    /// Include documents at or before the position.
    EndAt,
    /// Include documents strictly before the position.
    EndBefore,
}

/// A cursor bound over the query's ordering fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CursorBound {
    /// Bound kind.
    pub position: CursorPosition,
    /// One value per ordering field.
    pub values: Vec<Value>,
}

impl CursorBound {
    /// Start at (inclusive) the given ordering values.
    pub fn start_at(values: Vec<Value>) -> Self {
        Self {
            position: CursorPosition::StartAt,
            values,
        }
    }

    /// Start after (exclusive) the given ordering values.
    pub fn start_after(values: Vec<Value>) -> Self {
        Self {
            position: CursorPosition::StartAfter,
            values,
        }
    }

    /// End at (inclusive) the given ordering values.
    pub fn end_at(values: Vec<Value>) -> Self {
        Self {
            position: CursorPosition::EndAt,
            values,
        }
    }

    /// End before (exclusive) the given ordering values.
    pub fn end_before(values: Vec<Value>) -> Self {
        Self {
            position: CursorPosition::EndBefore,
            values,
        }
    }

    /// Whether this bound limits the start of the result set.
    pub fn is_start(&self) -> bool {
        matches!(self.position, CursorPosition::StartAt | CursorPosition::StartAfter)
    }
}
