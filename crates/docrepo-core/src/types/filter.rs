//! Filter types for declarative document queries.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::AppError;
use crate::result::AppResult;

/// Maximum number of values accepted by set-membership operators.
pub const MAX_IN_VALUES: usize = 30;

/// Filter comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOp {
    /// Exact equality.
    Eq,
    /// Not equal.
    Ne,
    /// Greater than.
    Gt,
    /// Greater than or equal.
    Gte,
    /// Less than.
    Lt,
    /// Less than or equal.
    Lte,
    /// Field value is one of the listed values.
    In,
    /// Field value is none of the listed values.
    NotIn,
    /// Array field contains the value.
    ArrayContains,
    /// Array field contains at least one of the listed values.
    ArrayContainsAny,
}

impl FilterOp {
    /// Whether the operator expects a list value.
    pub fn takes_list(&self) -> bool {
        matches!(self, Self::In | Self::NotIn | Self::ArrayContainsAny)
    }
}

/// A single filter condition on a document field (dotted paths allowed).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterField {
    /// The field path to filter on.
    pub field: String,
    /// The comparison operator.
    pub op: FilterOp,
    /// The value to compare against.
    pub value: Value,
}

impl FilterField {
    /// Create a new filter field.
    pub fn new(field: impl Into<String>, op: FilterOp, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            op,
            value: value.into(),
        }
    }

    /// Shorthand for an equality filter.
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(field, FilterOp::Eq, value)
    }

    /// Shorthand for a not-equal filter.
    pub fn ne(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(field, FilterOp::Ne, value)
    }

    /// Shorthand for a greater-than filter.
    pub fn gt(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(field, FilterOp::Gt, value)
    }

    /// Shorthand for a greater-than-or-equal filter.
    pub fn gte(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(field, FilterOp::Gte, value)
    }

    /// Shorthand for a less-than filter.
    pub fn lt(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(field, FilterOp::Lt, value)
    }

    /// Shorthand for a less-than-or-equal filter.
    pub fn lte(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(field, FilterOp::Lte, value)
    }

    /// Shorthand for a set-membership filter.
    pub fn is_in(field: impl Into<String>, values: Vec<Value>) -> Self {
        Self::new(field, FilterOp::In, Value::Array(values))
    }

    /// Shorthand for a negated set-membership filter.
    pub fn not_in(field: impl Into<String>, values: Vec<Value>) -> Self {
        Self::new(field, FilterOp::NotIn, Value::Array(values))
    }

    /// Shorthand for an array-contains filter.
    pub fn array_contains(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(field, FilterOp::ArrayContains, value)
    }

    /// Shorthand for an array-contains-any filter.
    pub fn array_contains_any(field: impl Into<String>, values: Vec<Value>) -> Self {
        Self::new(field, FilterOp::ArrayContainsAny, Value::Array(values))
    }

    /// Check that the value shape fits the operator.
    pub fn validate(&self) -> AppResult<()> {
        if self.field.is_empty() {
            return Err(AppError::validation("Filter field must not be empty"));
        }
        if self.op.takes_list() {
            match &self.value {
                Value::Array(values) if values.is_empty() => {
                    return Err(AppError::validation(format!(
                        "Filter on '{}' needs at least one value",
                        self.field
                    )));
                }
                Value::Array(values) if values.len() > MAX_IN_VALUES => {
                    return Err(AppError::validation(format!(
                        "Filter on '{}' accepts at most {MAX_IN_VALUES} values",
                        self.field
                    )));
                }
                Value::Array(_) => {}
                _ => {
                    return Err(AppError::validation(format!(
                        "Filter {:?} on '{}' requires a list value",
                        self.op, self.field
                    )));
                }
            }
        }
        Ok(())
    }
}
