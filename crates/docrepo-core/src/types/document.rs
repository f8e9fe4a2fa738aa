//! Schemaless document representation and field-path helpers.
//!
//! Documents are JSON objects. Field paths use `.` to address nested
//! objects (`dimensions.width`).

use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde_json::{Map, Value};

use crate::types::id::DocumentId;

/// A stored document body, without its key.
pub type Document = Map<String, Value>;

/// Reserved metadata field names written by the entity codec.
pub mod fields {
    /// Document key (never stored inside the body).
    pub const ID: &str = "id";
    /// Creation timestamp.
    pub const CREATED_AT: &str = "createdAt";
    /// Last update timestamp.
    pub const UPDATED_AT: &str = "updatedAt";
    /// Update counter.
    pub const VERSION: &str = "version";
    /// Soft-delete flag.
    pub const IS_DELETED: &str = "isDeleted";
    /// Soft-delete timestamp.
    pub const DELETED_AT: &str = "deletedAt";

    /// Fields a caller payload may never set directly.
    pub const PROTECTED: &[&str] = &[ID, CREATED_AT, UPDATED_AT, VERSION, IS_DELETED, DELETED_AT];
}

/// A document together with its key.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredDocument {
    /// Document key.
    pub id: DocumentId,
    /// Document body.
    pub data: Document,
}

impl StoredDocument {
    /// Create a stored document.
    pub fn new(id: DocumentId, data: Document) -> Self {
        Self { id, data }
    }
}

/// A partial update: fields to overwrite plus numeric fields to increment.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocumentPatch {
    /// Field paths to overwrite.
    pub set: Document,
    /// Field paths to increment atomically.
    pub increment: BTreeMap<String, i64>,
}

impl DocumentPatch {
    /// Create an empty patch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a patch that overwrites the given fields.
    pub fn from_fields(set: Document) -> Self {
        Self {
            set,
            increment: BTreeMap::new(),
        }
    }

    /// Overwrite a field.
    pub fn set(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set.insert(field.into(), value.into());
        self
    }

    /// Increment a numeric field; a missing field counts as `0`.
    pub fn increment(mut self, field: impl Into<String>, by: i64) -> Self {
        self.increment.insert(field.into(), by);
        self
    }

    /// Whether the patch changes nothing.
    pub fn is_empty(&self) -> bool {
        self.set.is_empty() && self.increment.is_empty()
    }
}

/// Look up a (possibly dotted) field path.
pub fn get_path<'a>(doc: &'a Document, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let first = segments.next()?;
    let mut current = doc.get(first)?;
    for segment in segments {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

/// Write a (possibly dotted) field path, creating intermediate objects.
pub fn set_path(doc: &mut Document, path: &str, value: Value) {
    match path.split_once('.') {
        None => {
            doc.insert(path.to_string(), value);
        }
        Some((head, rest)) => {
            let child = doc
                .entry(head.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if !child.is_object() {
                *child = Value::Object(Map::new());
            }
            if let Value::Object(map) = child {
                set_path(map, rest, value);
            }
        }
    }
}

/// Apply a patch in place: overwrites first, then increments.
pub fn apply_patch(doc: &mut Document, patch: &DocumentPatch) {
    for (path, value) in &patch.set {
        set_path(doc, path, value.clone());
    }
    for (path, by) in &patch.increment {
        let current = get_path(doc, path).and_then(Value::as_i64).unwrap_or(0);
        set_path(doc, path, Value::from(current.saturating_add(*by)));
    }
}

/// Whether applying `patch.set` to `doc` would change any field.
pub fn patch_changes(doc: &Document, patch: &DocumentPatch) -> bool {
    if patch.increment.values().any(|by| *by != 0) {
        return true;
    }
    patch
        .set
        .iter()
        .any(|(path, value)| get_path(doc, path) != Some(value))
}

fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

/// Total order over JSON values: values of different types order by type
/// (null < bool < number < string < array < object), values of the same
/// type order naturally.
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => {
            match (x.as_i64(), y.as_i64()) {
                (Some(x), Some(y)) => x.cmp(&y),
                _ => {
                    let x = x.as_f64().unwrap_or(f64::NAN);
                    let y = y.as_f64().unwrap_or(f64::NAN);
                    x.partial_cmp(&y).unwrap_or(Ordering::Equal)
                }
            }
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Array(x), Value::Array(y)) => {
            for (l, r) in x.iter().zip(y.iter()) {
                let ord = compare_values(l, r);
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            x.len().cmp(&y.len())
        }
        (Value::Object(x), Value::Object(y)) => x.len().cmp(&y.len()),
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

/// Loose equality used by filters: numbers compare by value regardless
/// of integer/float representation.
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(_), Value::Number(_)) => compare_values(a, b) == Ordering::Equal,
        _ => a == b,
    }
}
