//! Query evaluation over in-memory documents.

use std::cmp::Ordering;

use serde_json::Value;

use docrepo_core::traits::store::StoreQuery;
use docrepo_core::types::cursor::{CursorBound, CursorPosition};
use docrepo_core::types::document::{Document, StoredDocument, compare_values, get_path, values_equal};
use docrepo_core::types::filter::{FilterField, FilterOp};
use docrepo_core::types::id::DocumentId;
use docrepo_core::types::sorting::SortField;

/// Whether a document satisfies a single filter.
///
/// A document lacking the filtered field never matches, whatever the operator.
pub(crate) fn matches(doc: &Document, filter: &FilterField) -> bool {
    let Some(actual) = get_path(doc, &filter.field) else {
        return false;
    };
    match filter.op {
        FilterOp::Eq => values_equal(actual, &filter.value),
        FilterOp::Ne => !values_equal(actual, &filter.value),
        FilterOp::Gt => same_type_cmp(actual, &filter.value) == Some(Ordering::Greater),
        FilterOp::Gte => matches!(
            same_type_cmp(actual, &filter.value),
            Some(Ordering::Greater | Ordering::Equal)
        ),
        FilterOp::Lt => same_type_cmp(actual, &filter.value) == Some(Ordering::Less),
        FilterOp::Lte => matches!(
            same_type_cmp(actual, &filter.value),
            Some(Ordering::Less | Ordering::Equal)
        ),
        FilterOp::In => list(&filter.value).iter().any(|v| values_equal(actual, v)),
        FilterOp::NotIn => !list(&filter.value).iter().any(|v| values_equal(actual, v)),
        FilterOp::ArrayContains => actual
            .as_array()
            .is_some_and(|items| items.iter().any(|item| values_equal(item, &filter.value))),
        FilterOp::ArrayContainsAny => actual.as_array().is_some_and(|items| {
            list(&filter.value)
                .iter()
                .any(|wanted| items.iter().any(|item| values_equal(item, wanted)))
        }),
    }
}

fn list(value: &Value) -> &[Value] {
    value.as_array().map(Vec::as_slice).unwrap_or_default()
}

/// Range comparisons only apply between values of the same JSON type.
fn same_type_cmp(a: &Value, b: &Value) -> Option<Ordering> {
    let same = matches!(
        (a, b),
        (Value::Bool(_), Value::Bool(_))
            | (Value::Number(_), Value::Number(_))
            | (Value::String(_), Value::String(_))
            | (Value::Array(_), Value::Array(_))
    );
    same.then(|| compare_values(a, b))
}

/// Ordering key of a document: its ordering field values, or its id when
/// the query has no ordering.
fn position_key(id: &DocumentId, doc: &Document, order_by: &[SortField]) -> Option<Vec<Value>> {
    if order_by.is_empty() {
        return Some(vec![Value::String(id.as_str().to_string())]);
    }
    order_by
        .iter()
        .map(|sort| get_path(doc, &sort.field).cloned())
        .collect()
}

fn compare_keys(a: &[Value], b: &[Value], order_by: &[SortField]) -> Ordering {
    for (index, (left, right)) in a.iter().zip(b.iter()).enumerate() {
        let ord = match order_by.get(index) {
            Some(sort) => sort.direction.orient(compare_values(left, right)),
            None => compare_values(left, right),
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

fn within_bound(key: &[Value], bound: &CursorBound, order_by: &[SortField]) -> bool {
    let ord = compare_keys(key, &bound.values, order_by);
    match bound.position {
        CursorPosition::StartAt => ord != Ordering::Less,
        CursorPosition::StartAfter => ord == Ordering::Greater,
        CursorPosition::EndAt => ord != Ordering::Greater,
        CursorPosition::EndBefore => ord == Ordering::Less,
    }
}

/// Evaluate a query over `(id, document)` pairs.
pub(crate) fn execute<'a, I>(docs: I, query: &StoreQuery) -> Vec<StoredDocument>
where
    I: IntoIterator<Item = (&'a DocumentId, &'a Document)>,
{
    let mut rows: Vec<(Vec<Value>, &DocumentId, &Document)> = docs
        .into_iter()
        .filter(|(_, doc)| query.filters.iter().all(|f| matches(doc, f)))
        .filter_map(|(id, doc)| position_key(id, doc, &query.order_by).map(|key| (key, id, doc)))
        .filter(|(key, _, _)| {
            query
                .cursors
                .iter()
                .all(|bound| within_bound(key, bound, &query.order_by))
        })
        .collect();

    rows.sort_by(|(ka, ia, _), (kb, ib, _)| {
        compare_keys(ka, kb, &query.order_by).then_with(|| ia.cmp(ib))
    });

    let limit = query.limit.unwrap_or(usize::MAX);
    rows.into_iter()
        .take(limit)
        .map(|(_, id, doc)| StoredDocument::new(id.clone(), doc.clone()))
        .collect()
}
