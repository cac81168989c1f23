//! Value-level helpers shared by the filter, sort, and aggregation code.

use std::cmp::Ordering;

use bson::{Bson, Document};

/// Resolves a dotted field path against a document.
///
/// Segments traverse nested documents; a numeric segment indexes into an
/// array. Returns `None` as soon as a segment cannot be resolved.
pub(crate) fn resolve_path<'a>(doc: &'a Document, path: &str) -> Option<&'a Bson> {
    let mut segments = path.split('.');
    let mut current = doc.get(segments.next()?);
    for segment in segments {
        current = match current? {
            Bson::Document(nested) => nested.get(segment),
            Bson::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        };
    }
    current
}

/// Widens any of the three BSON numeric types to `f64`.
pub(crate) fn as_f64(value: &Bson) -> Option<f64> {
    match value {
        Bson::Int32(v) => Some(f64::from(*v)),
        Bson::Int64(v) => Some(*v as f64),
        Bson::Double(v) => Some(*v),
        _ => None,
    }
}

pub(crate) fn is_numeric(value: &Bson) -> bool {
    matches!(value, Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_))
}

/// Compares two BSON values, numerics by magnitude regardless of width.
///
/// Returns `None` for pairs that have no defined ordering (mixed types,
/// arrays, documents). Callers decide whether that means "no match" or
/// "leave in place".
pub(crate) fn compare(a: &Bson, b: &Bson) -> Option<Ordering> {
    if let (Some(x), Some(y)) = (as_f64(a), as_f64(b)) {
        return x.partial_cmp(&y);
    }
    match (a, b) {
        (Bson::String(x), Bson::String(y)) => Some(x.cmp(y)),
        (Bson::Boolean(x), Bson::Boolean(y)) => Some(x.cmp(y)),
        (Bson::DateTime(x), Bson::DateTime(y)) => Some(x.cmp(y)),
        (Bson::ObjectId(x), Bson::ObjectId(y)) => Some(x.cmp(y)),
        (Bson::Timestamp(x), Bson::Timestamp(y)) => Some(x.cmp(y)),
        (Bson::Null, Bson::Null) => Some(Ordering::Equal),
        _ => None,
    }
}

/// Equality with numeric widening, recursing into arrays and documents.
///
/// `Bson`'s derived `PartialEq` treats `Int32(1)` and `Int64(1)` as
/// different values, which is wrong for query semantics.
pub(crate) fn values_equal(a: &Bson, b: &Bson) -> bool {
    match (a, b) {
        (Bson::Array(x), Bson::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(l, r)| values_equal(l, r))
        }
        (Bson::Document(x), Bson::Document(y)) => documents_equal(x, y),
        _ => match compare(a, b) {
            Some(order) => order == Ordering::Equal,
            None => a == b,
        },
    }
}

/// Field-order-sensitive document equality, matching server comparison rules.
pub(crate) fn documents_equal(a: &Document, b: &Document) -> bool {
    a.len() == b.len()
        && a.iter()
            .zip(b.iter())
            .all(|((ka, va), (kb, vb))| ka == kb && values_equal(va, vb))
}
