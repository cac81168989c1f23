//! Filter-document matching.
//!
//! A filter is a document whose top-level keys are either logical
//! operators (`$and`, `$or`, `$nor`) or dotted field paths. A field
//! condition is either a literal value (equality) or an operator document
//! such as `{"$gt": 100}`. The empty filter matches every document.

use bson::{Bson, Document};
use regex::Regex;

use crate::error::{Error, Result};
use crate::utils::{compare, resolve_path, values_equal};

/// Returns whether `doc` satisfies `filter`.
pub(crate) fn matches(doc: &Document, filter: &Document) -> Result<bool> {
    for (key, condition) in filter.iter() {
        let ok = match key.as_str() {
            "$and" => all_match(doc, clause_list(key, condition)?)?,
            "$or" => any_match(doc, clause_list(key, condition)?)?,
            "$nor" => !any_match(doc, clause_list(key, condition)?)?,
            _ if key.starts_with('$') => {
                return Err(Error::InvalidFilter(format!(
                    "unsupported top-level operator `{key}`"
                )))
            }
            path => field_matches(resolve_path(doc, path), condition)?,
        };
        if !ok {
            return Ok(false);
        }
    }
    Ok(true)
}

fn all_match(doc: &Document, clauses: Vec<&Document>) -> Result<bool> {
    for clause in clauses {
        if !matches(doc, clause)? {
            return Ok(false);
        }
    }
    Ok(true)
}

fn any_match(doc: &Document, clauses: Vec<&Document>) -> Result<bool> {
    for clause in clauses {
        if matches(doc, clause)? {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Extracts the sub-filter array of a logical operator.
fn clause_list<'a>(op: &str, operand: &'a Bson) -> Result<Vec<&'a Document>> {
    let items = operand.as_array().ok_or_else(|| {
        Error::InvalidFilter(format!("`{op}` requires an array of filter documents"))
    })?;
    items
        .iter()
        .map(|item| {
            item.as_document().ok_or_else(|| {
                Error::InvalidFilter(format!("`{op}` entries must be documents"))
            })
        })
        .collect()
}

/// Applies one field condition to the (possibly absent) resolved value.
fn field_matches(value: Option<&Bson>, condition: &Bson) -> Result<bool> {
    if let Bson::Document(ops) = condition {
        if ops.keys().any(|k| k.starts_with('$')) {
            return apply_operators(value, ops);
        }
    }
    Ok(equality_matches(value, condition))
}

fn apply_operators(value: Option<&Bson>, ops: &Document) -> Result<bool> {
    for (op, operand) in ops.iter() {
        let ok = match op.as_str() {
            "$eq" => equality_matches(value, operand),
            "$ne" => !equality_matches(value, operand),
            "$gt" | "$gte" | "$lt" | "$lte" => ordered_matches(op, value, operand),
            "$in" => in_matches(op, value, operand)?,
            "$nin" => !in_matches(op, value, operand)?,
            "$exists" => {
                let expected = operand.as_bool().ok_or_else(|| {
                    Error::InvalidFilter("`$exists` requires a boolean operand".into())
                })?;
                value.is_some() == expected
            }
            "$regex" => regex_matches(value, operand)?,
            "$not" => {
                let inner = operand.as_document().ok_or_else(|| {
                    Error::InvalidFilter("`$not` requires an operator document".into())
                })?;
                !apply_operators(value, inner)?
            }
            other => {
                return Err(Error::InvalidFilter(format!(
                    "unsupported operator `{other}`"
                )))
            }
        };
        if !ok {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Equality per query semantics: `null` also matches an absent field, and
/// a scalar condition matches an array field containing an equal element.
fn equality_matches(value: Option<&Bson>, condition: &Bson) -> bool {
    if matches!(condition, Bson::Null) {
        return matches!(value, None | Some(Bson::Null));
    }
    match value {
        Some(v) if values_equal(v, condition) => true,
        Some(Bson::Array(items)) if !matches!(condition, Bson::Array(_)) => {
            items.iter().any(|item| values_equal(item, condition))
        }
        _ => false,
    }
}

fn ordered_matches(op: &str, value: Option<&Bson>, operand: &Bson) -> bool {
    let Some(value) = value else { return false };
    match compare(value, operand) {
        Some(order) => match op {
            "$gt" => order.is_gt(),
            "$gte" => order.is_ge(),
            "$lt" => order.is_lt(),
            _ => order.is_le(),
        },
        // Incomparable pairs (mixed types) never match.
        None => false,
    }
}

fn in_matches(op: &str, value: Option<&Bson>, operand: &Bson) -> Result<bool> {
    let candidates = operand
        .as_array()
        .ok_or_else(|| Error::InvalidFilter(format!("`{op}` requires an array operand")))?;
    Ok(candidates
        .iter()
        .any(|candidate| equality_matches(value, candidate)))
}

fn regex_matches(value: Option<&Bson>, operand: &Bson) -> Result<bool> {
    let pattern = match operand {
        Bson::String(s) => s.as_str(),
        Bson::RegularExpression(re) => re.pattern.as_str(),
        _ => {
            return Err(Error::InvalidFilter(
                "`$regex` requires a pattern string".into(),
            ))
        }
    };
    let re = Regex::new(pattern)?;
    Ok(matches!(value, Some(Bson::String(s)) if re.is_match(s)))
}

#[cfg(test)]
mod tests {
    use bson::doc;

    use super::*;

    fn sample() -> Document {
        doc! { "a": 1, "b": 4, "c": 900, "tags": ["x", "y"], "nested": { "k": 7 } }
    }

    #[test]
    fn empty_filter_matches_everything() {
        assert!(matches(&sample(), &doc! {}).unwrap());
    }

    #[test]
    fn equality_and_subfield_paths() {
        assert!(matches(&sample(), &doc! { "a": 1 }).unwrap());
        assert!(matches(&sample(), &doc! { "a": 1_i64 }).unwrap());
        assert!(matches(&sample(), &doc! { "nested.k": 7 }).unwrap());
        assert!(!matches(&sample(), &doc! { "a": 2 }).unwrap());
        assert!(!matches(&sample(), &doc! { "missing": 1 }).unwrap());
    }

    #[test]
    fn comparison_operators() {
        assert!(matches(&sample(), &doc! { "c": { "$gt": 100 } }).unwrap());
        assert!(!matches(&sample(), &doc! { "b": { "$gt": 100 } }).unwrap());
        assert!(matches(&sample(), &doc! { "b": { "$gte": 4, "$lte": 4 } }).unwrap());
        assert!(matches(&sample(), &doc! { "a": { "$lt": 1.5 } }).unwrap());
        // Mixed types never satisfy an ordered comparison.
        assert!(!matches(&sample(), &doc! { "tags": { "$gt": 1 } }).unwrap());
    }

    #[test]
    fn set_membership_and_negation() {
        assert!(matches(&sample(), &doc! { "a": { "$in": [1, 2, 3] } }).unwrap());
        assert!(matches(&sample(), &doc! { "a": { "$nin": [2, 3] } }).unwrap());
        assert!(matches(&sample(), &doc! { "a": { "$ne": 5 } }).unwrap());
        assert!(matches(&sample(), &doc! { "c": { "$not": { "$lt": 100 } } }).unwrap());
    }

    #[test]
    fn null_matches_absent_fields() {
        assert!(matches(&sample(), &doc! { "missing": null }).unwrap());
        assert!(!matches(&sample(), &doc! { "a": null }).unwrap());
    }

    #[test]
    fn array_fields_match_contained_scalars() {
        assert!(matches(&sample(), &doc! { "tags": "x" }).unwrap());
        assert!(!matches(&sample(), &doc! { "tags": "z" }).unwrap());
        assert!(matches(&sample(), &doc! { "tags": ["x", "y"] }).unwrap());
    }

    #[test]
    fn exists_and_regex() {
        assert!(matches(&sample(), &doc! { "a": { "$exists": true } }).unwrap());
        assert!(matches(&sample(), &doc! { "missing": { "$exists": false } }).unwrap());
        assert!(matches(&sample(), &doc! { "tags.0": { "$regex": "^x$" } }).unwrap());
        assert!(matches(&doc! { "s": "hello" }, &doc! { "s": { "$regex": "ell" } }).unwrap());
    }

    #[test]
    fn logical_operators() {
        let both = doc! { "$and": [ { "a": 1 }, { "b": 4 } ] };
        let either = doc! { "$or": [ { "a": 9 }, { "b": 4 } ] };
        let neither = doc! { "$nor": [ { "a": 9 }, { "b": 9 } ] };
        assert!(matches(&sample(), &both).unwrap());
        assert!(matches(&sample(), &either).unwrap());
        assert!(matches(&sample(), &neither).unwrap());
    }

    #[test]
    fn malformed_filters_error() {
        assert!(matches(&sample(), &doc! { "$unknown": 1 }).is_err());
        assert!(matches(&sample(), &doc! { "a": { "$frob": 1 } }).is_err());
        assert!(matches(&sample(), &doc! { "$and": "not-an-array" }).is_err());
        assert!(matches(&sample(), &doc! { "a": { "$exists": "yes" } }).is_err());
        assert!(matches(&sample(), &doc! { "tags.0": { "$regex": "(" } }).is_err());
    }
}
