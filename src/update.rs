//! Application of `$set` / `$unset` / `$inc` update documents.

use bson::{Bson, Document};

use crate::error::{Error, Result};
use crate::utils::{resolve_path, values_equal};

/// Applies `update` to `doc` in place. Returns whether anything changed.
///
/// Every top-level key of the update must be an operator; replacement-style
/// documents belong to `replace_one`, as the server also insists.
pub(crate) fn apply_update(doc: &mut Document, update: &Document) -> Result<bool> {
    validate(update)?;
    let mut changed = false;
    for (op, section) in update.iter() {
        let fields = section.as_document().ok_or_else(|| {
            Error::InvalidUpdate(format!("`{op}` requires a document operand"))
        })?;
        for (path, operand) in fields.iter() {
            changed |= match op.as_str() {
                "$set" => set_path(doc, path, operand.clone())?,
                "$unset" => unset_path(doc, path),
                "$inc" => increment_path(doc, path, operand)?,
                // validate() already rejected anything else
                _ => unreachable!(),
            };
        }
    }
    Ok(changed)
}

/// Rejects update documents with non-operator or unsupported top-level keys.
pub(crate) fn validate(update: &Document) -> Result<()> {
    for key in update.keys() {
        match key.as_str() {
            "$set" | "$unset" | "$inc" => {}
            other if other.starts_with('$') => {
                return Err(Error::InvalidUpdate(format!(
                    "unsupported update operator `{other}`"
                )))
            }
            other => {
                return Err(Error::InvalidUpdate(format!(
                    "top-level field `{other}` is not an update operator; \
                     use replace_one for whole-document replacement"
                )))
            }
        }
    }
    Ok(())
}

/// Builds the document an upsert inserts: the filter's literal equality
/// fields as the base, with the update applied on top.
pub(crate) fn synthesize_upsert(filter: &Document, update: &Document) -> Result<Document> {
    let mut doc = Document::new();
    for (key, condition) in filter.iter() {
        if key.starts_with('$') {
            continue;
        }
        let is_operator_doc = condition
            .as_document()
            .is_some_and(|d| d.keys().any(|k| k.starts_with('$')));
        if !is_operator_doc {
            set_path(&mut doc, key, condition.clone())?;
        }
    }
    apply_update(&mut doc, update)?;
    Ok(doc)
}

/// Writes `value` at a dotted path, creating intermediate documents.
pub(crate) fn set_path(doc: &mut Document, path: &str, value: Bson) -> Result<bool> {
    let mut segments: Vec<&str> = path.split('.').collect();
    let last = segments.pop().ok_or_else(|| {
        Error::InvalidUpdate("empty field path".into())
    })?;

    let mut current = doc;
    for segment in segments {
        if !matches!(current.get(segment), Some(Bson::Document(_))) {
            if current.contains_key(segment) {
                return Err(Error::InvalidUpdate(format!(
                    "cannot traverse non-document value at `{segment}` in path `{path}`"
                )));
            }
            current.insert(segment, Document::new());
        }
        current = match current.get_mut(segment) {
            Some(Bson::Document(nested)) => nested,
            _ => unreachable!(),
        };
    }

    let changed = !current
        .get(last)
        .is_some_and(|existing| values_equal(existing, &value));
    current.insert(last, value);
    Ok(changed)
}

/// Removes the value at a dotted path if present.
pub(crate) fn unset_path(doc: &mut Document, path: &str) -> bool {
    let Some((parent_path, last)) = split_parent(path) else {
        return false;
    };
    match parent_path {
        None => doc.remove(last).is_some(),
        Some(parent) => {
            // Walk to the parent without creating anything.
            let mut current = doc;
            for segment in parent.split('.') {
                current = match current.get_mut(segment) {
                    Some(Bson::Document(nested)) => nested,
                    _ => return false,
                };
            }
            current.remove(last).is_some()
        }
    }
}

fn increment_path(doc: &mut Document, path: &str, delta: &Bson) -> Result<bool> {
    let delta_value = match delta {
        Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_) => delta.clone(),
        _ => {
            return Err(Error::InvalidUpdate(format!(
                "`$inc` requires a numeric operand at `{path}`"
            )))
        }
    };
    let updated = match resolve_path(doc, path) {
        None => delta_value,
        Some(existing) => add_numeric(existing, &delta_value).ok_or_else(|| {
            Error::InvalidUpdate(format!(
                "`$inc` target `{path}` holds a non-numeric value"
            ))
        })?,
    };
    set_path(doc, path, updated)
}

fn add_numeric(a: &Bson, b: &Bson) -> Option<Bson> {
    match (a, b) {
        (Bson::Double(_), _) | (_, Bson::Double(_)) => {
            Some(Bson::Double(crate::utils::as_f64(a)? + crate::utils::as_f64(b)?))
        }
        (Bson::Int32(x), Bson::Int32(y)) => Some(Bson::Int32(x.wrapping_add(*y))),
        (Bson::Int32(x), Bson::Int64(y)) => Some(Bson::Int64(i64::from(*x).wrapping_add(*y))),
        (Bson::Int64(x), Bson::Int32(y)) => Some(Bson::Int64(x.wrapping_add(i64::from(*y)))),
        (Bson::Int64(x), Bson::Int64(y)) => Some(Bson::Int64(x.wrapping_add(*y))),
        _ => None,
    }
}

fn split_parent(path: &str) -> Option<(Option<&str>, &str)> {
    match path.rsplit_once('.') {
        Some((parent, last)) => Some((Some(parent), last)),
        None if path.is_empty() => None,
        None => Some((None, path)),
    }
}
