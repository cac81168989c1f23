//! In-memory execution of aggregation pipelines.
//!
//! Stages run in order over the snapshot taken when `aggregate` was
//! called. Supported stages: `$match`, `$group`, `$project`, `$sort`,
//! `$limit`, `$skip`, `$count`.

use std::cmp::Ordering;

use bson::{doc, Bson, Document};
use log::trace;

use crate::error::{Error, Result};
use crate::filter;
use crate::update::{set_path, unset_path};
use crate::utils::{as_f64, compare, is_numeric, resolve_path, values_equal};

pub(crate) fn run_pipeline(mut docs: Vec<Document>, stages: &[Document]) -> Result<Vec<Document>> {
    for stage_doc in stages {
        let mut entries = stage_doc.iter();
        let (name, spec) = match (entries.next(), entries.next()) {
            (Some(entry), None) => entry,
            _ => {
                return Err(Error::InvalidPipeline {
                    stage: format!("{stage_doc}"),
                    reason: "a stage must hold exactly one operator".into(),
                })
            }
        };
        trace!("running stage {} over {} documents", name, docs.len());
        docs = match name.as_str() {
            "$match" => run_match(docs, spec)?,
            "$group" => run_group(docs, spec)?,
            "$project" => run_project(docs, spec)?,
            "$sort" => {
                let spec = spec_document(name, spec)?;
                sort_documents(&mut docs, spec)?;
                docs
            }
            "$limit" => {
                let n = stage_cardinality(name, spec)?;
                docs.truncate(n);
                docs
            }
            "$skip" => {
                let n = stage_cardinality(name, spec)?;
                if n >= docs.len() {
                    Vec::new()
                } else {
                    docs.split_off(n)
                }
            }
            "$count" => {
                let field = spec.as_str().ok_or_else(|| invalid(name, "requires a field name"))?;
                let mut tally = Document::new();
                tally.insert(field, docs.len() as i64);
                vec![tally]
            }
            other => return Err(invalid(other, "unknown stage")),
        };
    }
    Ok(docs)
}

fn invalid(stage: &str, reason: &str) -> Error {
    Error::InvalidPipeline {
        stage: stage.to_string(),
        reason: reason.to_string(),
    }
}

fn spec_document<'a>(stage: &str, spec: &'a Bson) -> Result<&'a Document> {
    spec.as_document()
        .ok_or_else(|| invalid(stage, "requires a document specification"))
}

fn stage_cardinality(stage: &str, spec: &Bson) -> Result<usize> {
    let n = match spec {
        Bson::Int32(v) => i64::from(*v),
        Bson::Int64(v) => *v,
        _ => return Err(invalid(stage, "requires an integer operand")),
    };
    usize::try_from(n).map_err(|_| invalid(stage, "operand must be non-negative"))
}

fn run_match(docs: Vec<Document>, spec: &Bson) -> Result<Vec<Document>> {
    let filter_doc = spec_document("$match", spec)?;
    let mut kept = Vec::new();
    for doc in docs {
        if filter::matches(&doc, filter_doc)? {
            kept.push(doc);
        }
    }
    Ok(kept)
}

/// Stable multi-key sort; incomparable pairs keep their relative order.
pub(crate) fn sort_documents(docs: &mut [Document], spec: &Document) -> Result<()> {
    for (key, direction) in spec.iter() {
        if !matches!(
            direction,
            Bson::Int32(1 | -1) | Bson::Int64(1 | -1)
        ) {
            return Err(Error::InvalidFilter(format!(
                "sort direction for `{key}` must be 1 or -1"
            )));
        }
    }
    docs.sort_by(|a, b| {
        for (key, direction) in spec.iter() {
            let ascending = matches!(direction, Bson::Int32(1) | Bson::Int64(1));
            let left = resolve_path(a, key);
            let right = resolve_path(b, key);
            let order = match (left, right) {
                // Absent sorts before any present value, as the server does.
                (None, None) => Ordering::Equal,
                (None, Some(_)) => Ordering::Less,
                (Some(_), None) => Ordering::Greater,
                (Some(l), Some(r)) => compare(l, r).unwrap_or(Ordering::Equal),
            };
            let order = if ascending { order } else { order.reverse() };
            if order != Ordering::Equal {
                return order;
            }
        }
        Ordering::Equal
    });
    Ok(())
}

fn run_group(docs: Vec<Document>, spec: &Bson) -> Result<Vec<Document>> {
    let spec = spec_document("$group", spec)?;
    let id_expr = spec
        .get("_id")
        .ok_or_else(|| invalid("$group", "requires an `_id` key expression"))?;

    // Buckets keep first-seen order; keys are compared with query equality
    // since Bson is not hashable.
    let mut buckets: Vec<(Bson, Vec<Document>)> = Vec::new();
    for doc in docs {
        let key = eval(&doc, id_expr)?;
        match buckets.iter_mut().find(|(k, _)| values_equal(k, &key)) {
            Some((_, members)) => members.push(doc),
            None => buckets.push((key, vec![doc])),
        }
    }

    let mut output = Vec::with_capacity(buckets.len());
    for (key, members) in buckets {
        let mut grouped = doc! { "_id": key };
        for (field, accumulator) in spec.iter() {
            if field == "_id" {
                continue;
            }
            let accumulator = accumulator
                .as_document()
                .filter(|d| d.len() == 1)
                .ok_or_else(|| {
                    invalid("$group", "accumulators must be single-operator documents")
                })?;
            let (op, expr) = accumulator
                .iter()
                .next()
                .map(|(k, v)| (k.as_str(), v))
                .unwrap_or(("", &Bson::Null));
            let mut values = Vec::with_capacity(members.len());
            for member in &members {
                values.push(eval(member, expr)?);
            }
            grouped.insert(field.as_str(), finalize_accumulator(op, values)?);
        }
        output.push(grouped);
    }
    Ok(output)
}

fn finalize_accumulator(op: &str, values: Vec<Bson>) -> Result<Bson> {
    match op {
        "$sum" => Ok(sum_values(&values)),
        "$avg" => {
            let numerics: Vec<f64> = values.iter().filter_map(as_f64).collect();
            if numerics.is_empty() {
                Ok(Bson::Null)
            } else {
                Ok(Bson::Double(
                    numerics.iter().sum::<f64>() / numerics.len() as f64,
                ))
            }
        }
        "$min" => Ok(fold_extreme(values, Ordering::Less)),
        "$max" => Ok(fold_extreme(values, Ordering::Greater)),
        "$first" => Ok(values.into_iter().next().unwrap_or(Bson::Null)),
        "$last" => Ok(values.into_iter().next_back().unwrap_or(Bson::Null)),
        "$push" => Ok(Bson::Array(values)),
        other => Err(invalid("$group", &format!("unknown accumulator `{other}`"))),
    }
}

/// Sums numeric values, ignoring everything else. The result stays
/// integral unless a double participates.
fn sum_values(values: &[Bson]) -> Bson {
    let mut int_total: i64 = 0;
    let mut float_total: f64 = 0.0;
    let mut saw_double = false;
    for value in values {
        match value {
            Bson::Int32(v) => int_total = int_total.wrapping_add(i64::from(*v)),
            Bson::Int64(v) => int_total = int_total.wrapping_add(*v),
            Bson::Double(v) => {
                saw_double = true;
                float_total += v;
            }
            _ => {}
        }
    }
    if saw_double {
        Bson::Double(float_total + int_total as f64)
    } else {
        Bson::Int64(int_total)
    }
}

fn fold_extreme(values: Vec<Bson>, keep: Ordering) -> Bson {
    let mut best: Option<Bson> = None;
    for value in values {
        if matches!(value, Bson::Null) {
            continue;
        }
        best = match best {
            None => Some(value),
            Some(current) => match compare(&value, &current) {
                Some(order) if order == keep => Some(value),
                _ => Some(current),
            },
        };
    }
    best.unwrap_or(Bson::Null)
}

fn run_project(docs: Vec<Document>, spec: &Bson) -> Result<Vec<Document>> {
    let spec = spec_document("$project", spec)?;

    #[derive(Clone, Copy, PartialEq)]
    enum Mode {
        Include,
        Exclude,
    }

    let mut mode = None;
    for (key, value) in spec.iter() {
        let field_mode = match value {
            Bson::Int32(0) | Bson::Int64(0) | Bson::Boolean(false) => Mode::Exclude,
            _ => Mode::Include,
        };
        if key == "_id" {
            continue;
        }
        match mode {
            None => mode = Some(field_mode),
            Some(m) if m != field_mode => {
                return Err(invalid(
                    "$project",
                    "cannot mix inclusion and exclusion of fields",
                ))
            }
            Some(_) => {}
        }
    }
    let mode = mode.unwrap_or(Mode::Include);
    let id_excluded = matches!(
        spec.get("_id"),
        Some(Bson::Int32(0) | Bson::Int64(0) | Bson::Boolean(false))
    );

    let mut output = Vec::with_capacity(docs.len());
    for doc in docs {
        let projected = match mode {
            Mode::Exclude => {
                let mut kept = doc;
                for (key, _) in spec.iter() {
                    unset_path(&mut kept, key);
                }
                kept
            }
            Mode::Include => {
                let mut built = Document::new();
                if !id_excluded {
                    if let Some(id) = doc.get("_id") {
                        built.insert("_id", id.clone());
                    }
                }
                for (key, value) in spec.iter() {
                    if key == "_id" {
                        continue;
                    }
                    match value {
                        Bson::Int32(1) | Bson::Int64(1) | Bson::Boolean(true) => {
                            if let Some(found) = resolve_path(&doc, key) {
                                set_path(&mut built, key, found.clone())?;
                            }
                        }
                        expr => {
                            let computed = eval(&doc, expr)?;
                            set_path(&mut built, key, computed)?;
                        }
                    }
                }
                built
            }
        };
        output.push(projected);
    }
    Ok(output)
}

/// Evaluates an aggregation expression against one document.
///
/// `"$path"` strings resolve field paths (absent resolves to null),
/// single-key `$`-documents are operators, and everything else is a
/// literal, recursing into documents and arrays.
pub(crate) fn eval(doc: &Document, expr: &Bson) -> Result<Bson> {
    match expr {
        Bson::String(s) if s.starts_with('$') => {
            Ok(resolve_path(doc, &s[1..]).cloned().unwrap_or(Bson::Null))
        }
        Bson::Document(d) if d.len() == 1 && d.keys().next().is_some_and(|k| k.starts_with('$')) => {
            let (op, operand) = d.iter().next().map(|(k, v)| (k.as_str(), v)).unwrap_or(("", &Bson::Null));
            match op {
                "$literal" => Ok(operand.clone()),
                "$add" | "$subtract" | "$multiply" | "$divide" => arithmetic(doc, op, operand),
                other => Err(invalid(other, "unknown expression operator")),
            }
        }
        Bson::Document(d) => {
            let mut evaluated = Document::new();
            for (key, value) in d.iter() {
                evaluated.insert(key.as_str(), eval(doc, value)?);
            }
            Ok(Bson::Document(evaluated))
        }
        Bson::Array(items) => {
            let evaluated: Result<Vec<Bson>> = items.iter().map(|item| eval(doc, item)).collect();
            Ok(Bson::Array(evaluated?))
        }
        literal => Ok(literal.clone()),
    }
}

fn arithmetic(doc: &Document, op: &str, operand: &Bson) -> Result<Bson> {
    let args = operand
        .as_array()
        .ok_or_else(|| invalid(op, "requires an array of operands"))?;
    let mut operands = Vec::with_capacity(args.len());
    for arg in args {
        let value = eval(doc, arg)?;
        // Null operands make the whole expression null.
        if matches!(value, Bson::Null) {
            return Ok(Bson::Null);
        }
        if !is_numeric(&value) {
            return Err(invalid(op, "operands must be numeric"));
        }
        operands.push(value);
    }
    match op {
        "$add" => Ok(sum_values(&operands)),
        "$multiply" => {
            if operands.iter().any(|v| matches!(v, Bson::Double(_))) {
                let product = operands.iter().filter_map(as_f64).product::<f64>();
                Ok(Bson::Double(product))
            } else {
                let mut product: i64 = 1;
                for v in &operands {
                    match v {
                        Bson::Int32(x) => product = product.wrapping_mul(i64::from(*x)),
                        Bson::Int64(x) => product = product.wrapping_mul(*x),
                        _ => {}
                    }
                }
                Ok(Bson::Int64(product))
            }
        }
        "$subtract" | "$divide" => {
            let [a, b] = operands.as_slice() else {
                return Err(invalid(op, "requires exactly two operands"));
            };
            if op == "$divide" {
                let denominator = as_f64(b).unwrap_or(0.0);
                if denominator == 0.0 {
                    return Err(invalid(op, "division by zero"));
                }
                return Ok(Bson::Double(as_f64(a).unwrap_or(0.0) / denominator));
            }
            match (a, b) {
                (Bson::Double(_), _) | (_, Bson::Double(_)) => Ok(Bson::Double(
                    as_f64(a).unwrap_or(0.0) - as_f64(b).unwrap_or(0.0),
                )),
                _ => {
                    let x = match a {
                        Bson::Int32(v) => i64::from(*v),
                        Bson::Int64(v) => *v,
                        _ => 0,
                    };
                    let y = match b {
                        Bson::Int32(v) => i64::from(*v),
                        Bson::Int64(v) => *v,
                        _ => 0,
                    };
                    Ok(Bson::Int64(x.wrapping_sub(y)))
                }
            }
        }
        _ => unreachable!(),
    }
}

#[cfg(test)]
mod tests {
    use bson::bson;

    use super::*;

    fn rows() -> Vec<Document> {
        vec![
            doc! { "team": "red", "points": 3 },
            doc! { "team": "blue", "points": 5 },
            doc! { "team": "red", "points": 7 },
            doc! { "team": "blue", "points": 1.5 },
        ]
    }

    #[test]
    fn match_then_count() {
        let stages = vec![
            doc! { "$match": { "team": "red" } },
            doc! { "$count": "n" },
        ];
        let out = run_pipeline(rows(), &stages).unwrap();
        assert_eq!(out, vec![doc! { "n": 2_i64 }]);
    }

    #[test]
    fn group_accumulators() {
        let stages = vec![doc! { "$group": {
            "_id": "$team",
            "total": { "$sum": "$points" },
            "best": { "$max": "$points" },
            "avg": { "$avg": "$points" },
            "first": { "$first": "$points" },
            "all": { "$push": "$points" },
            "size": { "$sum": 1 },
        } }];
        let out = run_pipeline(rows(), &stages).unwrap();
        assert_eq!(out.len(), 2);

        let red = &out[0];
        assert_eq!(red.get_str("_id").unwrap(), "red");
        assert_eq!(red.get_i64("total").unwrap(), 10);
        assert_eq!(red.get_i32("best").unwrap(), 7);
        assert_eq!(red.get_f64("avg").unwrap(), 5.0);
        assert_eq!(red.get_i32("first").unwrap(), 3);
        assert_eq!(red.get_array("all").unwrap().len(), 2);
        assert_eq!(red.get_i64("size").unwrap(), 2);

        let blue = &out[1];
        // A double in the inputs promotes the sum.
        assert_eq!(blue.get_f64("total").unwrap(), 6.5);
    }

    #[test]
    fn project_inclusion_and_computation() {
        let docs = vec![doc! { "_id": 1, "a": 2, "b": 3, "c": 4 }];
        let stages = vec![doc! { "$project": {
            "a": 1,
            "total": { "$add": ["$a", "$b", "$c"] },
        } }];
        let out = run_pipeline(docs, &stages).unwrap();
        assert_eq!(out, vec![doc! { "_id": 1, "a": 2, "total": 9_i64 }]);
    }

    #[test]
    fn project_exclusion() {
        let docs = vec![doc! { "_id": 1, "a": 2, "b": 3 }];
        let stages = vec![doc! { "$project": { "b": 0 } }];
        let out = run_pipeline(docs, &stages).unwrap();
        assert_eq!(out, vec![doc! { "_id": 1, "a": 2 }]);
    }

    #[test]
    fn project_rejects_mixed_modes() {
        let stages = vec![doc! { "$project": { "a": 1, "b": 0 } }];
        assert!(run_pipeline(rows(), &stages).is_err());
    }

    #[test]
    fn sort_skip_limit() {
        let stages = vec![
            doc! { "$sort": { "points": -1 } },
            doc! { "$skip": 1 },
            doc! { "$limit": 2 },
        ];
        let out = run_pipeline(rows(), &stages).unwrap();
        let points: Vec<Bson> = out.iter().map(|d| d.get("points").unwrap().clone()).collect();
        assert_eq!(points, vec![bson!(5), bson!(3)]);
    }

    #[test]
    fn sort_is_stable_and_multi_key() {
        let mut docs = vec![
            doc! { "g": 1, "n": "b" },
            doc! { "g": 2, "n": "a" },
            doc! { "g": 1, "n": "a" },
        ];
        sort_documents(&mut docs, &doc! { "g": 1, "n": 1 }).unwrap();
        assert_eq!(docs[0].get_str("n").unwrap(), "a");
        assert_eq!(docs[0].get_i32("g").unwrap(), 1);
        assert_eq!(docs[2].get_i32("g").unwrap(), 2);
    }

    #[test]
    fn expression_null_propagation_and_literal() {
        let doc = doc! { "a": 1 };
        assert_eq!(eval(&doc, &bson!({ "$add": ["$a", "$missing"] })).unwrap(), Bson::Null);
        assert_eq!(eval(&doc, &bson!({ "$literal": "$a" })).unwrap(), bson!("$a"));
        assert_eq!(eval(&doc, &bson!({ "$subtract": [10, "$a"] })).unwrap(), bson!(9_i64));
        assert_eq!(eval(&doc, &bson!({ "$multiply": ["$a", 4] })).unwrap(), bson!(4_i64));
        assert_eq!(eval(&doc, &bson!({ "$divide": [9, 2] })).unwrap(), bson!(4.5));
        assert!(eval(&doc, &bson!({ "$divide": [1, 0] })).is_err());
    }

    #[test]
    fn malformed_stages_error() {
        assert!(run_pipeline(rows(), &[doc! { "$frobnicate": 1 }]).is_err());
        assert!(run_pipeline(rows(), &[doc! { "$group": { "x": { "$sum": "$a" } } }]).is_err());
        assert!(run_pipeline(rows(), &[doc! { "$limit": -1 }]).is_err());
        assert!(run_pipeline(rows(), &[doc! { "$match": 5 }]).is_err());
    }
}
