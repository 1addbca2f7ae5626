//! Wire-predicate evaluation against in-memory documents.
//!
//! The cluster receives the same compiled predicate documents a real store
//! would, so evaluation happens on the wire form, not on the expression
//! trees that produced it.

use bson::{Bson, Document, datetime::DateTime};
use std::cmp::Ordering;

use replidoc_core::error::{ClientError, ClientResult};

/// Type-erased, comparable view of a BSON value.
///
/// Numeric types are normalized to f64 so `Int32(3)` and `Double(3.0)`
/// compare equal, matching how the predicates treat numbers.
#[derive(Debug)]
pub(crate) enum Comparable<'a> {
    Null,
    Bool(bool),
    Number(f64),
    DateTime(DateTime),
    String(&'a str),
    Array(Vec<Comparable<'a>>),
    Map(Vec<(&'a str, Comparable<'a>)>),
    Binary(&'a [u8]),
}

impl<'a> From<&'a Bson> for Comparable<'a> {
    fn from(bson: &'a Bson) -> Self {
        match bson {
            Bson::Null => Comparable::Null,
            Bson::Boolean(value) => Comparable::Bool(*value),
            Bson::Int32(value) => Comparable::Number(*value as f64),
            Bson::Int64(value) => Comparable::Number(*value as f64),
            Bson::Double(value) => Comparable::Number(*value),
            Bson::DateTime(value) => Comparable::DateTime(*value),
            Bson::String(value) => Comparable::String(value),
            Bson::Array(values) => Comparable::Array(values.iter().map(Comparable::from).collect()),
            Bson::Document(doc) => Comparable::Map(
                doc.iter().map(|(k, v)| (k.as_str(), Comparable::from(v))).collect(),
            ),
            Bson::Binary(binary) => Comparable::Binary(&binary.bytes),
            _ => Comparable::Null,
        }
    }
}

impl PartialEq for Comparable<'_> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Comparable::Null, Comparable::Null) => true,
            (Comparable::Bool(a), Comparable::Bool(b)) => a == b,
            (Comparable::Number(a), Comparable::Number(b)) => a == b,
            (Comparable::DateTime(a), Comparable::DateTime(b)) => a == b,
            (Comparable::String(a), Comparable::String(b)) => a == b,
            (Comparable::Array(a), Comparable::Array(b)) => a == b,
            (Comparable::Map(a), Comparable::Map(b)) => a == b,
            (Comparable::Binary(a), Comparable::Binary(b)) => a == b,
            _ => false,
        }
    }
}

impl PartialOrd for Comparable<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Comparable::Bool(a), Comparable::Bool(b)) => a.partial_cmp(b),
            (Comparable::Number(a), Comparable::Number(b)) => a.partial_cmp(b),
            (Comparable::DateTime(a), Comparable::DateTime(b)) => a.partial_cmp(b),
            (Comparable::String(a), Comparable::String(b)) => a.partial_cmp(b),
            _ => None,
        }
    }
}

/// Equality used by `$eq`, `$ne`, `$in`, `$nin`, and `$pull`.
pub(crate) fn values_equal(a: &Bson, b: &Bson) -> bool {
    Comparable::from(a) == Comparable::from(b)
}

/// Resolves a possibly dotted field path within a document.
pub(crate) fn lookup<'a>(doc: &'a Document, path: &str) -> Option<&'a Bson> {
    let mut segments = path.split('.');
    let mut current = doc.get(segments.next()?)?;
    for segment in segments {
        current = current.as_document()?.get(segment)?;
    }
    Some(current)
}

/// Decides whether `doc` satisfies a compiled wire predicate.
///
/// An empty predicate matches every document.
pub(crate) fn matches(predicate: &Document, doc: &Document) -> ClientResult<bool> {
    for (key, condition) in predicate {
        let satisfied = match key.as_str() {
            "$and" => {
                let branches = predicate_array(key, condition)?;
                let mut all = true;
                for branch in branches {
                    if !matches(branch, doc)? {
                        all = false;
                        break;
                    }
                }
                all
            }
            "$or" => {
                let branches = predicate_array(key, condition)?;
                let mut any = false;
                for branch in branches {
                    if matches(branch, doc)? {
                        any = true;
                        break;
                    }
                }
                any
            }
            "$nor" => {
                let branches = predicate_array(key, condition)?;
                let mut none = true;
                for branch in branches {
                    if matches(branch, doc)? {
                        none = false;
                        break;
                    }
                }
                none
            }
            field => {
                let operators = condition.as_document().ok_or_else(|| {
                    ClientError::Transport(format!("malformed condition on field '{field}'"))
                })?;
                field_matches(field, operators, doc)?
            }
        };
        if !satisfied {
            return Ok(false);
        }
    }
    Ok(true)
}

fn predicate_array<'p>(key: &str, condition: &'p Bson) -> ClientResult<Vec<&'p Document>> {
    condition
        .as_array()
        .map(|branches| branches.iter().filter_map(Bson::as_document).collect())
        .ok_or_else(|| ClientError::Transport(format!("malformed '{key}' predicate")))
}

fn operand_array<'p>(field: &str, operator: &str, operand: &'p Bson) -> ClientResult<&'p [Bson]> {
    operand.as_array().map(Vec::as_slice).ok_or_else(|| {
        ClientError::Transport(format!("malformed '{operator}' operand on field '{field}'"))
    })
}

fn field_matches(field: &str, operators: &Document, doc: &Document) -> ClientResult<bool> {
    let value = lookup(doc, field);
    for (operator, operand) in operators {
        let satisfied = match operator.as_str() {
            "$eq" => value.is_some_and(|v| eq_matches(v, operand)),
            "$ne" => !value.is_some_and(|v| eq_matches(v, operand)),
            "$gt" => compares(value, operand, |ord| ord == Ordering::Greater),
            "$gte" => compares(value, operand, |ord| ord != Ordering::Less),
            "$lt" => compares(value, operand, |ord| ord == Ordering::Less),
            "$lte" => compares(value, operand, |ord| ord != Ordering::Greater),
            "$in" => {
                let candidates = operand_array(field, operator, operand)?;
                value.is_some_and(|v| candidates.iter().any(|c| eq_matches(v, c)))
            }
            "$nin" => {
                let candidates = operand_array(field, operator, operand)?;
                !value.is_some_and(|v| candidates.iter().any(|c| eq_matches(v, c)))
            }
            "$all" => {
                let required = operand_array(field, operator, operand)?;
                match value {
                    Some(Bson::Array(elements)) => required
                        .iter()
                        .all(|r| elements.iter().any(|e| values_equal(e, r))),
                    _ => false,
                }
            }
            "$size" => match (value, operand) {
                (Some(Bson::Array(elements)), Bson::Int32(size)) => {
                    elements.len() == *size as usize
                }
                (Some(Bson::Array(elements)), Bson::Int64(size)) => {
                    elements.len() as i64 == *size
                }
                _ => false,
            },
            other => {
                return Err(ClientError::Transport(format!(
                    "unrecognized operator '{other}' on field '{field}'"
                )));
            }
        };
        if !satisfied {
            return Ok(false);
        }
    }
    Ok(true)
}

// Equality against an array field also matches any of its elements.
fn eq_matches(value: &Bson, operand: &Bson) -> bool {
    if values_equal(value, operand) {
        return true;
    }
    match value {
        Bson::Array(elements) => elements.iter().any(|e| values_equal(e, operand)),
        _ => false,
    }
}

fn compares(value: Option<&Bson>, operand: &Bson, accept: impl Fn(Ordering) -> bool) -> bool {
    value
        .and_then(|v| Comparable::from(v).partial_cmp(&Comparable::from(operand)))
        .is_some_and(accept)
}

/// Orders two documents under a compiled sort clause (field name mapped to
/// 1 or -1, in precedence order). Missing and incomparable fields compare
/// equal so the underlying sort stays stable.
pub(crate) fn order_by(sort: &Document, a: &Document, b: &Document) -> Ordering {
    for (field, direction) in sort {
        let ordering = match (lookup(a, field), lookup(b, field)) {
            (Some(left), Some(right)) => Comparable::from(left)
                .partial_cmp(&Comparable::from(right))
                .unwrap_or(Ordering::Equal),
            (Some(_), None) => Ordering::Greater,
            (None, Some(_)) => Ordering::Less,
            (None, None) => Ordering::Equal,
        };
        let descending = matches!(direction, Bson::Int32(-1) | Bson::Int64(-1));
        let ordering = if descending { ordering.reverse() } else { ordering };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn numbers_compare_across_bson_types() {
        assert!(values_equal(&Bson::Int32(3), &Bson::Double(3.0)));
        assert!(!values_equal(&Bson::Int32(3), &Bson::String("3".into())));
    }

    #[test]
    fn empty_predicate_matches_everything() {
        assert!(matches(&doc! {}, &doc! { "name": "A" }).unwrap());
    }

    #[test]
    fn nor_of_match_all_matches_nothing() {
        let predicate = doc! { "$nor": [ {} ] };
        assert!(!matches(&predicate, &doc! { "name": "A" }).unwrap());
        assert!(!matches(&predicate, &doc! {}).unwrap());
    }

    #[test]
    fn range_operators_respect_ordering() {
        let target = doc! { "age": 25 };
        assert!(matches(&doc! { "age": { "$gte": 20 } }, &target).unwrap());
        assert!(matches(&doc! { "age": { "$lt": 30 } }, &target).unwrap());
        assert!(!matches(&doc! { "age": { "$gt": 25 } }, &target).unwrap());
    }

    #[test]
    fn missing_field_fails_ranges_but_passes_ne() {
        let target = doc! { "name": "A" };
        assert!(!matches(&doc! { "age": { "$gte": 20 } }, &target).unwrap());
        assert!(matches(&doc! { "age": { "$ne": 20 } }, &target).unwrap());
        assert!(matches(&doc! { "age": { "$nin": [20, 30] } }, &target).unwrap());
    }

    #[test]
    fn membership_against_array_fields() {
        let target = doc! { "tags": ["rust", "db"] };
        assert!(matches(&doc! { "tags": { "$in": ["db", "x"] } }, &target).unwrap());
        assert!(matches(&doc! { "tags": { "$all": ["db", "rust"] } }, &target).unwrap());
        assert!(!matches(&doc! { "tags": { "$all": ["db", "go"] } }, &target).unwrap());
        assert!(matches(&doc! { "tags": { "$size": 2 } }, &target).unwrap());
    }

    #[test]
    fn dotted_paths_descend_into_subdocuments() {
        let target = doc! { "address": { "city": "Oslo" } };
        assert!(matches(&doc! { "address.city": { "$eq": "Oslo" } }, &target).unwrap());
        assert!(!matches(&doc! { "address.zip": { "$eq": "1234" } }, &target).unwrap());
    }

    #[test]
    fn sort_clause_orders_with_precedence() {
        let sort = doc! { "age": -1, "name": 1 };
        let a = doc! { "name": "A", "age": 30 };
        let b = doc! { "name": "B", "age": 30 };
        let c = doc! { "name": "C", "age": 18 };
        assert_eq!(order_by(&sort, &a, &b), Ordering::Less);
        assert_eq!(order_by(&sort, &c, &a), Ordering::Greater);
    }
}
