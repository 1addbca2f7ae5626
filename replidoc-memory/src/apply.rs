//! Application of compiled wire update documents.
//!
//! Each document is updated atomically: every operator runs against a
//! scratch copy, and the copy replaces the original only when all operators
//! succeed. A type mismatch therefore leaves the document untouched.

use bson::{Bson, Document};

use replidoc_core::error::{ClientError, ClientResult};

use crate::evaluator::values_equal;

/// Applies a compiled update to one document.
///
/// Returns the updated document when any field actually changed, or `None`
/// for a clean no-op (for example a set to the already-present value).
pub(crate) fn apply_update(doc: &Document, update: &Document) -> ClientResult<Option<Document>> {
    let mut scratch = doc.clone();

    for (operator, group) in update {
        let group = group.as_document().ok_or_else(|| {
            ClientError::Transport(format!("malformed '{operator}' update group"))
        })?;
        match operator.as_str() {
            "$set" => {
                for (field, value) in group {
                    scratch.insert(field.clone(), value.clone());
                }
            }
            "$unset" => {
                for (field, _) in group {
                    scratch.remove(field);
                }
            }
            "$inc" => {
                for (field, delta) in group {
                    let sum = add_numeric(field, scratch.get(field), delta)?;
                    scratch.insert(field.clone(), sum);
                }
            }
            "$rename" => {
                for (from, to) in group {
                    let to = to.as_str().ok_or_else(|| {
                        ClientError::Transport(format!("malformed rename target for '{from}'"))
                    })?;
                    // Renaming an absent field is a no-op.
                    if let Some(value) = scratch.remove(from) {
                        scratch.insert(to.to_string(), value);
                    }
                }
            }
            "$push" => {
                for (field, value) in group {
                    match scratch.get_mut(field) {
                        Some(Bson::Array(elements)) => elements.push(value.clone()),
                        Some(_) => {
                            return Err(ClientError::TypeMismatch(
                                field.clone(),
                                "cannot push to a non-array field".into(),
                            ));
                        }
                        None => {
                            scratch.insert(field.clone(), Bson::Array(vec![value.clone()]));
                        }
                    }
                }
            }
            "$pull" => {
                for (field, value) in group {
                    match scratch.get_mut(field) {
                        Some(Bson::Array(elements)) => {
                            elements.retain(|element| !values_equal(element, value));
                        }
                        Some(_) => {
                            return Err(ClientError::TypeMismatch(
                                field.clone(),
                                "cannot pull from a non-array field".into(),
                            ));
                        }
                        // Pulling from an absent field is a no-op.
                        None => {}
                    }
                }
            }
            other => {
                return Err(ClientError::Transport(format!(
                    "unrecognized update operator '{other}'"
                )));
            }
        }
    }

    if &scratch == doc { Ok(None) } else { Ok(Some(scratch)) }
}

// An absent field increments from zero; integer sums stay integral and any
// double operand promotes the sum to a double.
fn add_numeric(field: &str, current: Option<&Bson>, delta: &Bson) -> ClientResult<Bson> {
    let current = current.cloned().unwrap_or(match delta {
        Bson::Double(_) => Bson::Double(0.0),
        _ => Bson::Int64(0),
    });
    match (&current, delta) {
        (Bson::Int32(a), Bson::Int32(b)) => Ok(Bson::Int32(a + b)),
        (Bson::Int32(a), Bson::Int64(b)) => Ok(Bson::Int64(*a as i64 + b)),
        (Bson::Int64(a), Bson::Int32(b)) => Ok(Bson::Int64(a + *b as i64)),
        (Bson::Int64(a), Bson::Int64(b)) => Ok(Bson::Int64(a + b)),
        (Bson::Double(a), Bson::Int32(b)) => Ok(Bson::Double(a + *b as f64)),
        (Bson::Double(a), Bson::Int64(b)) => Ok(Bson::Double(a + *b as f64)),
        (Bson::Int32(a), Bson::Double(b)) => Ok(Bson::Double(*a as f64 + b)),
        (Bson::Int64(a), Bson::Double(b)) => Ok(Bson::Double(*a as f64 + b)),
        (Bson::Double(a), Bson::Double(b)) => Ok(Bson::Double(a + b)),
        _ => Err(ClientError::TypeMismatch(
            field.to_string(),
            "cannot increment a non-numeric field".into(),
        )),
    }
}
