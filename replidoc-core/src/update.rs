//! Composable field mutations applied atomically to matched documents.
//!
//! An [`UpdateExpr`] is an ordered sequence of mutation operations combined
//! conjunctively: all of them apply to the same matched document set in one
//! atomic server-side operation. Two operations targeting the same field in
//! one expression are a caller error and are rejected at compile time with
//! [`ConflictingUpdate`](crate::error::ClientError::ConflictingUpdate), never
//! silently resolved.
//!
//! ```ignore
//! use replidoc_core::update::UpdateExpr;
//!
//! let update = UpdateExpr::new()
//!     .set("name", "A_mod")
//!     .inc("age", 22)
//!     .push("tags", "engineer");
//! ```
//!
//! Backend semantics, enforced wherever the expression is applied:
//!
//! - `inc` on an absent field starts from 0; on a non-numeric value it is a
//!   `TypeMismatch` error, never a coercion.
//! - `push` on an absent field creates a single-element array; on a
//!   non-array value it is a `TypeMismatch`.
//! - `pull` on an absent field is a no-op (zero elements removed); on a
//!   non-array value it is a `TypeMismatch`.
//! - `rename` on an absent field is a no-op.

use bson::Bson;
use std::collections::HashSet;

use crate::error::{ClientError, ClientResult};

/// One field mutation.
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateOp {
    /// Sets the field to the given value, creating it if absent.
    Set { field: String, value: Bson },
    /// Removes the field.
    Unset { field: String },
    /// Adds `delta` to a numeric field; absent fields start at 0.
    Inc { field: String, delta: Bson },
    /// Renames `from` to `to`, carrying the value.
    Rename { from: String, to: String },
    /// Appends the value to an array field, creating the array if absent.
    Push { field: String, value: Bson },
    /// Removes all elements equal to the value from an array field.
    Pull { field: String, value: Bson },
}

impl UpdateOp {
    /// Fields this operation touches. Rename touches both names.
    fn targets(&self) -> Vec<&str> {
        match self {
            UpdateOp::Set { field, .. }
            | UpdateOp::Unset { field }
            | UpdateOp::Inc { field, .. }
            | UpdateOp::Push { field, .. }
            | UpdateOp::Pull { field, .. } => vec![field],
            UpdateOp::Rename { from, to } => vec![from, to],
        }
    }
}

/// Ordered, conjunctive sequence of field mutations.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateExpr {
    ops: Vec<UpdateOp>,
}

impl UpdateExpr {
    pub fn new() -> Self {
        UpdateExpr::default()
    }

    pub fn ops(&self) -> &[UpdateOp] {
        &self.ops
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Sets a field to a value.
    pub fn set(mut self, field: impl Into<String>, value: impl Into<Bson>) -> Self {
        self.ops.push(UpdateOp::Set { field: field.into(), value: value.into() });
        self
    }

    /// Removes a field.
    pub fn unset(mut self, field: impl Into<String>) -> Self {
        self.ops.push(UpdateOp::Unset { field: field.into() });
        self
    }

    /// Increments a numeric field by `delta` (which may be negative).
    pub fn inc(mut self, field: impl Into<String>, delta: impl Into<Bson>) -> Self {
        self.ops.push(UpdateOp::Inc { field: field.into(), delta: delta.into() });
        self
    }

    /// Renames a field.
    pub fn rename(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.ops.push(UpdateOp::Rename { from: from.into(), to: to.into() });
        self
    }

    /// Appends a value to an array field.
    pub fn push(mut self, field: impl Into<String>, value: impl Into<Bson>) -> Self {
        self.ops.push(UpdateOp::Push { field: field.into(), value: value.into() });
        self
    }

    /// Removes all elements equal to `value` from an array field.
    pub fn pull(mut self, field: impl Into<String>, value: impl Into<Bson>) -> Self {
        self.ops.push(UpdateOp::Pull { field: field.into(), value: value.into() });
        self
    }

    /// Verifies that no two operations touch the same field.
    ///
    /// A rename counts for both its old and its new name, so
    /// `rename(a, b)` conflicts with any other operation on `a` or `b`.
    pub fn validate(&self) -> ClientResult<()> {
        if self.ops.is_empty() {
            return Err(ClientError::Configuration("update expression has no operations".into()));
        }
        let mut seen: HashSet<&str> = HashSet::new();
        for op in &self.ops {
            for target in op.targets() {
                if !seen.insert(target) {
                    return Err(ClientError::ConflictingUpdate(target.to_string()));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ops_keep_insertion_order() {
        let update = UpdateExpr::new().set("name", "A").inc("age", 1).unset("sex");
        let fields: Vec<_> = update.ops().iter().flat_map(|op| op.targets()).collect();

        assert_eq!(fields, vec!["name", "age", "sex"]);
    }

    #[test]
    fn duplicate_target_is_a_conflict() {
        let update = UpdateExpr::new().set("age", 30).inc("age", 1);

        match update.validate().unwrap_err() {
            ClientError::ConflictingUpdate(field) => assert_eq!(field, "age"),
            other => panic!("expected ConflictingUpdate, got {other:?}"),
        }
    }

    #[test]
    fn rename_conflicts_on_both_names() {
        let onto_set = UpdateExpr::new().set("b", 1).rename("a", "b");
        assert!(matches!(onto_set.validate(), Err(ClientError::ConflictingUpdate(_))));

        let from_set = UpdateExpr::new().set("a", 1).rename("a", "b");
        assert!(matches!(from_set.validate(), Err(ClientError::ConflictingUpdate(_))));
    }

    #[test]
    fn disjoint_ops_validate() {
        let update = UpdateExpr::new()
            .set("name", "A")
            .inc("age", 22)
            .rename("user_sex", "sex")
            .push("tags", "engineer");

        assert!(update.validate().is_ok());
    }

    #[test]
    fn empty_expression_is_rejected() {
        assert!(UpdateExpr::new().validate().is_err());
    }
}
