//! Compilation of expression trees into wire-level operations.
//!
//! The wire form is opaque to callers of this crate: it is produced only
//! here and consumed only by [`transport`](crate::transport)
//! implementations. Each expression node maps to exactly one documented
//! operator. Compilation is pure and deterministic: structurally identical
//! inputs always produce predicates selecting the identical document set.

use bson::{Bson, Document, Uuid, doc};

use crate::error::{ClientError, ClientResult};
use crate::filter::{ComparisonOp, FilterExpr, FilterVisitor, MembershipOp};
use crate::query::{PageSpec, SortDirection, SortSpec};
use crate::update::{UpdateExpr, UpdateOp};

/// A wire-level operation issued over one physical connection.
#[derive(Debug, Clone, PartialEq)]
pub enum WireOp {
    /// Opens a cursor over matching documents. Sort applies before
    /// skip/limit; `batch_size` caps each returned batch.
    Find {
        collection: String,
        filter: Document,
        sort: Document,
        skip: u64,
        limit: Option<u64>,
        batch_size: u32,
    },
    /// Fetches the next batch from an open cursor.
    GetMore { collection: String, cursor_id: i64, batch_size: u32 },
    /// Applies a compiled update document to every match.
    UpdateMany { collection: String, filter: Document, update: Document },
    /// Deletes every match.
    DeleteMany { collection: String, filter: Document },
    /// Inserts one document; the `_id` field must already be present.
    Insert { collection: String, document: Document },
    /// Counts matching documents.
    Count { collection: String, filter: Document },
    /// Lists collection names.
    ListCollections,
}

/// The result of one wire-level operation.
#[derive(Debug, Clone, PartialEq)]
pub enum WireReply {
    /// A batch of documents plus the cursor to continue from, if any.
    Cursor { batch: Vec<Document>, cursor_id: Option<i64> },
    /// Matched and modified counts of an update.
    Update { matched: u64, modified: u64 },
    /// Deleted count.
    Delete { deleted: u64 },
    /// Generated id of an inserted document.
    Insert { id: Uuid },
    /// Matching document count.
    Count(u64),
    /// Collection names.
    Collections(Vec<String>),
}

/// Compiles a filter expression tree into a wire predicate.
///
/// `And` with zero children compiles to the match-all predicate; `Or` with
/// zero children compiles to a match-none predicate. Equivalent expressions
/// may differ in wire text while selecting the same documents; callers must
/// never compare wire forms for equality.
pub fn compile_filter(expr: &FilterExpr) -> ClientResult<Document> {
    WirePredicateCompiler.visit_expr(expr)
}

/// Compiles an optional filter, treating `None` as match-all.
pub fn compile_optional_filter(expr: Option<&FilterExpr>) -> ClientResult<Document> {
    match expr {
        Some(expr) => compile_filter(expr),
        None => Ok(doc! {}),
    }
}

/// Compiles a sort specification into an ordered wire sort clause. Key order
/// in the output preserves tie-break precedence; an empty spec compiles to an
/// empty clause, leaving document order unspecified.
pub fn compile_sort(sort: &SortSpec) -> Document {
    let mut clause = Document::new();
    for key in sort {
        clause.insert(
            key.field.clone(),
            match key.direction {
                SortDirection::Asc => 1,
                SortDirection::Desc => -1,
            },
        );
    }
    clause
}

/// Compiles a validated update expression into a wire update document,
/// grouping operations by operator.
pub fn compile_update(update: &UpdateExpr) -> ClientResult<Document> {
    update.validate()?;

    let mut set = Document::new();
    let mut unset = Document::new();
    let mut inc = Document::new();
    let mut rename = Document::new();
    let mut push = Document::new();
    let mut pull = Document::new();

    for op in update.ops() {
        match op {
            UpdateOp::Set { field, value } => {
                set.insert(field.clone(), value.clone());
            }
            UpdateOp::Unset { field } => {
                unset.insert(field.clone(), Bson::Int32(1));
            }
            UpdateOp::Inc { field, delta } => {
                if !matches!(delta, Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_)) {
                    return Err(ClientError::TypeMismatch(
                        field.clone(),
                        "increment delta must be numeric".into(),
                    ));
                }
                inc.insert(field.clone(), delta.clone());
            }
            UpdateOp::Rename { from, to } => {
                rename.insert(from.clone(), Bson::String(to.clone()));
            }
            UpdateOp::Push { field, value } => {
                push.insert(field.clone(), value.clone());
            }
            UpdateOp::Pull { field, value } => {
                pull.insert(field.clone(), value.clone());
            }
        }
    }

    let mut compiled = Document::new();
    for (operator, group) in [
        ("$set", set),
        ("$unset", unset),
        ("$inc", inc),
        ("$rename", rename),
        ("$push", push),
        ("$pull", pull),
    ] {
        if !group.is_empty() {
            compiled.insert(operator, group);
        }
    }
    Ok(compiled)
}

/// Builds the find operation for a compiled query.
pub fn find_op(
    collection: &str,
    filter: Document,
    sort: Document,
    page: &PageSpec,
    batch_size: u32,
) -> WireOp {
    WireOp::Find {
        collection: collection.to_string(),
        filter,
        sort,
        skip: page.offset,
        limit: page.limit,
        batch_size,
    }
}

/// Translates filter expressions into wire predicate documents.
struct WirePredicateCompiler;

impl FilterVisitor for WirePredicateCompiler {
    type Output = Document;
    type Error = ClientError;

    fn visit_and(&mut self, exprs: &[FilterExpr]) -> Result<Self::Output, Self::Error> {
        if exprs.is_empty() {
            // And of nothing matches everything.
            return Ok(doc! {});
        }
        Ok(doc! {
            "$and": exprs
                .iter()
                .map(|expr| self.visit_expr(expr))
                .collect::<Result<Vec<_>, _>>()?,
        })
    }

    fn visit_or(&mut self, exprs: &[FilterExpr]) -> Result<Self::Output, Self::Error> {
        if exprs.is_empty() {
            // Or of nothing matches nothing: negate the match-all predicate.
            return Ok(doc! { "$nor": [ {} ] });
        }
        Ok(doc! {
            "$or": exprs
                .iter()
                .map(|expr| self.visit_expr(expr))
                .collect::<Result<Vec<_>, _>>()?,
        })
    }

    fn visit_comparison(
        &mut self,
        field: &str,
        op: ComparisonOp,
        value: &Bson,
    ) -> Result<Self::Output, Self::Error> {
        if matches!(value, Bson::Undefined) {
            return Err(ClientError::UnsupportedExpression(format!(
                "comparison on field '{field}' against an undefined value"
            )));
        }
        Ok(doc! {
            field: match op {
                ComparisonOp::Eq => doc! { "$eq": value },
                ComparisonOp::Ne => doc! { "$ne": value },
                ComparisonOp::Gt => doc! { "$gt": value },
                ComparisonOp::Gte => doc! { "$gte": value },
                ComparisonOp::Lt => doc! { "$lt": value },
                ComparisonOp::Lte => doc! { "$lte": value },
            }
        })
    }

    fn visit_membership(
        &mut self,
        field: &str,
        op: MembershipOp,
        values: &[Bson],
    ) -> Result<Self::Output, Self::Error> {
        let values = values.to_vec();
        Ok(doc! {
            field: match op {
                MembershipOp::In => doc! { "$in": values },
                MembershipOp::NotIn => doc! { "$nin": values },
                MembershipOp::All => doc! { "$all": values },
            }
        })
    }

    fn visit_size(&mut self, field: &str, size: u32) -> Result<Self::Output, Self::Error> {
        Ok(doc! { field: { "$size": size as i32 } })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::Filter;
    use crate::query::SortKey;

    #[test]
    fn compilation_is_deterministic() {
        let expr = Filter::and(vec![
            Filter::gte("age", 20),
            Filter::ne("name", "B"),
            Filter::is_in("tags", ["a", "b"]),
        ]);

        assert_eq!(compile_filter(&expr).unwrap(), compile_filter(&expr.clone()).unwrap());
    }

    #[test]
    fn empty_and_compiles_to_match_all() {
        assert_eq!(compile_filter(&Filter::and(vec![])).unwrap(), doc! {});
    }

    #[test]
    fn nested_logic_compiles_losslessly() {
        let expr = Filter::or(vec![
            Filter::eq("name", "A"),
            Filter::and(vec![Filter::gt("age", 20), Filter::size("tags", 2)]),
        ]);

        let compiled = compile_filter(&expr).unwrap();
        let branches = compiled.get_array("$or").unwrap();
        assert_eq!(branches.len(), 2);
    }

    #[test]
    fn sort_clause_preserves_precedence() {
        let clause = compile_sort(&vec![
            SortKey { field: "name".into(), direction: SortDirection::Asc },
            SortKey { field: "age".into(), direction: SortDirection::Desc },
        ]);

        let keys: Vec<_> = clause.keys().collect();
        assert_eq!(keys, vec!["name", "age"]);
        assert_eq!(clause.get_i32("age").unwrap(), -1);
    }

    #[test]
    fn update_groups_by_operator() {
        let update = UpdateExpr::new()
            .set("name", "A_mod")
            .inc("age", 22)
            .push("tags", "engineer")
            .unset("sex")
            .rename("user_sex", "gender");

        let compiled = compile_update(&update).unwrap();
        assert_eq!(compiled.get_document("$set").unwrap().get_str("name").unwrap(), "A_mod");
        assert_eq!(compiled.get_document("$inc").unwrap().get_i32("age").unwrap(), 22);
        assert_eq!(
            compiled.get_document("$rename").unwrap().get_str("user_sex").unwrap(),
            "gender"
        );
        assert!(compiled.get_document("$unset").unwrap().contains_key("sex"));
        assert!(compiled.get_document("$push").unwrap().contains_key("tags"));
        assert!(!compiled.contains_key("$pull"));
    }

    #[test]
    fn conflicting_update_fails_compilation() {
        let update = UpdateExpr::new().set("age", 1).inc("age", 1);
        assert!(matches!(compile_update(&update), Err(ClientError::ConflictingUpdate(_))));
    }

    #[test]
    fn non_numeric_inc_delta_is_rejected() {
        let update = UpdateExpr::new().inc("age", "five");
        assert!(matches!(compile_update(&update), Err(ClientError::TypeMismatch(_, _))));
    }
}
