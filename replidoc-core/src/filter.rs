//! Composable filter predicate trees over document fields.
//!
//! # Filter Expression API
//!
//! The [`Filter`] struct provides a collection of static methods for building
//! filter expressions:
//!
//! - Comparison: `eq`, `ne`, `gt`, `gte`, `lt`, `lte`
//! - Membership: `is_in`, `not_in`, `all`
//! - Array length: `size`
//! - Logical: `and`, `or`
//!
//! Expressions can be combined using chainable methods for more complex
//! queries:
//!
//! ```ignore
//! use replidoc_core::filter::Filter;
//!
//! let expr = Filter::gte("age", 20).and(Filter::ne("name", "B"));
//! ```
//!
//! An `And` with zero children matches every document; an `Or` with zero
//! children matches none. Both are defined behavior, not accidents of the
//! compiler.

use bson::Bson;

use crate::error::ClientError;

/// Field comparison operators for filter leaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComparisonOp {
    /// Equal to (exact match).
    Eq,
    /// Not equal to.
    Ne,
    /// Greater than.
    Gt,
    /// Greater than or equal to.
    Gte,
    /// Less than.
    Lt,
    /// Less than or equal to.
    Lte,
}

/// Membership operators over an ordered sequence of candidate values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MembershipOp {
    /// Field equals, or field array contains, any of the values.
    In,
    /// Field matches none of the values.
    NotIn,
    /// Field array contains every one of the values, order irrelevant.
    All,
}

/// A filter expression for selecting documents.
///
/// Comparison, membership, and size checks are leaves; `And`/`Or` nest
/// losslessly to arbitrary depth.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterExpr {
    /// Field comparison leaf.
    Comparison {
        /// The field name to compare.
        field: String,
        /// The comparison operator.
        op: ComparisonOp,
        /// The value to compare against.
        value: Bson,
    },
    /// Membership leaf over an ordered sequence of values.
    Membership {
        field: String,
        op: MembershipOp,
        values: Vec<Bson>,
    },
    /// Matches documents whose array field has exactly `size` elements.
    SizeEquals { field: String, size: u32 },
    /// Logical AND of child expressions; empty matches everything.
    And(Vec<FilterExpr>),
    /// Logical OR of child expressions; empty matches nothing.
    Or(Vec<FilterExpr>),
}

impl FilterExpr {
    /// Creates a comparison leaf.
    pub fn comparison(field: String, op: ComparisonOp, value: Bson) -> Self {
        FilterExpr::Comparison { field, op, value }
    }

    /// Combines this expression with another using logical AND.
    ///
    /// If this expression is already an AND, the other expression is appended
    /// to the list. Otherwise, a new AND expression is created.
    pub fn and(self, other: FilterExpr) -> Self {
        match self {
            FilterExpr::And(mut list) => {
                list.push(other);
                FilterExpr::And(list)
            }
            _ => FilterExpr::And(vec![self, other]),
        }
    }

    /// Combines this expression with another using logical OR.
    ///
    /// If this expression is already an OR, the other expression is appended
    /// to the list. Otherwise, a new OR expression is created.
    pub fn or(self, other: FilterExpr) -> Self {
        match self {
            FilterExpr::Or(mut list) => {
                list.push(other);
                FilterExpr::Or(list)
            }
            _ => FilterExpr::Or(vec![self, other]),
        }
    }
}

/// Helper struct for constructing filter expressions.
///
/// Provides static methods to construct filter leaves in a type-safe manner.
/// All methods accept field names as `Into<String>` and values as
/// `Into<Bson>` for ergonomics.
pub struct Filter;

impl Filter {
    /// Matches documents where the field equals the specified value.
    pub fn eq(field: impl Into<String>, value: impl Into<Bson>) -> FilterExpr {
        FilterExpr::comparison(field.into(), ComparisonOp::Eq, value.into())
    }

    /// Matches documents where the field does not equal the specified value.
    pub fn ne(field: impl Into<String>, value: impl Into<Bson>) -> FilterExpr {
        FilterExpr::comparison(field.into(), ComparisonOp::Ne, value.into())
    }

    /// Matches documents where the field is greater than the specified value.
    pub fn gt(field: impl Into<String>, value: impl Into<Bson>) -> FilterExpr {
        FilterExpr::comparison(field.into(), ComparisonOp::Gt, value.into())
    }

    /// Matches documents where the field is greater than or equal to the
    /// specified value.
    pub fn gte(field: impl Into<String>, value: impl Into<Bson>) -> FilterExpr {
        FilterExpr::comparison(field.into(), ComparisonOp::Gte, value.into())
    }

    /// Matches documents where the field is less than the specified value.
    pub fn lt(field: impl Into<String>, value: impl Into<Bson>) -> FilterExpr {
        FilterExpr::comparison(field.into(), ComparisonOp::Lt, value.into())
    }

    /// Matches documents where the field is less than or equal to the
    /// specified value.
    pub fn lte(field: impl Into<String>, value: impl Into<Bson>) -> FilterExpr {
        FilterExpr::comparison(field.into(), ComparisonOp::Lte, value.into())
    }

    /// Matches documents where the field equals, or the field array contains,
    /// any of the specified values.
    pub fn is_in(
        field: impl Into<String>,
        values: impl IntoIterator<Item = impl Into<Bson>>,
    ) -> FilterExpr {
        FilterExpr::Membership {
            field: field.into(),
            op: MembershipOp::In,
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    /// Matches documents where the field matches none of the specified
    /// values.
    pub fn not_in(
        field: impl Into<String>,
        values: impl IntoIterator<Item = impl Into<Bson>>,
    ) -> FilterExpr {
        FilterExpr::Membership {
            field: field.into(),
            op: MembershipOp::NotIn,
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    /// Matches documents where the array field contains every one of the
    /// specified values, in any order.
    pub fn all(
        field: impl Into<String>,
        values: impl IntoIterator<Item = impl Into<Bson>>,
    ) -> FilterExpr {
        FilterExpr::Membership {
            field: field.into(),
            op: MembershipOp::All,
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    /// Matches documents whose array field has exactly `size` elements.
    pub fn size(field: impl Into<String>, size: u32) -> FilterExpr {
        FilterExpr::SizeEquals { field: field.into(), size }
    }

    /// Combines multiple expressions such that all must match. An empty
    /// iterator yields a filter matching every document.
    pub fn and(exprs: impl IntoIterator<Item = FilterExpr>) -> FilterExpr {
        FilterExpr::And(exprs.into_iter().collect())
    }

    /// Combines multiple expressions such that any can match. An empty
    /// iterator yields a filter matching no document.
    pub fn or(exprs: impl IntoIterator<Item = FilterExpr>) -> FilterExpr {
        FilterExpr::Or(exprs.into_iter().collect())
    }
}

/// Visitor over the filter grammar, used by wire compilers.
///
/// The grammar is closed; `visit_expr` dispatches each node to exactly one
/// method. Compilers that cannot express a node return
/// [`ClientError::UnsupportedExpression`] through their error type.
pub trait FilterVisitor {
    type Output;
    type Error: Into<ClientError>;

    fn visit_and(&mut self, exprs: &[FilterExpr]) -> Result<Self::Output, Self::Error>;
    fn visit_or(&mut self, exprs: &[FilterExpr]) -> Result<Self::Output, Self::Error>;
    fn visit_comparison(
        &mut self,
        field: &str,
        op: ComparisonOp,
        value: &Bson,
    ) -> Result<Self::Output, Self::Error>;
    fn visit_membership(
        &mut self,
        field: &str,
        op: MembershipOp,
        values: &[Bson],
    ) -> Result<Self::Output, Self::Error>;
    fn visit_size(&mut self, field: &str, size: u32) -> Result<Self::Output, Self::Error>;

    fn visit_expr(&mut self, expr: &FilterExpr) -> Result<Self::Output, Self::Error> {
        match expr {
            FilterExpr::And(exprs) => self.visit_and(exprs),
            FilterExpr::Or(exprs) => self.visit_or(exprs),
            FilterExpr::Comparison { field, op, value } => self.visit_comparison(field, *op, value),
            FilterExpr::Membership { field, op, values } => {
                self.visit_membership(field, *op, values)
            }
            FilterExpr::SizeEquals { field, size } => self.visit_size(field, *size),
        }
    }
}
