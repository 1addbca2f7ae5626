//! Query construction: sort order, pagination, and the fluent builder.
//!
//! ```ignore
//! use replidoc_core::{filter::Filter, query::{Query, SortDirection}};
//!
//! let query = Query::builder()
//!     .filter(Filter::gte("age", 20))
//!     .sort("age", SortDirection::Desc)
//!     .sort("name", SortDirection::Asc)
//!     .offset(0)
//!     .limit(10)
//!     .build()?;
//! ```

use crate::error::{ClientError, ClientResult};
use crate::filter::FilterExpr;

/// Sort direction for query results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    /// Ascending order (A to Z, 0 to 9, earliest to latest).
    Asc,
    /// Descending order (Z to A, 9 to 0, latest to earliest).
    Desc,
}

/// One sort key: a field name and a direction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    /// The field name to sort by.
    pub field: String,
    /// The sort direction.
    pub direction: SortDirection,
}

/// Ordered list of sort keys. Sequence order determines tie-break precedence:
/// the first entry is the primary sort key.
///
/// An empty spec means "unspecified order": the store returns documents in
/// whatever order it likes and no determinism is guaranteed. It is never
/// silently defaulted to any particular field.
pub type SortSpec = Vec<SortKey>;

/// Offset and limit, applied after sorting, never before.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageSpec {
    /// Number of documents to skip.
    pub offset: u64,
    /// Maximum number of documents to return; `None` means unbounded.
    pub limit: Option<u64>,
}

impl PageSpec {
    /// An unbounded page starting at the first document.
    pub fn unbounded() -> Self {
        Self { offset: 0, limit: None }
    }

    pub fn new(offset: u64, limit: u64) -> ClientResult<Self> {
        if limit == 0 {
            return Err(ClientError::Configuration("page limit must be greater than zero".into()));
        }
        Ok(Self { offset, limit: Some(limit) })
    }
}

impl Default for PageSpec {
    fn default() -> Self {
        Self::unbounded()
    }
}

/// A structured query: filter, sort order, and pagination.
///
/// Use [`Query::builder`] for ergonomic construction.
#[derive(Debug, Clone, Default)]
pub struct Query {
    /// Optional filter expression to match documents. `None` matches all.
    pub filter: Option<FilterExpr>,
    /// Sort keys in precedence order.
    pub sort: SortSpec,
    /// Offset and limit.
    pub page: PageSpec,
}

impl Query {
    /// Creates a new empty query: no filter, unspecified order, unbounded.
    pub fn new() -> Self {
        Query::default()
    }

    /// Creates a new query builder for fluent construction.
    pub fn builder() -> QueryBuilder {
        QueryBuilder::new()
    }
}

#[derive(Debug, Clone, Default)]
pub struct QueryBuilder {
    filter: Option<FilterExpr>,
    sort: SortSpec,
    offset: u64,
    limit: Option<u64>,
}

impl QueryBuilder {
    pub fn new() -> Self {
        QueryBuilder::default()
    }

    /// Sets the filter expression for this query.
    pub fn filter(mut self, filter: FilterExpr) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Appends a sort key. Keys added earlier take precedence.
    pub fn sort(mut self, field: impl Into<String>, direction: SortDirection) -> Self {
        self.sort.push(SortKey { field: field.into(), direction });
        self
    }

    /// Sets the number of documents to skip.
    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = offset;
        self
    }

    /// Sets the maximum number of documents to return. Must be greater than
    /// zero; leave unset for an unbounded query.
    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Builds and returns the final query, validating the page spec.
    pub fn build(self) -> ClientResult<Query> {
        let page = match self.limit {
            Some(limit) => PageSpec::new(self.offset, limit)?,
            None => PageSpec { offset: self.offset, limit: None },
        };
        Ok(Query { filter: self.filter, sort: self.sort, page })
    }
}
