//! Convenient re-exports of commonly used types.
//!
//! ```ignore
//! use replidoc::prelude::*;
//! ```

pub use replidoc_core::{
    config::{ClientConfig, Credential, PoolConfig, ReadPreference, Timeouts},
    error::{ClientError, ClientResult},
    executor::{DocumentCursor, QueryExecutor, UpdateOutcome},
    filter::{Filter, FilterExpr, FilterVisitor},
    pool::{ConnectionHandle, ConnectionPool},
    query::{PageSpec, Query, QueryBuilder, SortDirection, SortKey, SortSpec},
    topology::{NodeAddress, NodeRole, RoleMap, Topology},
    transport::{PhysicalConnection, Transport},
    update::{UpdateExpr, UpdateOp},
};
