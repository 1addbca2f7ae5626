//! Client-side access layer for a replica-set of document store nodes.
//!
//! This crate is the core of the replidoc project and provides:
//!
//! - **Topology description** ([`topology`]) - Node addresses, replica-set roles
//! - **Configuration** ([`config`]) - Immutable, validated client/pool/credential settings
//! - **Filter expressions** ([`filter`]) - Composable predicate trees over document fields
//! - **Queries** ([`query`]) - Sort specifications, pagination, and query construction
//! - **Update expressions** ([`update`]) - Composable field mutations with conflict validation
//! - **Wire compilation** ([`wire`]) - Translation of expression trees to wire operations
//! - **Transport seam** ([`transport`]) - Narrow interface to the underlying driver
//! - **Connection pooling** ([`pool`]) - Bounded, lifetime-aware connection management
//! - **Read routing** ([`routing`]) - Read-preference based node selection
//! - **Query execution** ([`executor`]) - find / update-many / delete-many / insert
//! - **Error handling** ([`error`]) - Typed error taxonomy and result alias
//!
//! # Example
//!
//! ```ignore
//! use replidoc_core::{
//!     config::ClientConfig,
//!     executor::QueryExecutor,
//!     filter::Filter,
//!     pool::ConnectionPool,
//!     query::{Query, SortDirection},
//! };
//! use std::sync::Arc;
//!
//! let pool = Arc::new(ConnectionPool::new(transport, &config));
//! let executor = QueryExecutor::new(pool, &config);
//!
//! let query = Query::builder()
//!     .filter(Filter::gte("age", 20).and(Filter::ne("name", "B")))
//!     .sort("age", SortDirection::Desc)
//!     .limit(10)
//!     .build()?;
//! let mut cursor = executor.find("users", &query).await?;
//!
//! while let Some(doc) = cursor.next().await {
//!     println!("{:?}", doc?);
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as replidoc_core;

pub mod config;
pub mod error;
pub mod executor;
pub mod filter;
pub mod pool;
pub mod query;
pub mod routing;
pub mod topology;
pub mod transport;
pub mod update;
pub mod wire;
