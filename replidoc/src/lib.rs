//! Replica-set-aware document store client.
//!
//! This crate is the primary entry point for users of replidoc. It
//! re-exports the core building blocks and the in-memory backend:
//!
//! - **Connection pooling** - Per-node pools with size and lifetime limits,
//!   transient-failure retry, and background sweeping
//! - **Read routing** - Deterministic node selection under the five read
//!   preferences; writes always go to the primary
//! - **Expression DSL** - Composable filter, sort, pagination, and update
//!   expressions compiled into wire operations
//! - **Lazy cursors** - Batched result streaming with clean interruption
//!   semantics
//!
//! # Quick Start
//!
//! ```ignore
//! use replidoc::prelude::*;
//! use replidoc::memory::MemoryCluster;
//! use bson::doc;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let cluster = MemoryCluster::builder()
//!         .primary(NodeAddress::new("db1", 27017))
//!         .secondary(NodeAddress::new("db2", 27017))
//!         .build();
//!
//!     let config = ClientConfig::new(cluster.topology())?;
//!     let pool = Arc::new(ConnectionPool::new(Arc::new(cluster), &config));
//!     let executor = QueryExecutor::new(Arc::clone(&pool), &config);
//!
//!     executor.insert("users", doc! { "name": "Alice", "age": 30 }).await?;
//!
//!     let query = Query::builder()
//!         .filter(Filter::gte("age", 18))
//!         .sort("age", SortDirection::Desc)
//!         .limit(10)
//!         .build()?;
//!     let users = executor.find("users", &query).await?.try_collect().await?;
//!     println!("matched {} users", users.len());
//!
//!     pool.close();
//!     Ok(())
//! }
//! ```

pub use replidoc_core::{
    config, error, executor, filter, pool, query, routing, topology, transport, update, wire,
};

/// The in-memory backend, for development and testing.
pub mod memory {
    pub use replidoc_memory::{MemoryCluster, MemoryClusterBuilder, MemoryConnection};
}

pub mod prelude;

pub use bson;
