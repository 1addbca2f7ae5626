//! In-memory transport backend for replidoc.
//!
//! This crate provides [`MemoryCluster`], a thread-safe stand-in for a
//! whole replica set that implements the core `Transport` seam. It stores
//! documents behind async-aware read-write locks, evaluates the same
//! compiled wire predicates a real store would receive, and supports fault
//! injection for exercising retry and stream-failure paths. Ideal for
//! development and testing.
//!
//! ```ignore
//! use replidoc_core::topology::NodeAddress;
//! use replidoc_memory::MemoryCluster;
//!
//! let cluster = MemoryCluster::builder()
//!     .primary(NodeAddress::new("db1", 27017))
//!     .secondary(NodeAddress::new("db2", 27017))
//!     .build();
//! ```

#[allow(unused_extern_crates)]
extern crate self as replidoc_memory;

mod apply;
mod evaluator;

pub mod cluster;

pub use cluster::{MemoryCluster, MemoryClusterBuilder, MemoryConnection};
