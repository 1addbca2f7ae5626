#![allow(dead_code)]

use std::sync::Arc;

use bson::doc;
use replidoc::memory::MemoryCluster;
use replidoc::prelude::*;

pub fn primary() -> NodeAddress {
    NodeAddress::new("db1", 27017)
}

pub fn secondary() -> NodeAddress {
    NodeAddress::new("db2", 27017)
}

pub fn two_node_cluster() -> MemoryCluster {
    MemoryCluster::builder()
        .primary(primary())
        .secondary(secondary())
        .build()
}

pub fn client(
    cluster: &MemoryCluster,
    config: &ClientConfig,
) -> (Arc<ConnectionPool<MemoryCluster>>, QueryExecutor<MemoryCluster>) {
    let pool = Arc::new(ConnectionPool::new(Arc::new(cluster.clone()), config));
    let executor = QueryExecutor::new(Arc::clone(&pool), config);
    (pool, executor)
}

pub async fn seed_users(cluster: &MemoryCluster) {
    cluster
        .seed(
            "users",
            [
                doc! { "name": "A", "age": 18, "tags": ["junior"] },
                doc! { "name": "B", "age": 25, "tags": ["mid", "oncall"] },
                doc! { "name": "C", "age": 30, "tags": ["senior", "oncall"] },
            ],
        )
        .await;
}
