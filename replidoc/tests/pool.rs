mod common;

use std::sync::Arc;
use std::time::Duration;

use replidoc::prelude::*;

use common::{client, primary, two_node_cluster};

fn capped_config(cluster_topology: Topology, max_size: usize) -> ClientConfig {
    ClientConfig::new(cluster_topology)
        .unwrap()
        .with_pool(PoolConfig {
            min_size: 1,
            max_size,
            ..PoolConfig::default()
        })
        .unwrap()
        .with_timeouts(Timeouts {
            connect: Duration::from_millis(200),
            read: Duration::from_secs(1),
        })
}

#[tokio::test]
async fn acquire_blocks_at_capacity_until_a_release() {
    let cluster = two_node_cluster();
    let config = capped_config(cluster.topology(), 1);
    let (pool, _) = client(&cluster, &config);

    let first = pool.acquire(&primary()).await.unwrap();

    let waiter_pool = Arc::clone(&pool);
    let waiter = tokio::spawn(async move { waiter_pool.acquire(&primary()).await });
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!waiter.is_finished());

    pool.release(first);
    let second = waiter.await.unwrap().unwrap();
    pool.release(second);
    // The released handle was recycled, not replaced.
    assert_eq!(cluster.connect_attempts(), 1);
}

#[tokio::test]
async fn acquire_times_out_when_the_pool_stays_full() {
    let cluster = two_node_cluster();
    let config = capped_config(cluster.topology(), 1);
    let (pool, _) = client(&cluster, &config);

    let _held = pool.acquire(&primary()).await.unwrap();
    let err = pool.acquire(&primary()).await.unwrap_err();
    assert!(matches!(err, ClientError::PoolExhausted(_)));
}

#[tokio::test]
async fn closed_pool_rejects_acquires_and_destroys_released_handles() {
    let cluster = two_node_cluster();
    let config = capped_config(cluster.topology(), 2);
    let (pool, _) = client(&cluster, &config);

    let held = pool.acquire(&primary()).await.unwrap();
    pool.close();

    assert!(matches!(pool.acquire(&primary()).await.unwrap_err(), ClientError::PoolClosed));
    pool.release(held);
    assert_eq!(pool.idle_count(&primary()), 0);
}

#[tokio::test]
async fn transient_connect_failures_are_retried() {
    let cluster = two_node_cluster();
    let config = capped_config(cluster.topology(), 2);
    let (pool, _) = client(&cluster, &config);

    cluster.fail_next_connects(2);
    let handle = pool.acquire(&primary()).await.unwrap();
    assert_eq!(cluster.connect_attempts(), 3);
    pool.release(handle);
}

#[tokio::test]
async fn authentication_failures_are_not_retried() {
    let cluster = replidoc::memory::MemoryCluster::builder()
        .primary(primary())
        .credential(Credential::new("app", "app_db", "right"))
        .build();
    let config = ClientConfig::new(cluster.topology())
        .unwrap()
        .with_credential(Credential::new("app", "app_db", "wrong"));
    let (pool, _) = client(&cluster, &config);

    let err = pool.acquire(&primary()).await.unwrap_err();
    assert!(matches!(err, ClientError::AuthenticationFailed(_)));
    assert_eq!(cluster.connect_attempts(), 1);
}

#[tokio::test]
async fn matching_credential_authenticates() {
    let credential = Credential::new("app", "app_db", "hunter2");
    let cluster = replidoc::memory::MemoryCluster::builder()
        .primary(primary())
        .credential(credential.clone())
        .build();
    let config = ClientConfig::new(cluster.topology()).unwrap().with_credential(credential);
    let (pool, _) = client(&cluster, &config);

    let handle = pool.acquire(&primary()).await.unwrap();
    pool.release(handle);
    assert_eq!(pool.idle_count(&primary()), 1);
}

#[tokio::test]
async fn poisoned_handles_are_destroyed_on_release() {
    let cluster = two_node_cluster();
    let config = capped_config(cluster.topology(), 2);
    let (pool, _) = client(&cluster, &config);

    let mut handle = pool.acquire(&primary()).await.unwrap();
    handle.poison();
    pool.release(handle);

    assert_eq!(pool.idle_count(&primary()), 0);
    let replacement = pool.acquire(&primary()).await.unwrap();
    assert_eq!(cluster.connect_attempts(), 2);
    pool.release(replacement);
}

#[tokio::test]
async fn lifetime_expired_handles_are_destroyed_on_release() {
    let cluster = two_node_cluster();
    let config = ClientConfig::new(cluster.topology())
        .unwrap()
        .with_pool(PoolConfig { max_lifetime: Duration::ZERO, ..PoolConfig::default() })
        .unwrap();
    let (pool, _) = client(&cluster, &config);

    let handle = pool.acquire(&primary()).await.unwrap();
    pool.release(handle);
    assert_eq!(pool.idle_count(&primary()), 0);
}

#[tokio::test]
async fn sweep_keeps_min_size_idle_connections() {
    let cluster = two_node_cluster();
    let config = ClientConfig::new(cluster.topology())
        .unwrap()
        .with_pool(PoolConfig {
            min_size: 1,
            max_size: 2,
            max_idle_time: Duration::ZERO,
            max_lifetime: Duration::from_secs(600),
        })
        .unwrap();
    let (pool, _) = client(&cluster, &config);

    let first = pool.acquire(&primary()).await.unwrap();
    let second = pool.acquire(&primary()).await.unwrap();
    pool.release(first);
    pool.release(second);
    assert_eq!(pool.idle_count(&primary()), 2);

    // Idleness eviction stops at the floor; lifetime eviction would not.
    pool.sweep();
    assert_eq!(pool.idle_count(&primary()), 1);
}

#[tokio::test]
async fn dropping_a_handle_without_release_frees_capacity() {
    let cluster = two_node_cluster();
    let config = capped_config(cluster.topology(), 1);
    let (pool, _) = client(&cluster, &config);

    let handle = pool.acquire(&primary()).await.unwrap();
    drop(handle);

    // Capacity is back but the connection was destroyed, not recycled.
    let replacement = pool.acquire(&primary()).await.unwrap();
    assert_eq!(cluster.connect_attempts(), 2);
    pool.release(replacement);
}

#[tokio::test]
async fn per_node_capacity_is_independent() {
    let cluster = two_node_cluster();
    let config = capped_config(cluster.topology(), 1);
    let (pool, _) = client(&cluster, &config);

    let _first = pool.acquire(&primary()).await.unwrap();
    // The other node's pool still has capacity.
    let other = pool.acquire(&common::secondary()).await.unwrap();
    pool.release(other);
}
