mod common;

use bson::doc;
use futures::StreamExt;
use replidoc::memory::MemoryCluster;
use replidoc::prelude::*;

use common::{client, primary};

fn batched_cluster() -> MemoryCluster {
    MemoryCluster::builder().primary(primary()).batch_size(2).build()
}

async fn seed_numbered(cluster: &MemoryCluster, count: i32) {
    cluster
        .seed("events", (0..count).map(|n| doc! { "n": n }))
        .await;
}

fn ordered_query() -> Query {
    Query::builder().sort("n", SortDirection::Asc).build().unwrap()
}

#[tokio::test]
async fn cursor_fetches_batches_lazily_until_exhaustion() {
    let cluster = batched_cluster();
    seed_numbered(&cluster, 5).await;
    let config = ClientConfig::new(cluster.topology()).unwrap();
    let (pool, executor) = client(&cluster, &config);

    let mut cursor = executor.find("events", &ordered_query()).await.unwrap();
    let mut seen = Vec::new();
    while let Some(item) = cursor.next().await {
        seen.push(item.unwrap().get_i32("n").unwrap());
    }
    assert_eq!(seen, vec![0, 1, 2, 3, 4]);

    // Exhaustion returned the connection to the pool.
    assert_eq!(pool.idle_count(&primary()), 1);
    pool.close();
}

#[tokio::test]
async fn interrupted_stream_keeps_already_yielded_documents() {
    let cluster = batched_cluster();
    seed_numbered(&cluster, 6).await;
    let config = ClientConfig::new(cluster.topology()).unwrap();
    let (pool, executor) = client(&cluster, &config);

    let mut cursor = executor.find("events", &ordered_query()).await.unwrap();
    // First batch arrives with the find itself.
    let first = cursor.next().await.unwrap().unwrap();
    let second = cursor.next().await.unwrap().unwrap();
    assert_eq!((first.get_i32("n").unwrap(), second.get_i32("n").unwrap()), (0, 1));

    cluster.fail_next_get_mores(1);
    let err = cursor.next().await.unwrap().unwrap_err();
    assert!(matches!(err, ClientError::StreamInterrupted(_)));

    // The cursor is finished and its connection was destroyed, not pooled.
    assert!(cursor.next().await.is_none());
    assert_eq!(pool.idle_count(&primary()), 0);
    pool.close();
}

#[tokio::test]
async fn into_stream_adapts_the_cursor() {
    let cluster = batched_cluster();
    seed_numbered(&cluster, 4).await;
    let config = ClientConfig::new(cluster.topology()).unwrap();
    let (pool, executor) = client(&cluster, &config);

    let stream = executor.find("events", &ordered_query()).await.unwrap().into_stream();
    let collected: Vec<i32> = stream
        .map(|item| item.unwrap().get_i32("n").unwrap())
        .collect()
        .await;
    assert_eq!(collected, vec![0, 1, 2, 3]);
    pool.close();
}

#[tokio::test]
async fn dropping_a_cursor_mid_stream_destroys_its_connection() {
    let cluster = batched_cluster();
    seed_numbered(&cluster, 6).await;
    let config = ClientConfig::new(cluster.topology()).unwrap();
    let (pool, executor) = client(&cluster, &config);

    let cursor = executor.find("events", &ordered_query()).await.unwrap();
    drop(cursor);

    assert_eq!(pool.idle_count(&primary()), 0);
    let attempts = cluster.connect_attempts();
    let replacement = executor.find("events", &ordered_query()).await.unwrap();
    assert_eq!(cluster.connect_attempts(), attempts + 1);
    drop(replacement);
    pool.close();
}

#[tokio::test]
async fn limit_truncates_across_batches() {
    let cluster = batched_cluster();
    seed_numbered(&cluster, 10).await;
    let config = ClientConfig::new(cluster.topology()).unwrap();
    let (pool, executor) = client(&cluster, &config);

    let query = Query::builder()
        .sort("n", SortDirection::Asc)
        .offset(2)
        .limit(5)
        .build()
        .unwrap();
    let documents = executor.find("events", &query).await.unwrap().try_collect().await.unwrap();

    let seen: Vec<i32> = documents.iter().map(|d| d.get_i32("n").unwrap()).collect();
    assert_eq!(seen, vec![2, 3, 4, 5, 6]);
    pool.close();
}
