mod common;

use bson::doc;
use replidoc::prelude::*;

use common::{client, seed_users, two_node_cluster};

#[tokio::test]
async fn filtered_sorted_page_returns_matching_documents() {
    let cluster = two_node_cluster();
    seed_users(&cluster).await;
    let config = ClientConfig::new(cluster.topology()).unwrap();
    let (pool, executor) = client(&cluster, &config);

    let query = Query::builder()
        .filter(Filter::gte("age", 20).and(Filter::ne("name", "B")))
        .sort("age", SortDirection::Desc)
        .offset(0)
        .limit(10)
        .build()
        .unwrap();
    let documents = executor.find("users", &query).await.unwrap().try_collect().await.unwrap();

    assert_eq!(documents.len(), 1);
    assert_eq!(documents[0].get_str("name").unwrap(), "C");
    pool.close();
}

#[tokio::test]
async fn sort_applies_before_pagination() {
    let cluster = two_node_cluster();
    seed_users(&cluster).await;
    let config = ClientConfig::new(cluster.topology()).unwrap();
    let (pool, executor) = client(&cluster, &config);

    let query = Query::builder()
        .sort("age", SortDirection::Desc)
        .offset(1)
        .limit(1)
        .build()
        .unwrap();
    let documents = executor.find("users", &query).await.unwrap().try_collect().await.unwrap();

    assert_eq!(documents.len(), 1);
    assert_eq!(documents[0].get_str("name").unwrap(), "B");
    pool.close();
}

#[tokio::test]
async fn empty_conjunction_matches_all_and_empty_disjunction_matches_none() {
    let cluster = two_node_cluster();
    seed_users(&cluster).await;
    let config = ClientConfig::new(cluster.topology()).unwrap();
    let (pool, executor) = client(&cluster, &config);

    let all = Query::builder().filter(Filter::and(vec![])).build().unwrap();
    assert_eq!(executor.find("users", &all).await.unwrap().try_collect().await.unwrap().len(), 3);

    let none = Query::builder().filter(Filter::or(vec![])).build().unwrap();
    assert!(executor.find("users", &none).await.unwrap().try_collect().await.unwrap().is_empty());
    pool.close();
}

#[tokio::test]
async fn membership_filters_match_array_fields() {
    let cluster = two_node_cluster();
    seed_users(&cluster).await;
    let config = ClientConfig::new(cluster.topology()).unwrap();
    let (pool, executor) = client(&cluster, &config);

    let query = Query::builder()
        .filter(Filter::all("tags", ["oncall"]).and(Filter::size("tags", 2)))
        .sort("name", SortDirection::Asc)
        .build()
        .unwrap();
    let documents = executor.find("users", &query).await.unwrap().try_collect().await.unwrap();

    let names: Vec<&str> = documents.iter().map(|d| d.get_str("name").unwrap()).collect();
    assert_eq!(names, vec!["B", "C"]);
    pool.close();
}

#[tokio::test]
async fn count_does_not_materialize_documents() {
    let cluster = two_node_cluster();
    seed_users(&cluster).await;
    let config = ClientConfig::new(cluster.topology()).unwrap();
    let (pool, executor) = client(&cluster, &config);

    let count = executor
        .count_documents("users", Some(&Filter::gte("age", 20)))
        .await
        .unwrap();
    assert_eq!(count, 2);
    assert_eq!(executor.count_documents("users", None).await.unwrap(), 3);
    pool.close();
}

#[tokio::test]
async fn insert_generates_an_id_and_stores_the_document() {
    let cluster = two_node_cluster();
    seed_users(&cluster).await;
    let config = ClientConfig::new(cluster.topology()).unwrap();
    let (pool, executor) = client(&cluster, &config);

    let id = executor.insert("users", doc! { "name": "D", "age": 41 }).await.unwrap();

    let stored = executor
        .find("users", &Query::builder().filter(Filter::eq("name", "D")).build().unwrap())
        .await
        .unwrap()
        .try_collect()
        .await
        .unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].get("_id").unwrap(), &bson::Bson::from(id));
    assert_eq!(executor.count_documents("users", None).await.unwrap(), 4);
    pool.close();
}

#[tokio::test]
async fn delete_many_removes_only_matches() {
    let cluster = two_node_cluster();
    seed_users(&cluster).await;
    let config = ClientConfig::new(cluster.topology()).unwrap();
    let (pool, executor) = client(&cluster, &config);

    let deleted = executor.delete_many("users", Some(&Filter::lt("age", 20))).await.unwrap();
    assert_eq!(deleted, 1);
    assert_eq!(executor.count_documents("users", None).await.unwrap(), 2);
    pool.close();
}

#[tokio::test]
async fn list_collections_names_every_collection() {
    let cluster = two_node_cluster();
    seed_users(&cluster).await;
    cluster.seed("audit", [doc! { "event": "login" }]).await;
    let config = ClientConfig::new(cluster.topology()).unwrap();
    let (pool, executor) = client(&cluster, &config);

    assert_eq!(executor.list_collections().await.unwrap(), vec!["audit", "users"]);
    pool.close();
}

#[tokio::test]
async fn writes_reach_the_primary_under_secondary_read_preference() {
    let cluster = two_node_cluster();
    seed_users(&cluster).await;
    let config = ClientConfig::new(cluster.topology())
        .unwrap()
        .with_read_preference(ReadPreference::Secondary);
    let (pool, executor) = client(&cluster, &config);

    let outcome = executor
        .update_many("users", None, &UpdateExpr::new().set("active", true))
        .await
        .unwrap();
    assert_eq!(outcome.matched, 3);
    pool.close();
}

#[tokio::test]
async fn writes_fail_without_a_primary() {
    let cluster = replidoc::memory::MemoryCluster::builder()
        .secondary(common::secondary())
        .build();
    let config = ClientConfig::new(cluster.topology()).unwrap();
    let (pool, executor) = client(&cluster, &config);

    let err = executor
        .update_many("users", None, &UpdateExpr::new().set("active", true))
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::NoPrimaryAvailable));
    pool.close();
}
