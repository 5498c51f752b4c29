mod common;

use common::{TestServer, storage_config};
use lrucached::config::StorageConfig;

fn small_store(budget: usize) -> StorageConfig {
    StorageConfig {
        memory_budget_bytes: budget,
        ..Default::default()
    }
}

#[tokio::test]
async fn recently_read_entry_survives_eviction() {
    let server = TestServer::with_config(storage_config(small_store(1024))).await;
    let mut client = server.client().await;
    let value = "v".repeat(100);

    for i in 1..=10 {
        assert_eq!(client.set(&format!("e{i}"), &value).await, "STORED");
        assert!(client.get("e1").await.is_some(), "e1 evicted after e{i}");
    }

    assert!(server.store.used_bytes() <= 1024);
    assert!(client.get("e2").await.is_none());
    assert!(client.get("e10").await.is_some());
    assert!(server.metrics.evictions.get() >= 4);
}

#[tokio::test]
async fn expired_entries_are_reclaimed_before_live_ones() {
    let server = TestServer::with_config(storage_config(small_store(512))).await;
    let mut client = server.client().await;
    let value = "v".repeat(100);

    // oldest entry is live, the next one expires soon
    client.set("old", &value).await;
    let cmd = format!("set short 0 5 {}\r\n{value}\r\n", value.len());
    assert_eq!(client.request(cmd.as_bytes()).await, "STORED");
    client.set("mid", &value).await;

    server.clock.advance(5);
    client.set("new", &value).await;

    assert!(client.get("old").await.is_some());
    assert!(client.get("short").await.is_none());
    assert_eq!(server.metrics.evictions.get(), 0);
}

#[tokio::test]
async fn item_larger_than_budget_is_rejected() {
    let server = TestServer::with_config(storage_config(small_store(256))).await;
    let mut client = server.client().await;

    client.set("keep", "me").await;
    let big = "x".repeat(300);
    assert_eq!(
        client.set("big", &big).await,
        "SERVER_ERROR out of memory storing object"
    );
    assert_eq!(client.get("keep").await.as_deref(), Some("me"));
}

#[tokio::test]
async fn append_growing_past_budget_evicts_others() {
    let server = TestServer::with_config(storage_config(small_store(350))).await;
    let mut client = server.client().await;
    let value = "v".repeat(100);

    client.set("a", &value).await;
    client.set("b", &value).await;
    let cmd = format!("append b 0 0 {}\r\n{value}\r\n", value.len());
    assert_eq!(client.request(cmd.as_bytes()).await, "STORED");

    assert!(server.store.used_bytes() <= 350);
    assert!(client.get("a").await.is_none());
    assert_eq!(client.get("b").await.map(|v| v.len()), Some(200));
}
