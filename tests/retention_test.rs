//! Retention sweep tests against a running server.

mod common;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use common::{error_kind, TestServer};
use filebin::config::StorageConfig;
use filebin::{start_retention_sweeper, ErrorKind, RetentionSweeper};

#[tokio::test]
async fn test_expired_entries_are_unrecoverable() {
    let server = TestServer::start().await;
    let (mut client, token) = server.login().await;

    client.upload(&token, "old.txt", b"1").await;
    client.command(&["DELETE", &token, "old.txt"]).await;
    tokio::time::sleep(Duration::from_millis(20)).await;
    let cutoff = Utc::now();
    tokio::time::sleep(Duration::from_millis(20)).await;
    client.upload(&token, "young.txt", b"2").await;
    client.command(&["DELETE", &token, "young.txt"]).await;

    assert_eq!(server.store.purge_deleted_before(cutoff).await.unwrap(), 1);

    assert_eq!(client.search_recycle(&token, "").await, vec!["young.txt"]);
    let response = client.command(&["RESTORE", &token, "old.txt"]).await;
    assert_eq!(error_kind(&response), ErrorKind::NotFound);
    assert!(!server.recycle_dir().join("old.txt").exists());

    let response = client.command(&["RESTORE", &token, "young.txt"]).await;
    assert!(response.is_ok());
}

#[tokio::test]
async fn test_default_retention_keeps_fresh_entries() {
    let server = TestServer::start().await;
    let (mut client, token) = server.login().await;

    client.upload(&token, "fresh.txt", b"x").await;
    client.command(&["DELETE", &token, "fresh.txt"]).await;

    let sweeper = RetentionSweeper::from_config(Arc::clone(&server.store), &StorageConfig::default());
    assert_eq!(sweeper.sweep_once().await, 0);
    assert_eq!(client.search_recycle(&token, "").await, vec!["fresh.txt"]);
}

#[tokio::test]
async fn test_background_sweeper_purges() {
    let server = TestServer::start().await;
    let (mut client, token) = server.login().await;

    client.upload(&token, "doomed.txt", b"x").await;
    client.command(&["DELETE", &token, "doomed.txt"]).await;

    let sweeper = RetentionSweeper::new(
        Arc::clone(&server.store),
        Duration::ZERO,
        Duration::from_millis(50),
    );
    let handle = tokio::spawn(async move { sweeper.run().await });

    let mut purged = false;
    for _ in 0..50 {
        if client.search_recycle(&token, "").await.is_empty() {
            purged = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    handle.abort();
    assert!(purged, "sweeper never purged the expired entry");
}

#[tokio::test]
async fn test_start_retention_sweeper_waits_one_interval() {
    let server = TestServer::start().await;
    let (mut client, token) = server.login().await;

    client.upload(&token, "a.txt", b"x").await;
    client.command(&["DELETE", &token, "a.txt"]).await;

    let config = StorageConfig {
        retention_days: 1,
        sweep_interval_secs: 3600,
        ..StorageConfig::default()
    };
    let handle = start_retention_sweeper(Arc::clone(&server.store), &config);

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!handle.is_finished());
    assert_eq!(client.search_recycle(&token, "").await, vec!["a.txt"]);
    handle.abort();
}
