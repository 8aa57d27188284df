//! Integration tests for the peer registry actor.
//!
//! Staleness tests run with paused Tokio time so "an hour later" costs
//! nothing.

use std::time::Duration;

use mudwire_peers::{PeerError, PeerRegistry};
use mudwire_protocol::PeerPacket;

// =========================================================================
// Helpers
// =========================================================================

const HOUR: Duration = Duration::from_secs(3600);

fn announce(name: &str) -> PeerPacket {
    PeerPacket::new()
        .with("name", name)
        .with("host", "h")
        .with("port", "4000")
}

fn depart(name: &str) -> PeerPacket {
    PeerPacket::new().with("name", name)
}

async fn active_names(
    registry: &PeerRegistry,
    threshold: Duration,
) -> Vec<String> {
    let mut names: Vec<_> = registry
        .list_active(threshold)
        .await
        .unwrap()
        .into_iter()
        .map(|r| r.name)
        .collect();
    names.sort();
    names
}

// =========================================================================
// Upsert / remove / list
// =========================================================================

#[tokio::test]
async fn test_announce_list_depart_cycle() {
    let registry = PeerRegistry::spawn();

    registry.upsert(announce("Foo")).await.unwrap();
    let active = registry.list_active(HOUR).await.unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].name, "Foo");
    assert_eq!(active[0].port, Some(4000));

    assert!(registry.remove(depart("Foo")).await.unwrap());
    assert!(registry.list_active(HOUR).await.unwrap().is_empty());

    // Departing twice is fine.
    assert!(!registry.remove(depart("Foo")).await.unwrap());
}

#[tokio::test]
async fn test_repeat_announcement_updates_record() {
    let registry = PeerRegistry::spawn();

    registry.upsert(announce("Foo")).await.unwrap();
    registry
        .upsert(announce("Foo").with("versionid", "2.0"))
        .await
        .unwrap();

    let active = registry.list_active(HOUR).await.unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].version_id.as_deref(), Some("2.0"));
}

#[tokio::test]
async fn test_garbled_packet_is_dropped() {
    let registry = PeerRegistry::spawn();

    let accepted = registry
        .upsert(PeerPacket::new().with("host", "h"))
        .await
        .unwrap();

    assert!(!accepted);
    assert!(registry.list_active(HOUR).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_concurrent_announcements_never_duplicate() {
    let registry = PeerRegistry::spawn();

    let mut tasks = Vec::new();
    for i in 0..50 {
        let registry = registry.clone();
        tasks.push(tokio::spawn(async move {
            let name = format!("Peer{}", i % 5);
            registry
                .upsert(announce(&name).with("versionid", &i.to_string()))
                .await
                .unwrap();
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    assert_eq!(
        active_names(&registry, HOUR).await,
        vec!["Peer0", "Peer1", "Peer2", "Peer3", "Peer4"]
    );
}

// =========================================================================
// Staleness
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_list_active_hides_stale_peers() {
    let registry = PeerRegistry::spawn();

    registry.upsert(announce("Old")).await.unwrap();
    tokio::time::sleep(Duration::from_secs(120)).await;
    registry.upsert(announce("New")).await.unwrap();

    assert_eq!(
        active_names(&registry, Duration::from_secs(60)).await,
        vec!["New"]
    );
    assert_eq!(active_names(&registry, HOUR).await, vec!["New", "Old"]);
}

#[tokio::test(start_paused = true)]
async fn test_expire_removes_stale_peers() {
    let registry = PeerRegistry::spawn();

    registry.upsert(announce("Old")).await.unwrap();
    tokio::time::sleep(Duration::from_secs(120)).await;
    registry.upsert(announce("New")).await.unwrap();

    let expired = registry.expire(Duration::from_secs(60)).await.unwrap();
    assert_eq!(expired, vec!["Old".to_string()]);
    assert!(registry.get("Old").await.unwrap().is_none());
    assert_eq!(active_names(&registry, HOUR).await, vec!["New"]);
}

#[tokio::test(start_paused = true)]
async fn test_reannouncing_refreshes_last_seen() {
    let registry = PeerRegistry::spawn();

    registry.upsert(announce("Foo")).await.unwrap();
    tokio::time::sleep(Duration::from_secs(50)).await;
    registry.upsert(announce("Foo")).await.unwrap();
    tokio::time::sleep(Duration::from_secs(50)).await;

    assert!(registry.expire(Duration::from_secs(60)).await.unwrap().is_empty());
    let names = active_names(&registry, Duration::from_secs(60)).await;
    assert_eq!(names, vec!["Foo"]);
}

// =========================================================================
// Lifecycle
// =========================================================================

#[tokio::test]
async fn test_every_handle_fails_after_shutdown() {
    let registry = PeerRegistry::spawn();
    let other = registry.clone();

    registry.shutdown().await.unwrap();

    let result = other.upsert(announce("Foo")).await;
    assert!(matches!(result, Err(PeerError::Unavailable)));
}
