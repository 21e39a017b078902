// Integration tests for the liveness monitor
//
// These tests verify the probe state machine: a connection answering pings
// survives indefinitely, a silent connection is evicted after one full
// interval of grace, and eviction removes it from both the registry and
// its room in one observable step.

mod common;

use anyhow::Result;
use common::{build_coordinator, connect, coordinator_config, segment, MemoryStore, StubProvider};
use parley::protocol::ServerMessage;
use parley::session::spawn_liveness_monitor;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

const PROBE_INTERVAL: Duration = Duration::from_millis(50);

fn pong_json() -> String {
    serde_json::json!({
        "type": "pong",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    })
    .to_string()
}

fn join_json(meeting_id: &str) -> String {
    serde_json::json!({
        "type": "join-meeting",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "meeting_id": meeting_id,
    })
    .to_string()
}

#[tokio::test]
async fn test_silent_connection_is_evicted_from_registry_and_room() -> Result<()> {
    let temp = TempDir::new()?;
    let store = Arc::new(MemoryStore::default());
    let coordinator = build_coordinator(
        &temp,
        coordinator_config(),
        Arc::new(StubProvider::streaming(vec![segment("hi")])),
        Arc::clone(&store),
    );

    let (id, _rx) = connect(&coordinator).await;
    coordinator.handle_text(id, &join_json("m1")).await;

    let cancel = CancellationToken::new();
    let monitor = spawn_liveness_monitor(Arc::clone(&coordinator), PROBE_INTERVAL, cancel.clone());

    // The connection never answers: round 1 marks it awaiting, round 2
    // evicts it. Give the monitor a few intervals of slack.
    tokio::time::sleep(PROBE_INTERVAL * 10).await;

    assert!(
        coordinator.registry().lookup(id).await.is_none(),
        "silent connection should be removed from the registry"
    );
    assert!(
        coordinator.rooms().members("m1").await.is_empty(),
        "eviction must also clear room membership"
    );

    cancel.cancel();
    monitor.await?;
    Ok(())
}

#[tokio::test]
async fn test_ponging_connection_survives() -> Result<()> {
    let temp = TempDir::new()?;
    let store = Arc::new(MemoryStore::default());
    let coordinator = build_coordinator(
        &temp,
        coordinator_config(),
        Arc::new(StubProvider::streaming(Vec::new())),
        Arc::clone(&store),
    );

    let (id, mut rx) = connect(&coordinator).await;

    // A well-behaved client: answer every ping
    let responder_coordinator = Arc::clone(&coordinator);
    let responder = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if matches!(msg, ServerMessage::Ping { .. }) {
                responder_coordinator.handle_text(id, &pong_json()).await;
            }
        }
    });

    let cancel = CancellationToken::new();
    let monitor = spawn_liveness_monitor(Arc::clone(&coordinator), PROBE_INTERVAL, cancel.clone());

    tokio::time::sleep(PROBE_INTERVAL * 10).await;

    assert!(
        coordinator.registry().lookup(id).await.is_some(),
        "a connection answering probes must not be evicted"
    );

    cancel.cancel();
    monitor.await?;
    responder.abort();
    Ok(())
}

#[tokio::test]
async fn test_dead_transport_is_evicted_on_ping_failure() -> Result<()> {
    let temp = TempDir::new()?;
    let store = Arc::new(MemoryStore::default());
    let coordinator = build_coordinator(
        &temp,
        coordinator_config(),
        Arc::new(StubProvider::streaming(Vec::new())),
        Arc::clone(&store),
    );

    let (id, rx) = connect(&coordinator).await;
    drop(rx); // transport gone without a close event

    let cancel = CancellationToken::new();
    let monitor = spawn_liveness_monitor(Arc::clone(&coordinator), PROBE_INTERVAL, cancel.clone());

    tokio::time::sleep(PROBE_INTERVAL * 5).await;

    assert!(
        coordinator.registry().lookup(id).await.is_none(),
        "a transport that cannot accept a ping is evicted immediately"
    );

    cancel.cancel();
    monitor.await?;
    Ok(())
}

#[tokio::test]
async fn test_pong_resets_probe_state() -> Result<()> {
    let temp = TempDir::new()?;
    let store = Arc::new(MemoryStore::default());
    let coordinator = build_coordinator(
        &temp,
        coordinator_config(),
        Arc::new(StubProvider::streaming(Vec::new())),
        Arc::clone(&store),
    );

    let (id, _rx) = connect(&coordinator).await;

    // Simulate one probe round by hand, then a pong
    let registry = coordinator.registry();
    assert_eq!(
        registry.begin_probe(id).await,
        Some(parley::session::Liveness::Alive)
    );
    coordinator.handle_text(id, &pong_json()).await;

    // The next round sees the connection alive again
    assert_eq!(
        registry.begin_probe(id).await,
        Some(parley::session::Liveness::Alive)
    );

    Ok(())
}
