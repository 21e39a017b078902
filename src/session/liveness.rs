//! Liveness monitor: periodic ping/pong probing of every registered
//! connection.
//!
//! Each round resets every connection to `AwaitingPong` and sends a ping; a
//! pong restores `Alive`. A connection found still `AwaitingPong` at the
//! start of a round missed the whole previous interval and is evicted
//! through the coordinator's one teardown path. Threshold: one unanswered
//! probe, i.e. one full interval of grace.

use super::coordinator::SessionCoordinator;
use super::registry::Liveness;
use crate::protocol::ServerMessage;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub fn spawn_liveness_monitor(
    coordinator: Arc<SessionCoordinator>,
    interval: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // Skip the immediate first tick so connections get a full interval
        // before their first probe.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Liveness monitor shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    probe_round(&coordinator).await;
                }
            }
        }
    })
}

async fn probe_round(coordinator: &Arc<SessionCoordinator>) {
    let registry = coordinator.registry();
    let ids = registry.connection_ids().await;
    debug!("Liveness probe round: {} connections", ids.len());

    for id in ids {
        // begin_probe reads the previous state and resets it in one lock
        // acquisition; a connection that disconnected since the snapshot
        // returns None and is skipped.
        let previous = match registry.begin_probe(id).await {
            Some(state) => state,
            None => continue,
        };

        if previous == Liveness::AwaitingPong {
            warn!("Connection {} missed its liveness probe, evicting", id);
            coordinator.disconnect(id).await;
            continue;
        }

        if let Err(e) = registry.send_to(id, ServerMessage::ping()).await {
            // A dead transport does not get to wait out another interval.
            warn!("Ping to {} failed ({}), evicting", id, e);
            coordinator.disconnect(id).await;
        }
    }
}
