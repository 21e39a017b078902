//! Real-time session coordination
//!
//! This module provides the coordinator core:
//! - Connection registry (admission, metadata, transport ownership)
//! - Room router (meeting-room membership and broadcast)
//! - Liveness monitor (ping/pong probing and eviction)
//! - Session coordinator (message dispatch, audio handoff, graceful drain)

mod config;
mod coordinator;
mod liveness;
mod registry;
mod rooms;

pub use config::CoordinatorConfig;
pub use coordinator::SessionCoordinator;
pub use liveness::spawn_liveness_monitor;
pub use registry::{ConnectionId, ConnectionInfo, ConnectionRegistry, Liveness};
pub use rooms::{LeftRoom, RoomRouter};
