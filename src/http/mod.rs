//! HTTP + WebSocket surface
//!
//! This module provides the service's external surface:
//! - GET  /ws - WebSocket upgrade into the session coordinator
//! - POST /meetings/:meeting_id/audio - file-based audio intake
//! - GET  /meetings/:meeting_id/status - meeting status snapshot
//! - GET  /meetings/:meeting_id/transcript - accumulated transcript
//! - GET  /health - health check

mod handlers;
mod routes;
mod state;

pub use routes::create_router;
pub use state::AppState;
