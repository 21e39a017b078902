//! Client-facing real-time message protocol.
//!
//! Every message is a tagged JSON object with at least `{type, timestamp}`.
//! Client-originated kinds: join-meeting, leave-meeting, audio-chunk,
//! status-request, pong. Server-pushed kinds: transcription-update,
//! processing-status, error, ping, shutdown.

mod messages;

pub use messages::{ClientMessage, MeetingStatus, ServerMessage};
