use crate::error::{ParleyError, Result};
use crate::transcribe::TranscriptSegment;
use serde::{Deserialize, Serialize};

/// Message sent by a connected client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ClientMessage {
    /// Join a meeting room (leaving any room currently occupied)
    JoinMeeting {
        timestamp: String,
        meeting_id: String,
        /// Speaker label attached to transcript segments from this connection
        display_name: Option<String>,
    },

    /// Leave the current meeting room
    LeaveMeeting { timestamp: String },

    /// A chunk of streamed audio (base64-encoded 16-bit little-endian PCM)
    AudioChunk {
        timestamp: String,
        pcm: String,
        sample_rate: u32,
        channels: u16,
        #[serde(rename = "final")]
        final_chunk: bool,
        /// Language hint forwarded to the transcription provider
        language: Option<String>,
    },

    /// Ask for the processing status of the current meeting
    StatusRequest { timestamp: String },

    /// Reply to a server ping (liveness probe)
    Pong { timestamp: String },
}

impl ClientMessage {
    /// Parse an inbound text frame. Unknown or malformed input is an
    /// `InvalidMessage`, reported to the sender only.
    pub fn parse(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| ParleyError::InvalidMessage {
            reason: e.to_string(),
        })
    }
}

/// Message pushed by the coordinator to a client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ServerMessage {
    /// A transcript segment for the connection's meeting
    TranscriptionUpdate {
        timestamp: String,
        meeting_id: String,
        segment: TranscriptSegment,
    },

    /// Progress of audio intake/transcription for a meeting
    ProcessingStatus {
        timestamp: String,
        meeting_id: Option<String>,
        /// 0-100
        progress: u8,
        /// Qualitative stage label ("validating", "transcoding", ...)
        stage: String,
        status: Option<MeetingStatus>,
    },

    /// Structured error, sent to the offending connection only
    Error {
        timestamp: String,
        code: String,
        message: String,
    },

    /// Liveness probe; clients answer with `pong`
    Ping { timestamp: String },

    /// Coordinator is draining; no further messages will be accepted
    Shutdown { timestamp: String, message: String },
}

/// Snapshot of a meeting's accumulated state, carried on status replies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeetingStatus {
    pub meeting_id: String,
    pub member_count: usize,
    pub segment_count: usize,
    pub duration_secs: f64,
}

impl ServerMessage {
    pub fn transcription_update(meeting_id: &str, segment: TranscriptSegment) -> Self {
        ServerMessage::TranscriptionUpdate {
            timestamp: now_rfc3339(),
            meeting_id: meeting_id.to_string(),
            segment,
        }
    }

    pub fn processing_status(meeting_id: Option<&str>, progress: u8, stage: &str) -> Self {
        ServerMessage::ProcessingStatus {
            timestamp: now_rfc3339(),
            meeting_id: meeting_id.map(str::to_string),
            progress,
            stage: stage.to_string(),
            status: None,
        }
    }

    pub fn meeting_status(status: MeetingStatus, progress: u8, stage: &str) -> Self {
        ServerMessage::ProcessingStatus {
            timestamp: now_rfc3339(),
            meeting_id: Some(status.meeting_id.clone()),
            progress,
            stage: stage.to_string(),
            status: Some(status),
        }
    }

    pub fn error(err: &ParleyError) -> Self {
        ServerMessage::Error {
            timestamp: now_rfc3339(),
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }

    pub fn ping() -> Self {
        ServerMessage::Ping {
            timestamp: now_rfc3339(),
        }
    }

    pub fn shutdown(message: &str) -> Self {
        ServerMessage::Shutdown {
            timestamp: now_rfc3339(),
            message: message.to_string(),
        }
    }
}

fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}
