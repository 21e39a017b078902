//! Error types for parley.
//!
//! The propagation rule: failures scoped to one connection or one artifact
//! stay with that connection or artifact. Only listener bind failure at
//! startup is allowed to abort the process.

use thiserror::Error;

/// Stage of the intake pipeline that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessingStage {
    Probe,
    Transcode,
}

impl std::fmt::Display for ProcessingStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProcessingStage::Probe => write!(f, "probe"),
            ProcessingStage::Transcode => write!(f, "transcode"),
        }
    }
}

#[derive(Error, Debug)]
pub enum ParleyError {
    // Upload/message validation errors (reported to the originating caller only)
    #[error("invalid audio upload: {reason}")]
    InvalidAudio { reason: String },

    #[error("malformed client message: {reason}")]
    InvalidMessage { reason: String },

    // Intake pipeline errors (reported to the originating room as status)
    #[error("audio processing failed during {stage}: {message}")]
    Processing {
        stage: ProcessingStage,
        message: String,
    },

    #[error("audio processing timed out after {timeout_secs}s")]
    ProcessingTimeout { timeout_secs: u64 },

    // Connection errors
    #[error("connection {id} is not registered")]
    NotConnected { id: String },

    #[error("transport send failed: {message}")]
    Transport { message: String },

    #[error("coordinator is draining; new connections are not accepted")]
    Draining,

    // External collaborator errors
    #[error("transcription provider error: {message}")]
    Provider { message: String },

    #[error("document store error: {message}")]
    Store { message: String },

    // Startup errors (the only fatal class)
    #[error("failed to bind real-time listener on {addr}: {message}")]
    ListenerBind { addr: String, message: String },

    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ParleyError>;

impl ParleyError {
    /// Machine-readable code carried on every server-pushed error message.
    pub fn code(&self) -> &'static str {
        match self {
            ParleyError::InvalidAudio { .. } => "invalid-audio",
            ParleyError::InvalidMessage { .. } => "invalid-message",
            ParleyError::Processing { .. } => "processing-failed",
            ParleyError::ProcessingTimeout { .. } => "processing-timeout",
            ParleyError::NotConnected { .. } => "not-connected",
            ParleyError::Transport { .. } => "transport-failure",
            ParleyError::Draining => "shutting-down",
            ParleyError::Provider { .. } => "provider-error",
            ParleyError::Store { .. } => "store-error",
            ParleyError::ListenerBind { .. } => "listener-bind",
            ParleyError::Config(_) => "config-error",
            ParleyError::Io(_) => "io-error",
        }
    }
}
