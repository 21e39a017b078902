use std::time::Duration;

/// Tunables for the session coordinator.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Liveness probe interval; an unanswered probe evicts on the next tick
    pub liveness_interval: Duration,

    /// Bounded grace period for shutdown drain
    pub shutdown_grace: Duration,

    /// Per-artifact processing/transcription timeout
    pub processing_timeout: Duration,

    /// Cap on buffered PCM per connection for the file-based chunk flow
    pub max_chunk_buffer_bytes: usize,

    /// Language hint used when a client does not supply one
    pub default_language: Option<String>,

    /// Owning identity finished meeting records are keyed by
    pub record_owner: String,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            liveness_interval: Duration::from_secs(30),
            shutdown_grace: Duration::from_secs(10),
            processing_timeout: Duration::from_secs(120),
            max_chunk_buffer_bytes: 64 * 1024 * 1024, // 64 MiB of raw PCM
            default_language: None,
            record_owner: "parley".to_string(),
        }
    }
}
