//! Transcription provider and document store seams.
//!
//! Both collaborators are black boxes to the coordinator: the provider turns
//! canonical audio into transcript segments, the store persists finished
//! meeting records. Provider failures surface as status messages to the
//! relevant room; they never cross into other meetings.

mod nats;
mod store;

pub use nats::NatsTranscriptionProvider;
pub use store::JsonDocumentStore;

use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// A single transcript segment from the transcription provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptSegment {
    /// Speaker label, if the provider attributes one
    pub speaker: Option<String>,

    /// Segment start offset in milliseconds
    pub start_ms: u64,

    /// Segment end offset in milliseconds
    pub end_ms: u64,

    /// Transcribed text
    pub text: String,

    /// Confidence score (0.0 to 1.0), if available
    pub confidence: Option<f32>,

    /// Whether this is a partial (interim) result
    pub partial: bool,
}

/// A finished meeting record handed to the document store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeetingRecord {
    pub meeting_id: String,
    pub title: String,
    pub segments: Vec<TranscriptSegment>,
    pub speakers: Vec<String>,
    pub summary: Option<String>,
    pub duration_secs: f64,
    pub finished_at: DateTime<Utc>,
}

/// Speech-to-text provider seam.
///
/// Providers either accept a chunk stream directly (`supports_streaming`)
/// or a canonical processed artifact on disk.
#[async_trait::async_trait]
pub trait TranscriptionProvider: Send + Sync {
    /// Whether audio chunks should be forwarded as they arrive instead of
    /// being buffered into an artifact first
    fn supports_streaming(&self) -> bool;

    /// Feed one PCM chunk for a meeting; returns any segments produced so far
    async fn transcribe_chunk(
        &self,
        meeting_id: &str,
        pcm: &[u8],
        sample_rate: u32,
        channels: u16,
        final_chunk: bool,
        language: Option<&str>,
    ) -> Result<Vec<TranscriptSegment>>;

    /// Transcribe a complete canonical artifact
    async fn transcribe_file(
        &self,
        meeting_id: &str,
        path: &Path,
        language: Option<&str>,
    ) -> Result<Vec<TranscriptSegment>>;

    /// Provider name for logging
    fn name(&self) -> &str;
}

/// Document store seam for finished meeting records.
#[async_trait::async_trait]
pub trait DocumentStore: Send + Sync {
    /// Persist a finished meeting record keyed by its owning identity
    async fn save(&self, owner: &str, record: &MeetingRecord) -> Result<()>;
}
