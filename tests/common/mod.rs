// Shared fixtures for integration tests: stub transcription providers, an
// in-memory document store, and coordinator construction with short
// timeouts suitable for tests.

#![allow(dead_code)]

use async_trait::async_trait;
use parley::config::AudioConfig;
use parley::error::Result;
use parley::protocol::ServerMessage;
use parley::session::{ConnectionId, CoordinatorConfig, SessionCoordinator};
use parley::transcribe::{DocumentStore, MeetingRecord, TranscriptSegment, TranscriptionProvider};
use parley::IntakePipeline;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::mpsc;

/// Stub provider returning a fixed set of segments. Chunk mode only returns
/// them on the final chunk, mirroring how a real STT service flushes.
pub struct StubProvider {
    pub streaming: bool,
    pub segments: Vec<TranscriptSegment>,
    /// Artificial latency before file transcription returns
    pub file_delay: Duration,
}

impl StubProvider {
    pub fn streaming(segments: Vec<TranscriptSegment>) -> Self {
        Self {
            streaming: true,
            segments,
            file_delay: Duration::ZERO,
        }
    }

    pub fn file_based(segments: Vec<TranscriptSegment>) -> Self {
        Self {
            streaming: false,
            segments,
            file_delay: Duration::ZERO,
        }
    }
}

#[async_trait]
impl TranscriptionProvider for StubProvider {
    fn supports_streaming(&self) -> bool {
        self.streaming
    }

    async fn transcribe_chunk(
        &self,
        _meeting_id: &str,
        _pcm: &[u8],
        _sample_rate: u32,
        _channels: u16,
        final_chunk: bool,
        _language: Option<&str>,
    ) -> Result<Vec<TranscriptSegment>> {
        if final_chunk {
            Ok(self.segments.clone())
        } else {
            Ok(Vec::new())
        }
    }

    async fn transcribe_file(
        &self,
        _meeting_id: &str,
        _path: &Path,
        _language: Option<&str>,
    ) -> Result<Vec<TranscriptSegment>> {
        if !self.file_delay.is_zero() {
            tokio::time::sleep(self.file_delay).await;
        }
        Ok(self.segments.clone())
    }

    fn name(&self) -> &str {
        "stub"
    }
}

/// Document store that keeps records in memory for assertions.
#[derive(Default)]
pub struct MemoryStore {
    pub records: std::sync::Mutex<Vec<(String, MeetingRecord)>>,
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn save(&self, owner: &str, record: &MeetingRecord) -> Result<()> {
        let mut records = self.records.lock().unwrap();
        records.push((owner.to_string(), record.clone()));
        Ok(())
    }
}

pub fn segment(text: &str) -> TranscriptSegment {
    TranscriptSegment {
        speaker: Some("speaker-0".to_string()),
        start_ms: 0,
        end_ms: 1500,
        text: text.to_string(),
        confidence: Some(0.92),
        partial: false,
    }
}

pub fn audio_config(temp: &TempDir) -> AudioConfig {
    AudioConfig {
        intake_path: temp.path().join("intake").display().to_string(),
        processed_path: temp.path().join("processed").display().to_string(),
        max_upload_bytes: 100 * 1024 * 1024,
        allowed_media_types: vec![
            "audio/wav".to_string(),
            "audio/mpeg".to_string(),
            "audio/flac".to_string(),
        ],
        volume_normalization: false,
        noise_reduction: false,
        model: "whisper-small".to_string(),
        processing_timeout_secs: 30,
    }
}

pub fn coordinator_config() -> CoordinatorConfig {
    CoordinatorConfig {
        liveness_interval: Duration::from_millis(50),
        shutdown_grace: Duration::from_millis(300),
        processing_timeout: Duration::from_secs(10),
        ..CoordinatorConfig::default()
    }
}

pub fn build_coordinator(
    temp: &TempDir,
    config: CoordinatorConfig,
    provider: Arc<dyn TranscriptionProvider>,
    store: Arc<MemoryStore>,
) -> Arc<SessionCoordinator> {
    let intake = IntakePipeline::new(audio_config(temp)).expect("intake pipeline");
    SessionCoordinator::new(config, intake, provider, store)
}

/// Admit a test transport and return its id plus the receive side.
pub async fn connect(
    coordinator: &Arc<SessionCoordinator>,
) -> (ConnectionId, mpsc::Receiver<ServerMessage>) {
    let (tx, rx) = mpsc::channel(64);
    let id = coordinator.connect(tx).await.expect("connect");
    (id, rx)
}

/// Receive messages until one matches, discarding the rest. Panics after
/// the timeout so a missing message fails the test instead of hanging it.
pub async fn recv_until<F>(
    rx: &mut mpsc::Receiver<ServerMessage>,
    what: &str,
    mut matches: F,
) -> ServerMessage
where
    F: FnMut(&ServerMessage) -> bool,
{
    let deadline = Duration::from_secs(5);
    tokio::time::timeout(deadline, async {
        loop {
            let msg = rx.recv().await.unwrap_or_else(|| {
                panic!("channel closed while waiting for {}", what);
            });
            if matches(&msg) {
                return msg;
            }
        }
    })
    .await
    .unwrap_or_else(|_| panic!("timed out waiting for {}", what))
}

/// Write a sine-wave WAV fixture.
pub fn write_wav(path: &PathBuf, sample_rate: u32, channels: u16, seconds: f32) {
    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut writer = hound::WavWriter::create(path, spec).expect("create wav");
    let frames = (sample_rate as f32 * seconds) as usize;
    for i in 0..frames {
        let t = i as f32 / sample_rate as f32;
        let value = (f32::sin(2.0 * std::f32::consts::PI * 440.0 * t) * 8000.0) as i16;
        for _ in 0..channels {
            writer.write_sample(value).expect("write sample");
        }
    }
    writer.finalize().expect("finalize wav");
}
