//! NATS-backed transcription provider.
//!
//! Publishes canonical PCM frames to `audio.frame.meeting-{id}` and consumes
//! transcript messages from `stt.text.>`, filtered by session id. The STT
//! service on the other side of the broker is a black box.

use super::{TranscriptSegment, TranscriptionProvider};
use crate::error::{ParleyError, Result};
use base64::Engine;
use futures::stream::StreamExt;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Audio frame message published to NATS
#[derive(Debug, Serialize, Deserialize)]
struct AudioFrameMessage {
    session_id: String,
    sequence: u32,
    pcm: String, // Base64-encoded PCM bytes
    sample_rate: u32,
    channels: u16,
    timestamp: String, // RFC3339 timestamp
    #[serde(rename = "final")]
    final_frame: bool,
    language: Option<String>,
}

/// Transcript message received from the STT service
#[derive(Debug, Serialize, Deserialize)]
struct TranscriptMessage {
    session_id: String,
    text: String,
    partial: bool,
    timestamp: String,
    confidence: Option<f32>,
    #[serde(default)]
    speaker: Option<String>,
    #[serde(default)]
    start_ms: u64,
    #[serde(default)]
    end_ms: u64,
}

/// How long a final chunk waits for the STT service to flush its results.
const FINAL_RESULT_WAIT: Duration = Duration::from_secs(5);
const INBOX_POLL: Duration = Duration::from_millis(50);

/// Samples per published frame when replaying a processed artifact (1s at 16 kHz)
const FILE_FRAME_SAMPLES: usize = 16_000;

pub struct NatsTranscriptionProvider {
    client: async_nats::Client,
    /// Segments received per meeting, filled by the drain task
    inbox: Arc<Mutex<HashMap<String, Vec<TranscriptSegment>>>>,
    sequence: AtomicU32,
    drain_task: JoinHandle<()>,
}

impl NatsTranscriptionProvider {
    /// Connect to NATS and start draining transcript messages.
    pub async fn connect(url: &str) -> Result<Self> {
        info!("Connecting to NATS at {}", url);

        let client = async_nats::connect(url)
            .await
            .map_err(|e| ParleyError::Provider {
                message: format!("failed to connect to NATS at {}: {}", url, e),
            })?;

        let mut subscriber =
            client
                .subscribe("stt.text.>")
                .await
                .map_err(|e| ParleyError::Provider {
                    message: format!("failed to subscribe to transcripts: {}", e),
                })?;

        info!("Connected to NATS, subscribed to stt.text.>");

        let inbox: Arc<Mutex<HashMap<String, Vec<TranscriptSegment>>>> =
            Arc::new(Mutex::new(HashMap::new()));

        let drain_inbox = Arc::clone(&inbox);
        let drain_task = tokio::spawn(async move {
            while let Some(msg) = subscriber.next().await {
                match serde_json::from_slice::<TranscriptMessage>(&msg.payload) {
                    Ok(transcript) => {
                        let segment = TranscriptSegment {
                            speaker: transcript.speaker,
                            start_ms: transcript.start_ms,
                            end_ms: transcript.end_ms,
                            text: transcript.text,
                            confidence: transcript.confidence,
                            partial: transcript.partial,
                        };
                        let mut inbox = drain_inbox.lock().await;
                        inbox
                            .entry(transcript.session_id)
                            .or_default()
                            .push(segment);
                    }
                    Err(e) => {
                        warn!("Failed to parse transcript message: {}", e);
                    }
                }
            }
        });

        Ok(Self {
            client,
            inbox,
            sequence: AtomicU32::new(0),
            drain_task,
        })
    }

    async fn publish_frame(
        &self,
        meeting_id: &str,
        pcm: &[u8],
        sample_rate: u32,
        channels: u16,
        final_frame: bool,
        language: Option<&str>,
    ) -> Result<()> {
        let subject = format!("audio.frame.meeting-{}", meeting_id);

        let message = AudioFrameMessage {
            session_id: meeting_id.to_string(),
            sequence: self.sequence.fetch_add(1, Ordering::SeqCst),
            pcm: base64::engine::general_purpose::STANDARD.encode(pcm),
            sample_rate,
            channels,
            timestamp: chrono::Utc::now().to_rfc3339(),
            final_frame,
            language: language.map(str::to_string),
        };

        let payload = serde_json::to_vec(&message).map_err(|e| ParleyError::Provider {
            message: format!("failed to encode audio frame: {}", e),
        })?;

        self.client
            .publish(subject, payload.into())
            .await
            .map_err(|e| ParleyError::Provider {
                message: format!("failed to publish audio frame: {}", e),
            })
    }

    /// Take everything the drain task has collected for a meeting.
    async fn drain(&self, meeting_id: &str) -> Vec<TranscriptSegment> {
        let mut inbox = self.inbox.lock().await;
        inbox.remove(meeting_id).unwrap_or_default()
    }

    /// Poll the inbox until a non-partial segment arrives or the bounded
    /// wait elapses. Final chunks use this to give the STT service time to
    /// flush without blocking indefinitely.
    async fn drain_final(&self, meeting_id: &str) -> Vec<TranscriptSegment> {
        let deadline = tokio::time::Instant::now() + FINAL_RESULT_WAIT;
        let mut collected = Vec::new();

        loop {
            collected.extend(self.drain(meeting_id).await);
            if collected.iter().any(|s| !s.partial) {
                break;
            }
            if tokio::time::Instant::now() >= deadline {
                warn!(
                    "No final transcript for meeting {} within {:?}",
                    meeting_id, FINAL_RESULT_WAIT
                );
                break;
            }
            tokio::time::sleep(INBOX_POLL).await;
        }

        collected
    }
}

impl Drop for NatsTranscriptionProvider {
    fn drop(&mut self) {
        self.drain_task.abort();
    }
}

#[async_trait::async_trait]
impl TranscriptionProvider for NatsTranscriptionProvider {
    fn supports_streaming(&self) -> bool {
        true
    }

    async fn transcribe_chunk(
        &self,
        meeting_id: &str,
        pcm: &[u8],
        sample_rate: u32,
        channels: u16,
        final_chunk: bool,
        language: Option<&str>,
    ) -> Result<Vec<TranscriptSegment>> {
        self.publish_frame(meeting_id, pcm, sample_rate, channels, final_chunk, language)
            .await?;

        if final_chunk {
            Ok(self.drain_final(meeting_id).await)
        } else {
            Ok(self.drain(meeting_id).await)
        }
    }

    async fn transcribe_file(
        &self,
        meeting_id: &str,
        path: &Path,
        language: Option<&str>,
    ) -> Result<Vec<TranscriptSegment>> {
        let reader = hound::WavReader::open(path).map_err(|e| ParleyError::Provider {
            message: format!("failed to open artifact {}: {}", path.display(), e),
        })?;

        let spec = reader.spec();
        let samples: Vec<i16> = reader
            .into_samples::<i16>()
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| ParleyError::Provider {
                message: format!("failed to read artifact samples: {}", e),
            })?;

        for frame in samples.chunks(FILE_FRAME_SAMPLES) {
            let pcm: Vec<u8> = frame.iter().flat_map(|s| s.to_le_bytes()).collect();
            self.publish_frame(
                meeting_id,
                &pcm,
                spec.sample_rate,
                spec.channels,
                false,
                language,
            )
            .await?;
        }

        // Empty final frame tells the STT service to flush
        self.publish_frame(meeting_id, &[], spec.sample_rate, spec.channels, true, language)
            .await?;

        Ok(self.drain_final(meeting_id).await)
    }

    fn name(&self) -> &str {
        "nats"
    }
}
