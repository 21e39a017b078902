//! Session coordinator: the top-level orchestrator wiring the connection
//! registry, room router, liveness monitor, intake pipeline, and the
//! transcription/document-store collaborators together.
//!
//! Per-connection lifecycle: admitted (no room) -> joined (exactly one room)
//! -> closed (registry entry removed, terminal). Close happens on transport
//! close, protocol error, or liveness eviction, always through
//! `disconnect` so no teardown logic is duplicated.

use super::config::CoordinatorConfig;
use super::registry::{ConnectionId, ConnectionRegistry};
use super::rooms::RoomRouter;
use crate::audio::{cleanup, AudioArtifact, AudioUpload, IntakePipeline};
use crate::config::RetentionConfig;
use crate::error::{ParleyError, ProcessingStage, Result};
use crate::protocol::{ClientMessage, MeetingStatus, ServerMessage};
use crate::transcribe::{DocumentStore, MeetingRecord, TranscriptSegment, TranscriptionProvider};
use base64::Engine;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Accumulated state for one meeting while any connection is joined to it.
struct MeetingState {
    started_at: DateTime<Utc>,
    segments: Vec<TranscriptSegment>,
    last_stage: String,
    last_progress: u8,
}

impl MeetingState {
    fn new() -> Self {
        Self {
            started_at: Utc::now(),
            segments: Vec::new(),
            last_stage: "idle".to_string(),
            last_progress: 0,
        }
    }
}

/// Buffered PCM for the file-based chunk flow.
struct ChunkBuffer {
    pcm: Vec<u8>,
    sample_rate: u32,
    channels: u16,
    language: Option<String>,
}

pub struct SessionCoordinator {
    config: CoordinatorConfig,
    registry: Arc<ConnectionRegistry>,
    rooms: Arc<RoomRouter>,
    intake: Arc<IntakePipeline>,
    provider: Arc<dyn TranscriptionProvider>,
    store: Arc<dyn DocumentStore>,

    accepting: AtomicBool,
    meetings: Mutex<HashMap<String, MeetingState>>,
    chunk_buffers: Mutex<HashMap<ConnectionId, ChunkBuffer>>,

    /// In-flight artifact processing tasks, joined (bounded) at shutdown
    processing_tasks: Mutex<Vec<JoinHandle<()>>>,
    /// Artifact paths owned by in-flight tasks; anything still here after an
    /// aborted drain is deleted so no orphaned output survives shutdown
    inflight_paths: Arc<Mutex<HashSet<PathBuf>>>,

    /// Liveness monitor + retention sweeper handles
    background_tasks: Mutex<Vec<JoinHandle<()>>>,
    cancel: CancellationToken,
}

impl SessionCoordinator {
    pub fn new(
        config: CoordinatorConfig,
        intake: IntakePipeline,
        provider: Arc<dyn TranscriptionProvider>,
        store: Arc<dyn DocumentStore>,
    ) -> Arc<Self> {
        let registry = ConnectionRegistry::new();
        let rooms = RoomRouter::new(Arc::clone(&registry));

        Arc::new(Self {
            config,
            registry,
            rooms,
            intake: Arc::new(intake),
            provider,
            store,
            accepting: AtomicBool::new(true),
            meetings: Mutex::new(HashMap::new()),
            chunk_buffers: Mutex::new(HashMap::new()),
            processing_tasks: Mutex::new(Vec::new()),
            inflight_paths: Arc::new(Mutex::new(HashSet::new())),
            background_tasks: Mutex::new(Vec::new()),
            cancel: CancellationToken::new(),
        })
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    pub fn rooms(&self) -> &Arc<RoomRouter> {
        &self.rooms
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    /// Start the liveness monitor and retention sweeper. Both run until
    /// shutdown cancels them.
    pub async fn start_background(self: &Arc<Self>, retention: RetentionConfig) {
        let liveness = super::liveness::spawn_liveness_monitor(
            Arc::clone(self),
            self.config.liveness_interval,
            self.cancel.child_token(),
        );
        let sweeper =
            crate::audio::spawn_retention_sweeper(retention, self.cancel.child_token());

        let mut tasks = self.background_tasks.lock().await;
        tasks.push(liveness);
        tasks.push(sweeper);
    }

    /// Admit a new transport. Refused while draining.
    pub async fn connect(&self, sender: mpsc::Sender<ServerMessage>) -> Result<ConnectionId> {
        if !self.accepting.load(Ordering::SeqCst) {
            return Err(ParleyError::Draining);
        }

        Ok(self.registry.admit(sender).await)
    }

    /// The one teardown path, used by transport close, protocol errors, and
    /// liveness eviction alike. The registry entry goes first, then room
    /// membership: `RoomRouter::join` re-checks the registry after insert,
    /// so whichever of a racing join/disconnect pair runs second clears the
    /// membership. Idempotent.
    pub async fn disconnect(&self, id: ConnectionId) {
        if self.registry.remove(id).await.is_some() {
            debug!("Connection {} closed", id);
        }

        if let Some(left) = self.rooms.leave(id).await {
            if left.now_empty {
                self.finalize_meeting(&left.meeting_id).await;
            }
        }

        let mut buffers = self.chunk_buffers.lock().await;
        buffers.remove(&id);
    }

    /// Handle one inbound text frame from a connection.
    pub async fn handle_text(self: &Arc<Self>, id: ConnectionId, text: &str) {
        self.registry.touch(id).await;

        match ClientMessage::parse(text) {
            Ok(message) => self.handle_message(id, message).await,
            Err(e) => {
                // Malformed input errors the sender only, never the room.
                self.reply_error(id, &e).await;
            }
        }
    }

    async fn handle_message(self: &Arc<Self>, id: ConnectionId, message: ClientMessage) {
        match message {
            ClientMessage::JoinMeeting {
                meeting_id,
                display_name,
                ..
            } => {
                self.join_meeting(id, &meeting_id, display_name).await;
            }

            ClientMessage::LeaveMeeting { .. } => {
                if let Some(left) = self.rooms.leave(id).await {
                    if left.now_empty {
                        self.finalize_meeting(&left.meeting_id).await;
                    }
                }
            }

            ClientMessage::AudioChunk {
                pcm,
                sample_rate,
                channels,
                final_chunk,
                language,
                ..
            } => {
                self.handle_audio_chunk(id, pcm, sample_rate, channels, final_chunk, language)
                    .await;
            }

            ClientMessage::StatusRequest { .. } => {
                self.reply_status(id).await;
            }

            ClientMessage::Pong { .. } => {
                self.registry.mark_alive(id).await;
            }
        }
    }

    async fn join_meeting(&self, id: ConnectionId, meeting_id: &str, display_name: Option<String>) {
        self.registry.set_display_name(id, display_name).await;

        if let Some(left) = self.rooms.join(id, meeting_id).await {
            // Joining implies leaving the previous room; that room may have
            // just emptied.
            if left.now_empty && left.meeting_id != meeting_id {
                self.finalize_meeting(&left.meeting_id).await;
            }
        }

        let progress = {
            let mut meetings = self.meetings.lock().await;
            let state = meetings
                .entry(meeting_id.to_string())
                .or_insert_with(MeetingState::new);
            state.last_progress
        };

        let ack = ServerMessage::processing_status(Some(meeting_id), progress, "joined");
        if let Err(e) = self.registry.send_to(id, ack).await {
            debug!("Join ack to {} failed: {}", id, e);
        }
    }

    async fn handle_audio_chunk(
        self: &Arc<Self>,
        id: ConnectionId,
        pcm: String,
        sample_rate: u32,
        channels: u16,
        final_chunk: bool,
        language: Option<String>,
    ) {
        let Some(info) = self.registry.lookup(id).await else {
            return;
        };

        let Some(meeting_id) = info.meeting_id else {
            let e = ParleyError::InvalidMessage {
                reason: "join a meeting before sending audio".to_string(),
            };
            self.reply_error(id, &e).await;
            return;
        };

        let bytes = match base64::engine::general_purpose::STANDARD.decode(&pcm) {
            Ok(bytes) => bytes,
            Err(e) => {
                let e = ParleyError::InvalidMessage {
                    reason: format!("audio-chunk pcm is not valid base64: {}", e),
                };
                self.reply_error(id, &e).await;
                return;
            }
        };

        let language = language.or_else(|| self.config.default_language.clone());

        if self.provider.supports_streaming() {
            self.stream_chunk(id, &meeting_id, bytes, sample_rate, channels, final_chunk, language)
                .await;
        } else {
            self.buffer_chunk(id, &meeting_id, bytes, sample_rate, channels, final_chunk, language)
                .await;
        }
    }

    /// Streaming flow: forward the chunk to the provider and push whatever
    /// segments come back to the whole room.
    #[allow(clippy::too_many_arguments)]
    async fn stream_chunk(
        &self,
        id: ConnectionId,
        meeting_id: &str,
        bytes: Vec<u8>,
        sample_rate: u32,
        channels: u16,
        final_chunk: bool,
        language: Option<String>,
    ) {
        let result = tokio::time::timeout(
            self.config.processing_timeout,
            self.provider.transcribe_chunk(
                meeting_id,
                &bytes,
                sample_rate,
                channels,
                final_chunk,
                language.as_deref(),
            ),
        )
        .await;

        match result {
            Ok(Ok(segments)) => {
                self.accumulate_and_broadcast(meeting_id, segments).await;
            }
            Ok(Err(e)) => {
                self.report_processing_failure(meeting_id, Some(id), &e).await;
            }
            Err(_) => {
                let e = ParleyError::ProcessingTimeout {
                    timeout_secs: self.config.processing_timeout.as_secs(),
                };
                self.report_processing_failure(meeting_id, Some(id), &e).await;
            }
        }
    }

    /// File-based flow: buffer until the final chunk, then hand the whole
    /// recording to the intake pipeline on a worker task.
    #[allow(clippy::too_many_arguments)]
    async fn buffer_chunk(
        self: &Arc<Self>,
        id: ConnectionId,
        meeting_id: &str,
        bytes: Vec<u8>,
        sample_rate: u32,
        channels: u16,
        final_chunk: bool,
        language: Option<String>,
    ) {
        let buffer = {
            let mut buffers = self.chunk_buffers.lock().await;
            let buffer = buffers.entry(id).or_insert_with(|| ChunkBuffer {
                pcm: Vec::new(),
                sample_rate,
                channels,
                language: language.clone(),
            });

            if buffer.pcm.len() + bytes.len() > self.config.max_chunk_buffer_bytes {
                buffers.remove(&id);
                drop(buffers);
                let e = ParleyError::InvalidAudio {
                    reason: format!(
                        "buffered audio exceeds the {} byte limit",
                        self.config.max_chunk_buffer_bytes
                    ),
                };
                self.reply_error(id, &e).await;
                return;
            }

            buffer.pcm.extend_from_slice(&bytes);
            buffer.sample_rate = sample_rate;
            buffer.channels = channels;
            if language.is_some() {
                buffer.language = language;
            }

            if !final_chunk {
                return;
            }
            buffers.remove(&id)
        };

        if let Some(buffer) = buffer {
            if buffer.pcm.is_empty() {
                debug!("Final chunk with no buffered audio from {}", id);
                return;
            }
            self.spawn_buffer_processing(meeting_id.to_string(), id, buffer)
                .await;
        }
    }

    /// Spawn the worker task for a buffered recording. Transcoding is long
    /// running and must not block message dispatch.
    async fn spawn_buffer_processing(
        self: &Arc<Self>,
        meeting_id: String,
        origin: ConnectionId,
        buffer: ChunkBuffer,
    ) {
        let coordinator = Arc::clone(self);
        let handle = tokio::spawn(async move {
            coordinator
                .process_buffered_audio(meeting_id, origin, buffer)
                .await;
        });

        self.track_processing_task(handle).await;
    }

    async fn process_buffered_audio(
        self: Arc<Self>,
        meeting_id: String,
        origin: ConnectionId,
        buffer: ChunkBuffer,
    ) {
        self.push_status(&meeting_id, 10, "validating").await;

        let path = self
            .intake
            .intake_dir()
            .join(format!("stream-{}.wav", Uuid::new_v4()));
        self.register_path(&path).await;

        let language = buffer.language.clone();
        let write_path = path.clone();
        let written = tokio::task::spawn_blocking(move || write_buffer_wav(&write_path, &buffer))
            .await
            .unwrap_or_else(|e| {
                Err(ParleyError::Processing {
                    stage: ProcessingStage::Transcode,
                    message: format!("buffer writer panicked: {}", e),
                })
            });

        let size_bytes = match written {
            Ok(size) => size,
            Err(e) => {
                self.report_processing_failure(&meeting_id, Some(origin), &e).await;
                self.release_path(&path).await;
                cleanup(&path);
                return;
            }
        };

        let upload = AudioUpload {
            path: path.clone(),
            declared_media_type: "audio/wav".to_string(),
            declared_size_bytes: size_bytes,
        };

        let intake = Arc::clone(&self.intake);
        let validated = tokio::task::spawn_blocking(move || intake.validate(&upload))
            .await
            .unwrap_or_else(|e| {
                Err(ParleyError::Processing {
                    stage: ProcessingStage::Probe,
                    message: format!("validation worker panicked: {}", e),
                })
            });

        match validated {
            Ok(artifact) => {
                self.run_artifact(meeting_id, Some(origin), artifact, language)
                    .await;
            }
            Err(e) => {
                self.report_processing_failure(&meeting_id, Some(origin), &e).await;
                self.release_path(&path).await;
                cleanup(&path);
            }
        }
    }

    /// File-based intake entry used by the HTTP upload route: the body is
    /// already on disk-bound bytes; validation happens inline so the caller
    /// gets a proper rejection, processing continues on a worker task.
    pub async fn ingest_upload(
        self: &Arc<Self>,
        meeting_id: &str,
        media_type: &str,
        bytes: Vec<u8>,
        language: Option<String>,
    ) -> Result<Uuid> {
        if !self.accepting.load(Ordering::SeqCst) {
            return Err(ParleyError::Draining);
        }

        let path = self.intake.intake_dir().join(format!(
            "upload-{}.{}",
            Uuid::new_v4(),
            extension_for(media_type)
        ));

        let upload = AudioUpload {
            path: path.clone(),
            declared_media_type: media_type.to_string(),
            declared_size_bytes: bytes.len() as u64,
        };

        self.register_path(&path).await;
        if let Err(e) = tokio::fs::write(&path, &bytes).await {
            self.release_path(&path).await;
            return Err(e.into());
        }

        let intake = Arc::clone(&self.intake);
        let validated = tokio::task::spawn_blocking(move || intake.validate(&upload))
            .await
            .unwrap_or_else(|e| {
                Err(ParleyError::Processing {
                    stage: ProcessingStage::Probe,
                    message: format!("validation worker panicked: {}", e),
                })
            });

        let artifact = match validated {
            Ok(artifact) => artifact,
            Err(e) => {
                self.release_path(&path).await;
                cleanup(&path);
                return Err(e);
            }
        };

        let artifact_id = artifact.id;
        let coordinator = Arc::clone(self);
        let meeting = meeting_id.to_string();
        let language = language.or_else(|| self.config.default_language.clone());
        let handle = tokio::spawn(async move {
            coordinator.run_artifact(meeting, None, artifact, language).await;
        });
        self.track_processing_task(handle).await;

        Ok(artifact_id)
    }

    /// Process a validated artifact and push its transcript to the room:
    /// transcode (bounded), transcribe (bounded), broadcast, clean up. Both
    /// the origin and the processed file are deleted on every exit path;
    /// paths stay registered until then so shutdown can reclaim them.
    async fn run_artifact(
        self: &Arc<Self>,
        meeting_id: String,
        origin: Option<ConnectionId>,
        artifact: AudioArtifact,
        language: Option<String>,
    ) {
        let origin_path = artifact.origin_path.clone();
        let processed_path = self
            .intake
            .processed_dir()
            .join(format!("{}.wav", artifact.id));
        let part_path = processed_path.with_extension("wav.part");
        self.register_path(&processed_path).await;
        self.register_path(&part_path).await;

        self.push_status(&meeting_id, 40, "transcoding").await;

        let intake = Arc::clone(&self.intake);
        let to_process = artifact.clone();
        let processed = tokio::time::timeout(
            self.config.processing_timeout,
            tokio::task::spawn_blocking(move || intake.process(&to_process)),
        )
        .await;

        let processed = match processed {
            Ok(Ok(result)) => result,
            Ok(Err(join_error)) => Err(ParleyError::Processing {
                stage: ProcessingStage::Transcode,
                message: format!("processing worker panicked: {}", join_error),
            }),
            Err(_) => Err(ParleyError::ProcessingTimeout {
                timeout_secs: self.config.processing_timeout.as_secs(),
            }),
        };

        let processed = match processed {
            Ok(processed) => processed,
            Err(e) => {
                self.report_processing_failure(&meeting_id, origin, &e).await;
                self.cleanup_paths(&[&origin_path, &processed_path, &part_path])
                    .await;
                return;
            }
        };

        info!(
            "Artifact {} canonicalized in {}ms (model {})",
            processed.artifact.id, processed.metadata.processing_ms, processed.metadata.model
        );

        self.push_status(&meeting_id, 70, "transcribing").await;

        let transcript = tokio::time::timeout(
            self.config.processing_timeout,
            self.provider
                .transcribe_file(&meeting_id, &processed_path, language.as_deref()),
        )
        .await;

        // Handoff is over either way once the provider call returns: both
        // variants are deleted before anyone hears about the outcome; the
        // retention sweeper is only a backstop for crashes.
        self.cleanup_paths(&[&origin_path, &processed_path, &part_path])
            .await;

        match transcript {
            Ok(Ok(segments)) => {
                self.accumulate_and_broadcast(&meeting_id, segments).await;
                self.push_status(&meeting_id, 100, "complete").await;
            }
            Ok(Err(e)) => {
                self.report_processing_failure(&meeting_id, origin, &e).await;
            }
            Err(_) => {
                let e = ParleyError::ProcessingTimeout {
                    timeout_secs: self.config.processing_timeout.as_secs(),
                };
                self.report_processing_failure(&meeting_id, origin, &e).await;
            }
        }
    }

    /// Append segments to the meeting transcript and push them to every
    /// member of the room, the sender included.
    async fn accumulate_and_broadcast(&self, meeting_id: &str, segments: Vec<TranscriptSegment>) {
        if segments.is_empty() {
            return;
        }

        {
            let mut meetings = self.meetings.lock().await;
            let state = meetings
                .entry(meeting_id.to_string())
                .or_insert_with(MeetingState::new);
            state.segments.extend(segments.iter().cloned());
        }

        for segment in segments {
            self.rooms
                .broadcast_room(
                    meeting_id,
                    ServerMessage::transcription_update(meeting_id, segment),
                    None,
                )
                .await;
        }
    }

    /// Processing failures are reported to the originating room as a status
    /// message, with the detail sent to the originating connection. They
    /// never cross into other meetings.
    async fn report_processing_failure(
        &self,
        meeting_id: &str,
        origin: Option<ConnectionId>,
        e: &ParleyError,
    ) {
        error!("Processing for meeting {} failed: {}", meeting_id, e);
        self.push_status(meeting_id, 100, "failed").await;

        if let Some(origin) = origin {
            self.reply_error(origin, e).await;
        }
    }

    async fn push_status(&self, meeting_id: &str, progress: u8, stage: &str) {
        {
            let mut meetings = self.meetings.lock().await;
            let state = meetings
                .entry(meeting_id.to_string())
                .or_insert_with(MeetingState::new);
            state.last_progress = progress;
            state.last_stage = stage.to_string();
        }

        self.rooms
            .broadcast_room(
                meeting_id,
                ServerMessage::processing_status(Some(meeting_id), progress, stage),
                None,
            )
            .await;
    }

    async fn reply_status(&self, id: ConnectionId) {
        let Some(info) = self.registry.lookup(id).await else {
            return;
        };

        let message = match info.meeting_id {
            Some(meeting_id) => match self.meeting_status(&meeting_id).await {
                Some((status, progress, stage)) => {
                    ServerMessage::meeting_status(status, progress, &stage)
                }
                None => ServerMessage::processing_status(Some(meeting_id.as_str()), 0, "idle"),
            },
            None => ServerMessage::processing_status(None, 0, "idle"),
        };

        if let Err(e) = self.registry.send_to(id, message).await {
            debug!("Status reply to {} failed: {}", id, e);
        }
    }

    /// Snapshot of a meeting's accumulated state, also served over HTTP.
    pub async fn meeting_status(&self, meeting_id: &str) -> Option<(MeetingStatus, u8, String)> {
        let member_count = self.rooms.member_count(meeting_id).await;
        let meetings = self.meetings.lock().await;
        let state = meetings.get(meeting_id)?;

        let duration = Utc::now().signed_duration_since(state.started_at);
        let status = MeetingStatus {
            meeting_id: meeting_id.to_string(),
            member_count,
            segment_count: state.segments.len(),
            duration_secs: duration.num_milliseconds() as f64 / 1000.0,
        };

        Some((status, state.last_progress, state.last_stage.clone()))
    }

    /// Transcript accumulated so far for a meeting.
    pub async fn meeting_transcript(&self, meeting_id: &str) -> Option<Vec<TranscriptSegment>> {
        let meetings = self.meetings.lock().await;
        meetings.get(meeting_id).map(|state| state.segments.clone())
    }

    async fn reply_error(&self, id: ConnectionId, e: &ParleyError) {
        if let Err(send_err) = self.registry.send_to(id, ServerMessage::error(e)).await {
            debug!("Error reply to {} failed: {}", id, send_err);
        }
    }

    /// Assemble and persist the finished meeting record. Called when the
    /// last member leaves a room and once per meeting at shutdown.
    async fn finalize_meeting(&self, meeting_id: &str) {
        let state = {
            let mut meetings = self.meetings.lock().await;
            meetings.remove(meeting_id)
        };

        let Some(state) = state else {
            return;
        };

        if state.segments.is_empty() {
            debug!("Meeting {} finished with no transcript, nothing to store", meeting_id);
            return;
        }

        let mut speakers: Vec<String> = state
            .segments
            .iter()
            .filter_map(|s| s.speaker.clone())
            .collect();
        speakers.sort();
        speakers.dedup();

        let duration = Utc::now().signed_duration_since(state.started_at);
        let record = MeetingRecord {
            meeting_id: meeting_id.to_string(),
            title: meeting_id.to_string(),
            segments: state.segments,
            speakers,
            summary: None,
            duration_secs: duration.num_milliseconds() as f64 / 1000.0,
            finished_at: Utc::now(),
        };

        info!(
            "Meeting {} finished: {} segments over {:.1}s",
            meeting_id,
            record.segments.len(),
            record.duration_secs
        );

        if let Err(e) = self.store.save(&self.config.record_owner, &record).await {
            // Persistence is the store's problem; the coordinator only
            // surfaces the failure.
            error!("Failed to store record for meeting {}: {}", meeting_id, e);
        }
    }

    /// Graceful shutdown: stop admitting, cancel background tasks, notify
    /// every connection, drain in-flight processing within the grace period,
    /// reclaim any artifact files the drain abandoned, then close all
    /// transports.
    pub async fn shutdown(self: &Arc<Self>) {
        if self.accepting.swap(false, Ordering::SeqCst) {
            info!("Coordinator shutting down");
        }

        // Background tasks (liveness, retention) go first so nothing evicts
        // or sweeps underneath the drain.
        self.cancel.cancel();
        let background = {
            let mut tasks = self.background_tasks.lock().await;
            std::mem::take(&mut *tasks)
        };
        for task in background {
            if let Err(e) = task.await {
                if !e.is_cancelled() {
                    error!("Background task panicked during shutdown: {}", e);
                }
            }
        }

        self.rooms
            .broadcast_all(ServerMessage::shutdown("coordinator is shutting down"))
            .await;

        // Bounded drain of in-flight processing.
        let mut handles = {
            let mut tasks = self.processing_tasks.lock().await;
            std::mem::take(&mut *tasks)
        };

        let drained = tokio::time::timeout(self.config.shutdown_grace, async {
            for handle in handles.iter_mut() {
                if let Err(e) = handle.await {
                    if !e.is_cancelled() {
                        error!("Processing task panicked during drain: {}", e);
                    }
                }
            }
        })
        .await;

        if drained.is_err() {
            warn!(
                "Shutdown grace of {:?} elapsed with processing still in flight, aborting",
                self.config.shutdown_grace
            );
            for handle in &handles {
                handle.abort();
            }
        }

        // Reclaim artifacts abandoned by aborted tasks so nothing orphaned
        // survives on disk.
        let leftover: Vec<PathBuf> = {
            let mut paths = self.inflight_paths.lock().await;
            paths.drain().collect()
        };
        for path in leftover {
            cleanup(&path);
        }

        // Flush records for meetings that still had members.
        let remaining: Vec<String> = {
            let meetings = self.meetings.lock().await;
            meetings.keys().cloned().collect()
        };
        for meeting_id in remaining {
            self.finalize_meeting(&meeting_id).await;
        }

        let closed = self.registry.clear().await;
        info!("Shutdown complete, {} transports closed", closed);
    }

    async fn track_processing_task(&self, handle: JoinHandle<()>) {
        let mut tasks = self.processing_tasks.lock().await;
        tasks.retain(|task| !task.is_finished());
        tasks.push(handle);
    }

    async fn register_path(&self, path: &PathBuf) {
        let mut paths = self.inflight_paths.lock().await;
        paths.insert(path.clone());
    }

    async fn release_path(&self, path: &PathBuf) {
        let mut paths = self.inflight_paths.lock().await;
        paths.remove(path);
    }

    async fn cleanup_paths(&self, targets: &[&PathBuf]) {
        for path in targets {
            self.release_path(path).await;
            cleanup(path);
        }
    }
}

/// Write buffered PCM out as a WAV file in its declared format; the intake
/// pipeline canonicalizes it from there.
fn write_buffer_wav(path: &PathBuf, buffer: &ChunkBuffer) -> Result<u64> {
    let spec = hound::WavSpec {
        channels: buffer.channels.max(1),
        sample_rate: buffer.sample_rate.max(1),
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut writer = hound::WavWriter::create(path, spec).map_err(|e| ParleyError::Processing {
        stage: ProcessingStage::Transcode,
        message: format!("failed to create {}: {}", path.display(), e),
    })?;

    for sample in buffer.pcm.chunks_exact(2) {
        let value = i16::from_le_bytes([sample[0], sample[1]]);
        writer
            .write_sample(value)
            .map_err(|e| ParleyError::Processing {
                stage: ProcessingStage::Transcode,
                message: format!("failed to write sample: {}", e),
            })?;
    }

    writer.finalize().map_err(|e| ParleyError::Processing {
        stage: ProcessingStage::Transcode,
        message: format!("failed to finalize {}: {}", path.display(), e),
    })?;

    Ok(std::fs::metadata(path).map(|m| m.len()).unwrap_or(0))
}

fn extension_for(media_type: &str) -> &'static str {
    match media_type {
        "audio/wav" | "audio/x-wav" | "audio/wave" => "wav",
        "audio/mpeg" | "audio/mp3" => "mp3",
        "audio/mp4" | "audio/x-m4a" | "audio/m4a" => "m4a",
        "audio/flac" | "audio/x-flac" => "flac",
        "audio/ogg" => "ogg",
        _ => "bin",
    }
}
