pub mod audio;
pub mod config;
pub mod error;
pub mod http;
pub mod protocol;
pub mod session;
pub mod transcribe;

pub use audio::{
    cleanup, spawn_retention_sweeper, sweep, AudioArtifact, AudioUpload, IntakePipeline,
    ProcessedAudio, ProcessingMetadata, SweepStats, CANONICAL_CHANNELS, CANONICAL_SAMPLE_RATE,
};
pub use config::Config;
pub use error::{ParleyError, ProcessingStage, Result};
pub use http::{create_router, AppState};
pub use protocol::{ClientMessage, MeetingStatus, ServerMessage};
pub use session::{
    ConnectionId, ConnectionRegistry, CoordinatorConfig, Liveness, RoomRouter, SessionCoordinator,
};
pub use transcribe::{
    DocumentStore, JsonDocumentStore, MeetingRecord, NatsTranscriptionProvider, TranscriptSegment,
    TranscriptionProvider,
};
