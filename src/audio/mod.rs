pub mod artifact;
pub mod intake;
pub mod retention;

pub use artifact::{AudioArtifact, AudioUpload, ProcessedAudio, ProcessingMetadata};
pub use intake::{cleanup, IntakePipeline, CANONICAL_CHANNELS, CANONICAL_SAMPLE_RATE};
pub use retention::{spawn_retention_sweeper, sweep, SweepStats};
