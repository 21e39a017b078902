use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

/// An audio upload as handed to the intake pipeline: the bytes are already
/// on disk, the media type and size are what the caller declared.
#[derive(Debug, Clone)]
pub struct AudioUpload {
    pub path: PathBuf,
    pub declared_media_type: String,
    pub declared_size_bytes: u64,
}

/// An audio file tracked through intake, transcoding, and eventual deletion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioArtifact {
    pub id: Uuid,

    /// Where the validated upload lives
    pub origin_path: PathBuf,

    /// Declared media type of the upload
    pub media_type: String,

    pub size_bytes: u64,

    /// Probed stream facts; filled by the first processing step
    pub duration_secs: Option<f64>,
    pub sample_rate: Option<u32>,
    pub channels: Option<u16>,

    /// Canonical variant; set once transcoding succeeds and never mutated
    pub processed_path: Option<PathBuf>,

    pub created_at: DateTime<Utc>,
}

impl AudioArtifact {
    pub fn new(upload: &AudioUpload) -> Self {
        Self {
            id: Uuid::new_v4(),
            origin_path: upload.path.clone(),
            media_type: upload.declared_media_type.clone(),
            size_bytes: upload.declared_size_bytes,
            duration_secs: None,
            sample_rate: None,
            channels: None,
            processed_path: None,
            created_at: Utc::now(),
        }
    }
}

/// Record of what processing did to an artifact, consumed by downstream
/// reporting. Not retained by the coordinator itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingMetadata {
    /// Wall-clock processing time in milliseconds
    pub processing_ms: u64,

    /// Transcription model the artifact was prepared for
    pub model: String,

    /// Whether peak volume normalization was applied
    pub volume_normalization: bool,

    /// Whether noise reduction was applied
    pub noise_reduction: bool,
}

/// Result of a successful intake pipeline run.
#[derive(Debug, Clone)]
pub struct ProcessedAudio {
    pub artifact: AudioArtifact,
    pub metadata: ProcessingMetadata,
}
