use anyhow::Result;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Deserialize)]
pub struct Config {
    pub service: ServiceConfig,
    pub audio: AudioConfig,
    pub retention: RetentionConfig,
    pub liveness: LivenessConfig,
    pub shutdown: ShutdownConfig,
    pub nats: NatsConfig,
    pub store: StoreConfig,
}

#[derive(Debug, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
    pub http: HttpConfig,
}

#[derive(Debug, Deserialize)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AudioConfig {
    /// Directory where validated uploads land before transcoding
    pub intake_path: String,
    /// Directory for canonical (mono, 16 kHz, 16-bit PCM) artifacts
    pub processed_path: String,
    /// Maximum accepted upload size in bytes
    pub max_upload_bytes: u64,
    /// Accepted declared media types
    pub allowed_media_types: Vec<String>,
    /// Apply peak volume normalization during transcode
    #[serde(default)]
    pub volume_normalization: bool,
    /// Noise reduction flag recorded in processing metadata
    #[serde(default)]
    pub noise_reduction: bool,
    /// Transcription model identifier recorded in processing metadata
    pub model: String,
    /// Per-artifact processing timeout in seconds
    pub processing_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetentionConfig {
    /// Maximum artifact age in seconds before the sweeper deletes it
    pub max_age_secs: u64,
    /// How often the sweeper runs, in seconds (86400 = daily)
    pub sweep_interval_secs: u64,
    /// Directories the sweeper tracks
    pub directories: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LivenessConfig {
    /// Probe interval in seconds; an unanswered probe evicts on the next tick
    pub interval_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ShutdownConfig {
    /// Bounded grace period for drain, in seconds
    pub grace_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NatsConfig {
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// Directory finished meeting records are written to
    pub path: String,
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .build()?;

        Ok(settings.try_deserialize()?)
    }
}

impl RetentionConfig {
    pub fn max_age(&self) -> Duration {
        Duration::from_secs(self.max_age_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn directories(&self) -> Vec<PathBuf> {
        self.directories.iter().map(PathBuf::from).collect()
    }
}
