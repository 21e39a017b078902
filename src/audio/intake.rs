//! Audio intake pipeline: validation, probing, and transcoding to the
//! canonical format (mono, 16 kHz, 16-bit linear PCM WAV).
//!
//! `process` is a strict two-step pipeline. Probe and transcode fail
//! independently, and a transcode failure never leaves a partial output
//! under the final path: output is written to a `.part` file and renamed
//! into place only on success.

use super::artifact::{AudioArtifact, AudioUpload, ProcessedAudio, ProcessingMetadata};
use crate::config::AudioConfig;
use crate::error::{ParleyError, ProcessingStage, Result};
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::time::Instant;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{info, warn};

/// Canonical output format expected by the transcription provider
pub const CANONICAL_SAMPLE_RATE: u32 = 16_000;
pub const CANONICAL_CHANNELS: u16 = 1;

/// Probed facts about the source stream
#[derive(Debug, Clone, Copy)]
struct StreamInfo {
    duration_secs: f64,
    sample_rate: u32,
    channels: u16,
}

pub struct IntakePipeline {
    config: AudioConfig,
}

impl IntakePipeline {
    pub fn new(config: AudioConfig) -> Result<Self> {
        fs::create_dir_all(&config.intake_path)?;
        fs::create_dir_all(&config.processed_path)?;

        info!(
            "Intake pipeline initialized: intake={}, processed={}, max_upload={} bytes",
            config.intake_path, config.processed_path, config.max_upload_bytes
        );

        Ok(Self { config })
    }

    pub fn intake_dir(&self) -> &Path {
        Path::new(&self.config.intake_path)
    }

    pub fn processed_dir(&self) -> &Path {
        Path::new(&self.config.processed_path)
    }

    /// Validate an upload: declared size, declared media type, and an actual
    /// decodable audio stream in the bytes on disk.
    pub fn validate(&self, upload: &AudioUpload) -> Result<AudioArtifact> {
        if upload.declared_size_bytes > self.config.max_upload_bytes {
            return Err(ParleyError::InvalidAudio {
                reason: format!(
                    "upload of {} bytes exceeds the {} byte limit",
                    upload.declared_size_bytes, self.config.max_upload_bytes
                ),
            });
        }

        let supported = self
            .config
            .allowed_media_types
            .iter()
            .any(|t| t.eq_ignore_ascii_case(&upload.declared_media_type));
        if !supported {
            return Err(ParleyError::InvalidAudio {
                reason: format!(
                    "unsupported media type: {} (accepted: {})",
                    upload.declared_media_type,
                    self.config.allowed_media_types.join(", ")
                ),
            });
        }

        // Guard against mislabeled or corrupt uploads: the declared type is
        // not trusted until the bytes actually probe as audio.
        probe_stream(&upload.path).map_err(|e| ParleyError::InvalidAudio {
            reason: format!("no decodable audio stream: {}", e),
        })?;

        let artifact = AudioArtifact::new(upload);
        info!(
            "Validated upload {} ({}, {} bytes)",
            artifact.id, artifact.media_type, artifact.size_bytes
        );

        Ok(artifact)
    }

    /// Run the two-step pipeline: probe stream facts, then transcode to the
    /// canonical format. CPU/IO-bound; callers offload this to a blocking
    /// worker and bound it with a timeout.
    pub fn process(&self, artifact: &AudioArtifact) -> Result<ProcessedAudio> {
        let started = Instant::now();

        // Step 1: probe
        let stream = probe_stream(&artifact.origin_path).map_err(|message| {
            ParleyError::Processing {
                stage: ProcessingStage::Probe,
                message,
            }
        })?;

        info!(
            "Probed artifact {}: {:.1}s, {} Hz, {} channels",
            artifact.id, stream.duration_secs, stream.sample_rate, stream.channels
        );

        // Step 2: transcode
        let processed_path = self
            .processed_dir()
            .join(format!("{}.wav", artifact.id));
        let transcode = self.transcode(&artifact.origin_path, &processed_path);

        let metadata = ProcessingMetadata {
            processing_ms: started.elapsed().as_millis() as u64,
            model: self.config.model.clone(),
            volume_normalization: self.config.volume_normalization,
            noise_reduction: self.config.noise_reduction,
        };

        match transcode {
            Ok(()) => {
                let mut artifact = artifact.clone();
                artifact.duration_secs = Some(stream.duration_secs);
                artifact.sample_rate = Some(stream.sample_rate);
                artifact.channels = Some(stream.channels);
                artifact.processed_path = Some(processed_path);

                info!(
                    "Processed artifact {} in {}ms",
                    artifact.id, metadata.processing_ms
                );

                Ok(ProcessedAudio { artifact, metadata })
            }
            Err(message) => {
                warn!(
                    "Transcode of artifact {} failed after {}ms: {}",
                    artifact.id, metadata.processing_ms, message
                );
                Err(ParleyError::Processing {
                    stage: ProcessingStage::Transcode,
                    message,
                })
            }
        }
    }

    fn transcode(&self, source: &Path, dest: &Path) -> std::result::Result<(), String> {
        let decoded = decode_to_mono_f32(source)?;

        let resampled = if decoded.sample_rate != CANONICAL_SAMPLE_RATE {
            resample(&decoded.samples, decoded.sample_rate, CANONICAL_SAMPLE_RATE)
        } else {
            decoded.samples
        };

        let samples = if self.config.volume_normalization {
            normalize_peak(resampled)
        } else {
            resampled
        };

        // Write to a temp path first so a failure never leaves a partial
        // file under the final path.
        let part_path = dest.with_extension("wav.part");
        let result = write_canonical_wav(&part_path, &samples);

        match result {
            Ok(()) => fs::rename(&part_path, dest)
                .map_err(|e| format!("failed to finalize {}: {}", dest.display(), e)),
            Err(message) => {
                cleanup(&part_path);
                Err(message)
            }
        }
    }
}

/// Best-effort deletion of an artifact path. Failures are logged and
/// swallowed; the retention sweeper picks up anything left behind.
pub fn cleanup(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => info!("Deleted artifact file {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to delete {}: {}", path.display(), e),
    }
}

/// Probe a file for its default audio track facts.
fn probe_stream(path: &Path) -> std::result::Result<StreamInfo, String> {
    let file =
        File::open(path).map_err(|e| format!("failed to open {}: {}", path.display(), e))?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| format!("format probe failed: {}", e))?;

    let track = probed
        .format
        .default_track()
        .ok_or_else(|| "no default audio track".to_string())?;

    let sample_rate = track
        .codec_params
        .sample_rate
        .ok_or_else(|| "stream has no sample rate".to_string())?;
    let channels = track
        .codec_params
        .channels
        .map(|c| c.count() as u16)
        .ok_or_else(|| "stream has no channel description".to_string())?;

    let duration_secs = match (track.codec_params.n_frames, track.codec_params.time_base) {
        (Some(frames), Some(tb)) => {
            let time = tb.calc_time(frames);
            time.seconds as f64 + time.frac
        }
        (Some(frames), None) => frames as f64 / sample_rate as f64,
        _ => 0.0,
    };

    Ok(StreamInfo {
        duration_secs,
        sample_rate,
        channels,
    })
}

struct DecodedMono {
    samples: Vec<f32>,
    sample_rate: u32,
}

/// Decode the whole source and downmix to mono by averaging channels.
fn decode_to_mono_f32(path: &Path) -> std::result::Result<DecodedMono, String> {
    let file =
        File::open(path).map_err(|e| format!("failed to open {}: {}", path.display(), e))?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| format!("format probe failed: {}", e))?;

    let mut format = probed.format;
    let track = format
        .default_track()
        .ok_or_else(|| "no default audio track".to_string())?;

    let sample_rate = track
        .codec_params
        .sample_rate
        .ok_or_else(|| "stream has no sample rate".to_string())?;
    let channels = track
        .codec_params
        .channels
        .map(|c| c.count())
        .unwrap_or(1)
        .max(1);

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| format!("failed to create decoder: {}", e))?;

    let track_id = track.id;
    let mut samples: Vec<f32> = Vec::new();

    loop {
        let packet = match format.next_packet() {
            Ok(p) => p,
            Err(symphonia::core::errors::Error::IoError(e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(e) => return Err(format!("failed to read packet: {}", e)),
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = decoder
            .decode(&packet)
            .map_err(|e| format!("failed to decode packet: {}", e))?;

        let spec = *decoded.spec();
        let capacity = decoded.capacity();

        let mut sample_buf = SampleBuffer::<f32>::new(capacity as u64, spec);
        sample_buf.copy_interleaved_ref(decoded);

        if channels == 1 {
            samples.extend(sample_buf.samples());
        } else {
            // Interleaved N-channel -> mono by averaging each frame
            for frame in sample_buf.samples().chunks_exact(channels) {
                samples.push(frame.iter().sum::<f32>() / channels as f32);
            }
        }
    }

    if samples.is_empty() {
        return Err("stream decoded to zero samples".to_string());
    }

    Ok(DecodedMono {
        samples,
        sample_rate,
    })
}

/// Simple linear interpolation resampling.
fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == to_rate || samples.is_empty() {
        return samples.to_vec();
    }

    let ratio = from_rate as f64 / to_rate as f64;
    let output_len = (samples.len() as f64 / ratio).ceil() as usize;

    (0..output_len)
        .map(|i| {
            let source_pos = i as f64 * ratio;
            let source_idx = source_pos.floor() as usize;
            let fraction = source_pos - source_idx as f64;

            if source_idx + 1 >= samples.len() {
                samples[samples.len() - 1]
            } else {
                let left = samples[source_idx] as f64;
                let right = samples[source_idx + 1] as f64;
                (left + (right - left) * fraction) as f32
            }
        })
        .collect()
}

/// Scale so the peak sits at 90% of full range. A silent stream is left
/// untouched.
fn normalize_peak(samples: Vec<f32>) -> Vec<f32> {
    let peak = samples.iter().fold(0.0f32, |acc, s| acc.max(s.abs()));
    if peak < f32::EPSILON {
        return samples;
    }

    let gain = 0.9 / peak;
    samples.into_iter().map(|s| s * gain).collect()
}

fn write_canonical_wav(path: &Path, samples: &[f32]) -> std::result::Result<(), String> {
    let spec = hound::WavSpec {
        channels: CANONICAL_CHANNELS,
        sample_rate: CANONICAL_SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut writer = hound::WavWriter::create(path, spec)
        .map_err(|e| format!("failed to create {}: {}", path.display(), e))?;

    for &sample in samples {
        let value = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
        writer
            .write_sample(value)
            .map_err(|e| format!("failed to write sample: {}", e))?;
    }

    writer
        .finalize()
        .map_err(|e| format!("failed to finalize {}: {}", path.display(), e))
}
