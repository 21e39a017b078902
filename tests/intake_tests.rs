// Integration tests for the audio intake pipeline
//
// These tests verify upload validation (size, media type, decodability)
// and that processing always yields the canonical format: mono, 16 kHz,
// 16-bit PCM, with no partial output left behind.

mod common;

use anyhow::Result;
use parley::audio::AudioUpload;
use parley::error::{ParleyError, ProcessingStage};
use parley::{IntakePipeline, CANONICAL_CHANNELS, CANONICAL_SAMPLE_RATE};
use std::fs;
use tempfile::TempDir;

fn pipeline(temp: &TempDir) -> IntakePipeline {
    IntakePipeline::new(common::audio_config(temp)).expect("intake pipeline")
}

fn wav_upload(temp: &TempDir, sample_rate: u32, channels: u16, seconds: f32) -> AudioUpload {
    let path = temp.path().join("upload.wav");
    common::write_wav(&path, sample_rate, channels, seconds);
    let size = fs::metadata(&path).unwrap().len();

    AudioUpload {
        path,
        declared_media_type: "audio/wav".to_string(),
        declared_size_bytes: size,
    }
}

#[tokio::test]
async fn test_validate_rejects_oversized_upload() -> Result<()> {
    let temp = TempDir::new()?;
    let intake = pipeline(&temp);

    // 150 MB declared against the 100 MB limit
    let mut upload = wav_upload(&temp, 16000, 1, 0.1);
    upload.declared_size_bytes = 150 * 1024 * 1024;

    let err = intake.validate(&upload).unwrap_err();
    match &err {
        ParleyError::InvalidAudio { reason } => {
            assert!(
                reason.contains(&(100 * 1024 * 1024).to_string()),
                "reason should mention the limit, got: {}",
                reason
            );
        }
        other => panic!("expected InvalidAudio, got {:?}", other),
    }

    Ok(())
}

#[tokio::test]
async fn test_validate_accepts_supported_upload() -> Result<()> {
    let temp = TempDir::new()?;
    let intake = pipeline(&temp);

    // 5 MB declared, supported media type, real decodable bytes
    let mut upload = wav_upload(&temp, 16000, 1, 0.1);
    upload.declared_size_bytes = 5 * 1024 * 1024;

    let artifact = intake.validate(&upload)?;
    assert_eq!(artifact.media_type, "audio/wav");
    assert_eq!(artifact.size_bytes, 5 * 1024 * 1024);
    assert!(artifact.processed_path.is_none());

    Ok(())
}

#[tokio::test]
async fn test_validate_rejects_unsupported_media_type() -> Result<()> {
    let temp = TempDir::new()?;
    let intake = pipeline(&temp);

    let mut upload = wav_upload(&temp, 16000, 1, 0.1);
    upload.declared_media_type = "video/avi".to_string();

    let err = intake.validate(&upload).unwrap_err();
    match &err {
        ParleyError::InvalidAudio { reason } => {
            assert!(reason.contains("unsupported media type"), "got: {}", reason);
        }
        other => panic!("expected InvalidAudio, got {:?}", other),
    }

    Ok(())
}

#[tokio::test]
async fn test_validate_rejects_undecodable_bytes() -> Result<()> {
    let temp = TempDir::new()?;
    let intake = pipeline(&temp);

    // Correct declared type, but the bytes are not audio
    let path = temp.path().join("garbage.wav");
    fs::write(&path, b"this is not a riff container at all")?;

    let upload = AudioUpload {
        path,
        declared_media_type: "audio/wav".to_string(),
        declared_size_bytes: 35,
    };

    let err = intake.validate(&upload).unwrap_err();
    match &err {
        ParleyError::InvalidAudio { reason } => {
            assert!(reason.contains("no decodable audio stream"), "got: {}", reason);
        }
        other => panic!("expected InvalidAudio, got {:?}", other),
    }

    Ok(())
}

#[tokio::test]
async fn test_process_produces_canonical_output() -> Result<()> {
    let temp = TempDir::new()?;
    let intake = pipeline(&temp);

    // 44.1 kHz stereo input must come out mono 16 kHz
    let upload = wav_upload(&temp, 44100, 2, 1.0);
    let artifact = intake.validate(&upload)?;

    let processed = intake.process(&artifact)?;

    // Probed facts reflect the source
    assert_eq!(processed.artifact.sample_rate, Some(44100));
    assert_eq!(processed.artifact.channels, Some(2));
    let duration = processed.artifact.duration_secs.unwrap();
    assert!(
        (duration - 1.0).abs() < 0.05,
        "probed duration should be ~1s, got {}",
        duration
    );

    // The canonical variant is mono 16 kHz
    let processed_path = processed.artifact.processed_path.clone().expect("processed path");
    let reader = hound::WavReader::open(&processed_path)?;
    let spec = reader.spec();
    assert_eq!(spec.channels, CANONICAL_CHANNELS);
    assert_eq!(spec.sample_rate, CANONICAL_SAMPLE_RATE);
    assert_eq!(spec.bits_per_sample, 16);

    let sample_count = reader.len() as usize;
    assert!(
        (sample_count as i64 - 16000).unsigned_abs() < 200,
        "1s of audio should resample to ~16000 samples, got {}",
        sample_count
    );

    // Metadata records the run
    assert_eq!(processed.metadata.model, "whisper-small");
    assert!(!processed.metadata.volume_normalization);

    // No temp output is left next to the finished artifact
    let leftovers: Vec<_> = fs::read_dir(intake.processed_dir())?
        .filter_map(|e| e.ok())
        .filter(|e| e.path().extension().map(|x| x == "part").unwrap_or(false))
        .collect();
    assert!(leftovers.is_empty(), "no .part file should remain");

    Ok(())
}

#[tokio::test]
async fn test_process_already_canonical_passthrough() -> Result<()> {
    let temp = TempDir::new()?;
    let intake = pipeline(&temp);

    let upload = wav_upload(&temp, 16000, 1, 0.5);
    let artifact = intake.validate(&upload)?;
    let processed = intake.process(&artifact)?;

    let reader = hound::WavReader::open(processed.artifact.processed_path.unwrap())?;
    assert_eq!(reader.spec().sample_rate, CANONICAL_SAMPLE_RATE);
    assert_eq!(reader.spec().channels, CANONICAL_CHANNELS);

    Ok(())
}

#[tokio::test]
async fn test_probe_failure_is_reported_as_probe_stage() -> Result<()> {
    let temp = TempDir::new()?;
    let intake = pipeline(&temp);

    // Validate a real upload, then pull the file out from under process
    let upload = wav_upload(&temp, 16000, 1, 0.1);
    let artifact = intake.validate(&upload)?;
    fs::remove_file(&artifact.origin_path)?;

    let err = intake.process(&artifact).unwrap_err();
    match err {
        ParleyError::Processing { stage, .. } => assert_eq!(stage, ProcessingStage::Probe),
        other => panic!("expected Processing, got {:?}", other),
    }

    Ok(())
}

#[tokio::test]
async fn test_volume_normalization_raises_peak() -> Result<()> {
    let temp = TempDir::new()?;
    let mut config = common::audio_config(&temp);
    config.volume_normalization = true;
    let intake = IntakePipeline::new(config)?;

    // Quiet fixture: peak well below full scale
    let upload = wav_upload(&temp, 16000, 1, 0.5);
    let artifact = intake.validate(&upload)?;
    let processed = intake.process(&artifact)?;

    assert!(processed.metadata.volume_normalization);

    let reader = hound::WavReader::open(processed.artifact.processed_path.unwrap())?;
    let peak = reader
        .into_samples::<i16>()
        .filter_map(|s| s.ok())
        .map(|s| (s as i32).abs())
        .max()
        .unwrap_or(0);

    // The fixture peaks at 8000; normalization should push it near 90%
    assert!(
        peak > 25000,
        "normalized peak should approach full scale, got {}",
        peak
    );

    Ok(())
}

#[test]
fn test_cleanup_of_missing_file_is_silent() {
    // Best-effort: nothing to assert beyond "does not panic"
    parley::cleanup(std::path::Path::new("/nonexistent/artifact.wav"));
}
