// Integration tests for the retention sweeper
//
// These tests verify the age threshold (delete past max_age, preserve
// within it) and that per-entry failures never abort the rest of a sweep.

use anyhow::Result;
use parley::sweep;
use std::fs;
use std::path::PathBuf;
use std::time::{Duration, SystemTime};
use tempfile::TempDir;

const HOUR: Duration = Duration::from_secs(3600);

#[test]
fn test_sweep_deletes_entries_older_than_max_age() -> Result<()> {
    let temp = TempDir::new()?;
    let file = temp.path().join("stale.wav");
    fs::write(&file, b"pcm")?;

    // File was written "now"; sweeping from two hours in the future makes
    // it two hours old against a one hour window
    let now = SystemTime::now() + 2 * HOUR;
    let stats = sweep(&[temp.path().to_path_buf()], HOUR, now);

    assert_eq!(stats.examined, 1);
    assert_eq!(stats.deleted, 1);
    assert_eq!(stats.failed, 0);
    assert!(!file.exists(), "stale file should be deleted");

    Ok(())
}

#[test]
fn test_sweep_preserves_entries_within_max_age() -> Result<()> {
    let temp = TempDir::new()?;
    let file = temp.path().join("fresh.wav");
    fs::write(&file, b"pcm")?;

    // 30 minutes old against a one hour window
    let now = SystemTime::now() + HOUR / 2;
    let stats = sweep(&[temp.path().to_path_buf()], HOUR, now);

    assert_eq!(stats.examined, 1);
    assert_eq!(stats.deleted, 0);
    assert!(file.exists(), "fresh file should be preserved");

    Ok(())
}

#[test]
fn test_sweep_covers_multiple_directories() -> Result<()> {
    let intake = TempDir::new()?;
    let processed = TempDir::new()?;
    fs::write(intake.path().join("a.wav"), b"pcm")?;
    fs::write(processed.path().join("b.wav"), b"pcm")?;

    let dirs = vec![intake.path().to_path_buf(), processed.path().to_path_buf()];
    let stats = sweep(&dirs, HOUR, SystemTime::now() + 2 * HOUR);

    assert_eq!(stats.examined, 2);
    assert_eq!(stats.deleted, 2);

    Ok(())
}

#[test]
fn test_sweep_missing_directory_does_not_abort() -> Result<()> {
    let temp = TempDir::new()?;
    let file = temp.path().join("stale.wav");
    fs::write(&file, b"pcm")?;

    // The unreadable directory is logged and skipped; the real one is
    // still swept
    let dirs = vec![
        PathBuf::from("/nonexistent/sweep/dir"),
        temp.path().to_path_buf(),
    ];
    let stats = sweep(&dirs, HOUR, SystemTime::now() + 2 * HOUR);

    assert_eq!(stats.failed, 1);
    assert_eq!(stats.deleted, 1);
    assert!(!file.exists());

    Ok(())
}

#[test]
fn test_sweep_ignores_subdirectories() -> Result<()> {
    let temp = TempDir::new()?;
    fs::create_dir(temp.path().join("nested"))?;
    fs::write(temp.path().join("stale.wav"), b"pcm")?;

    let stats = sweep(&[temp.path().to_path_buf()], HOUR, SystemTime::now() + 2 * HOUR);

    assert_eq!(stats.examined, 1, "directories are not counted as entries");
    assert_eq!(stats.deleted, 1);
    assert!(temp.path().join("nested").exists());

    Ok(())
}

#[test]
fn test_sweep_on_empty_directory_is_a_noop() -> Result<()> {
    let temp = TempDir::new()?;
    let stats = sweep(&[temp.path().to_path_buf()], HOUR, SystemTime::now());

    assert_eq!(stats.examined, 0);
    assert_eq!(stats.deleted, 0);
    assert_eq!(stats.failed, 0);

    Ok(())
}
