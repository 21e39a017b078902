//! Filesystem document store: finished meeting records as JSON documents.
//!
//! The reference deployment points this at a notes vault so finished
//! meetings show up as documents; any failure is surfaced to the caller and
//! never crosses into live sessions.

use super::{DocumentStore, MeetingRecord};
use crate::error::{ParleyError, Result};
use std::path::PathBuf;
use tracing::info;

pub struct JsonDocumentStore {
    root: PathBuf,
}

impl JsonDocumentStore {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }
}

#[async_trait::async_trait]
impl DocumentStore for JsonDocumentStore {
    async fn save(&self, owner: &str, record: &MeetingRecord) -> Result<()> {
        let file_name = format!("{}-{}.json", owner, sanitize(&record.meeting_id));
        let path = self.root.join(file_name);

        let payload =
            serde_json::to_vec_pretty(record).map_err(|e| ParleyError::Store {
                message: format!("failed to encode record: {}", e),
            })?;

        tokio::fs::write(&path, payload)
            .await
            .map_err(|e| ParleyError::Store {
                message: format!("failed to write {}: {}", path.display(), e),
            })?;

        info!(
            "Stored meeting record {} ({} segments)",
            path.display(),
            record.segments.len()
        );

        Ok(())
    }
}

/// Meeting ids are opaque caller-supplied strings; keep file names tame.
fn sanitize(meeting_id: &str) -> String {
    meeting_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
        .collect()
}
