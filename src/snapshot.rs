use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::view::FrameSnapshot;
use crate::world::Millis;

#[derive(Serialize)]
struct SnapshotFile<'a> {
    scenario: &'a str,
    written_at: DateTime<Utc>,
    frame: &'a FrameSnapshot,
}

/// Writes frames as pretty JSON under `<dir>/<scenario>/`.
pub struct SnapshotWriter {
    dir: PathBuf,
    interval_ms: Millis,
}

impl SnapshotWriter {
    pub fn new(dir: impl AsRef<Path>, interval_ms: Millis) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            interval_ms,
        }
    }

    /// Zero disables snapshots.
    pub fn interval_ms(&self) -> Millis {
        self.interval_ms
    }

    pub fn path_for(&self, scenario: &str, now_ms: Millis) -> PathBuf {
        self.dir
            .join(scenario)
            .join(format!("t_{:09}.json", now_ms.max(0)))
    }

    pub fn write(&self, scenario: &str, frame: &FrameSnapshot) -> Result<PathBuf> {
        let path = self.path_for(scenario, frame.now_ms);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let payload = SnapshotFile {
            scenario,
            written_at: Utc::now(),
            frame,
        };
        let json = serde_json::to_string_pretty(&payload)?;
        fs::write(&path, json).with_context(|| format!("Failed to write {}", path.display()))?;
        tracing::debug!(path = %path.display(), "snapshot written");
        Ok(path)
    }
}
