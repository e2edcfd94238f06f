use std::fs;
use std::path::{Path, PathBuf};

use tracing::warn;

use super::FrameSink;
use crate::AppResult;

/// Keeps `path` holding the most recent frame.
///
/// Each frame goes to a sibling `.tmp` file first and is renamed over the
/// target, so readers see either the previous or the new image, never a
/// partial one.
#[derive(Debug)]
pub struct SnapshotFile {
    path: PathBuf,
    tmp_path: PathBuf,
    written: u64,
}

impl SnapshotFile {
    pub fn new(path: impl Into<PathBuf>) -> SnapshotFile {
        let path = path.into();
        let mut tmp_path = path.clone().into_os_string();
        tmp_path.push(".tmp");
        SnapshotFile {
            path,
            tmp_path: PathBuf::from(tmp_path),
            written: 0,
        }
    }

    pub fn write(&mut self, frame: &[u8]) -> AppResult<()> {
        fs::write(&self.tmp_path, frame)?;
        fs::rename(&self.tmp_path, &self.path)?;
        self.written += 1;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn written(&self) -> u64 {
        self.written
    }
}

impl FrameSink for SnapshotFile {
    fn on_frame(&mut self, frame: &[u8]) {
        if let Err(err) = self.write(frame) {
            warn!("failed to write snapshot {}: {}", self.path.display(), err);
        }
    }
}
