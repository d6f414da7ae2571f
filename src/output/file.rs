//! JSON file sink

use super::messages::BpmRecord;
use super::SinkError;
use std::path::{Path, PathBuf};

/// Overwrites a JSON file with the latest BPM on every publish
#[derive(Debug, Clone)]
pub struct FileSink {
    path: PathBuf,
}

impl FileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn publish(&self, bpm: u32) -> Result<(), SinkError> {
        let json = serde_json::to_string(&BpmRecord::new(bpm))?;
        tokio::fs::write(&self.path, json)
            .await
            .map_err(|source| SinkError::Io {
                target: self.path.display().to_string(),
                source,
            })
    }
}
