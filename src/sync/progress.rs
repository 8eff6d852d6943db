//! Durable upload cursor.
//!
//! A single-field JSON file next to the input data. The cursor only moves
//! forward, and only after the record at the previous position has been
//! confirmed accepted — a crash between acceptance and persist costs at
//! most one idempotent re-send on the next run.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::error::StoreError;

pub const PROGRESS_FILE: &str = "progress.json";

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
struct ProgressFile {
    next_index: usize,
}

pub struct ProgressStore {
    path: PathBuf,
}

impl ProgressStore {
    /// Store rooted in the directory holding the input data.
    pub fn new(dir: &Path) -> Self {
        Self {
            path: dir.join(PROGRESS_FILE),
        }
    }

    #[cfg(test)]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Persisted cursor, or 0 when there is none yet. A corrupt file is
    /// treated as a fresh start rather than an abort.
    pub fn load(&self) -> usize {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(_) => return 0,
        };
        match serde_json::from_str::<ProgressFile>(&contents) {
            Ok(progress) => progress.next_index,
            Err(e) => {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %e,
                    "progress file corrupt, starting from the beginning"
                );
                0
            }
        }
    }

    /// Persist a new cursor value. Written to a temp file and renamed so an
    /// interrupted write cannot leave a half-written cursor behind.
    pub fn save(&self, next_index: usize) -> Result<(), StoreError> {
        let body = serde_json::to_string(&ProgressFile { next_index }).map_err(|source| {
            StoreError::Encode {
                path: self.path.clone(),
                source,
            }
        })?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, body).map_err(|source| StoreError::Write {
            path: tmp.clone(),
            source,
        })?;
        std::fs::rename(&tmp, &self.path).map_err(|source| StoreError::Write {
            path: self.path.clone(),
            source,
        })?;
        Ok(())
    }
}
