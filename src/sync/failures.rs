//! Durable append-only record of uploads that did not go through.
//!
//! `failed_uploads.json` holds a `{"data": [...]}` list in the same
//! directory as the input data. The engine only ever appends; pruning and
//! retrying entries is left to whoever operates the tool.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::record::FailureRecord;

use super::error::StoreError;

pub const FAILURE_FILE: &str = "failed_uploads.json";

#[derive(Debug, Default, Serialize, Deserialize)]
struct FailureFile {
    data: Vec<FailureRecord>,
}

pub struct FailureLog {
    path: PathBuf,
}

impl FailureLog {
    pub fn new(dir: &Path) -> Self {
        Self {
            path: dir.join(FAILURE_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one entry, preserving whatever the file already holds. A
    /// corrupt existing file is logged and replaced rather than appended to.
    pub fn append(&self, record: FailureRecord) -> Result<(), StoreError> {
        let mut file = self.load_file();
        file.data.push(record);

        let body =
            serde_json::to_string_pretty(&file).map_err(|source| StoreError::Encode {
                path: self.path.clone(),
                source,
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

    /// All recorded failures, oldest first.
    #[allow(dead_code)] // Inspection helper; exercised in tests
    pub fn entries(&self) -> Vec<FailureRecord> {
        self.load_file().data
    }

    fn load_file(&self) -> FailureFile {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(_) => return FailureFile::default(),
        };
        match serde_json::from_str(&contents) {
            Ok(file) => file,
            Err(e) => {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %e,
                    "failure log corrupt, starting a fresh one"
                );
                FailureFile::default()
            }
        }
    }
}
