//! Format adapters — turn a raw collection export into [`LocalRecord`]s.
//!
//! The engine never sees source-specific shapes: adapters normalize titles,
//! ratings and completion dates, and map each source's status vocabulary to
//! engine label codes through a table supplied by configuration.

pub mod bangumi;
pub mod text;

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::config::Config;
use crate::record::LocalRecord;

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("{path} is not valid JSON: {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },

    /// Structured input without the expected envelope. Fatal: silently
    /// syncing nothing would look like success.
    #[error("{path} is missing the expected top-level \"data\" key")]
    MissingData { path: PathBuf },
}

/// Parse an export file, picking the adapter by extension: `.json` is a
/// Bangumi collection dump, anything else a two-column delimited text file.
pub fn read_records(path: &Path, config: &Config) -> Result<Vec<LocalRecord>, AdapterError> {
    let is_json = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("json"));

    let records = if is_json {
        bangumi::read(path, &config.adapter_labels(bangumi::ADAPTER_NAME))?
    } else {
        text::read(path, &config.default_labels(text::ADAPTER_NAME))?
    };

    tracing::info!(
        count = records.len(),
        path = %path.display(),
        "read local collection"
    );
    Ok(records)
}
