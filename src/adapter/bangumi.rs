//! Adapter for a Bangumi collection export (`collection_list.json`).
//!
//! The export wraps everything in a top-level `data` array; each item
//! carries the subject, the collection type (wish/collected/doing/…), a
//! 0–10 rating and the last-updated timestamp, which doubles as the
//! completion date.

use std::collections::HashMap;
use std::path::Path;

use chrono::NaiveDate;
use serde_json::Value;

use crate::record::LocalRecord;
use crate::types::Label;

use super::AdapterError;

pub const ADAPTER_NAME: &str = "bangumi";

/// Bangumi subject type for games; other media kinds are skipped.
const GAME_SUBJECT_TYPE: i64 = 4;

/// Parse the export. `labels` maps the stringified collection type
/// (`"1"`…`"5"`) to the engine label codes an entry should get.
pub fn read(
    path: &Path,
    labels: &HashMap<String, Vec<Label>>,
) -> Result<Vec<LocalRecord>, AdapterError> {
    let contents = std::fs::read_to_string(path).map_err(|source| AdapterError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let root: Value = serde_json::from_str(&contents).map_err(|source| AdapterError::Json {
        path: path.to_path_buf(),
        source,
    })?;

    let Some(items) = root.get("data").and_then(Value::as_array) else {
        return Err(AdapterError::MissingData {
            path: path.to_path_buf(),
        });
    };

    let mut records = Vec::new();
    for item in items {
        if item["subject_type"].as_i64() != Some(GAME_SUBJECT_TYPE) {
            continue;
        }
        let Some(title) = item["subject"]["name"].as_str().filter(|s| !s.is_empty()) else {
            tracing::debug!(subject_id = ?item["subject_id"], "skipping entry without a title");
            continue;
        };

        let title_alt = item["subject"]["name_cn"]
            .as_str()
            .filter(|s| !s.is_empty())
            .map(str::to_string);

        let completed_on = item["updated_at"]
            .as_str()
            .and_then(|stamp| stamp.split('T').next())
            .and_then(|date| NaiveDate::parse_from_str(date, "%Y-%m-%d").ok());

        let rating = item["rate"]
            .as_u64()
            .filter(|r| (1..=10).contains(r))
            .map(|r| r as u8);

        let labels = item["type"]
            .as_i64()
            .and_then(|t| labels.get(&t.to_string()))
            .cloned()
            .unwrap_or_default();

        records.push(LocalRecord {
            title: title.to_string(),
            title_alt,
            labels,
            rating,
            completed_on,
        });
    }

    Ok(records)
}
