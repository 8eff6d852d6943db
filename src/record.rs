//! Core data shapes passed between the adapters, the resolver and the
//! sync engine.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::types::Label;

/// A normalized collection entry produced by a format adapter.
///
/// Immutable once handed to the engine. `rating` carries the source's raw
/// 1–10 score; conversion to VNDB's vote scale happens when the update
/// payload is built.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalRecord {
    /// Primary title as exported by the source.
    pub title: String,
    /// Alternate (usually translated) title, when the source has one.
    pub title_alt: Option<String>,
    /// Engine label codes this entry should carry on VNDB.
    pub labels: Vec<Label>,
    /// Raw 1–10 rating; `None` when unrated.
    pub rating: Option<u8>,
    /// Completion date, when the source records one.
    pub completed_on: Option<NaiveDate>,
}

/// The update sent to `PATCH ulist/<id>` once a record has resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdatePayload {
    /// Resolved VNDB id, e.g. `"v17"`.
    pub vn_id: String,
    pub labels: Vec<Label>,
    /// Vote on VNDB's 10–100 scale; absent votes are omitted, never sent as 0.
    pub vote: Option<u8>,
    pub finished: Option<NaiveDate>,
}

impl UpdatePayload {
    pub fn from_record(record: &LocalRecord, vn_id: String) -> Self {
        Self {
            vn_id,
            labels: record.labels.clone(),
            vote: record
                .rating
                .filter(|r| *r > 0)
                .map(|r| r.saturating_mul(10).min(100)),
            finished: record.completed_on,
        }
    }

    /// JSON body for the PATCH request. Absent optionals are omitted.
    pub fn body(&self) -> Value {
        let codes: Vec<u8> = self.labels.iter().map(Label::code).collect();
        let mut body = json!({ "labels_set": codes });
        if let Some(vote) = self.vote {
            body["vote"] = vote.into();
        }
        if let Some(finished) = self.finished {
            body["finished"] = Value::String(finished.format("%Y-%m-%d").to_string());
        }
        body
    }
}

/// One entry of the durable failure log.
///
/// Field names match the on-disk `failed_uploads.json` vocabulary so the
/// file stays compatible with hand-rolled retry scripts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureRecord {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub title_cn: Option<String>,
    pub labels_set: Vec<Label>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub vote: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub finished: Option<NaiveDate>,
    pub reason: String,
}

impl FailureRecord {
    fn from_record(record: &LocalRecord, reason: String) -> Self {
        Self {
            title: record.title.clone(),
            title_cn: record.title_alt.clone(),
            labels_set: record.labels.clone(),
            vote: record.rating.filter(|r| *r > 0).map(|r| r.saturating_mul(10)),
            finished: record.completed_on,
            reason,
        }
    }

    /// The resolver exhausted its whole fallback chain without a match.
    pub fn unresolved(record: &LocalRecord) -> Self {
        Self::from_record(record, "unresolved: no VNDB entry matched".to_string())
    }

    /// The record resolved but the upload did not go through.
    pub fn upload_failed(record: &LocalRecord, error: &str) -> Self {
        Self::from_record(record, format!("upload failed: {}", error))
    }
}
