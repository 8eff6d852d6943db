//! Adapter for two-column delimited-text exports.
//!
//! Column 1 is the primary title, an optional column 2 the alternate one.
//! The first line is a header and skipped. The format carries no status,
//! rating or date, so every record gets the adapter's configured default
//! labels.

use std::path::Path;

use crate::record::LocalRecord;
use crate::types::Label;

use super::AdapterError;

pub const ADAPTER_NAME: &str = "text";

pub fn read(path: &Path, default_labels: &[Label]) -> Result<Vec<LocalRecord>, AdapterError> {
    let contents = std::fs::read_to_string(path).map_err(|source| AdapterError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    let mut records = Vec::new();
    for line in contents.lines().skip(1) {
        if line.trim().is_empty() {
            continue;
        }
        let fields = split_fields(line, ',');
        let Some(title) = fields.first().map(|f| f.trim()).filter(|f| !f.is_empty()) else {
            continue;
        };
        let title_alt = fields
            .get(1)
            .map(|f| f.trim())
            .filter(|f| !f.is_empty())
            .map(str::to_string);

        records.push(LocalRecord {
            title: title.to_string(),
            title_alt,
            labels: default_labels.to_vec(),
            rating: None,
            completed_on: None,
        });
    }
    Ok(records)
}

/// Split one delimited line, honouring double-quoted fields. `""` inside a
/// quoted field is a literal quote.
fn split_fields(line: &str, separator: char) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            if c == '"' {
                if chars.peek() == Some(&'"') {
                    chars.next();
                    current.push('"');
                } else {
                    in_quotes = false;
                }
            } else {
                current.push(c);
            }
        } else if c == '"' && current.is_empty() {
            in_quotes = true;
        } else if c == separator {
            fields.push(std::mem::take(&mut current));
        } else {
            current.push(c);
        }
    }
    fields.push(current);
    fields
}
