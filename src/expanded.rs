//! # Expanded Block Reader
//!
//! Parses lines of the `identified_blocks_expanded.txt` file written by
//! `hashdb expand_identified_blocks`. Each match line is
//! `<forensic path>\t<block hash>\t<json>` where the JSON payload is a
//! positional array whose element 1 holds the `sources` list:
//!
//! ```text
//! 2048	8ed9...	["8ed9...", {"sources":[{"source_id":1,"repository_name":"r","filename":"f","filesize":800,"file_hashdigest":"ab"}]}]
//! ```

use serde::{Deserialize, Deserializer, de::IgnoredAny};
use serde_json::Value;
use thiserror::Error;

const FIELD_COUNT: usize = 3;
const SOURCES_INDEX: usize = 1;

/// One source attribution found on a match line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceContribution {
    pub source_id: i64,
    pub repository_name: String,
    pub filename: String,
    pub filesize: i64,
    pub file_hashdigest: String,
    /// True when the source entry carries no `label`.
    pub is_unflagged: bool,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("expected {FIELD_COUNT} tab-separated fields, found {fields}")]
    MalformedLine { fields: usize },
    #[error("malformed json payload: {0}")]
    MalformedJson(String),
}

#[derive(Deserialize)]
struct RawSource {
    source_id: i64,
    repository_name: String,
    filename: String,
    filesize: i64,
    file_hashdigest: String,
    #[serde(default, deserialize_with = "field_present")]
    label: bool,
}

// Only invoked when the key exists, so `"label": null` still counts as a label.
fn field_present<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    IgnoredAny::deserialize(deserializer).map(|_| true)
}

impl From<RawSource> for SourceContribution {
    fn from(raw: RawSource) -> Self {
        Self {
            source_id: raw.source_id,
            repository_name: raw.repository_name,
            filename: raw.filename,
            filesize: raw.filesize,
            file_hashdigest: raw.file_hashdigest,
            is_unflagged: !raw.label,
        }
    }
}

/// Returns true for lines that carry no match data.
pub fn is_comment(line: &str) -> bool {
    line.is_empty() || line.starts_with('#')
}

/// Parse one line into its source contributions.
///
/// Comment and blank lines yield an empty vector.
pub fn parse_line(line: &str) -> Result<Vec<SourceContribution>, ParseError> {
    if is_comment(line) {
        return Ok(Vec::new());
    }

    let fields: Vec<&str> = line.split('\t').collect();
    if fields.len() != FIELD_COUNT {
        return Err(ParseError::MalformedLine {
            fields: fields.len(),
        });
    }

    let payload: Value = serde_json::from_str(fields[2])
        .map_err(|e| ParseError::MalformedJson(e.to_string()))?;
    let entry = payload
        .as_array()
        .ok_or_else(|| ParseError::MalformedJson("payload is not an array".to_string()))?
        .get(SOURCES_INDEX)
        .ok_or_else(|| {
            ParseError::MalformedJson(format!("payload has no element {SOURCES_INDEX}"))
        })?;
    let entry = entry.as_object().ok_or_else(|| {
        ParseError::MalformedJson(format!("payload element {SOURCES_INDEX} is not an object"))
    })?;
    let sources = entry
        .get("sources")
        .ok_or_else(|| ParseError::MalformedJson("missing \"sources\"".to_string()))?
        .as_array()
        .ok_or_else(|| ParseError::MalformedJson("\"sources\" is not an array".to_string()))?;

    sources.iter().map(parse_source).collect()
}

// Struct derives also accept the sequence form, so the object shape is checked first.
fn parse_source(source: &Value) -> Result<SourceContribution, ParseError> {
    if !source.is_object() {
        return Err(ParseError::MalformedJson(
            "source entry is not an object".to_string(),
        ));
    }
    RawSource::deserialize(source)
        .map(SourceContribution::from)
        .map_err(|e| ParseError::MalformedJson(format!("invalid source entry: {e}")))
}
