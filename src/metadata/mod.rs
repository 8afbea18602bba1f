pub mod csv;
pub mod jsonl;

use std::path::Path;

use thiserror::Error;

use crate::sources::{AggregateSummary, SourceRecord};

pub const METADATA_DIR: &str = "metadata";

#[derive(Debug, Clone, serde::Serialize)]
pub struct RunSummary {
    pub run_id: String,
    pub image_name: String,
    pub total_matches: u64,
    pub total_unflagged: u64,
    pub distinct_sources: u64,
}

impl RunSummary {
    pub fn new(run_id: &str, image_name: &str, totals: &AggregateSummary) -> Self {
        Self {
            run_id: run_id.to_string(),
            image_name: image_name.to_string(),
            total_matches: totals.total_matches,
            total_unflagged: totals.total_unflagged,
            distinct_sources: totals.distinct_sources,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetadataBackendKind {
    Jsonl,
    Csv,
}

/// Provenance stamped on every exported row.
#[derive(Debug, Clone)]
pub struct ExportContext {
    pub tool_version: String,
    pub config_hash: String,
    pub image_path: String,
    pub hashdb_dir: String,
}

#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("csv error: {0}")]
    Csv(#[from] ::csv::Error),
    #[error("serde error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("other error: {0}")]
    Other(String),
}

/// Output sink for the aggregated per-source table of a job.
///
/// # Example
/// ```rust
/// use sectorsweep::metadata::{self, ExportContext, MetadataBackendKind, RunSummary};
/// use sectorsweep::sources::AggregateSummary;
///
/// let job_dir = std::env::temp_dir().join("sectorsweep_meta_example");
/// std::fs::create_dir_all(&job_dir).unwrap();
///
/// let ctx = ExportContext {
///     tool_version: "0.1.0".to_string(),
///     config_hash: String::new(),
///     image_path: "disk.raw".to_string(),
///     hashdb_dir: "blacklist.hdb".to_string(),
/// };
/// let sink = metadata::build_sink(MetadataBackendKind::Jsonl, &ctx, &job_dir).unwrap();
/// let summary = RunSummary::new("example_run", "disk.raw", &AggregateSummary::default());
/// sink.record_run_summary(&summary).unwrap();
/// sink.flush().unwrap();
/// ```
pub trait SourceSink: Send + Sync {
    fn record_source(&self, record: &SourceRecord) -> Result<(), MetadataError>;
    fn record_run_summary(&self, summary: &RunSummary) -> Result<(), MetadataError>;
    fn flush(&self) -> Result<(), MetadataError>;
}

pub fn build_sink(
    backend: MetadataBackendKind,
    ctx: &ExportContext,
    job_dir: &Path,
) -> Result<Box<dyn SourceSink>, MetadataError> {
    match backend {
        MetadataBackendKind::Jsonl => Ok(Box::new(jsonl::JsonlSink::new(ctx, job_dir)?)),
        MetadataBackendKind::Csv => Ok(Box::new(csv::CsvSink::new(ctx, job_dir)?)),
    }
}
