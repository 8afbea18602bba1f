use std::fs::File;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use serde::Serialize;

use crate::metadata::{ExportContext, METADATA_DIR, MetadataError, RunSummary, SourceSink};
use crate::sources::SourceRecord;

pub struct CsvSink {
    ctx: ExportContext,
    sources_writer: Mutex<csv::Writer<File>>,
    run_writer: Mutex<csv::Writer<File>>,
}

#[derive(Serialize)]
struct SourceCsv<'a> {
    source_id: i64,
    repository_name: &'a str,
    filename: &'a str,
    filesize: i64,
    file_hashdigest: &'a str,
    match_count: u64,
    unflagged_count: u64,
    tool_version: &'a str,
    config_hash: &'a str,
    image_path: &'a str,
    hashdb_dir: &'a str,
}

#[derive(Serialize)]
struct RunSummaryCsv<'a> {
    run_id: &'a str,
    image_name: &'a str,
    total_matches: u64,
    total_unflagged: u64,
    distinct_sources: u64,
    tool_version: &'a str,
    config_hash: &'a str,
    image_path: &'a str,
    hashdb_dir: &'a str,
}

impl CsvSink {
    pub fn new(ctx: &ExportContext, job_dir: &Path) -> Result<Self, MetadataError> {
        let meta_dir = job_dir.join(METADATA_DIR);
        std::fs::create_dir_all(&meta_dir)?;
        let sources_writer = csv::Writer::from_path(meta_dir.join("sources.csv"))?;
        let run_writer = csv::Writer::from_path(meta_dir.join("run_summary.csv"))?;
        Ok(Self {
            ctx: ctx.clone(),
            sources_writer: Mutex::new(sources_writer),
            run_writer: Mutex::new(run_writer),
        })
    }
}

fn lock(writer: &Mutex<csv::Writer<File>>) -> Result<MutexGuard<'_, csv::Writer<File>>, MetadataError> {
    writer
        .lock()
        .map_err(|_| MetadataError::Other("csv writer lock poisoned".to_string()))
}

impl SourceSink for CsvSink {
    fn record_source(&self, record: &SourceRecord) -> Result<(), MetadataError> {
        let row = SourceCsv {
            source_id: record.source_id,
            repository_name: &record.repository_name,
            filename: &record.filename,
            filesize: record.filesize,
            file_hashdigest: &record.file_hashdigest,
            match_count: record.match_count,
            unflagged_count: record.unflagged_count,
            tool_version: &self.ctx.tool_version,
            config_hash: &self.ctx.config_hash,
            image_path: &self.ctx.image_path,
            hashdb_dir: &self.ctx.hashdb_dir,
        };
        lock(&self.sources_writer)?.serialize(row)?;
        Ok(())
    }

    fn record_run_summary(&self, summary: &RunSummary) -> Result<(), MetadataError> {
        let row = RunSummaryCsv {
            run_id: &summary.run_id,
            image_name: &summary.image_name,
            total_matches: summary.total_matches,
            total_unflagged: summary.total_unflagged,
            distinct_sources: summary.distinct_sources,
            tool_version: &self.ctx.tool_version,
            config_hash: &self.ctx.config_hash,
            image_path: &self.ctx.image_path,
            hashdb_dir: &self.ctx.hashdb_dir,
        };
        lock(&self.run_writer)?.serialize(row)?;
        Ok(())
    }

    fn flush(&self) -> Result<(), MetadataError> {
        lock(&self.sources_writer)?.flush()?;
        lock(&self.run_writer)?.flush()?;
        Ok(())
    }
}
