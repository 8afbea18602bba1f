use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use serde::Serialize;

use crate::metadata::{ExportContext, METADATA_DIR, MetadataError, RunSummary, SourceSink};
use crate::sources::SourceRecord;

pub struct JsonlSink {
    ctx: ExportContext,
    sources_writer: Mutex<BufWriter<File>>,
    run_writer: Mutex<BufWriter<File>>,
}

#[derive(Serialize)]
struct Stamped<'a, T: Serialize> {
    #[serde(flatten)]
    record: &'a T,
    tool_version: &'a str,
    config_hash: &'a str,
    image_path: &'a str,
    hashdb_dir: &'a str,
}

impl JsonlSink {
    pub fn new(ctx: &ExportContext, job_dir: &Path) -> Result<Self, MetadataError> {
        let meta_dir = job_dir.join(METADATA_DIR);
        std::fs::create_dir_all(&meta_dir)?;
        let sources = File::create(meta_dir.join("sources.jsonl"))?;
        let runs = File::create(meta_dir.join("run_summary.jsonl"))?;
        Ok(Self {
            ctx: ctx.clone(),
            sources_writer: Mutex::new(BufWriter::new(sources)),
            run_writer: Mutex::new(BufWriter::new(runs)),
        })
    }

    fn write_line<T: Serialize>(
        &self,
        writer: &Mutex<BufWriter<File>>,
        record: &T,
    ) -> Result<(), MetadataError> {
        let stamped = Stamped {
            record,
            tool_version: &self.ctx.tool_version,
            config_hash: &self.ctx.config_hash,
            image_path: &self.ctx.image_path,
            hashdb_dir: &self.ctx.hashdb_dir,
        };
        let mut guard = lock(writer)?;
        serde_json::to_writer(&mut *guard, &stamped)?;
        guard.write_all(b"\n")?;
        Ok(())
    }
}

fn lock(writer: &Mutex<BufWriter<File>>) -> Result<MutexGuard<'_, BufWriter<File>>, MetadataError> {
    writer
        .lock()
        .map_err(|_| MetadataError::Other("jsonl writer lock poisoned".to_string()))
}

impl SourceSink for JsonlSink {
    fn record_source(&self, record: &SourceRecord) -> Result<(), MetadataError> {
        self.write_line(&self.sources_writer, record)
    }

    fn record_run_summary(&self, summary: &RunSummary) -> Result<(), MetadataError> {
        self.write_line(&self.run_writer, summary)
    }

    fn flush(&self) -> Result<(), MetadataError> {
        lock(&self.sources_writer)?.flush()?;
        lock(&self.run_writer)?.flush()?;
        Ok(())
    }
}
