//! # Pipeline Module
//!
//! Orchestrates one blacklist scan of a data source:
//! - block hash scan of the image (`bulk_extractor` with the hashdb scanner)
//! - expansion of identified blocks into source attributions (`hashdb`)
//! - per-source aggregation and the summary message
//! - the viewer launcher report
//!
//! Phases run strictly in order on the calling thread. Any failure ends the
//! run; `process` turns that into an `ERROR` result and a single user alert.

pub mod job;

use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::sync::atomic::AtomicBool;

use chrono::Local;
use thiserror::Error;
use tracing::{debug, error, info, info_span, warn};

use crate::config::{JobSettings, LoadedConfig};
use crate::evidence::DataSource;
use crate::expanded::{self, ParseError};
use crate::host::HostServices;
use crate::metadata::{self, ExportContext, MetadataBackendKind, MetadataError, RunSummary};
use crate::report::{ReportEmitter, ReportError};
use crate::sources::{AggregateSummary, SourceAggregator};
use crate::tool::{ToolError, ToolRunner};

pub use job::ScanJob;

/// Determinate progress steps: scan, expand+summarize, report, done.
pub const PROGRESS_WORKUNITS: u32 = 4;

const ALERT_TITLE: &str = "Error processing block hash blacklist module";
const ALERT_MESSAGE: &str = "Block hash blacklist module failed";

/// Outcome reported to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessResult {
    Ok,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Init,
    PathsComputed,
    Scanned,
    NoMatches,
    Expanded,
    Summarized,
    Reported,
    Done,
    Errored,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolPhase {
    Scan,
    Expand,
}

impl fmt::Display for ToolPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ToolPhase::Scan => f.write_str("scan"),
            ToolPhase::Expand => f.write_str("expand"),
        }
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("{phase} tool failed: {source}")]
    Tool {
        phase: ToolPhase,
        #[source]
        source: ToolError,
    },
    #[error("{phase} cancelled")]
    Cancelled { phase: ToolPhase },
    #[error("{}:{line_number}: {source} in line '{line}'", path.display())]
    Parse {
        path: PathBuf,
        line_number: usize,
        line: String,
        #[source]
        source: ParseError,
    },
    #[error("io error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("source export failed: {0}")]
    Metadata(#[from] MetadataError),
    #[error("report failed: {0}")]
    Report(#[from] ReportError),
}

impl PipelineError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        PipelineError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// What a finished run produced.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub state: PipelineState,
    pub job: Option<ScanJob>,
    pub summary: Option<AggregateSummary>,
    pub message: Option<String>,
    pub launcher: Option<PathBuf>,
}

impl RunReport {
    fn skipped() -> Self {
        Self {
            state: PipelineState::Done,
            job: None,
            summary: None,
            message: None,
            launcher: None,
        }
    }
}

pub struct ScanPipeline {
    loaded: LoadedConfig,
    settings: JobSettings,
    metadata_backend: Option<MetadataBackendKind>,
    host: HostServices,
    runner: Arc<dyn ToolRunner>,
    cancel_flag: Arc<AtomicBool>,
    last_state: Mutex<PipelineState>,
}

impl ScanPipeline {
    /// Validates the job settings; a missing hashdb directory aborts before
    /// any work is done.
    pub fn new(
        loaded: LoadedConfig,
        settings: JobSettings,
        host: HostServices,
        runner: Arc<dyn ToolRunner>,
        cancel_flag: Arc<AtomicBool>,
    ) -> Result<Self, PipelineError> {
        if !settings.hashdb_dir.is_dir() {
            error!(
                "hashdb directory path is invalid: {}",
                settings.hashdb_dir.display()
            );
            return Err(PipelineError::Configuration(format!(
                "the path to the hashdb directory is invalid: {}",
                settings.hashdb_dir.display()
            )));
        }
        Ok(Self {
            loaded,
            settings,
            metadata_backend: None,
            host,
            runner,
            cancel_flag,
            last_state: Mutex::new(PipelineState::Init),
        })
    }

    /// Export the per-source table into the job directory.
    pub fn with_metadata_backend(mut self, backend: MetadataBackendKind) -> Self {
        self.metadata_backend = Some(backend);
        self
    }

    pub fn module_name(&self) -> &str {
        &self.loaded.config.module_name
    }

    /// State the most recent run ended in; `Errored` after a failed run.
    pub fn last_state(&self) -> PipelineState {
        *self
            .last_state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Module output directory inside the case.
    pub fn module_dir(&self) -> PathBuf {
        self.host.case.modules_output_dir().join(self.module_name())
    }

    /// Run the pipeline and report a host-level outcome.
    pub fn process(&self, source: &DataSource) -> ProcessResult {
        match self.run(source) {
            Ok(_) => ProcessResult::Ok,
            Err(PipelineError::Cancelled { phase }) => {
                warn!("blacklist scan cancelled during {phase}");
                ProcessResult::Error
            }
            Err(err) => {
                error!("blacklist scan failed: {err}");
                self.host.notifier.alert(ALERT_TITLE, ALERT_MESSAGE);
                ProcessResult::Error
            }
        }
    }

    /// Run the pipeline, returning what it produced or the error that ended it.
    pub fn run(&self, source: &DataSource) -> Result<RunReport, PipelineError> {
        let Some(image_path) = source.image_path() else {
            info!("data source is not a disk image; skipping");
            *self
                .last_state
                .lock()
                .unwrap_or_else(PoisonError::into_inner) = PipelineState::Done;
            return Ok(RunReport::skipped());
        };
        PipelineRunner::new(self).run(image_path)
    }
}

struct PipelineRunner<'a> {
    pipeline: &'a ScanPipeline,
    state: PipelineState,
}

impl<'a> PipelineRunner<'a> {
    fn new(pipeline: &'a ScanPipeline) -> Self {
        Self {
            pipeline,
            state: PipelineState::Init,
        }
    }

    fn advance(&mut self, next: PipelineState) {
        debug!("state {:?} -> {:?}", self.state, next);
        self.state = next;
        *self
            .pipeline
            .last_state
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = next;
    }

    fn run(mut self, image_path: &Path) -> Result<RunReport, PipelineError> {
        let image_name = image_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let span = info_span!("scan_job", image = %image_name);
        let _enter = span.enter();

        self.advance(PipelineState::Init);
        let result = self.run_phases(image_path);
        if result.is_err() {
            warn!("run aborted after state {:?}", self.state);
            self.advance(PipelineState::Errored);
        }
        result
    }

    fn run_phases(&mut self, image_path: &Path) -> Result<RunReport, PipelineError> {
        let pipeline = self.pipeline;
        let cfg = &pipeline.loaded.config;
        let host = &pipeline.host;

        let job = self.compute_paths(image_path)?;
        self.advance(PipelineState::PathsComputed);

        host.progress.switch_to_indeterminate();
        self.invoke(
            ToolPhase::Scan,
            &job.scan_command(&cfg.scanner),
            &job.scanner_stdout,
            &job.scanner_stderr,
        )?;
        host.progress.switch_to_determinate(PROGRESS_WORKUNITS);
        host.progress.progress(1);
        self.advance(PipelineState::Scanned);

        if !has_matches(&job.match_file)? {
            info!("no blacklist block hashes found in {}", job.image_name);
            self.advance(PipelineState::NoMatches);
            host.progress.progress(PROGRESS_WORKUNITS);
            self.advance(PipelineState::Done);
            return Ok(RunReport {
                state: self.state,
                job: Some(job),
                summary: None,
                message: None,
                launcher: None,
            });
        }

        self.invoke(
            ToolPhase::Expand,
            &job.expand_command(&cfg.expander),
            &job.expanded_file,
            &job.expander_stderr,
        )?;
        self.advance(PipelineState::Expanded);

        let aggregator = summarize(&job.expanded_file)?;
        let totals = aggregator.totals();
        self.export(&job, &aggregator, &totals)?;
        let message = totals.to_string();
        info!("{message}");
        host.inbox.post_message(&cfg.module_name, &message);
        host.progress.progress(2);
        self.advance(PipelineState::Summarized);

        let emitter = ReportEmitter::new(&cfg.viewer, &cfg.module_name, host.case.as_ref());
        let launcher = emitter.emit(&job.job_dir, &job.scanner_output_dir, &job.image_name)?;
        host.progress.progress(3);
        self.advance(PipelineState::Reported);

        host.progress.progress(PROGRESS_WORKUNITS);
        self.advance(PipelineState::Done);
        Ok(RunReport {
            state: self.state,
            job: Some(job),
            summary: Some(totals),
            message: Some(message),
            launcher: Some(launcher),
        })
    }

    fn compute_paths(&self, image_path: &Path) -> Result<ScanJob, PipelineError> {
        let cfg = &self.pipeline.loaded.config;
        let job = ScanJob::new(
            &self.pipeline.module_dir(),
            image_path,
            &self.pipeline.settings.hashdb_dir,
            &cfg.scanner,
            &cfg.expander,
            Local::now(),
        );
        std::fs::create_dir_all(&job.job_dir).map_err(|source| {
            error!(
                "failed to create job directory {}: {source}",
                job.job_dir.display()
            );
            PipelineError::io(&job.job_dir, source)
        })?;
        info!(
            "job_dir={} image={} hashdb={}",
            job.job_dir.display(),
            job.image_path.display(),
            job.hashdb_dir.display()
        );
        Ok(job)
    }

    fn invoke(
        &self,
        phase: ToolPhase,
        command_line: &[String],
        stdout_path: &Path,
        stderr_path: &Path,
    ) -> Result<(), PipelineError> {
        let program = command_line.first().map(String::as_str).unwrap_or_default();
        info!("running {phase}: {}", command_line.join(" "));
        match self
            .pipeline
            .runner
            .run(command_line, stdout_path, stderr_path, &self.pipeline.cancel_flag)
        {
            Ok(()) => {
                info!("{program} {phase} completed");
                Ok(())
            }
            Err(ToolError::Cancelled) => Err(PipelineError::Cancelled { phase }),
            Err(source) => {
                error!(
                    "{program} {phase} failed: {source} (stderr: {})",
                    stderr_path.display()
                );
                Err(PipelineError::Tool { phase, source })
            }
        }
    }

    fn export(
        &self,
        job: &ScanJob,
        aggregator: &SourceAggregator,
        totals: &AggregateSummary,
    ) -> Result<(), PipelineError> {
        let Some(backend) = self.pipeline.metadata_backend else {
            return Ok(());
        };
        let ctx = ExportContext {
            tool_version: env!("CARGO_PKG_VERSION").to_string(),
            config_hash: self.pipeline.loaded.config_hash.clone(),
            image_path: job.image_path.to_string_lossy().to_string(),
            hashdb_dir: job.hashdb_dir.to_string_lossy().to_string(),
        };
        let sink = metadata::build_sink(backend, &ctx, &job.job_dir)?;
        for record in aggregator.records() {
            sink.record_source(record)?;
        }
        sink.record_run_summary(&RunSummary::new(&job.run_id(), &job.image_name, totals))?;
        sink.flush()?;
        debug!("exported {} sources", aggregator.source_count());
        Ok(())
    }
}

/// A missing or empty match file means the scan found nothing.
fn has_matches(match_file: &Path) -> Result<bool, PipelineError> {
    match std::fs::metadata(match_file) {
        Ok(meta) => Ok(meta.len() > 0),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(err) => Err(PipelineError::io(match_file, err)),
    }
}

/// Stream the expanded file into a fresh aggregator. The first bad line
/// fails the whole file.
pub fn summarize(expanded_file: &Path) -> Result<SourceAggregator, PipelineError> {
    let file = File::open(expanded_file).map_err(|e| PipelineError::io(expanded_file, e))?;
    let reader = BufReader::new(file);
    let mut aggregator = SourceAggregator::new();

    for (idx, line) in reader.lines().enumerate() {
        let line = line.map_err(|e| PipelineError::io(expanded_file, e))?;
        match expanded::parse_line(&line) {
            Ok(contributions) => aggregator.apply(contributions),
            Err(source) => {
                error!(
                    "error processing file {} line {}: '{}': {source}",
                    expanded_file.display(),
                    idx + 1,
                    line
                );
                return Err(PipelineError::Parse {
                    path: expanded_file.to_path_buf(),
                    line_number: idx + 1,
                    line,
                    source,
                });
            }
        }
    }
    Ok(aggregator)
}
