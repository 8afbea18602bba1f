//! Shared test infrastructure for pipeline tests.
//!
//! Provides a scripted [`ToolRunner`] that plays the part of the scanner and
//! expander, recording host services, and a temporary case layout.

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};

use sectorsweep::case::LocalCase;
use sectorsweep::config::{self, JobSettings, LoadedConfig};
use sectorsweep::host::{
    CaseReports, HostServices, MessageInbox, Notifier, ProgressReporter, RegistrationError,
};
use sectorsweep::pipeline::ScanPipeline;
use sectorsweep::tool::{ToolError, ToolRunner};

// ============================================================================
// Fixture Lines
// ============================================================================

/// JSON for one `sources` entry; `label` of `None` means unflagged.
pub fn source_json(id: u64, filename: &str, label: Option<&str>) -> String {
    let label = label
        .map(|l| format!(r#","label":"{l}""#))
        .unwrap_or_default();
    format!(
        r#"{{"source_id":{id},"repository_name":"corpus","filename":"{filename}","filesize":4096,"file_hashdigest":"digest{id}"{label}}}"#
    )
}

/// One expanded-output line attributing a block to `sources`.
pub fn expanded_line(offset: u64, sources: &[String]) -> String {
    format!(
        "{offset}\t8ed9f0a1\t[\"8ed9f0a1\",{{\"count\":{},\"sources\":[{}]}}]",
        sources.len(),
        sources.join(",")
    )
}

pub const MATCH_LINE: &str = "# bulk_extractor hashdb scanner\n512\t8ed9f0a1\t[\"8ed9f0a1\",{\"count\":1}]\n";

// ============================================================================
// Scripted Tool Runner
// ============================================================================

/// Stands in for `bulk_extractor` and `hashdb`.
#[derive(Default)]
pub struct ScriptedRunner {
    /// Content of `identified_blocks.txt`; `None` leaves it absent.
    pub match_file: Option<String>,
    pub expanded: String,
    pub scan_result: Option<fn() -> ToolError>,
    pub expand_result: Option<fn() -> ToolError>,
    pub calls: Mutex<Vec<Vec<String>>>,
}

impl ScriptedRunner {
    pub fn with_matches(expanded_lines: &[String]) -> Self {
        let mut expanded = expanded_lines.join("\n");
        expanded.push('\n');
        Self {
            match_file: Some(MATCH_LINE.to_string()),
            expanded,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().unwrap().clone()
    }
}

impl ToolRunner for ScriptedRunner {
    fn run(
        &self,
        command_line: &[String],
        stdout_path: &Path,
        stderr_path: &Path,
        _cancel_flag: &AtomicBool,
    ) -> Result<(), ToolError> {
        self.calls.lock().unwrap().push(command_line.to_vec());
        fs::write(stdout_path, "").expect("stdout redirect");
        fs::write(stderr_path, "").expect("stderr redirect");

        let is_expand = command_line.get(1).map(String::as_str) == Some("expand_identified_blocks");
        if is_expand {
            if let Some(err) = self.expand_result {
                return Err(err());
            }
            let match_file = command_line.last().expect("match file arg");
            assert!(Path::new(match_file).is_file(), "expander ran without a match file");
            fs::write(stdout_path, &self.expanded).expect("expanded output");
            return Ok(());
        }

        if let Some(err) = self.scan_result {
            return Err(err());
        }
        let out_idx = command_line
            .iter()
            .position(|a| a == "-o")
            .expect("scanner output flag");
        let out_dir = PathBuf::from(&command_line[out_idx + 1]);
        fs::create_dir_all(&out_dir).expect("scanner output dir");
        if let Some(content) = &self.match_file {
            fs::write(out_dir.join("identified_blocks.txt"), content).expect("match file");
        }
        Ok(())
    }
}

// ============================================================================
// Recording Host Services
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    Indeterminate,
    Determinate(u32),
    Step(u32),
}

#[derive(Default)]
pub struct RecordingProgress {
    pub events: Mutex<Vec<ProgressEvent>>,
}

impl ProgressReporter for RecordingProgress {
    fn switch_to_indeterminate(&self) {
        self.events.lock().unwrap().push(ProgressEvent::Indeterminate);
    }
    fn switch_to_determinate(&self, workunits: u32) {
        self.events
            .lock()
            .unwrap()
            .push(ProgressEvent::Determinate(workunits));
    }
    fn progress(&self, workunit: u32) {
        self.events.lock().unwrap().push(ProgressEvent::Step(workunit));
    }
}

#[derive(Default)]
pub struct RecordingInbox {
    pub messages: Mutex<Vec<(String, String)>>,
}

impl MessageInbox for RecordingInbox {
    fn post_message(&self, module_name: &str, message: &str) {
        self.messages
            .lock()
            .unwrap()
            .push((module_name.to_string(), message.to_string()));
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    pub alerts: Mutex<Vec<(String, String)>>,
}

impl Notifier for RecordingNotifier {
    fn alert(&self, title: &str, message: &str) {
        self.alerts
            .lock()
            .unwrap()
            .push((title.to_string(), message.to_string()));
    }
}

/// Case that hands out a module directory but refuses every report.
pub struct ReadOnlyCase {
    pub root: PathBuf,
}

impl CaseReports for ReadOnlyCase {
    fn modules_output_dir(&self) -> PathBuf {
        self.root.join("ModuleOutput")
    }

    fn add_report(
        &self,
        _path: &Path,
        _module_name: &str,
        _display_name: &str,
    ) -> Result<(), RegistrationError> {
        Err(RegistrationError::Rejected("case is read-only".to_string()))
    }
}

// ============================================================================
// Harness
// ============================================================================

pub struct Harness {
    pub temp_dir: tempfile::TempDir,
    pub hashdb_dir: PathBuf,
    pub image_path: PathBuf,
    pub case: Arc<LocalCase>,
    pub progress: Arc<RecordingProgress>,
    pub inbox: Arc<RecordingInbox>,
    pub notifier: Arc<RecordingNotifier>,
    pub cancel_flag: Arc<AtomicBool>,
}

impl Harness {
    pub fn new() -> Self {
        let temp_dir = tempfile::tempdir().expect("tempdir");
        let hashdb_dir = temp_dir.path().join("blacklist.hdb");
        fs::create_dir_all(&hashdb_dir).expect("hashdb dir");
        let image_path = temp_dir.path().join("disk.raw");
        fs::write(&image_path, vec![0u8; 4096]).expect("image");
        let case = Arc::new(LocalCase::open(&temp_dir.path().join("case")).expect("case"));
        Self {
            temp_dir,
            hashdb_dir,
            image_path,
            case,
            progress: Arc::new(RecordingProgress::default()),
            inbox: Arc::new(RecordingInbox::default()),
            notifier: Arc::new(RecordingNotifier::default()),
            cancel_flag: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn loaded_config(&self) -> LoadedConfig {
        config::load_config(None).expect("config")
    }

    pub fn host(&self) -> HostServices {
        self.host_with_case(self.case.clone())
    }

    pub fn host_with_case(&self, case: Arc<dyn CaseReports>) -> HostServices {
        HostServices {
            progress: self.progress.clone(),
            inbox: self.inbox.clone(),
            notifier: self.notifier.clone(),
            case,
        }
    }

    pub fn pipeline(&self, runner: Arc<dyn ToolRunner>) -> ScanPipeline {
        self.pipeline_with(self.loaded_config(), self.host(), runner)
    }

    pub fn pipeline_with(
        &self,
        loaded: LoadedConfig,
        host: HostServices,
        runner: Arc<dyn ToolRunner>,
    ) -> ScanPipeline {
        ScanPipeline::new(
            loaded,
            JobSettings {
                hashdb_dir: self.hashdb_dir.clone(),
            },
            host,
            runner,
            self.cancel_flag.clone(),
        )
        .expect("pipeline")
    }

    pub fn module_dir(&self) -> PathBuf {
        self.case.modules_output_dir().join("Block Hash Blacklist")
    }

    /// Job directories created under the module directory.
    pub fn job_dirs(&self) -> Vec<PathBuf> {
        let Ok(entries) = fs::read_dir(self.module_dir()) else {
            return Vec::new();
        };
        entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_dir())
            .collect()
    }

    pub fn messages(&self) -> Vec<(String, String)> {
        self.inbox.messages.lock().unwrap().clone()
    }

    pub fn alerts(&self) -> Vec<(String, String)> {
        self.notifier.alerts.lock().unwrap().clone()
    }

    pub fn progress_events(&self) -> Vec<ProgressEvent> {
        self.progress.events.lock().unwrap().clone()
    }
}
