//! # Scan Job
//!
//! Work paths and tool command lines for one pipeline run.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};

use crate::config::{ExpanderConfig, ScannerConfig};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d-%H-%M-%S";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanJob {
    pub image_path: PathBuf,
    pub image_name: String,
    pub hashdb_dir: PathBuf,
    pub job_dir: PathBuf,
    /// Created by the scanner itself; it refuses to reuse an existing directory.
    pub scanner_output_dir: PathBuf,
    pub match_file: PathBuf,
    pub expanded_file: PathBuf,
    pub scanner_stdout: PathBuf,
    pub scanner_stderr: PathBuf,
    pub expander_stderr: PathBuf,
}

impl ScanJob {
    pub fn new(
        module_dir: &Path,
        image_path: &Path,
        hashdb_dir: &Path,
        scanner: &ScannerConfig,
        expander: &ExpanderConfig,
        started: DateTime<Local>,
    ) -> Self {
        let image_name = image_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| image_path.to_string_lossy().to_string());
        let job_dir = module_dir.join(format!(
            "{}_{}",
            image_name,
            started.format(TIMESTAMP_FORMAT)
        ));
        let scanner_output_dir = job_dir.join(&scanner.output_dir_name);
        let scanner_tag = tool_tag(&scanner.program);
        let expander_tag = tool_tag(&expander.program);

        Self {
            image_path: image_path.to_path_buf(),
            image_name,
            hashdb_dir: hashdb_dir.to_path_buf(),
            match_file: scanner_output_dir.join(&scanner.match_file_name),
            expanded_file: scanner_output_dir.join(&expander.expanded_file_name),
            scanner_stdout: job_dir.join(format!("stdout_{scanner_tag}.txt")),
            scanner_stderr: job_dir.join(format!("stderr_{scanner_tag}.txt")),
            expander_stderr: job_dir.join(format!("stderr_{expander_tag}_expand.txt")),
            scanner_output_dir,
            job_dir,
        }
    }

    /// Directory name, also used as the run id.
    pub fn run_id(&self) -> String {
        self.job_dir
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default()
    }

    pub fn scan_command(&self, scanner: &ScannerConfig) -> Vec<String> {
        vec![
            scanner.program.clone(),
            "-E".to_string(),
            "hashdb".to_string(),
            "-S".to_string(),
            "hashdb_mode=scan".to_string(),
            "-S".to_string(),
            format!("hashdb_block_size={}", scanner.block_size),
            "-S".to_string(),
            format!("hashdb_scan_path_or_socket={}", self.hashdb_dir.display()),
            "-S".to_string(),
            format!("hashdb_scan_sector_size={}", scanner.sector_size),
            "-o".to_string(),
            self.scanner_output_dir.to_string_lossy().to_string(),
            self.image_path.to_string_lossy().to_string(),
        ]
    }

    pub fn expand_command(&self, expander: &ExpanderConfig) -> Vec<String> {
        vec![
            expander.program.clone(),
            "expand_identified_blocks".to_string(),
            "-m".to_string(),
            expander.mode.to_string(),
            self.hashdb_dir.to_string_lossy().to_string(),
            self.match_file.to_string_lossy().to_string(),
        ]
    }
}

/// File-name friendly stem of an executable path ("C:\be\bulk_extractor.exe" -> "bulk_extractor").
fn tool_tag(program: &str) -> String {
    let base = program.rsplit(['/', '\\']).next().unwrap_or(program);
    let stem = base.strip_suffix(".exe").unwrap_or(base);
    if stem.is_empty() {
        "tool".to_string()
    } else {
        stem.to_string()
    }
}
