use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::host::{CaseReports, RegistrationError};

const MODULE_OUTPUT_DIR: &str = "ModuleOutput";
const REPORTS_FILE: &str = "reports.jsonl";

/// A registered report artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportEntry {
    pub path: String,
    pub module_name: String,
    pub display_name: String,
    pub added_at: String,
}

/// Case directory on local disk used when running without a host application.
///
/// ```text
/// <case>/ModuleOutput/<module>/...   per-module output
/// <case>/reports.jsonl               registered report artifacts
/// ```
pub struct LocalCase {
    root: PathBuf,
    registry: Mutex<()>,
}

impl LocalCase {
    pub fn open(root: &Path) -> std::io::Result<Self> {
        std::fs::create_dir_all(root.join(MODULE_OUTPUT_DIR))?;
        Ok(Self {
            root: root.to_path_buf(),
            registry: Mutex::new(()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn reports_path(&self) -> PathBuf {
        self.root.join(REPORTS_FILE)
    }

    /// All reports registered so far, oldest first.
    pub fn reports(&self) -> Result<Vec<ReportEntry>, RegistrationError> {
        let path = self.reports_path();
        if !path.exists() {
            return Ok(Vec::new());
        }
        let reader = BufReader::new(File::open(path)?);
        let mut entries = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            entries.push(serde_json::from_str(&line)?);
        }
        Ok(entries)
    }
}

impl CaseReports for LocalCase {
    fn modules_output_dir(&self) -> PathBuf {
        self.root.join(MODULE_OUTPUT_DIR)
    }

    fn add_report(
        &self,
        path: &Path,
        module_name: &str,
        display_name: &str,
    ) -> Result<(), RegistrationError> {
        if !path.is_file() {
            return Err(RegistrationError::Rejected(format!(
                "report file does not exist: {}",
                path.display()
            )));
        }
        let entry = ReportEntry {
            path: path.to_string_lossy().to_string(),
            module_name: module_name.to_string(),
            display_name: display_name.to_string(),
            added_at: chrono::Local::now().to_rfc3339(),
        };
        let mut line = serde_json::to_string(&entry)?;
        line.push('\n');

        let _guard = self
            .registry
            .lock()
            .map_err(|_| RegistrationError::Rejected("report registry lock poisoned".to_string()))?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.reports_path())?;
        file.write_all(line.as_bytes())?;
        file.flush()?;
        info!("registered report {} for {display_name}", path.display());
        Ok(())
    }
}
