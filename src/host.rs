//! # Host Services
//!
//! Collaborators the scan pipeline reports to: progress, the message inbox,
//! user alerts, and the case that owns report artifacts. Implementations are
//! injected at construction; the console versions here back the CLI.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use thiserror::Error;
use tracing::{error, info};

#[derive(Debug, Error)]
pub enum RegistrationError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serde error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("report rejected: {0}")]
    Rejected(String),
}

/// Coarse progress for one pipeline run.
pub trait ProgressReporter: Send + Sync {
    fn switch_to_indeterminate(&self);
    fn switch_to_determinate(&self, workunits: u32);
    fn progress(&self, workunit: u32);
}

/// Informational messages shown to the analyst.
pub trait MessageInbox: Send + Sync {
    fn post_message(&self, module_name: &str, message: &str);
}

/// Pop-up style alerts; fired at most once per failed run.
pub trait Notifier: Send + Sync {
    fn alert(&self, title: &str, message: &str);
}

/// The case a run belongs to.
pub trait CaseReports: Send + Sync {
    /// Root under which each module keeps its own output directory.
    fn modules_output_dir(&self) -> PathBuf;
    fn add_report(
        &self,
        path: &Path,
        module_name: &str,
        display_name: &str,
    ) -> Result<(), RegistrationError>;
}

#[derive(Clone)]
pub struct HostServices {
    pub progress: Arc<dyn ProgressReporter>,
    pub inbox: Arc<dyn MessageInbox>,
    pub notifier: Arc<dyn Notifier>,
    pub case: Arc<dyn CaseReports>,
}

impl std::fmt::Debug for HostServices {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostServices")
            .field("modules_output_dir", &self.case.modules_output_dir())
            .finish_non_exhaustive()
    }
}

/// Progress reporter that logs phase changes.
#[derive(Debug, Default)]
pub struct LogProgress {
    workunits: AtomicU32,
}

impl ProgressReporter for LogProgress {
    fn switch_to_indeterminate(&self) {
        self.workunits.store(0, Ordering::Relaxed);
        info!("progress: working");
    }

    fn switch_to_determinate(&self, workunits: u32) {
        self.workunits.store(workunits, Ordering::Relaxed);
    }

    fn progress(&self, workunit: u32) {
        let total = self.workunits.load(Ordering::Relaxed);
        if total > 0 {
            info!("progress: {workunit}/{total}");
        }
    }
}

#[derive(Debug, Default)]
pub struct ConsoleInbox;

impl MessageInbox for ConsoleInbox {
    fn post_message(&self, module_name: &str, message: &str) {
        info!(module = module_name, "{message}");
        println!("[{module_name}] {message}");
    }
}

#[derive(Debug, Default)]
pub struct ConsoleNotifier;

impl Notifier for ConsoleNotifier {
    fn alert(&self, title: &str, message: &str) {
        error!("{title}: {message}");
        eprintln!("{title}: {message}");
    }
}
