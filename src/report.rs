//! # Report Emission
//!
//! Writes the viewer launcher for a finished job and registers it with the
//! case as a report artifact.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{error, info};

use crate::config::ViewerConfig;
use crate::host::{CaseReports, RegistrationError};

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("failed to write launcher {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to register {} as report for {display_name}: {source}", path.display())]
    Registration {
        path: PathBuf,
        display_name: String,
        #[source]
        source: RegistrationError,
    },
}

pub struct ReportEmitter<'a> {
    viewer: &'a ViewerConfig,
    module_name: &'a str,
    case: &'a dyn CaseReports,
}

impl<'a> ReportEmitter<'a> {
    pub fn new(viewer: &'a ViewerConfig, module_name: &'a str, case: &'a dyn CaseReports) -> Self {
        Self {
            viewer,
            module_name,
            case,
        }
    }

    /// Launcher command for `output_dir`.
    pub fn launcher_command(&self, output_dir: &Path) -> String {
        format!("{} -i \"{}\"", self.viewer.program, output_dir.display())
    }

    /// Write `<job_dir>/<launcher>` pointing the viewer at `output_dir`, then
    /// register it under `image_name`. Returns the launcher path.
    pub fn emit(
        &self,
        job_dir: &Path,
        output_dir: &Path,
        image_name: &str,
    ) -> Result<PathBuf, ReportError> {
        let launcher_path = job_dir.join(&self.viewer.launcher_name);
        let command = self.launcher_command(output_dir);

        write_launcher(&launcher_path, &command).map_err(|source| {
            error!(
                "error writing viewer launcher at {}: {source}",
                launcher_path.display()
            );
            ReportError::Write {
                path: launcher_path.clone(),
                source,
            }
        })?;

        self.case
            .add_report(&launcher_path, self.module_name, image_name)
            .map_err(|source| {
                error!("error adding {image_name} to case as report: {source}");
                ReportError::Registration {
                    path: launcher_path.clone(),
                    display_name: image_name.to_string(),
                    source,
                }
            })?;

        info!("viewer launcher written to {}", launcher_path.display());
        Ok(launcher_path)
    }
}

fn write_launcher(path: &Path, command: &str) -> std::io::Result<()> {
    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)?;
    file.write_all(command.as_bytes())?;
    file.flush()
}
