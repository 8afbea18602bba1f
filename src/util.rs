//! # Utility Module
//!
//! Filesystem helpers shared by the binary and the pipeline.

use std::fs::OpenOptions;
use std::path::Path;

use anyhow::{Result, anyhow};
use tracing::warn;

use crate::cli::MetadataBackend;
use crate::metadata::MetadataBackendKind;

/// Convert CLI metadata backend to internal enum
pub fn backend_from_cli(backend: MetadataBackend) -> MetadataBackendKind {
    match backend {
        MetadataBackend::Jsonl => MetadataBackendKind::Jsonl,
        MetadataBackend::Csv => MetadataBackendKind::Csv,
    }
}

/// Ensure output directory exists and is writable, warning on unsafe permissions.
pub fn ensure_output_dir(path: &Path) -> Result<()> {
    if path.exists() {
        let metadata = std::fs::metadata(path)?;
        if !metadata.is_dir() {
            return Err(anyhow!(
                "output path is not a directory: {}",
                path.display()
            ));
        }
    } else {
        std::fs::create_dir_all(path)?;
    }

    let probe_path = path.join(".sectorsweep_write_probe");
    match OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(&probe_path)
    {
        Ok(_) => {
            let _ = std::fs::remove_file(&probe_path);
        }
        Err(err) => {
            return Err(anyhow!(
                "output directory is not writable: {} ({})",
                path.display(),
                err
            ));
        }
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = std::fs::metadata(path)?.permissions().mode();
        if mode & 0o002 != 0 {
            warn!("output directory is world-writable: {}", path.display());
        }
    }

    Ok(())
}
