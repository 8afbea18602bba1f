use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EvidenceError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("unsupported evidence type: {0}")]
    Unsupported(String),
}

/// A data source submitted for ingest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataSource {
    /// Disk image; split images list every segment, the first one is scanned.
    Image { paths: Vec<PathBuf> },
    /// Loose files or a directory tree; nothing to scan at block level.
    LogicalFiles { root: PathBuf },
}

impl DataSource {
    pub fn image(path: impl Into<PathBuf>) -> Self {
        DataSource::Image {
            paths: vec![path.into()],
        }
    }

    /// Classify a path: directories are logical file sets, regular files and
    /// devices are images.
    pub fn from_path(path: &Path) -> Result<Self, EvidenceError> {
        let metadata = std::fs::metadata(path)?;
        if metadata.is_dir() {
            return Ok(DataSource::LogicalFiles {
                root: path.to_path_buf(),
            });
        }
        if metadata.is_file() || is_device(&metadata) {
            return Ok(DataSource::image(path));
        }
        Err(EvidenceError::Unsupported(path.display().to_string()))
    }

    /// Path of the first image segment, if this is an image source.
    pub fn image_path(&self) -> Option<&Path> {
        match self {
            DataSource::Image { paths } => paths.first().map(PathBuf::as_path),
            DataSource::LogicalFiles { .. } => None,
        }
    }
}

#[cfg(unix)]
fn is_device(metadata: &std::fs::Metadata) -> bool {
    use std::os::unix::fs::FileTypeExt;
    let ft = metadata.file_type();
    ft.is_block_device() || ft.is_char_device()
}

#[cfg(not(unix))]
fn is_device(_metadata: &std::fs::Metadata) -> bool {
    false
}
