use std::path::{Path, PathBuf};

use anyhow::Result;
use serde::Deserialize;
use sha2::{Digest, Sha256};

#[derive(Debug, Deserialize, Clone)]
pub struct ScannerConfig {
    pub program: String,
    pub block_size: u32,
    pub sector_size: u32,
    pub output_dir_name: String,
    pub match_file_name: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ExpanderConfig {
    pub program: String,
    pub mode: u32,
    pub expanded_file_name: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ViewerConfig {
    pub program: String,
    pub launcher_name: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub module_name: String,
    #[serde(default)]
    pub hashdb_dir: Option<PathBuf>,
    pub poll_interval_ms: u64,
    pub scanner: ScannerConfig,
    pub expander: ExpanderConfig,
    pub viewer: ViewerConfig,
}

#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: Config,
    pub config_hash: String,
}

/// Per-job settings supplied by whoever schedules the scan.
#[derive(Debug, Clone)]
pub struct JobSettings {
    pub hashdb_dir: PathBuf,
}

pub fn load_config(path: Option<&Path>) -> Result<LoadedConfig> {
    let bytes: Vec<u8> = if let Some(p) = path {
        std::fs::read(p)?
    } else {
        include_bytes!("../config/default.yml").to_vec()
    };

    let mut config: Config = serde_yaml::from_slice(&bytes)?;
    if config.module_name.trim().is_empty() {
        config.module_name = "Block Hash Blacklist".to_string();
    }
    if config.poll_interval_ms == 0 {
        config.poll_interval_ms = 100;
    }

    let config_hash = hash_bytes(&bytes);

    Ok(LoadedConfig { config, config_hash })
}

fn hash_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let digest = hasher.finalize();
    hex::encode(digest)
}
