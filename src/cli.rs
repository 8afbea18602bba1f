use std::path::PathBuf;

use clap::{Parser, ValueEnum};

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetadataBackend {
    Jsonl,
    Csv,
}

#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct CliOptions {
    /// Input data source (disk image; a directory is treated as logical files and skipped)
    #[arg(short, long)]
    pub input: PathBuf,

    /// Blacklist hashdb directory (overrides config)
    #[arg(long)]
    pub hashdb_dir: Option<PathBuf>,

    /// Case directory that receives module output and the report registry
    #[arg(short, long, default_value = "./case")]
    pub case_dir: PathBuf,

    /// Optional path to config file (YAML)
    #[arg(long)]
    pub config_path: Option<PathBuf>,

    /// Scanner executable (overrides config)
    #[arg(long)]
    pub scanner: Option<String>,

    /// Expander executable (overrides config)
    #[arg(long)]
    pub expander: Option<String>,

    /// Export the per-source table into the job directory
    #[arg(long, value_enum)]
    pub metadata_backend: Option<MetadataBackend>,

    /// Emit logs as JSON
    #[arg(long)]
    pub log_json: bool,
}

pub fn parse() -> CliOptions {
    CliOptions::parse()
}
