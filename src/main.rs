use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use tracing::{info, warn};

use sectorsweep::{
    case::LocalCase,
    cli,
    config::{self, JobSettings},
    evidence::DataSource,
    host::{ConsoleInbox, ConsoleNotifier, HostServices, LogProgress},
    logging,
    pipeline::{ProcessResult, ScanPipeline},
    tool::ProcessRunner,
    util,
};

fn main() -> Result<()> {
    let cli_opts = cli::parse();
    logging::init_logging(cli_opts.log_json);

    let mut loaded = config::load_config(cli_opts.config_path.as_deref())?;
    if let Some(scanner) = &cli_opts.scanner {
        loaded.config.scanner.program = scanner.clone();
    }
    if let Some(expander) = &cli_opts.expander {
        loaded.config.expander.program = expander.clone();
    }
    let hashdb_dir = cli_opts
        .hashdb_dir
        .clone()
        .or_else(|| loaded.config.hashdb_dir.clone())
        .ok_or_else(|| anyhow!("no hashdb directory configured; pass --hashdb-dir"))?;

    util::ensure_output_dir(&cli_opts.case_dir)?;
    let case = LocalCase::open(&cli_opts.case_dir)
        .with_context(|| format!("opening case {}", cli_opts.case_dir.display()))?;

    let cancel_flag = Arc::new(AtomicBool::new(false));
    {
        let flag = cancel_flag.clone();
        ctrlc::set_handler(move || {
            if !flag.swap(true, Ordering::SeqCst) {
                warn!("interrupt received; stopping external tools");
            }
        })?;
    }

    let host = HostServices {
        progress: Arc::new(LogProgress::default()),
        inbox: Arc::new(ConsoleInbox),
        notifier: Arc::new(ConsoleNotifier),
        case: Arc::new(case),
    };
    let runner = Arc::new(ProcessRunner::new(Duration::from_millis(
        loaded.config.poll_interval_ms,
    )));

    info!(
        "starting input={} hashdb={} case={} config_hash={}",
        cli_opts.input.display(),
        hashdb_dir.display(),
        cli_opts.case_dir.display(),
        loaded.config_hash
    );

    let mut pipeline = ScanPipeline::new(
        loaded,
        JobSettings { hashdb_dir },
        host,
        runner,
        cancel_flag,
    )?;
    if let Some(backend) = cli_opts.metadata_backend {
        pipeline = pipeline.with_metadata_backend(util::backend_from_cli(backend));
    }

    let source = DataSource::from_path(&cli_opts.input)
        .with_context(|| format!("opening data source {}", cli_opts.input.display()))?;

    match pipeline.process(&source) {
        ProcessResult::Ok => {
            info!("sectorsweep run finished");
            Ok(())
        }
        ProcessResult::Error => bail!("blacklist scan of {} failed", cli_opts.input.display()),
    }
}
