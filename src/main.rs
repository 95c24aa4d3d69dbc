use anyhow::{Context, Result};
use clap::Parser;
use portwatch::cli::Args;
use portwatch::report::{FanoutReporter, JsonLinesReporter, LogReporter};
use portwatch::{logging, Config, Scanner};
use std::sync::Arc;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    eprintln!("portwatch v{}", env!("CARGO_PKG_VERSION"));

    let path = match &args.config {
        Some(path) => path.clone(),
        None => Config::default_path().context("no --config given and no default location")?,
    };
    let config = Config::load(&path)
        .with_context(|| format!("failed to load configuration from {}", path.display()))?;

    logging::init(args.effective_log_level(config.log_level.as_deref()));
    info!(
        config = %path.display(),
        targets = config.targets.len(),
        concurrency = config.settings.concurrency,
        "configuration loaded"
    );

    // SAFETY: geteuid has no preconditions and cannot fail.
    if unsafe { libc::geteuid() } != 0 {
        warn!("not running as root: raw ICMP sockets will fail and every target will report as down");
    }

    let mut reporter = FanoutReporter::new().with(Arc::new(LogReporter::new()));
    if args.json {
        reporter = reporter.with(Arc::new(JsonLinesReporter::stdout()));
    }

    let mut scanner = Scanner::new(config.targets, config.settings, Arc::new(reporter));
    scanner.start()?;

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl-C")?;

    info!("interrupt received, stopping");
    scanner.stop().await;
    Ok(())
}
