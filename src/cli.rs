//! Command-line interface definitions for portwatch.
//!
//! Uses `clap` derive macros for declarative argument parsing.

use clap::Parser;
use std::path::PathBuf;

/// Monitor a fleet of hosts for open-port drift.
///
/// Every configured target is pinged on its own period; reachable targets
/// get their TCP and UDP ranges scanned and compared against the expected
/// open ports. Runs until interrupted with Ctrl-C.
#[derive(Parser, Debug)]
#[command(name = "portwatch")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Attack-surface drift monitor", long_about = None)]
pub struct Args {
    /// Path to the TOML configuration file
    /// [default: <XDG config dir>/portwatch/config.toml]
    #[arg(short, long, value_name = "PATH", env = "PORTWATCH_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log level, used when the configuration file sets none
    #[arg(
        short,
        long,
        value_name = "LEVEL",
        default_value = "info",
        value_parser = ["trace", "debug", "info", "warn", "error"]
    )]
    pub log_level: String,

    /// Also write every event as a JSON line on stdout
    #[arg(long)]
    pub json: bool,
}

impl Args {
    /// Level to log at: the configuration file wins over the flag.
    pub fn effective_log_level<'a>(&'a self, configured: Option<&'a str>) -> &'a str {
        configured.unwrap_or(&self.log_level)
    }
}
