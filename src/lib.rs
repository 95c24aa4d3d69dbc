//! # portwatch - attack-surface drift monitor
//!
//! portwatch keeps an eye on a fixed set of hosts. For each host it checks
//! reachability with an ICMP echo, scans the configured TCP and UDP port
//! ranges while the host is up, and compares the open ports against an
//! operator-declared baseline. Differences are reported as drift events.
//!
//! ## Features
//!
//! - **Independent loops**: one task per target, each with its own jittered
//!   period and its own cancellation token
//! - **Bounded fan-out**: port scans never exceed the configured pool width,
//!   even for the full 1-65535 range
//! - **Pluggable output**: events go through the [`report::Reporter`] trait
//!   (logs, JSON lines, channels)
//!
//! ## Example Usage
//!
//! ```rust,ignore
//! use portwatch::report::LogReporter;
//! use portwatch::{Config, Scanner};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("portwatch.toml".as_ref())?;
//!     let mut scanner = Scanner::new(config.targets, config.settings, Arc::new(LogReporter));
//!     scanner.start()?;
//!     tokio::signal::ctrl_c().await?;
//!     scanner.stop().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! - [`types`] - ports, range specs and targets
//! - [`diff`] - observed vs. expected open-port comparison
//! - [`scanner`] - probers, the worker pool, per-target loops and the `Scanner`
//! - [`report`] - scan events and reporters
//! - [`cli`] - command-line arguments
//! - [`config`] - TOML configuration and validation
//! - [`logging`] - tracing subscriber setup
//! - [`error`] - error types

pub mod cli;
pub mod config;
pub mod diff;
pub mod error;
pub mod logging;
pub mod report;
pub mod scanner;
pub mod types;

// Re-export commonly used types
pub use config::Config;
pub use diff::{diff, Drift};
pub use error::{ConfigError, ProbeError, RangeError, ScannerError};
pub use report::{Reporter, ScanEvent};
pub use scanner::{Liveness, PortStatus, ScanSettings, Scanner};
pub use types::{Port, Protocol, RangeSpec, Target, Transport};
