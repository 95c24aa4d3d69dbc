//! Error types for portwatch.
//!
//! Uses `thiserror` for ergonomic error definitions. Probe errors are
//! transient and never leave a target's loop; range and configuration
//! errors are fatal at setup time only.

use std::path::PathBuf;
use thiserror::Error;

/// Transient failure of a single probe.
///
/// These are absorbed by the probers and turned into a `Dead` or
/// closed outcome for the current cycle.
#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("failed to open raw ICMP socket: {0}")]
    Bind(#[source] std::io::Error),

    #[error("failed to send probe to {addr}: {source}")]
    Send {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid packet: {0}")]
    InvalidPacket(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Error resolving a port range specification.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RangeError {
    #[error("unsupported port range spec '{0}' (expected \"all\", \"reserved\", \"a-b\" or a comma-separated list)")]
    UnsupportedRangeSpec(String),

    #[error("invalid port range {start}-{end} (bounds must satisfy 1 <= start <= end <= 65535)")]
    InvalidRange { start: u32, end: u32 },
}

/// Configuration loading and validation errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("could not determine the configuration directory")]
    DirectoryNotFound,

    #[error("failed to read {path}: {reason}")]
    ReadFailed { path: PathBuf, reason: String },

    #[error("invalid configuration format: {0}")]
    InvalidFormat(String),

    #[error("invalid duration for '{field}': '{value}'")]
    InvalidDuration { field: String, value: String },

    #[error("target '{target}': '{value}' is not an IP address literal")]
    InvalidAddress { target: String, value: String },

    #[error("target '{target}' {protocol} range: {source}")]
    Range {
        target: String,
        protocol: String,
        #[source]
        source: RangeError,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

impl From<toml::de::Error> for ConfigError {
    fn from(err: toml::de::Error) -> Self {
        Self::InvalidFormat(err.to_string())
    }
}

/// Errors raised by the scanner orchestrator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScannerError {
    #[error("scanner is already running")]
    AlreadyRunning,

    #[error("no running target named '{0}'")]
    UnknownTarget(String),
}

/// Result type alias for probe operations.
pub type ProbeResult<T> = Result<T, ProbeError>;

/// Result type alias for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;
