//! On-disk configuration schema.
//!
//! Mirrors the TOML file one to one. Values stay as written (duration
//! strings, raw port numbers) until `Config` validates them.

use serde::{Deserialize, Serialize};

/// Top-level configuration file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    /// Overrides the log level given on the command line.
    #[serde(default)]
    pub log_level: Option<String>,
    /// Per-probe timeout.
    #[serde(default = "default_timeout")]
    pub timeout: String,
    /// Worker pool width of a port scan.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Datagrams sent per UDP port.
    #[serde(default = "default_udp_retries")]
    pub udp_retries: u32,
    #[serde(default = "default_jitter_min")]
    pub jitter_min: String,
    #[serde(default = "default_jitter_max")]
    pub jitter_max: String,
    #[serde(default)]
    pub targets: Vec<TargetConfig>,
}

/// One `[[targets]]` entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TargetConfig {
    pub name: String,
    pub ip: String,
    pub icmp_period: String,
    /// Port probes per second, 0 for unlimited.
    #[serde(default)]
    pub rate_limit: u32,
    #[serde(default)]
    pub tcp: Option<ProtocolConfig>,
    #[serde(default)]
    pub udp: Option<ProtocolConfig>,
}

/// A `[targets.tcp]` or `[targets.udp]` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProtocolConfig {
    pub range: String,
    /// Raw port numbers; range-checked during validation.
    #[serde(default)]
    pub expected: Vec<u32>,
}

fn default_timeout() -> String {
    "2s".to_string()
}

fn default_concurrency() -> usize {
    512
}

fn default_udp_retries() -> u32 {
    2
}

fn default_jitter_min() -> String {
    "1s".to_string()
}

fn default_jitter_max() -> String {
    "1.5s".to_string()
}
