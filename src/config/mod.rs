//! Configuration loading and validation.
//!
//! The configuration is a TOML file (see `settings` for its schema). Every
//! check happens here, once, before any target is built: a `Config` that
//! loaded successfully only holds valid targets.

mod settings;

pub use settings::{FileConfig, ProtocolConfig, TargetConfig};

use crate::error::{ConfigError, ConfigResult};
use crate::scanner::{Jitter, ScanSettings};
use crate::types::{Port, Protocol, Target, Transport};
use directories::ProjectDirs;
use std::collections::HashSet;
use std::fs;
use std::net::IpAddr;
use std::num::NonZeroU32;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Accepted values for `log_level`.
pub const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Validated configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Log level from the file, if set.
    pub log_level: Option<String>,
    pub settings: ScanSettings,
    pub targets: Vec<Target>,
}

impl Config {
    /// Default location: `<XDG config dir>/portwatch/config.toml`.
    pub fn default_path() -> ConfigResult<PathBuf> {
        let project =
            ProjectDirs::from("", "", "portwatch").ok_or(ConfigError::DirectoryNotFound)?;
        Ok(project.config_dir().join("config.toml"))
    }

    /// Read and validate a configuration file.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError::ReadFailed {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Self::from_toml(&content)
    }

    /// Parse and validate configuration text.
    pub fn from_toml(content: &str) -> ConfigResult<Self> {
        let file: FileConfig = toml::from_str(content)?;
        Self::try_from(file)
    }
}

impl TryFrom<FileConfig> for Config {
    type Error = ConfigError;

    fn try_from(file: FileConfig) -> ConfigResult<Self> {
        if let Some(level) = &file.log_level {
            if !LOG_LEVELS.contains(&level.to_lowercase().as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "unknown log level '{}' (expected one of {})",
                    level,
                    LOG_LEVELS.join(", ")
                )));
            }
        }

        let timeout = duration("timeout", &file.timeout)?;
        if timeout.is_zero() {
            return Err(ConfigError::Invalid("timeout must be greater than zero".into()));
        }
        if file.concurrency == 0 {
            return Err(ConfigError::Invalid("concurrency must be at least 1".into()));
        }

        let jitter_min = duration("jitter_min", &file.jitter_min)?;
        let jitter_max = duration("jitter_max", &file.jitter_max)?;
        if jitter_min > jitter_max {
            return Err(ConfigError::Invalid(format!(
                "jitter_min ({}) is greater than jitter_max ({})",
                file.jitter_min, file.jitter_max
            )));
        }

        if file.targets.is_empty() {
            return Err(ConfigError::Invalid("no targets configured".into()));
        }

        let mut names = HashSet::new();
        let mut targets = Vec::with_capacity(file.targets.len());
        for raw in &file.targets {
            let target = build_target(raw)?;
            if !names.insert(target.name.clone()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate target name '{}'",
                    target.name
                )));
            }
            targets.push(target);
        }

        Ok(Self {
            log_level: file.log_level.map(|level| level.to_lowercase()),
            settings: ScanSettings {
                timeout,
                concurrency: file.concurrency,
                udp_retries: file.udp_retries,
                jitter: Jitter::new(jitter_min, jitter_max),
                seed: None,
            },
            targets,
        })
    }
}

fn build_target(raw: &TargetConfig) -> ConfigResult<Target> {
    let name = raw.name.trim();
    if name.is_empty() {
        return Err(ConfigError::Invalid("target name must not be empty".into()));
    }

    let ip: IpAddr = raw.ip.trim().parse().map_err(|_| ConfigError::InvalidAddress {
        target: name.to_string(),
        value: raw.ip.clone(),
    })?;

    let field = format!("targets.{}.icmp_period", name);
    let icmp_period = duration(&field, &raw.icmp_period)?;
    if icmp_period.is_zero() {
        return Err(ConfigError::Invalid(format!(
            "{} must be greater than zero",
            field
        )));
    }

    let mut target = Target::new(name, ip, icmp_period);
    if let Some(tcp) = &raw.tcp {
        target = target.with_tcp(build_protocol(name, Transport::Tcp, tcp)?);
    }
    if let Some(udp) = &raw.udp {
        target = target.with_udp(build_protocol(name, Transport::Udp, udp)?);
    }
    if let Some(rate) = NonZeroU32::new(raw.rate_limit) {
        target = target.with_rate_limit(rate);
    }

    Ok(target)
}

fn build_protocol(
    target: &str,
    transport: Transport,
    raw: &ProtocolConfig,
) -> ConfigResult<Protocol> {
    let expected = raw
        .expected
        .iter()
        .map(|&port| {
            Port::from_u32(port).ok_or_else(|| {
                ConfigError::Invalid(format!(
                    "target '{}' {} expected port {} is outside 1-65535",
                    target, transport, port
                ))
            })
        })
        .collect::<ConfigResult<Vec<Port>>>()?;

    Protocol::parse(&raw.range, expected).map_err(|source| ConfigError::Range {
        target: target.to_string(),
        protocol: transport.to_string(),
        source,
    })
}

fn duration(field: &str, value: &str) -> ConfigResult<Duration> {
    humantime::parse_duration(value.trim()).map_err(|_| ConfigError::InvalidDuration {
        field: field.to_string(),
        value: value.to_string(),
    })
}
