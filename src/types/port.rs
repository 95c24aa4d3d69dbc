//! Port types and range resolution.
//!
//! The `Port` newtype ensures values are always valid port numbers (1-65535).
//! `RangeSpec` is the declarative per-protocol range from configuration and
//! resolves once, at setup, into the ordered list of ports to probe.

use crate::error::RangeError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A validated network port number (1-65535).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u16", into = "u16")]
pub struct Port(u16);

impl Port {
    /// Minimum valid port number.
    pub const MIN: u16 = 1;
    /// Maximum valid port number.
    pub const MAX: u16 = 65535;
    /// Last port of the privileged ("reserved") range.
    pub const RESERVED_MAX: u16 = 1024;

    /// Create a new Port from a u16, returning None if invalid.
    #[inline]
    pub const fn new(port: u16) -> Option<Self> {
        if port >= Self::MIN {
            Some(Self(port))
        } else {
            None
        }
    }

    /// Create a Port from a wider integer, as found in config files.
    pub fn from_u32(port: u32) -> Option<Self> {
        u16::try_from(port).ok().and_then(Self::new)
    }

    /// Get the raw port number.
    #[inline]
    pub const fn as_u16(self) -> u16 {
        self.0
    }
}

impl fmt::Display for Port {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<u16> for Port {
    type Error = RangeError;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        Self::new(value).ok_or(RangeError::InvalidRange {
            start: value.into(),
            end: value.into(),
        })
    }
}

impl From<Port> for u16 {
    fn from(port: Port) -> Self {
        port.0
    }
}

/// A range of ports (inclusive).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortRange {
    start: Port,
    end: Port,
}

impl PortRange {
    /// Build a range from raw bounds, validating both ends and their order.
    pub fn new(start: u32, end: u32) -> Result<Self, RangeError> {
        let invalid = RangeError::InvalidRange { start, end };
        let (Some(lo), Some(hi)) = (Port::from_u32(start), Port::from_u32(end)) else {
            return Err(invalid);
        };
        if lo > hi {
            return Err(invalid);
        }
        Ok(Self { start: lo, end: hi })
    }

    const fn between(start: u16, end: u16) -> Self {
        Self {
            start: Port(start),
            end: Port(end),
        }
    }

    /// Get the number of ports in this range.
    pub const fn len(&self) -> usize {
        (self.end.0 - self.start.0) as usize + 1
    }

    /// A valid range always holds at least one port.
    pub const fn is_empty(&self) -> bool {
        false
    }

    /// Iterate over all ports in this range.
    pub fn iter(&self) -> impl Iterator<Item = Port> {
        (self.start.0..=self.end.0).map(Port)
    }
}

impl fmt::Display for PortRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

/// Declarative description of which ports to probe for one protocol.
///
/// Supports:
/// - `"all"`: 1-65535
/// - `"reserved"`: 1-1024
/// - bounded range: `"8000-8100"`
/// - explicit list: `"22,80,443"` (a single `"80"` is a one-element list)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RangeSpec {
    All,
    Reserved,
    Bounded(PortRange),
    List(Vec<Port>),
}

impl RangeSpec {
    /// Expand into the ascending, deduplicated sequence of ports to probe.
    ///
    /// The result is never empty and resolving the same spec twice always
    /// yields the same sequence.
    pub fn resolve(&self) -> Vec<Port> {
        match self {
            Self::All => PortRange::between(Port::MIN, Port::MAX).iter().collect(),
            Self::Reserved => PortRange::between(Port::MIN, Port::RESERVED_MAX)
                .iter()
                .collect(),
            Self::Bounded(range) => range.iter().collect(),
            Self::List(ports) => {
                let mut ports = ports.clone();
                ports.sort_unstable();
                ports.dedup();
                ports
            }
        }
    }
}

/// Parse and resolve a range spec in one step.
pub fn resolve(spec: &str) -> Result<Vec<Port>, RangeError> {
    Ok(spec.parse::<RangeSpec>()?.resolve())
}

impl FromStr for RangeSpec {
    type Err = RangeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let unsupported = || RangeError::UnsupportedRangeSpec(s.to_string());

        match trimmed.to_ascii_lowercase().as_str() {
            "all" => return Ok(Self::All),
            "reserved" => return Ok(Self::Reserved),
            "" => return Err(unsupported()),
            _ => {}
        }

        if let Some((start, end)) = trimmed.split_once('-') {
            let start: u32 = start.trim().parse().map_err(|_| unsupported())?;
            let end: u32 = end.trim().parse().map_err(|_| unsupported())?;
            return PortRange::new(start, end).map(Self::Bounded);
        }

        let mut ports = Vec::new();
        for part in trimmed.split(',') {
            let value: u32 = part.trim().parse().map_err(|_| unsupported())?;
            let port = Port::from_u32(value).ok_or(RangeError::InvalidRange {
                start: value,
                end: value,
            })?;
            ports.push(port);
        }
        Ok(Self::List(ports))
    }
}

impl fmt::Display for RangeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => write!(f, "all"),
            Self::Reserved => write!(f, "reserved"),
            Self::Bounded(range) => write!(f, "{}", range),
            Self::List(ports) => {
                let parts: Vec<String> = ports.iter().map(|p| p.to_string()).collect();
                write!(f, "{}", parts.join(","))
            }
        }
    }
}
