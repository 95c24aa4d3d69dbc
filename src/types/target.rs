//! Monitored target definitions.
//!
//! A `Target` is built once from validated configuration. Its resolved
//! port lists are fixed for the lifetime of the process; only the
//! scheduler's observations change from cycle to cycle.

use super::port::{Port, RangeSpec};
use crate::error::RangeError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::net::IpAddr;
use std::num::NonZeroU32;
use std::time::Duration;

/// Transport protocol a port set belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    Tcp,
    Udp,
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tcp => write!(f, "tcp"),
            Self::Udp => write!(f, "udp"),
        }
    }
}

/// Per-protocol scan configuration of a target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Protocol {
    range: RangeSpec,
    ports: Vec<Port>,
    expected: BTreeSet<Port>,
}

impl Protocol {
    /// Create a protocol config, resolving the range immediately.
    pub fn new(range: RangeSpec, expected: impl IntoIterator<Item = Port>) -> Self {
        let ports = range.resolve();
        Self {
            range,
            ports,
            expected: expected.into_iter().collect(),
        }
    }

    /// Parse the range spec and build the protocol config.
    pub fn parse(
        range: &str,
        expected: impl IntoIterator<Item = Port>,
    ) -> Result<Self, RangeError> {
        Ok(Self::new(range.parse()?, expected))
    }

    /// The declarative range this protocol was built from.
    pub fn range(&self) -> &RangeSpec {
        &self.range
    }

    /// Ports to probe, ascending and deduplicated.
    pub fn ports(&self) -> &[Port] {
        &self.ports
    }

    /// Baseline set of ports that should be open.
    pub fn expected(&self) -> &BTreeSet<Port> {
        &self.expected
    }
}

/// One monitored host.
#[derive(Debug, Clone)]
pub struct Target {
    /// Human label, expected unique.
    pub name: String,
    /// Address probed every cycle; never re-resolved.
    pub ip: IpAddr,
    /// Base interval between cycles, before jitter.
    pub icmp_period: Duration,
    /// TCP scan configuration, if TCP is monitored.
    pub tcp: Option<Protocol>,
    /// UDP scan configuration, if UDP is monitored.
    pub udp: Option<Protocol>,
    /// Optional cap on port probes per second.
    pub rate_limit: Option<NonZeroU32>,
}

impl Target {
    /// Create a target that only runs liveness probes.
    pub fn new(name: impl Into<String>, ip: IpAddr, icmp_period: Duration) -> Self {
        Self {
            name: name.into(),
            ip,
            icmp_period,
            tcp: None,
            udp: None,
            rate_limit: None,
        }
    }

    /// Monitor TCP ports.
    pub fn with_tcp(mut self, protocol: Protocol) -> Self {
        self.tcp = Some(protocol);
        self
    }

    /// Monitor UDP ports.
    pub fn with_udp(mut self, protocol: Protocol) -> Self {
        self.udp = Some(protocol);
        self
    }

    /// Limit port probes to `rate` per second.
    pub fn with_rate_limit(mut self, rate: NonZeroU32) -> Self {
        self.rate_limit = Some(rate);
        self
    }

    /// Protocol configuration for a transport.
    pub fn protocol(&self, transport: Transport) -> Option<&Protocol> {
        match transport {
            Transport::Tcp => self.tcp.as_ref(),
            Transport::Udp => self.udp.as_ref(),
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.ip)
    }
}
