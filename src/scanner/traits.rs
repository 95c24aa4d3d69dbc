//! Prober trait abstractions.
//!
//! Defines the seams between the target scheduler and the network:
//! one trait for liveness, one for single-port probes. The scheduler only
//! talks to these traits, so tests can swap in scripted probers.

use crate::types::{Port, Transport};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;
use std::time::Duration;

/// Status of a probed port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PortStatus {
    /// Port is open (service listening).
    Open,
    /// Port is closed (connection refused or ICMP port unreachable).
    Closed,
    /// No answer within the timeout, possibly dropped by a firewall.
    Filtered,
    /// UDP only: no unreachable indication arrived, so the port is either
    /// open or silently filtered. Counted as open in scan results.
    #[serde(rename = "open|filtered")]
    OpenFiltered,
}

impl PortStatus {
    /// Whether the port belongs in the observed-open set.
    pub fn is_open(self) -> bool {
        matches!(self, Self::Open | Self::OpenFiltered)
    }
}

impl fmt::Display for PortStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Open => write!(f, "open"),
            Self::Closed => write!(f, "closed"),
            Self::Filtered => write!(f, "filtered"),
            Self::OpenFiltered => write!(f, "open|filtered"),
        }
    }
}

/// Outcome of a liveness probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    /// The host answered; `rtt` is measured from send to reply.
    Alive { rtt: Duration },
    /// No matching reply within the timeout, or the probe itself failed.
    Dead,
}

impl Liveness {
    pub fn is_alive(self) -> bool {
        matches!(self, Self::Alive { .. })
    }

    /// Round-trip time, if the host answered.
    pub fn rtt(self) -> Option<Duration> {
        match self {
            Self::Alive { rtt } => Some(rtt),
            Self::Dead => None,
        }
    }
}

/// Decides whether a host is reachable.
///
/// Implementations must never block longer than their configured timeout
/// plus one bounded retry window, and must absorb every I/O error.
#[async_trait]
pub trait LivenessProber: Send + Sync {
    async fn probe(&self, ip: IpAddr) -> Liveness;
}

/// Probes a single port over one transport.
///
/// Every failure is folded into the returned status; nothing propagates.
#[async_trait]
pub trait PortProber: Send + Sync {
    /// Transport this prober speaks.
    fn transport(&self) -> Transport;

    /// Probe one port on `ip`.
    async fn probe_port(&self, ip: IpAddr, port: Port) -> PortStatus;

    /// Per-attempt timeout.
    fn timeout(&self) -> Duration;
}
