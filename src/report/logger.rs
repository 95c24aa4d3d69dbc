//! Reporter writing scan events to the tracing log.

use super::{DriftEvent, LivenessEvent, Reporter, ScanEvent};
use crate::types::Port;
use std::collections::BTreeSet;
use tracing::{info, warn};

/// Logs every event: unreachable hosts and drift at `warn`, the rest at
/// `info`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogReporter;

impl LogReporter {
    pub fn new() -> Self {
        Self
    }

    fn liveness(&self, event: &LivenessEvent) {
        match event.rtt {
            Some(rtt) if event.alive => info!(
                host = %event.target,
                ip = %event.ip,
                rtt_ms = rtt.as_secs_f64() * 1000.0,
                "{} ({}) responds to ICMP requests",
                event.target,
                event.ip
            ),
            _ => warn!(
                host = %event.target,
                ip = %event.ip,
                "{} ({}) does not respond to ICMP requests",
                event.target,
                event.ip
            ),
        }
    }

    fn drift(&self, event: &DriftEvent) {
        if event.diff_count > 0 {
            warn!(
                host = %event.target,
                ip = %event.ip,
                protocol = %event.protocol,
                added = %join_ports(&event.added),
                removed = %join_ports(&event.removed),
                diff = event.diff_count,
                "{} ({}) {} ports drifted from baseline",
                event.target,
                event.ip,
                event.protocol
            );
        } else {
            info!(
                host = %event.target,
                ip = %event.ip,
                protocol = %event.protocol,
                open = %join_ports(&event.open),
                "{} ({}) {} ports match baseline",
                event.target,
                event.ip,
                event.protocol
            );
        }
    }
}

impl Reporter for LogReporter {
    fn report(&self, event: &ScanEvent) {
        match event {
            ScanEvent::Liveness(e) => self.liveness(e),
            ScanEvent::Drift(e) => self.drift(e),
        }
    }
}

/// Render a port set as `22,80,443`.
fn join_ports(ports: &BTreeSet<Port>) -> String {
    ports
        .iter()
        .map(|p| p.to_string())
        .collect::<Vec<_>>()
        .join(",")
}
