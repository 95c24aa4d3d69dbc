//! Scan events and their delivery.
//!
//! The scheduler publishes immutable `ScanEvent` snapshots to a `Reporter`.
//! What happens to them (logs, JSON lines, a channel, a metrics exporter)
//! is the reporter's business.

mod json;
mod logger;

pub use json::JsonLinesReporter;
pub use logger::LogReporter;

use crate::diff::Drift;
use crate::scanner::Liveness;
use crate::types::{Port, Target, Transport};
use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use std::collections::BTreeSet;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Result of one liveness probe.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LivenessEvent {
    pub target: String,
    pub ip: IpAddr,
    pub alive: bool,
    #[serde(rename = "rtt_ms", serialize_with = "serialize_rtt")]
    pub rtt: Option<Duration>,
    pub at: DateTime<Utc>,
}

impl LivenessEvent {
    pub fn new(target: &Target, liveness: Liveness) -> Self {
        Self {
            target: target.name.clone(),
            ip: target.ip,
            alive: liveness.is_alive(),
            rtt: liveness.rtt(),
            at: Utc::now(),
        }
    }
}

/// Result of one protocol scan, diffed against its baseline.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DriftEvent {
    pub target: String,
    pub ip: IpAddr,
    pub protocol: Transport,
    /// Every port observed open this cycle. For UDP this includes
    /// open|filtered ports.
    pub open: BTreeSet<Port>,
    pub added: BTreeSet<Port>,
    pub removed: BTreeSet<Port>,
    pub diff_count: usize,
    pub at: DateTime<Utc>,
}

impl DriftEvent {
    pub fn new(target: &Target, protocol: Transport, open: BTreeSet<Port>, drift: Drift) -> Self {
        Self {
            target: target.name.clone(),
            ip: target.ip,
            protocol,
            open,
            added: drift.added,
            removed: drift.removed,
            diff_count: drift.count,
            at: Utc::now(),
        }
    }
}

/// Everything the core emits.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ScanEvent {
    Liveness(LivenessEvent),
    Drift(DriftEvent),
}

impl ScanEvent {
    /// Name of the target the event is about.
    pub fn target(&self) -> &str {
        match self {
            Self::Liveness(e) => &e.target,
            Self::Drift(e) => &e.target,
        }
    }
}

fn serialize_rtt<S: Serializer>(rtt: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error> {
    match rtt {
        Some(rtt) => serializer.serialize_some(&(rtt.as_secs_f64() * 1000.0)),
        None => serializer.serialize_none(),
    }
}

/// Receives scan events from every target loop.
///
/// Called from many tasks at once; implementations must not block.
pub trait Reporter: Send + Sync {
    fn report(&self, event: &ScanEvent);
}

/// Forwards owned events into an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelReporter {
    tx: mpsc::UnboundedSender<ScanEvent>,
}

impl ChannelReporter {
    /// Create a reporter and the receiving end of its channel.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ScanEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl Reporter for ChannelReporter {
    fn report(&self, event: &ScanEvent) {
        if self.tx.send(event.clone()).is_err() {
            tracing::trace!(target_name = event.target(), "event receiver dropped");
        }
    }
}

/// Forwards each event to several reporters, in order.
#[derive(Default, Clone)]
pub struct FanoutReporter {
    reporters: Vec<Arc<dyn Reporter>>,
}

impl FanoutReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, reporter: Arc<dyn Reporter>) -> Self {
        self.reporters.push(reporter);
        self
    }

    pub fn len(&self) -> usize {
        self.reporters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reporters.is_empty()
    }
}

impl Reporter for FanoutReporter {
    fn report(&self, event: &ScanEvent) {
        for reporter in &self.reporters {
            reporter.report(event);
        }
    }
}
