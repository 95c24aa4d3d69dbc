//! JSON lines output.
//!
//! One compact JSON object per event, newline terminated, so the stream can
//! be piped into `jq` or a log shipper.

use super::{Reporter, ScanEvent};
use std::io::{self, Write};
use std::sync::Mutex;
use tracing::warn;

/// Serializes events as JSON lines onto a writer.
#[derive(Debug)]
pub struct JsonLinesReporter<W> {
    writer: Mutex<W>,
}

impl JsonLinesReporter<io::Stdout> {
    /// Write events to standard output.
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write + Send> JsonLinesReporter<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    /// Consume the reporter and return its writer.
    pub fn into_inner(self) -> W {
        self.writer
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_event(&self, event: &ScanEvent) -> io::Result<()> {
        let mut writer = self
            .writer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        serde_json::to_writer(&mut *writer, event)?;
        writer.write_all(b"\n")?;
        writer.flush()
    }
}

impl<W: Write + Send> Reporter for JsonLinesReporter<W> {
    fn report(&self, event: &ScanEvent) {
        if let Err(e) = self.write_event(event) {
            warn!(host = event.target(), error = %e, "failed to write JSON event");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::LivenessEvent;
    use crate::scanner::Liveness;
    use crate::types::Target;
    use std::net::{IpAddr, Ipv6Addr};
    use std::time::Duration;

    #[test]
    fn test_writes_one_object_per_line() {
        let target = Target::new("v6", IpAddr::V6(Ipv6Addr::LOCALHOST), Duration::from_secs(5));
        let reporter = JsonLinesReporter::new(Vec::new());

        reporter.report(&ScanEvent::Liveness(LivenessEvent::new(
            &target,
            Liveness::Dead,
        )));
        reporter.report(&ScanEvent::Liveness(LivenessEvent::new(
            &target,
            Liveness::Alive {
                rtt: Duration::from_millis(1),
            },
        )));

        let output = String::from_utf8(reporter.into_inner()).unwrap();
        let lines: Vec<_> = output.lines().collect();
        assert_eq!(lines.len(), 2);

        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["event"], "liveness");
        assert_eq!(first["target"], "v6");
        assert_eq!(first["ip"], "::1");
        assert_eq!(first["alive"], false);

        let second: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(second["alive"], true);
        assert_eq!(second["rtt_ms"], 1.0);
    }
}
