//! Bounded worker pool for port fan-out.
//!
//! At most `width` probes are in flight at any instant, whatever the size
//! of the resolved range. A pool and its clones share one set of permits,
//! so the TCP and UDP scans of a target running side by side stay within
//! the same bound. Results are gathered by the single stream consumer, so
//! no locking is needed on the open-port set.

use crate::scanner::rate_limiter::RateLimiter;
use crate::scanner::traits::{PortProber, PortStatus};
use crate::types::Port;
use futures::stream::{self, StreamExt};
use std::collections::BTreeSet;
use std::future::Future;
use std::net::IpAddr;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::trace;

/// Default pool width when none is configured.
pub const DEFAULT_WIDTH: usize = 512;

/// Run `probe` over `ports` with at most `width` probes in flight and
/// collect the ports reported open.
pub async fn run_bounded<F, Fut>(ports: &[Port], width: usize, probe: F) -> BTreeSet<Port>
where
    F: Fn(Port) -> Fut,
    Fut: Future<Output = PortStatus>,
{
    stream::iter(ports.iter().copied())
        .map(|port| {
            let pending = probe(port);
            async move { (port, pending.await) }
        })
        .buffer_unordered(width.max(1))
        .filter_map(|(port, status)| async move { status.is_open().then_some(port) })
        .collect()
        .await
}

/// Pool shared by every port scan of one target.
#[derive(Debug, Clone)]
pub struct WorkerPool {
    width: usize,
    permits: Arc<Semaphore>,
    limiter: Option<RateLimiter>,
}

impl WorkerPool {
    pub fn new(width: usize) -> Self {
        let width = width.max(1);
        Self {
            width,
            permits: Arc::new(Semaphore::new(width)),
            limiter: None,
        }
    }

    /// Gate every probe on a shared rate limiter.
    pub fn with_rate_limiter(mut self, limiter: RateLimiter) -> Self {
        self.limiter = Some(limiter);
        self
    }

    pub fn width(&self) -> usize {
        self.width
    }

    /// Probe every port with `prober` and return the open subset.
    ///
    /// Scans running concurrently on the same pool share its `width`.
    pub async fn scan(&self, prober: &dyn PortProber, ip: IpAddr, ports: &[Port]) -> BTreeSet<Port> {
        trace!(
            %ip,
            protocol = %prober.transport(),
            ports = ports.len(),
            timeout_ms = prober.timeout().as_millis() as u64,
            "port scan started"
        );

        let permits = &self.permits;
        let limiter = self.limiter.as_ref();
        run_bounded(ports, self.width, move |port| async move {
            // The semaphore is never closed.
            let Ok(_permit) = permits.acquire().await else {
                return PortStatus::Filtered;
            };
            if let Some(limiter) = limiter {
                limiter.wait().await;
            }
            prober.probe_port(ip, port).await
        })
        .await
    }
}

impl Default for WorkerPool {
    fn default() -> Self {
        Self::new(DEFAULT_WIDTH)
    }
}
