//! Scanner module - runs one scan loop per monitored target.
//!
//! `Scanner` owns the target list and spawns a `TargetScheduler` task for
//! each one. Every task gets a child of one root cancellation token, so a
//! single target can be stopped on its own and `stop` tears down all of them.

pub mod icmp;
pub mod pool;
pub mod rate_limiter;
pub mod schedule;
pub mod tcp;
pub mod traits;
pub mod udp;

use crate::error::ScannerError;
use crate::report::Reporter;
use crate::types::Target;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub use icmp::IcmpProber;
pub use pool::WorkerPool;
pub use rate_limiter::RateLimiter;
pub use schedule::{Jitter, Observation, Probers, SharedRng, TargetScheduler};
pub use tcp::TcpConnectProber;
pub use traits::{Liveness, LivenessProber, PortProber, PortStatus};
pub use udp::UdpProber;

/// Process-wide scan settings shared by every target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanSettings {
    /// Per-probe timeout: ICMP read, TCP connect, UDP wait.
    pub timeout: Duration,
    /// Worker pool width of a single port scan.
    pub concurrency: usize,
    /// Datagrams sent per UDP port.
    pub udp_retries: u32,
    /// Window the per-cycle jitter is drawn from.
    pub jitter: Jitter,
    /// Fixed RNG seed; `None` seeds from the OS.
    pub seed: Option<u64>,
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(2),
            concurrency: pool::DEFAULT_WIDTH,
            udp_retries: udp::DEFAULT_RETRIES,
            jitter: Jitter::default(),
            seed: None,
        }
    }
}

struct RunningTarget {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
    state: watch::Receiver<Arc<Observation>>,
}

/// Orchestrates the per-target scan loops.
pub struct Scanner {
    targets: Vec<Target>,
    settings: ScanSettings,
    probers: Probers,
    reporter: Arc<dyn Reporter>,
    rng: SharedRng,
    root: CancellationToken,
    running: HashMap<String, RunningTarget>,
}

impl Scanner {
    /// Create a scanner using the real ICMP, TCP and UDP probers.
    pub fn new(targets: Vec<Target>, settings: ScanSettings, reporter: Arc<dyn Reporter>) -> Self {
        let probers = Probers::network(&settings);
        Self::with_probers(targets, settings, probers, reporter)
    }

    /// Create a scanner driving the given probers.
    pub fn with_probers(
        targets: Vec<Target>,
        settings: ScanSettings,
        probers: Probers,
        reporter: Arc<dyn Reporter>,
    ) -> Self {
        let rng = match settings.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Self {
            targets,
            settings,
            probers,
            reporter,
            rng: Arc::new(Mutex::new(rng)),
            root: CancellationToken::new(),
            running: HashMap::new(),
        }
    }

    pub fn targets(&self) -> &[Target] {
        &self.targets
    }

    pub fn settings(&self) -> &ScanSettings {
        &self.settings
    }

    /// Spawn one loop per target and return immediately.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&mut self) -> Result<(), ScannerError> {
        if self.is_running() {
            return Err(ScannerError::AlreadyRunning);
        }

        self.root = CancellationToken::new();
        for target in &self.targets {
            if self.running.contains_key(&target.name) {
                warn!(host = %target.name, "duplicate target name, skipping");
                continue;
            }

            let scheduler = TargetScheduler::new(
                target.clone(),
                self.probers.clone(),
                &self.settings,
                Arc::clone(&self.rng),
                Arc::clone(&self.reporter),
            );
            let state = scheduler.subscribe();
            let cancel = self.root.child_token();
            let handle = tokio::spawn(scheduler.run(cancel.clone()));

            debug!(host = %target.name, ip = %target.ip, "spawned target loop");
            self.running.insert(
                target.name.clone(),
                RunningTarget {
                    cancel,
                    handle,
                    state,
                },
            );
        }

        info!(targets = self.running.len(), "scanner started");
        Ok(())
    }

    /// Cancel the loop of one target and wait for it to end.
    pub async fn stop_target(&mut self, name: &str) -> Result<(), ScannerError> {
        let running = self
            .running
            .remove(name)
            .ok_or_else(|| ScannerError::UnknownTarget(name.to_string()))?;

        running.cancel.cancel();
        join(name, running.handle).await;
        info!(host = name, "target stopped");
        Ok(())
    }

    /// Cancel every loop and wait for all of them to end.
    pub async fn stop(&mut self) {
        self.root.cancel();
        for (name, running) in self.running.drain() {
            join(&name, running.handle).await;
        }
        info!("scanner stopped");
    }

    pub fn is_running(&self) -> bool {
        !self.running.is_empty()
    }

    /// Names of the targets whose loop is running, sorted.
    pub fn running_targets(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.running.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Latest observation of a running target.
    pub fn snapshot(&self, name: &str) -> Option<Arc<Observation>> {
        self.running
            .get(name)
            .map(|running| running.state.borrow().clone())
    }
}

impl Drop for Scanner {
    fn drop(&mut self) {
        self.root.cancel();
    }
}

async fn join(name: &str, handle: JoinHandle<()>) {
    if let Err(e) = handle.await {
        warn!(host = name, error = %e, "target loop ended abnormally");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::ChannelReporter;
    use async_trait::async_trait;
    use std::net::{IpAddr, Ipv4Addr};

    struct Unreachable;

    #[async_trait]
    impl LivenessProber for Unreachable {
        async fn probe(&self, _ip: IpAddr) -> Liveness {
            Liveness::Dead
        }
    }

    fn scanner(names: &[&str]) -> Scanner {
        let targets = names
            .iter()
            .map(|name| {
                Target::new(
                    *name,
                    IpAddr::V4(Ipv4Addr::LOCALHOST),
                    Duration::from_millis(10),
                )
            })
            .collect();
        let settings = ScanSettings {
            timeout: Duration::from_millis(100),
            jitter: Jitter::none(),
            seed: Some(1),
            ..ScanSettings::default()
        };
        let probers = Probers {
            liveness: Arc::new(Unreachable),
            ..Probers::network(&settings)
        };
        let (reporter, _rx) = ChannelReporter::new();
        Scanner::with_probers(targets, settings, probers, Arc::new(reporter))
    }

    #[test]
    fn test_default_settings() {
        let settings = ScanSettings::default();
        assert_eq!(settings.timeout, Duration::from_secs(2));
        assert_eq!(settings.concurrency, 512);
        assert_eq!(settings.udp_retries, 2);
        assert_eq!(settings.jitter.min(), Duration::from_millis(1000));
        assert_eq!(settings.jitter.max(), Duration::from_millis(1500));
    }

    #[tokio::test]
    async fn test_start_twice_is_an_error() {
        let mut scanner = scanner(&["a", "b"]);
        assert!(!scanner.is_running());

        scanner.start().unwrap();
        assert!(scanner.is_running());
        assert_eq!(scanner.running_targets(), vec!["a", "b"]);
        assert!(matches!(scanner.start(), Err(ScannerError::AlreadyRunning)));

        scanner.stop().await;
        assert!(!scanner.is_running());
    }

    #[tokio::test]
    async fn test_stop_single_target() {
        let mut scanner = scanner(&["a", "b"]);
        scanner.start().unwrap();

        scanner.stop_target("a").await.unwrap();
        assert_eq!(scanner.running_targets(), vec!["b"]);
        assert!(scanner.snapshot("a").is_none());
        assert!(scanner.snapshot("b").is_some());

        assert!(matches!(
            scanner.stop_target("a").await,
            Err(ScannerError::UnknownTarget(name)) if name == "a"
        ));
        scanner.stop().await;
    }

    #[tokio::test]
    async fn test_restart_after_stop() {
        let mut scanner = scanner(&["a"]);
        scanner.start().unwrap();
        scanner.stop().await;

        scanner.start().unwrap();
        assert_eq!(scanner.running_targets(), vec!["a"]);
        scanner.stop().await;
    }

    #[tokio::test]
    async fn test_duplicate_names_run_once() {
        let mut scanner = scanner(&["dup", "dup"]);
        scanner.start().unwrap();
        assert_eq!(scanner.running_targets(), vec!["dup"]);
        scanner.stop().await;
    }
}
