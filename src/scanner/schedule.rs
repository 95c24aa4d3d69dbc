//! Per-target scan loop.
//!
//! Each target runs its own loop: wait `icmp_period + jitter`, probe
//! liveness, and when the host answers scan TCP and UDP concurrently, diff
//! both against their baselines and report. A dead host costs exactly one
//! liveness probe per cycle.
//!
//! The latest observation is owned by the loop and published as an
//! immutable `Arc<Observation>` snapshot on a watch channel.

use crate::diff::diff;
use crate::report::{DriftEvent, LivenessEvent, Reporter, ScanEvent};
use crate::scanner::icmp::IcmpProber;
use crate::scanner::pool::WorkerPool;
use crate::scanner::rate_limiter::RateLimiter;
use crate::scanner::tcp::TcpConnectProber;
use crate::scanner::traits::{Liveness, LivenessProber, PortProber};
use crate::scanner::udp::UdpProber;
use crate::scanner::ScanSettings;
use crate::types::{Port, Target, Transport};
use rand::rngs::StdRng;
use rand::Rng;
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Process-scoped RNG shared by every target loop.
pub type SharedRng = Arc<Mutex<StdRng>>;

/// Window the per-cycle jitter is drawn from, inclusive on both ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Jitter {
    min: Duration,
    max: Duration,
}

impl Jitter {
    pub const DEFAULT_MIN: Duration = Duration::from_millis(1000);
    pub const DEFAULT_MAX: Duration = Duration::from_millis(1500);

    /// Create a window; the bounds are ordered if given reversed.
    pub fn new(min: Duration, max: Duration) -> Self {
        if min <= max {
            Self { min, max }
        } else {
            Self { min: max, max: min }
        }
    }

    /// No jitter at all.
    pub const fn none() -> Self {
        Self {
            min: Duration::ZERO,
            max: Duration::ZERO,
        }
    }

    pub fn min(&self) -> Duration {
        self.min
    }

    pub fn max(&self) -> Duration {
        self.max
    }

    /// Draw one delay uniformly from the window.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        rng.gen_range(self.min..=self.max)
    }
}

impl Default for Jitter {
    fn default() -> Self {
        Self::new(Self::DEFAULT_MIN, Self::DEFAULT_MAX)
    }
}

/// What the scheduler last saw for its target.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Observation {
    /// TCP ports open at the last alive cycle.
    pub tcp_open: BTreeSet<Port>,
    /// UDP ports open (or open|filtered) at the last alive cycle.
    pub udp_open: BTreeSet<Port>,
    /// Outcome of the most recent liveness probe.
    pub last_liveness: Option<Liveness>,
    /// Completed cycles.
    pub cycles: u64,
}

/// The probers a scheduler drives.
#[derive(Clone)]
pub struct Probers {
    pub liveness: Arc<dyn LivenessProber>,
    pub tcp: Arc<dyn PortProber>,
    pub udp: Arc<dyn PortProber>,
}

impl Probers {
    /// Real network probers built from the scan settings.
    pub fn network(settings: &ScanSettings) -> Self {
        Self {
            liveness: Arc::new(IcmpProber::new(settings.timeout)),
            tcp: Arc::new(TcpConnectProber::new(settings.timeout)),
            udp: Arc::new(UdpProber::new(settings.timeout).with_retries(settings.udp_retries)),
        }
    }

    fn port(&self, transport: Transport) -> &dyn PortProber {
        match transport {
            Transport::Tcp => self.tcp.as_ref(),
            Transport::Udp => self.udp.as_ref(),
        }
    }
}

/// Drives the scan cycles of one target.
pub struct TargetScheduler {
    target: Target,
    probers: Probers,
    /// Shared by the TCP and UDP scans of a cycle.
    pool: WorkerPool,
    jitter: Jitter,
    rng: SharedRng,
    reporter: Arc<dyn Reporter>,
    state: watch::Sender<Arc<Observation>>,
}

impl TargetScheduler {
    pub fn new(
        target: Target,
        probers: Probers,
        settings: &ScanSettings,
        rng: SharedRng,
        reporter: Arc<dyn Reporter>,
    ) -> Self {
        let mut pool = WorkerPool::new(settings.concurrency);
        if let Some(rate) = target.rate_limit {
            pool = pool.with_rate_limiter(RateLimiter::new(rate));
        }
        let (state, _) = watch::channel(Arc::new(Observation::default()));

        Self {
            target,
            probers,
            pool,
            jitter: settings.jitter,
            rng,
            reporter,
            state,
        }
    }

    pub fn target(&self) -> &Target {
        &self.target
    }

    /// Latest published observation.
    pub fn snapshot(&self) -> Arc<Observation> {
        self.state.borrow().clone()
    }

    /// Receive every observation published from now on.
    pub fn subscribe(&self) -> watch::Receiver<Arc<Observation>> {
        self.state.subscribe()
    }

    /// Delay before the next cycle: `icmp_period` plus fresh jitter.
    pub fn next_delay(&self) -> Duration {
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        self.target.icmp_period + self.jitter.sample(&mut *rng)
    }

    /// Run one full cycle and return the liveness outcome.
    pub async fn run_cycle(&mut self) -> Liveness {
        let liveness = self.probers.liveness.probe(self.target.ip).await;
        self.reporter
            .report(&ScanEvent::Liveness(LivenessEvent::new(&self.target, liveness)));

        let previous = self.snapshot();
        let mut next = Observation {
            last_liveness: Some(liveness),
            cycles: previous.cycles + 1,
            ..Observation::clone(&previous)
        };

        if liveness.is_alive() {
            let (tcp, udp) = tokio::join!(self.scan(Transport::Tcp), self.scan(Transport::Udp));
            next.tcp_open = tcp;
            next.udp_open = udp;
        } else {
            debug!(host = %self.target.name, ip = %self.target.ip, "host down, skipping port scans");
        }

        self.state.send_replace(Arc::new(next));
        liveness
    }

    /// Scan one protocol and report its drift. Unconfigured protocols yield
    /// an empty set without probing.
    async fn scan(&self, transport: Transport) -> BTreeSet<Port> {
        let Some(protocol) = self.target.protocol(transport) else {
            return BTreeSet::new();
        };

        let open = self
            .pool
            .scan(self.probers.port(transport), self.target.ip, protocol.ports())
            .await;
        debug!(
            host = %self.target.name,
            protocol = %transport,
            scanned = protocol.ports().len(),
            open = open.len(),
            "port scan finished"
        );

        let drift = diff(open.iter().copied(), protocol.expected().iter().copied());
        self.reporter.report(&ScanEvent::Drift(DriftEvent::new(
            &self.target,
            transport,
            open.clone(),
            drift,
        )));
        open
    }

    /// Loop until `cancel` fires. Cancellation ends both the wait and an
    /// in-flight cycle; dropped probes close their sockets.
    pub async fn run(mut self, cancel: CancellationToken) {
        debug!(host = %self.target.name, "target loop started");
        loop {
            let delay = self.next_delay();
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = self.run_cycle() => {}
            }
        }
        debug!(host = %self.target.name, "target loop stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::ChannelReporter;
    use crate::scanner::traits::PortStatus;
    use crate::types::Protocol;
    use async_trait::async_trait;
    use rand::SeedableRng;
    use std::net::{IpAddr, Ipv4Addr};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    struct SwitchableHost {
        alive: AtomicBool,
    }

    #[async_trait]
    impl LivenessProber for SwitchableHost {
        async fn probe(&self, _ip: IpAddr) -> Liveness {
            if self.alive.load(Ordering::SeqCst) {
                Liveness::Alive {
                    rtt: Duration::from_millis(1),
                }
            } else {
                Liveness::Dead
            }
        }
    }

    struct ScriptedPorts {
        transport: Transport,
        open: Vec<u16>,
        calls: AtomicUsize,
    }

    impl ScriptedPorts {
        fn new(transport: Transport, open: &[u16]) -> Arc<Self> {
            Arc::new(Self {
                transport,
                open: open.to_vec(),
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl PortProber for ScriptedPorts {
        fn transport(&self) -> Transport {
            self.transport
        }

        async fn probe_port(&self, _ip: IpAddr, port: Port) -> PortStatus {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.open.contains(&port.as_u16()) {
                PortStatus::Open
            } else {
                PortStatus::Closed
            }
        }

        fn timeout(&self) -> Duration {
            Duration::from_millis(10)
        }
    }

    #[derive(Default)]
    struct InFlight {
        now: AtomicUsize,
        peak: AtomicUsize,
    }

    /// Closed-port prober feeding a counter shared across transports.
    struct Metered {
        transport: Transport,
        in_flight: Arc<InFlight>,
    }

    #[async_trait]
    impl PortProber for Metered {
        fn transport(&self) -> Transport {
            self.transport
        }

        async fn probe_port(&self, _ip: IpAddr, _port: Port) -> PortStatus {
            let now = self.in_flight.now.fetch_add(1, Ordering::SeqCst) + 1;
            self.in_flight.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(1)).await;
            self.in_flight.now.fetch_sub(1, Ordering::SeqCst);
            PortStatus::Closed
        }

        fn timeout(&self) -> Duration {
            Duration::from_millis(10)
        }
    }

    fn metered() -> (Probers, Arc<InFlight>) {
        let in_flight = Arc::new(InFlight::default());
        let probers = Probers {
            liveness: Arc::new(SwitchableHost {
                alive: AtomicBool::new(true),
            }),
            tcp: Arc::new(Metered {
                transport: Transport::Tcp,
                in_flight: in_flight.clone(),
            }),
            udp: Arc::new(Metered {
                transport: Transport::Udp,
                in_flight: in_flight.clone(),
            }),
        };
        (probers, in_flight)
    }

    fn ports(raw: &[u16]) -> BTreeSet<Port> {
        raw.iter().filter_map(|&p| Port::new(p)).collect()
    }

    fn seeded() -> SharedRng {
        Arc::new(Mutex::new(StdRng::seed_from_u64(7)))
    }

    fn target() -> Target {
        Target::new(
            "app1",
            IpAddr::V4(Ipv4Addr::new(198, 51, 100, 42)),
            Duration::from_millis(20),
        )
        .with_tcp(Protocol::parse("reserved", ports(&[22, 80, 443])).unwrap())
        .with_udp(Protocol::parse("50-60", ports(&[])).unwrap())
    }

    struct Fixture {
        host: Arc<SwitchableHost>,
        tcp: Arc<ScriptedPorts>,
        udp: Arc<ScriptedPorts>,
        probers: Probers,
    }

    fn fixture(alive: bool) -> Fixture {
        let host = Arc::new(SwitchableHost {
            alive: AtomicBool::new(alive),
        });
        let tcp = ScriptedPorts::new(Transport::Tcp, &[22, 80, 8080, 1024]);
        let udp = ScriptedPorts::new(Transport::Udp, &[53]);
        let probers = Probers {
            liveness: host.clone(),
            tcp: tcp.clone(),
            udp: udp.clone(),
        };
        Fixture {
            host,
            tcp,
            udp,
            probers,
        }
    }

    fn settings() -> ScanSettings {
        ScanSettings {
            concurrency: 16,
            jitter: Jitter::none(),
            ..ScanSettings::default()
        }
    }

    #[test]
    fn test_jitter_stays_in_window() {
        let jitter = Jitter::default();
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..1000 {
            let sample = jitter.sample(&mut rng);
            assert!(sample >= Jitter::DEFAULT_MIN && sample <= Jitter::DEFAULT_MAX);
        }
    }

    #[test]
    fn test_jitter_is_reproducible_with_seed() {
        let jitter = Jitter::default();
        let mut a = StdRng::seed_from_u64(3);
        let mut b = StdRng::seed_from_u64(3);
        let first: Vec<_> = (0..16).map(|_| jitter.sample(&mut a)).collect();
        let second: Vec<_> = (0..16).map(|_| jitter.sample(&mut b)).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn test_jitter_orders_bounds() {
        let jitter = Jitter::new(Duration::from_secs(2), Duration::from_secs(1));
        assert_eq!(jitter.min(), Duration::from_secs(1));
        assert_eq!(jitter.max(), Duration::from_secs(2));
        assert_eq!(
            Jitter::none().sample(&mut StdRng::seed_from_u64(0)),
            Duration::ZERO
        );
    }

    #[test]
    fn test_next_delay_adds_period() {
        let fx = fixture(true);
        let settings = ScanSettings {
            jitter: Jitter::default(),
            ..ScanSettings::default()
        };
        let (reporter, _rx) = ChannelReporter::new();
        let scheduler =
            TargetScheduler::new(target(), fx.probers, &settings, seeded(), Arc::new(reporter));

        for _ in 0..100 {
            let delay = scheduler.next_delay();
            assert!(delay >= Duration::from_millis(1020));
            assert!(delay <= Duration::from_millis(1520));
        }
    }

    #[tokio::test]
    async fn test_alive_cycle_scans_and_reports_drift() {
        let fx = fixture(true);
        let (reporter, mut rx) = ChannelReporter::new();
        let mut scheduler =
            TargetScheduler::new(target(), fx.probers, &settings(), seeded(), Arc::new(reporter));

        assert!(scheduler.run_cycle().await.is_alive());
        assert_eq!(fx.tcp.calls(), 1024);
        assert_eq!(fx.udp.calls(), 11);

        let snapshot = scheduler.snapshot();
        assert_eq!(snapshot.tcp_open, ports(&[22, 80, 1024]));
        assert_eq!(snapshot.udp_open, ports(&[53]));
        assert_eq!(snapshot.cycles, 1);

        assert!(matches!(rx.recv().await, Some(ScanEvent::Liveness(e)) if e.alive));
        let mut drifts = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let ScanEvent::Drift(drift) = event {
                drifts.push(drift);
            }
        }
        drifts.sort_by_key(|d| d.protocol == Transport::Udp);
        assert_eq!(drifts.len(), 2);

        assert_eq!(drifts[0].protocol, Transport::Tcp);
        assert_eq!(drifts[0].added, ports(&[1024]));
        assert_eq!(drifts[0].removed, ports(&[443]));
        assert_eq!(drifts[0].diff_count, 2);

        assert_eq!(drifts[1].protocol, Transport::Udp);
        assert_eq!(drifts[1].added, ports(&[53]));
        assert_eq!(drifts[1].diff_count, 1);
    }

    #[tokio::test]
    async fn test_dead_cycle_skips_ports_and_keeps_state() {
        let fx = fixture(true);
        let (reporter, mut rx) = ChannelReporter::new();
        let mut scheduler =
            TargetScheduler::new(target(), fx.probers, &settings(), seeded(), Arc::new(reporter));

        scheduler.run_cycle().await;
        let before = scheduler.snapshot();
        let (tcp_calls, udp_calls) = (fx.tcp.calls(), fx.udp.calls());
        while rx.try_recv().is_ok() {}

        fx.host.alive.store(false, Ordering::SeqCst);
        assert_eq!(scheduler.run_cycle().await, Liveness::Dead);

        assert_eq!(fx.tcp.calls(), tcp_calls);
        assert_eq!(fx.udp.calls(), udp_calls);

        let after = scheduler.snapshot();
        assert_eq!(after.tcp_open, before.tcp_open);
        assert_eq!(after.udp_open, before.udp_open);
        assert_eq!(after.last_liveness, Some(Liveness::Dead));
        assert_eq!(after.cycles, 2);

        assert!(matches!(rx.try_recv(), Ok(ScanEvent::Liveness(e)) if !e.alive));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_unconfigured_protocol_is_not_probed() {
        let fx = fixture(true);
        let (reporter, mut rx) = ChannelReporter::new();
        let tcp_only = Target::new("tcp-only", IpAddr::V4(Ipv4Addr::LOCALHOST), Duration::from_secs(1))
            .with_tcp(Protocol::parse("22,80", ports(&[22, 80])).unwrap());
        let mut scheduler =
            TargetScheduler::new(tcp_only, fx.probers, &settings(), seeded(), Arc::new(reporter));

        scheduler.run_cycle().await;
        assert_eq!(fx.tcp.calls(), 2);
        assert_eq!(fx.udp.calls(), 0);

        let events: Vec<_> = std::iter::from_fn(|| rx.try_recv().ok()).collect();
        assert_eq!(events.len(), 2);
        assert!(matches!(&events[1], ScanEvent::Drift(d) if d.diff_count == 0));
    }

    #[tokio::test]
    async fn test_run_stops_on_cancel() {
        let fx = fixture(false);
        let (reporter, mut rx) = ChannelReporter::new();
        let scheduler =
            TargetScheduler::new(target(), fx.probers, &settings(), seeded(), Arc::new(reporter));
        let mut updates = scheduler.subscribe();

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(scheduler.run(cancel.clone()));

        updates.changed().await.unwrap();
        assert!(matches!(rx.recv().await, Some(ScanEvent::Liveness(_))));

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("loop did not stop")
            .unwrap();
        assert_eq!(fx.tcp.calls(), 0);
    }

    #[tokio::test]
    async fn test_tcp_and_udp_share_concurrency() {
        let (probers, in_flight) = metered();
        let settings = ScanSettings {
            concurrency: 64,
            ..settings()
        };
        let both = Target::new("both", IpAddr::V4(Ipv4Addr::LOCALHOST), Duration::from_secs(1))
            .with_tcp(Protocol::parse("reserved", Vec::new()).unwrap())
            .with_udp(Protocol::parse("reserved", Vec::new()).unwrap());
        let (reporter, _rx) = ChannelReporter::new();
        let mut scheduler =
            TargetScheduler::new(both, probers, &settings, seeded(), Arc::new(reporter));

        scheduler.run_cycle().await;

        let peak = in_flight.peak.load(Ordering::SeqCst);
        assert!(peak <= 64, "peak concurrency {} exceeded width", peak);
        assert!(peak > 1);
    }

    #[tokio::test]
    async fn test_tcp_and_udp_share_rate_limit() {
        let (probers, _) = metered();
        // 10 ports per protocol fit one burst each, but not a shared one.
        let limited = Target::new("limited", IpAddr::V4(Ipv4Addr::LOCALHOST), Duration::from_secs(1))
            .with_tcp(Protocol::parse("1-10", Vec::new()).unwrap())
            .with_udp(Protocol::parse("11-20", Vec::new()).unwrap())
            .with_rate_limit(std::num::NonZeroU32::new(10).unwrap());
        let (reporter, _rx) = ChannelReporter::new();
        let mut scheduler =
            TargetScheduler::new(limited, probers, &settings(), seeded(), Arc::new(reporter));

        let started = std::time::Instant::now();
        scheduler.run_cycle().await;
        assert!(started.elapsed() >= Duration::from_millis(900));
    }
}
