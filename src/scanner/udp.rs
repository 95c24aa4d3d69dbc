//! UDP prober.
//!
//! Sends a datagram to each port and infers the port state from what comes
//! back. UDP is connectionless, so the answer is often ambiguous.
//!
//! # Detection Methods
//!
//! 1. **UDP Response**: any data received means the port is open
//! 2. **ICMP Port Unreachable**: surfaces as "connection refused" on the
//!    connected socket and means the port is closed
//! 3. **No Response**: open or silently filtered. This cannot be told apart
//!    and is counted as open, so consumers of UDP open-port sets must expect
//!    filtered ports among them.
//!
//! Hosts rate-limit ICMP errors, so wide UDP ranges tend to drift towards
//! open|filtered on busy targets.

use crate::error::ProbeResult;
use crate::scanner::traits::{PortProber, PortStatus};
use crate::types::{Port, Transport};
use async_trait::async_trait;
use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::timeout;
use tracing::trace;

/// Default number of sends per port.
pub const DEFAULT_RETRIES: u32 = 2;

/// Pause between two sends to the same port.
const RETRY_GAP: Duration = Duration::from_millis(100);

/// Protocol-aware payload for a well-known UDP service.
struct UdpProbe {
    port: u16,
    payload: &'static [u8],
}

/// Payloads that make common services answer instead of dropping garbage.
const UDP_PROBES: &[UdpProbe] = &[
    // DNS status query
    UdpProbe {
        port: 53,
        payload: b"\x00\x00\x10\x00\x00\x00\x00\x00\x00\x00\x00\x00",
    },
    // NTP client request
    UdpProbe {
        port: 123,
        payload: b"\xe3\x00\x04\xfa\x00\x01\x00\x00\x00\x01\x00\x00",
    },
    // SNMP get-request, community "public"
    UdpProbe {
        port: 161,
        payload: b"\x30\x26\x02\x01\x01\x04\x06public\xa0\x19\x02\x04",
    },
];

/// Payload for every other port.
const DEFAULT_PROBE: &[u8] = b"\x00";

/// UDP prober.
#[derive(Debug, Clone)]
pub struct UdpProber {
    timeout: Duration,
    retries: u32,
}

impl UdpProber {
    /// Create a prober waiting `timeout` for an answer to each send.
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            retries: DEFAULT_RETRIES,
        }
    }

    /// Set how many datagrams are sent before giving up on an answer.
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries.max(1);
        self
    }

    async fn exchange(&self, addr: SocketAddr) -> ProbeResult<PortStatus> {
        let local = match addr {
            SocketAddr::V4(_) => SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0),
            SocketAddr::V6(_) => SocketAddr::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), 0),
        };

        let socket = UdpSocket::bind(local).await?;
        socket.connect(addr).await?;

        let payload = payload_for(addr.port());
        let mut buffer = [0u8; 1024];

        for attempt in 0..self.retries {
            if let Err(e) = socket.send(payload).await {
                if is_unreachable(&e) {
                    return Ok(PortStatus::Closed);
                }
                return Err(e.into());
            }

            match timeout(self.timeout, socket.recv(&mut buffer)).await {
                Ok(Ok(_)) => return Ok(PortStatus::Open),
                Ok(Err(e)) if is_unreachable(&e) => return Ok(PortStatus::Closed),
                Ok(Err(e)) => trace!(%addr, error = %e, "udp recv failed"),
                Err(_) => {}
            }

            if attempt + 1 < self.retries {
                tokio::time::sleep(RETRY_GAP).await;
            }
        }

        Ok(PortStatus::OpenFiltered)
    }
}

#[async_trait]
impl PortProber for UdpProber {
    fn transport(&self) -> Transport {
        Transport::Udp
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn probe_port(&self, ip: IpAddr, port: Port) -> PortStatus {
        let addr = SocketAddr::new(ip, port.as_u16());
        match self.exchange(addr).await {
            Ok(status) => status,
            Err(e) => {
                trace!(%addr, error = %e, "udp probe failed");
                PortStatus::Filtered
            }
        }
    }
}

/// ICMP port unreachable is reported as a refused connection.
fn is_unreachable(err: &io::Error) -> bool {
    err.kind() == io::ErrorKind::ConnectionRefused
}

/// Get the probe payload for a port.
fn payload_for(port: u16) -> &'static [u8] {
    UDP_PROBES
        .iter()
        .find(|p| p.port == port)
        .map(|p| p.payload)
        .unwrap_or(DEFAULT_PROBE)
}
