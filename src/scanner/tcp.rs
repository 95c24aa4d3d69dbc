//! TCP connect prober.
//!
//! Performs standard TCP connect probes using the operating system's
//! socket API. An established connection means open and is released at
//! once; refusals, timeouts and unreachable errors all mean not open.
//!
//! # Performance Characteristics
//!
//! - **Reliability**: High - uses OS-level connection establishment
//! - **Stealth**: Low - completes full TCP handshake, easily logged
//! - **Privileges**: None required

use crate::scanner::traits::{PortProber, PortStatus};
use crate::types::{Port, Transport};
use async_trait::async_trait;
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::trace;

/// TCP connect prober.
#[derive(Debug, Clone)]
pub struct TcpConnectProber {
    timeout: Duration,
}

impl TcpConnectProber {
    /// Create a prober with the given per-port connect timeout.
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

/// Map a connect error onto a port status.
fn classify(err: &io::Error) -> PortStatus {
    match err.kind() {
        io::ErrorKind::ConnectionRefused | io::ErrorKind::ConnectionReset => PortStatus::Closed,
        io::ErrorKind::TimedOut => PortStatus::Filtered,
        _ => {
            let message = err.to_string().to_lowercase();
            if message.contains("unreachable") {
                PortStatus::Filtered
            } else {
                PortStatus::Closed
            }
        }
    }
}

#[async_trait]
impl PortProber for TcpConnectProber {
    fn transport(&self) -> Transport {
        Transport::Tcp
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn probe_port(&self, ip: IpAddr, port: Port) -> PortStatus {
        let addr = SocketAddr::new(ip, port.as_u16());

        match timeout(self.timeout, TcpStream::connect(addr)).await {
            Ok(Ok(stream)) => {
                drop(stream);
                PortStatus::Open
            }
            Ok(Err(e)) => {
                trace!(%addr, error = %e, "tcp connect failed");
                classify(&e)
            }
            Err(_) => PortStatus::Filtered,
        }
    }
}
