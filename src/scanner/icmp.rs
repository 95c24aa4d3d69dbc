//! ICMP echo liveness prober.
//!
//! Builds echo requests by hand, sends them over a raw ICMP socket and
//! waits for the matching echo reply.
//!
//! # Privileges
//!
//! Raw sockets need root (or `CAP_NET_RAW`). Without them the socket cannot
//! be opened, the probe is logged and the host is reported `Dead`.
//!
//! The socket is opened and closed for every probe so that targets never
//! share one. Raw ICMP sockets receive every ICMP packet that reaches the
//! host, so unrelated packets are skipped until the read deadline.

use crate::error::{ProbeError, ProbeResult};
use crate::scanner::traits::{Liveness, LivenessProber};
use async_trait::async_trait;
use pnet::packet::icmp::echo_reply::EchoReplyPacket;
use pnet::packet::icmp::echo_request::{IcmpCodes, MutableEchoRequestPacket};
use pnet::packet::icmp::{self, IcmpPacket, IcmpTypes};
use pnet::packet::ipv4::Ipv4Packet;
use pnet::packet::Packet;
use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use std::io::Read;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::{Duration, Instant};
use tokio::io::unix::AsyncFd;
use tokio::io::Interest;
use tracing::{debug, warn};

/// ICMP echo header: type, code, checksum, identifier, sequence.
const ECHO_HEADER_LEN: usize = 8;

/// Fixed echo payload.
const PAYLOAD: &[u8] = b"portwatch";

/// Fixed echo sequence number.
const SEQUENCE: u16 = 1;

const ICMPV6_ECHO_REQUEST: u8 = 128;
const ICMPV6_ECHO_REPLY: u8 = 129;

/// Large enough for an IP header plus any echo reply we would accept.
const RECV_BUFFER_LEN: usize = 1500;

/// Liveness prober backed by a raw ICMP socket.
#[derive(Debug, Clone)]
pub struct IcmpProber {
    timeout: Duration,
    identifier: u16,
}

impl IcmpProber {
    /// Create a prober whose echo identifier is derived from the process id.
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            identifier: (std::process::id() & 0xffff) as u16,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run one echo exchange.
    ///
    /// A failed socket open is retried once after waiting `timeout`.
    /// Dropping the returned future closes the socket at once.
    pub async fn ping(&self, ip: IpAddr) -> ProbeResult<Liveness> {
        let socket = match open_socket(ip) {
            Ok(socket) => socket,
            Err(e) => {
                debug!(%ip, error = %e, "raw socket busy, retrying once");
                tokio::time::sleep(self.timeout).await;
                open_socket(ip)?
            }
        };

        self.exchange(socket, ip).await
    }

    /// Send the request and wait up to `timeout` for a matching reply.
    ///
    /// Read errors and the deadline both mean `Dead`; only a failed send is
    /// reported as an error. The socket is owned by the exchange and closed
    /// when it finishes or is dropped.
    async fn exchange(&self, socket: AsyncFd<Socket>, ip: IpAddr) -> ProbeResult<Liveness> {
        let packet = echo_request(ip, self.identifier)?;

        let sent_at = Instant::now();
        socket
            .async_io(Interest::WRITABLE, |s| s.send(&packet))
            .await
            .map_err(|source| ProbeError::Send {
                addr: ip.to_string(),
                source,
            })?;

        let mut buffer = [0u8; RECV_BUFFER_LEN];
        let reply = async {
            loop {
                let n = socket
                    .async_io(Interest::READABLE, |mut s: &Socket| s.read(&mut buffer))
                    .await?;
                if n > 0 && is_echo_reply(ip, &buffer[..n], self.identifier) {
                    return Ok::<_, std::io::Error>(sent_at.elapsed());
                }
            }
        };

        let deadline = tokio::time::Instant::from_std(sent_at + self.timeout);
        match tokio::time::timeout_at(deadline, reply).await {
            Ok(Ok(rtt)) => Ok(Liveness::Alive { rtt }),
            Ok(Err(e)) => {
                debug!(%ip, error = %e, "ICMP read failed");
                Ok(Liveness::Dead)
            }
            Err(_) => {
                debug!(%ip, "no ICMP reply");
                Ok(Liveness::Dead)
            }
        }
    }
}

#[async_trait]
impl LivenessProber for IcmpProber {
    async fn probe(&self, ip: IpAddr) -> Liveness {
        match self.ping(ip).await {
            Ok(liveness) => liveness,
            Err(e) => {
                warn!(%ip, error = %e, "ICMP probe failed");
                Liveness::Dead
            }
        }
    }
}

/// Open a non-blocking raw ICMP socket bound to the unspecified address of
/// `ip`'s family and connected to `ip`.
///
/// Connecting makes the kernel drop packets from any other source.
fn open_socket(ip: IpAddr) -> ProbeResult<AsyncFd<Socket>> {
    let (domain, protocol, local) = match ip {
        IpAddr::V4(_) => (
            Domain::IPV4,
            Protocol::ICMPV4,
            SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0),
        ),
        IpAddr::V6(_) => (
            Domain::IPV6,
            Protocol::ICMPV6,
            SocketAddr::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), 0),
        ),
    };

    let socket = Socket::new(domain, Type::RAW, Some(protocol)).map_err(ProbeError::Bind)?;
    socket.bind(&local.into()).map_err(ProbeError::Bind)?;
    socket
        .connect(&SockAddr::from(SocketAddr::new(ip, 0)))
        .map_err(ProbeError::Bind)?;
    socket.set_nonblocking(true).map_err(ProbeError::Bind)?;
    AsyncFd::new(socket).map_err(ProbeError::Bind)
}

/// Serialize an echo request for `ip`'s family.
///
/// ICMPv4 carries its own checksum; for ICMPv6 the kernel computes it over
/// the pseudo-header, so the field is left zero.
fn echo_request(ip: IpAddr, identifier: u16) -> ProbeResult<Vec<u8>> {
    let mut buffer = vec![0u8; ECHO_HEADER_LEN + PAYLOAD.len()];

    match ip {
        IpAddr::V4(_) => {
            let mut packet = MutableEchoRequestPacket::new(&mut buffer).ok_or_else(|| {
                ProbeError::InvalidPacket("echo request buffer too small".to_string())
            })?;
            packet.set_icmp_type(IcmpTypes::EchoRequest);
            packet.set_icmp_code(IcmpCodes::NoCode);
            packet.set_identifier(identifier);
            packet.set_sequence_number(SEQUENCE);
            packet.set_payload(PAYLOAD);

            let checksum = IcmpPacket::new(packet.packet())
                .map(|p| icmp::checksum(&p))
                .ok_or_else(|| ProbeError::InvalidPacket("cannot checksum echo request".to_string()))?;
            packet.set_checksum(checksum);
        }
        IpAddr::V6(_) => {
            buffer[0] = ICMPV6_ECHO_REQUEST;
            buffer[4..6].copy_from_slice(&identifier.to_be_bytes());
            buffer[6..8].copy_from_slice(&SEQUENCE.to_be_bytes());
            buffer[ECHO_HEADER_LEN..].copy_from_slice(PAYLOAD);
        }
    }

    Ok(buffer)
}

/// Check that `data` is an echo reply from `ip` carrying our identifier.
///
/// IPv4 raw sockets deliver the IP header in front of the ICMP message, so
/// the source is checked there as well; IPv6 raw sockets deliver the
/// ICMPv6 message alone and rely on the connected peer filter.
fn is_echo_reply(ip: IpAddr, data: &[u8], identifier: u16) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            let Some(header) = Ipv4Packet::new(data) else {
                return false;
            };
            if header.get_source() != v4 {
                return false;
            }
            let offset = usize::from(header.get_header_length()) * 4;
            data.get(offset..)
                .and_then(EchoReplyPacket::new)
                .is_some_and(|reply| {
                    reply.get_icmp_type() == IcmpTypes::EchoReply
                        && reply.get_identifier() == identifier
                })
        }
        IpAddr::V6(_) => {
            data.len() >= ECHO_HEADER_LEN
                && data[0] == ICMPV6_ECHO_REPLY
                && u16::from_be_bytes([data[4], data[5]]) == identifier
        }
    }
}
