//! Unprivileged transport over an ordinary UDP socket.
//!
//! Each probe gets its own ephemeral socket, so the kernel already
//! demultiplexes responses by local port. The trade-off is that the kernel
//! only hands over reassembled datagrams: link-layer padding is never seen and
//! a datagram whose fragments were partly lost never arrives at all.

use crate::codec::CapturedPacket;
use crate::error::{ProbeFailure, ProbeResult};
use crate::probe::traits::Transport;
use async_trait::async_trait;
use socket2::{Domain, Protocol as SockProtocol, Socket, Type};
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::{sleep_until, timeout_at, Instant};
use tracing::debug;

/// Largest possible UDP payload.
const MAX_DATAGRAM: usize = 65_535;

/// Transport that sends and receives on a per-probe UDP socket.
pub struct UdpSocketTransport {
    recv_buffer_size: usize,
}

impl UdpSocketTransport {
    /// Receive buffer requested from the kernel, large enough for a burst of
    /// monlist or memcached response datagrams.
    pub const DEFAULT_RECV_BUFFER: usize = 4 * 1024 * 1024;

    pub fn new() -> Self {
        Self {
            recv_buffer_size: Self::DEFAULT_RECV_BUFFER,
        }
    }

    fn bind_for(&self, target: SocketAddr) -> ProbeResult<UdpSocket> {
        let (domain, local): (Domain, SocketAddr) = if target.is_ipv4() {
            (Domain::IPV4, (Ipv4Addr::UNSPECIFIED, 0).into())
        } else {
            (Domain::IPV6, (Ipv6Addr::UNSPECIFIED, 0).into())
        };

        let socket = Socket::new(domain, Type::DGRAM, Some(SockProtocol::UDP))
            .map_err(|e| ProbeFailure::from_io(&e))?;

        // The kernel may clamp this; a smaller buffer only risks drops.
        if let Err(e) = socket.set_recv_buffer_size(self.recv_buffer_size) {
            debug!(error = %e, "could not enlarge receive buffer");
        }

        socket
            .set_nonblocking(true)
            .map_err(|e| ProbeFailure::from_io(&e))?;
        socket
            .bind(&local.into())
            .map_err(|e| ProbeFailure::from_io(&e))?;

        UdpSocket::from_std(socket.into()).map_err(|e| ProbeFailure::from_io(&e))
    }
}

impl Default for UdpSocketTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for UdpSocketTransport {
    fn name(&self) -> &'static str {
        "socket"
    }

    fn requires_privileges(&self) -> bool {
        false
    }

    async fn exchange(
        &self,
        target: SocketAddr,
        payload: &[u8],
        window: Duration,
    ) -> ProbeResult<Vec<CapturedPacket>> {
        let socket = self.bind_for(target)?;

        socket
            .send_to(payload, target)
            .await
            .map_err(|e| ProbeFailure::from_io(&e))?;

        let deadline = Instant::now() + window;
        let mut packets = Vec::new();
        let mut failure = None;
        let mut buf = vec![0u8; MAX_DATAGRAM];

        loop {
            match timeout_at(deadline, socket.recv_from(&mut buf)).await {
                Ok(Ok((n, source))) => {
                    debug!(%source, bytes = n, "datagram received");
                    packets.push(CapturedPacket::from_datagram(source, buf[..n].to_vec()));
                }
                Ok(Err(e)) => {
                    // ICMP errors surface here; nothing more will arrive.
                    debug!(%target, error = %e, "receive failed");
                    failure = Some(ProbeFailure::from_io(&e));
                    sleep_until(deadline).await;
                    break;
                }
                Err(_) => break,
            }
        }

        match failure {
            Some(failure) if packets.is_empty() => Err(failure),
            _ => Ok(packets),
        }
    }
}
