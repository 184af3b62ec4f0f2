//! Privileged transport that sniffs responses at the link layer.
//!
//! The request still leaves through an ordinary UDP socket, but responses are
//! read from a `pnet` datalink channel. This sees things the socket API hides:
//! Ethernet padding on short frames, and the first fragment of a datagram
//! whose later fragments never arrived.
//!
//! # Privileges Required
//!
//! Opening a datalink channel requires root (or `CAP_NET_RAW`).

use crate::codec::{CapturedPacket, UDP_HEADER_LEN};
use crate::error::{ConfigError, ConfigResult, ProbeFailure, ProbeResult};
use crate::probe::traits::Transport;
use async_trait::async_trait;
use pnet::datalink::{self, Channel, DataLinkReceiver, NetworkInterface};
use pnet::packet::ethernet::{EtherTypes, EthernetPacket};
use pnet::packet::ip::IpNextHeaderProtocols;
use pnet::packet::ipv4::Ipv4Packet;
use pnet::packet::udp::UdpPacket;
use pnet::packet::Packet;
use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tokio::sync::oneshot;
use tracing::{debug, warn};

/// How long a blocking read on the channel waits before rechecking the deadline.
const READ_POLL: Duration = Duration::from_millis(100);

/// Transport that captures responses from a network interface.
///
/// **Requires elevated privileges (root/sudo).**
pub struct RawCaptureTransport {
    interface: NetworkInterface,
}

impl RawCaptureTransport {
    /// Create a capture transport on `interface_name`, or on the first
    /// interface that is up, not loopback and has an IPv4 address.
    pub fn new(interface_name: Option<&str>) -> ConfigResult<Self> {
        let interface = find_interface(interface_name)?;
        debug!(interface = %interface.name, "using capture interface");
        Ok(Self { interface })
    }

    pub fn interface_name(&self) -> &str {
        &self.interface.name
    }
}

#[async_trait]
impl Transport for RawCaptureTransport {
    fn name(&self) -> &'static str {
        "raw"
    }

    fn requires_privileges(&self) -> bool {
        true
    }

    async fn exchange(
        &self,
        target: SocketAddr,
        payload: &[u8],
        window: Duration,
    ) -> ProbeResult<Vec<CapturedPacket>> {
        if !target.is_ipv4() {
            return Err(ProbeFailure::Socket(
                "raw capture only supports IPv4 targets".to_string(),
            ));
        }

        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))
            .await
            .map_err(|e| ProbeFailure::from_io(&e))?;
        let local_port = socket
            .local_addr()
            .map_err(|e| ProbeFailure::from_io(&e))?
            .port();

        let interface = self.interface.clone();
        let (ready_tx, ready_rx) = oneshot::channel();

        let capture = tokio::task::spawn_blocking(move || {
            let rx = match open_receiver(&interface) {
                Ok(rx) => rx,
                Err(failure) => {
                    let _ = ready_tx.send(Err(failure));
                    return Vec::new();
                }
            };
            let deadline = Instant::now() + window;
            let _ = ready_tx.send(Ok(()));
            capture_until(rx, deadline, local_port)
        });

        match ready_rx.await {
            Ok(Ok(())) => {}
            Ok(Err(failure)) => return Err(failure),
            Err(_) => {
                return Err(ProbeFailure::Socket(
                    "capture worker exited before the probe was sent".to_string(),
                ))
            }
        }

        socket
            .send_to(payload, target)
            .await
            .map_err(|e| ProbeFailure::from_io(&e))?;

        let packets = capture
            .await
            .map_err(|e| ProbeFailure::Socket(e.to_string()))?;

        // Held open until here so the kernel does not answer with ICMP.
        drop(socket);

        Ok(packets)
    }
}

fn open_receiver(interface: &NetworkInterface) -> ProbeResult<Box<dyn DataLinkReceiver>> {
    let config = datalink::Config {
        read_timeout: Some(READ_POLL),
        ..Default::default()
    };

    match datalink::channel(interface, config) {
        Ok(Channel::Ethernet(_tx, rx)) => Ok(rx),
        Ok(_) => Err(ProbeFailure::Socket(
            "unsupported datalink channel type".to_string(),
        )),
        Err(e) => {
            let err_str = e.to_string().to_lowercase();
            if err_str.contains("permission") || err_str.contains("operation not permitted") {
                Err(ProbeFailure::Socket(
                    "raw capture requires root/sudo privileges".to_string(),
                ))
            } else {
                Err(ProbeFailure::Socket(e.to_string()))
            }
        }
    }
}

fn capture_until(
    mut rx: Box<dyn DataLinkReceiver>,
    deadline: Instant,
    local_port: u16,
) -> Vec<CapturedPacket> {
    let mut packets = Vec::new();

    while Instant::now() < deadline {
        match rx.next() {
            Ok(frame) => {
                if let Some(packet) = parse_frame(frame, local_port) {
                    debug!(source = %packet.source, bytes = packet.payload.len(), padding = packet.padding, "frame captured");
                    packets.push(packet);
                }
            }
            Err(e) if matches!(e.kind(), io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock) => {}
            Err(e) => {
                warn!(error = %e, "capture stopped early");
                break;
            }
        }
    }

    packets
}

/// Extract the UDP datagram addressed to `local_port` from an Ethernet frame.
///
/// Padding is whatever the frame carries beyond the IPv4 total length.
/// Non-initial fragments carry no UDP header and are skipped; the first
/// fragment keeps the full datagram length in its UDP header.
pub(crate) fn parse_frame(frame: &[u8], local_port: u16) -> Option<CapturedPacket> {
    let ethernet = EthernetPacket::new(frame)?;
    if ethernet.get_ethertype() != EtherTypes::Ipv4 {
        return None;
    }

    let ip_bytes = ethernet.payload();
    let ipv4 = Ipv4Packet::new(ip_bytes)?;
    if ipv4.get_next_level_protocol() != IpNextHeaderProtocols::Udp
        || ipv4.get_fragment_offset() != 0
    {
        return None;
    }

    let header_len = ipv4.get_header_length() as usize * 4;
    let udp_start = header_len;
    if ip_bytes.len() < udp_start + UDP_HEADER_LEN {
        return None;
    }

    let udp = UdpPacket::new(&ip_bytes[udp_start..])?;
    if udp.get_destination() != local_port {
        return None;
    }

    let padding = ip_bytes
        .len()
        .saturating_sub(ipv4.get_total_length() as usize);
    let source = SocketAddr::new(IpAddr::V4(ipv4.get_source()), udp.get_source());

    Some(CapturedPacket {
        source,
        udp_length: udp.get_length(),
        payload: ip_bytes[udp_start + UDP_HEADER_LEN..].to_vec(),
        padding: 0,
    }
    .with_padding(padding))
}

fn find_interface(name: Option<&str>) -> ConfigResult<NetworkInterface> {
    let interfaces = datalink::interfaces();

    if let Some(name) = name {
        interfaces
            .into_iter()
            .find(|iface| iface.name == name)
            .ok_or_else(|| ConfigError::Invalid(format!("network interface not found: {}", name)))
    } else {
        interfaces
            .into_iter()
            .find(|iface| {
                !iface.is_loopback() && iface.is_up() && iface.ips.iter().any(|ip| ip.is_ipv4())
            })
            .ok_or_else(|| ConfigError::Invalid("no suitable network interface found".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pnet::packet::ethernet::MutableEthernetPacket;
    use pnet::packet::ipv4::MutableIpv4Packet;
    use pnet::packet::udp::MutableUdpPacket;

    const ETH: usize = 14;
    const IP: usize = 20;

    /// Build an Ethernet frame carrying `payload` from 192.0.2.10:123 to
    /// `dst_port`, followed by `padding` zero bytes.
    fn frame(dst_port: u16, payload: &[u8], padding: usize, fragment_offset: u16) -> Vec<u8> {
        let udp_len = UDP_HEADER_LEN + payload.len();
        let mut buffer = vec![0u8; ETH + IP + udp_len + padding];

        {
            let mut eth = MutableEthernetPacket::new(&mut buffer[..ETH]).unwrap();
            eth.set_ethertype(EtherTypes::Ipv4);
        }
        {
            let mut ip = MutableIpv4Packet::new(&mut buffer[ETH..ETH + IP]).unwrap();
            ip.set_version(4);
            ip.set_header_length(5);
            ip.set_total_length((IP + udp_len) as u16);
            ip.set_fragment_offset(fragment_offset);
            ip.set_next_level_protocol(IpNextHeaderProtocols::Udp);
            ip.set_source(Ipv4Addr::new(192, 0, 2, 10));
            ip.set_destination(Ipv4Addr::new(198, 51, 100, 1));
        }
        {
            let mut udp = MutableUdpPacket::new(&mut buffer[ETH + IP..ETH + IP + udp_len]).unwrap();
            udp.set_source(123);
            udp.set_destination(dst_port);
            udp.set_length(udp_len as u16);
            udp.set_payload(payload);
        }

        buffer
    }

    #[test]
    fn test_padding_is_measured_from_ip_length() {
        let raw = frame(40000, &[0xAB; 16], 4, 0);
        let packet = parse_frame(&raw, 40000).unwrap();

        assert_eq!(packet.source, "192.0.2.10:123".parse().unwrap());
        assert_eq!(packet.payload.len(), 20);
        assert_eq!(packet.padding, 4);
        assert_eq!(packet.content(), &[0xAB; 16]);
        assert_eq!(packet.udp_length, 24);
    }

    #[test]
    fn test_other_ports_are_ignored() {
        let raw = frame(40001, &[0; 16], 0, 0);
        assert!(parse_frame(&raw, 40000).is_none());
    }

    #[test]
    fn test_trailing_fragments_are_ignored() {
        let raw = frame(40000, &[0; 16], 0, 185);
        assert!(parse_frame(&raw, 40000).is_none());
    }

    #[test]
    fn test_non_ip_frames_are_ignored() {
        let mut raw = frame(40000, &[0; 16], 0, 0);
        {
            let mut eth = MutableEthernetPacket::new(&mut raw[..ETH]).unwrap();
            eth.set_ethertype(EtherTypes::Arp);
        }
        assert!(parse_frame(&raw, 40000).is_none());
    }
}
