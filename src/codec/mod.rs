//! Protocol packet codec.
//!
//! Pure construction of request payloads for DNS, NTP and Memcached, and the
//! predicates that decide whether a captured datagram is a response to a
//! probe. Nothing in here touches the network.
//!
//! The predicates are deliberately permissive: a datagram from the right
//! source address and port is almost always counted, because malformed but
//! genuine amplification traffic still consumes victim bandwidth.

pub mod dns;
pub mod memcached;
pub mod ntp;

use crate::config::ProbeConfig;
use crate::types::{DnsQueryType, Protocol};
use std::net::{IpAddr, SocketAddr};

pub use dns::build_dns_query;
pub use memcached::{build_memcached_get, build_memcached_stats_probe};
pub use ntp::{build_mode7_packet, build_ntp_request};

/// Size of a UDP header in bytes.
pub const UDP_HEADER_LEN: usize = 8;

/// One UDP datagram observed during a listen window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedPacket {
    /// Sender of the datagram.
    pub source: SocketAddr,
    /// Length field of the UDP header (header included).
    pub udp_length: u16,
    /// Bytes following the UDP header as captured, trailing padding included.
    pub payload: Vec<u8>,
    /// Trailing bytes of `payload` added by the link layer.
    pub padding: usize,
}

impl CapturedPacket {
    /// A datagram delivered whole by the kernel: no padding, exact length.
    pub fn from_datagram(source: SocketAddr, payload: Vec<u8>) -> Self {
        let udp_length = (payload.len() + UDP_HEADER_LEN).min(u16::MAX as usize) as u16;
        Self {
            source,
            udp_length,
            payload,
            padding: 0,
        }
    }

    /// Mark the last `padding` bytes of the payload as link-layer padding.
    pub fn with_padding(mut self, padding: usize) -> Self {
        self.padding = padding.min(self.payload.len());
        self
    }

    /// Payload without link-layer padding.
    pub fn content(&self) -> &[u8] {
        &self.payload[..self.payload.len() - self.padding.min(self.payload.len())]
    }
}

/// Decides which captured datagrams belong to one probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponseFilter {
    target: IpAddr,
    protocol: Protocol,
    dns_query_type: Option<DnsQueryType>,
}

impl ResponseFilter {
    pub fn new(target: IpAddr, protocol: Protocol) -> Self {
        Self {
            target,
            protocol,
            dns_query_type: None,
        }
    }

    /// Filter for the probe `config` describes.
    pub fn for_config(target: IpAddr, config: &ProbeConfig) -> Self {
        let filter = Self::new(target, config.protocol());
        match config {
            ProbeConfig::Dns(dns) => filter.with_dns_query_type(dns.query_type),
            _ => filter,
        }
    }

    pub fn with_dns_query_type(mut self, query_type: DnsQueryType) -> Self {
        self.dns_query_type = Some(query_type);
        self
    }

    /// Whether the datagram came from the target's well-known server port.
    pub fn is_attributable(&self, packet: &CapturedPacket) -> bool {
        normalize(packet.source.ip()) == normalize(self.target)
            && packet.source.port() == self.protocol.well_known_port()
    }

    /// Whether the datagram counts as a response to the probe.
    pub fn accepts(&self, packet: &CapturedPacket) -> bool {
        if !self.is_attributable(packet) {
            return false;
        }

        match self.protocol {
            Protocol::Dns => {
                dns::is_valid_dns_response(packet.content(), self.dns_query_type.unwrap_or_default())
            }
            Protocol::Ntp | Protocol::Memcached => true,
        }
    }
}

/// Protocol-specific validity predicate for a captured datagram.
pub fn is_valid_response(packet: &CapturedPacket, target: IpAddr, config: &ProbeConfig) -> bool {
    ResponseFilter::for_config(target, config).accepts(packet)
}

/// How many bytes a captured datagram adds to a probe's response size.
///
/// DNS counts the UDP length field, so a datagram whose later IP fragments
/// were not captured still counts in full. NTP and Memcached count the
/// captured payload minus link-layer padding.
pub fn response_bytes(protocol: Protocol, packet: &CapturedPacket) -> usize {
    match protocol {
        Protocol::Dns => (packet.udp_length as usize).saturating_sub(UDP_HEADER_LEN),
        Protocol::Ntp | Protocol::Memcached => packet.content().len(),
    }
}

/// IPv4-mapped IPv6 addresses compare equal to their IPv4 form.
fn normalize(ip: IpAddr) -> IpAddr {
    match ip {
        IpAddr::V6(v6) => v6
            .to_ipv4_mapped()
            .map(IpAddr::V4)
            .unwrap_or(IpAddr::V6(v6)),
        v4 => v4,
    }
}
