//! Protocol and query-type tags.
//!
//! Each enum maps a human-readable name onto the wire constant the codec
//! needs, so invalid query types are rejected when configuration is parsed
//! rather than when a packet is built.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A reflection protocol the engine knows how to probe.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Dns,
    Ntp,
    Memcached,
}

impl Protocol {
    /// All protocols, in the order reports list them.
    pub const ALL: [Protocol; 3] = [Protocol::Dns, Protocol::Ntp, Protocol::Memcached];

    /// The UDP port a reflector for this protocol answers from.
    #[inline]
    pub const fn well_known_port(self) -> u16 {
        match self {
            Self::Dns => 53,
            Self::Ntp => 123,
            Self::Memcached => 11211,
        }
    }

    /// Lowercase protocol name, as used in file names and JSON.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Dns => "dns",
            Self::Ntp => "ntp",
            Self::Memcached => "memcached",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Protocol {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "dns" => Ok(Self::Dns),
            "ntp" => Ok(Self::Ntp),
            "memcached" | "memcache" => Ok(Self::Memcached),
            _ => Err(ConfigError::UnknownProtocol(s.to_string())),
        }
    }
}

/// DNS record types used as amplification probes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "UPPERCASE")]
pub enum DnsQueryType {
    #[value(name = "A")]
    A,
    #[value(name = "ANY")]
    Any,
    #[value(name = "NS")]
    Ns,
    #[value(name = "AXFR")]
    Axfr,
    #[value(name = "DNSKEY")]
    Dnskey,
    #[value(name = "TXT")]
    Txt,
}

impl DnsQueryType {
    /// Numeric QTYPE carried in the question section.
    pub const fn code(self) -> u16 {
        match self {
            Self::A => 1,
            Self::Ns => 2,
            Self::Txt => 16,
            Self::Dnskey => 48,
            Self::Axfr => 252,
            Self::Any => 255,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::A => "A",
            Self::Any => "ANY",
            Self::Ns => "NS",
            Self::Axfr => "AXFR",
            Self::Dnskey => "DNSKEY",
            Self::Txt => "TXT",
        }
    }
}

impl Default for DnsQueryType {
    fn default() -> Self {
        Self::A
    }
}

impl fmt::Display for DnsQueryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DnsQueryType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "A" => Ok(Self::A),
            "ANY" => Ok(Self::Any),
            "NS" => Ok(Self::Ns),
            "AXFR" => Ok(Self::Axfr),
            "DNSKEY" => Ok(Self::Dnskey),
            "TXT" => Ok(Self::Txt),
            _ => Err(ConfigError::UnknownDnsQueryType(s.to_string())),
        }
    }
}

/// NTP probe variants.
///
/// Everything except `Basic` is an ntpd Mode 7 request identified by a
/// one-byte request code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum NtpQueryType {
    Basic,
    Version,
    Monlist,
    #[value(name = "peer_list")]
    PeerList,
    #[value(name = "peer_list_sum")]
    PeerListSum,
    #[value(name = "get_restrict")]
    GetRestrict,
}

impl NtpQueryType {
    /// Mode 7 request code, or `None` for the Mode 3 `basic` query.
    pub const fn request_code(self) -> Option<u8> {
        match self {
            Self::Basic => None,
            Self::PeerList => Some(0x00),
            Self::PeerListSum => Some(0x01),
            Self::Version => Some(0x04),
            Self::GetRestrict => Some(0x10),
            Self::Monlist => Some(0x2a),
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Basic => "basic",
            Self::Version => "version",
            Self::Monlist => "monlist",
            Self::PeerList => "peer_list",
            Self::PeerListSum => "peer_list_sum",
            Self::GetRestrict => "get_restrict",
        }
    }
}

impl fmt::Display for NtpQueryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NtpQueryType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "basic" => Ok(Self::Basic),
            "version" => Ok(Self::Version),
            "monlist" => Ok(Self::Monlist),
            "peer_list" => Ok(Self::PeerList),
            "peer_list_sum" => Ok(Self::PeerListSum),
            "get_restrict" => Ok(Self::GetRestrict),
            _ => Err(ConfigError::UnknownNtpQueryType(s.to_string())),
        }
    }
}
