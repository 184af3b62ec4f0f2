//! Probe targets and host lists.
//!
//! Host lists come from an external discovery stage. Entries are either
//! single addresses or CIDR blocks; order is preserved and duplicates are
//! kept, so a host listed twice is probed twice.

use ipnetwork::IpNetwork;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::net::IpAddr;
use std::path::Path;
use std::str::FromStr;
use tracing::warn;

/// One host to probe.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HostEntry {
    /// Address of the candidate reflector.
    pub ip: IpAddr,
    /// Domain to resolve through this host, overriding the DNS configuration.
    ///
    /// Set when the host list pairs authoritative servers with the zones
    /// they serve.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dns_domain: Option<String>,
}

impl HostEntry {
    pub fn new(ip: IpAddr) -> Self {
        Self {
            ip,
            dns_domain: None,
        }
    }

    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.dns_domain = Some(domain.into());
        self
    }
}

impl From<IpAddr> for HostEntry {
    fn from(ip: IpAddr) -> Self {
        Self::new(ip)
    }
}

impl fmt::Display for HostEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.dns_domain {
            Some(domain) => write!(f, "{} ({})", self.ip, domain),
            None => write!(f, "{}", self.ip),
        }
    }
}

/// Error type for target parsing and host list loading.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TargetError {
    #[error("invalid target format: {0}")]
    InvalidFormat(String),
    #[error("invalid CIDR notation: {0}")]
    InvalidCidr(String),
    #[error("CIDR range too large: {0} addresses (max: {1})")]
    CidrTooLarge(u128, u128),
    #[error("failed to read host list {0}: {1}")]
    ReadFailed(String, String),
    #[error("host list {0} is not a JSON array of addresses: {1}")]
    InvalidJson(String, String),
    #[error("unsupported host list extension for {0} (expected .json or .csv)")]
    UnsupportedFormat(String),
}

/// A single host list entry: an address or a CIDR block.
#[derive(Debug, Clone)]
pub enum TargetSpec {
    /// A single IP address.
    Single(IpAddr),
    /// A CIDR network range.
    Cidr(IpNetwork),
}

impl TargetSpec {
    /// Maximum number of hosts allowed in a CIDR range.
    pub const MAX_CIDR_HOSTS: u128 = 65536;

    /// Parse a target specification from a string.
    pub fn parse(s: &str) -> Result<Self, TargetError> {
        let s = s.trim();

        if let Ok(ip) = s.parse::<IpAddr>() {
            return Ok(Self::Single(ip));
        }

        if s.contains('/') {
            let network: IpNetwork = s
                .parse()
                .map_err(|_| TargetError::InvalidCidr(s.to_string()))?;

            let host_count = network_size(&network);
            if host_count > Self::MAX_CIDR_HOSTS {
                return Err(TargetError::CidrTooLarge(host_count, Self::MAX_CIDR_HOSTS));
            }

            return Ok(Self::Cidr(network));
        }

        Err(TargetError::InvalidFormat(s.to_string()))
    }

    /// Expand into host addresses, in address order.
    ///
    /// IPv4 network and broadcast addresses are skipped for prefixes below /31.
    pub fn expand(&self) -> Vec<IpAddr> {
        match self {
            Self::Single(ip) => vec![*ip],
            Self::Cidr(network) => network
                .iter()
                .filter(|ip| {
                    if let (IpNetwork::V4(net), IpAddr::V4(addr)) = (network, ip) {
                        if net.prefix() < 31 {
                            return *addr != net.network() && *addr != net.broadcast();
                        }
                    }
                    true
                })
                .collect(),
        }
    }

    /// Number of addresses the specification covers before filtering.
    pub fn estimated_host_count(&self) -> u128 {
        match self {
            Self::Single(_) => 1,
            Self::Cidr(network) => network_size(network),
        }
    }
}

impl FromStr for TargetSpec {
    type Err = TargetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for TargetSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Single(ip) => write!(f, "{}", ip),
            Self::Cidr(network) => write!(f, "{}", network),
        }
    }
}

fn network_size(network: &IpNetwork) -> u128 {
    match network {
        IpNetwork::V4(net) => net.size() as u128,
        IpNetwork::V6(net) => {
            let prefix = net.prefix() as u32;
            if prefix >= 128 {
                1
            } else if prefix == 0 {
                u128::MAX
            } else {
                1u128 << (128 - prefix)
            }
        }
    }
}

/// An ordered list of hosts to probe.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostList {
    entries: Vec<HostEntry>,
}

impl HostList {
    pub fn new(entries: Vec<HostEntry>) -> Self {
        Self { entries }
    }

    /// Load a host list, choosing the format from the file extension.
    pub fn load(path: &Path) -> Result<Self, TargetError> {
        let display = path.display().to_string();
        let content = fs::read_to_string(path)
            .map_err(|e| TargetError::ReadFailed(display.clone(), e.to_string()))?;

        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Self::from_json(&content)
                .map_err(|e| match e {
                    TargetError::InvalidJson(_, reason) => TargetError::InvalidJson(display, reason),
                    other => other,
                }),
            Some("csv") | Some("txt") => Self::from_csv(&content),
            _ => Err(TargetError::UnsupportedFormat(display)),
        }
    }

    /// Parse a JSON array of address (or CIDR) strings.
    pub fn from_json(content: &str) -> Result<Self, TargetError> {
        let raw: Vec<String> = serde_json::from_str(content)
            .map_err(|e| TargetError::InvalidJson(String::new(), e.to_string()))?;

        let mut entries = Vec::with_capacity(raw.len());
        for item in &raw {
            let spec = TargetSpec::parse(item)?;
            entries.extend(spec.expand().into_iter().map(HostEntry::new));
        }

        Ok(Self { entries })
    }

    /// Parse `domain,ip` rows pairing a zone with its authoritative server.
    ///
    /// Rows that do not have exactly two columns, or whose address does not
    /// parse, are skipped with a warning.
    pub fn from_csv(content: &str) -> Result<Self, TargetError> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(content.as_bytes());

        let mut entries = Vec::new();
        for row in reader.records() {
            let row = match row {
                Ok(row) => row,
                Err(e) => {
                    warn!("Skipping unreadable row: {}", e);
                    continue;
                }
            };

            if row.len() != 2 {
                warn!("Skipping invalid row: {:?}", row);
                continue;
            }

            match row[1].parse::<IpAddr>() {
                Ok(ip) => entries.push(HostEntry::new(ip).with_domain(&row[0])),
                Err(_) => warn!("Skipping row with invalid address: {:?}", row),
            }
        }

        Ok(Self { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, HostEntry> {
        self.entries.iter()
    }
}

impl FromIterator<IpAddr> for HostList {
    fn from_iter<I: IntoIterator<Item = IpAddr>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().map(HostEntry::new).collect(),
        }
    }
}

impl<'a> IntoIterator for &'a HostList {
    type Item = &'a HostEntry;
    type IntoIter = std::slice::Iter<'a, HostEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_ipv4() {
        let spec = TargetSpec::parse("192.168.1.1").unwrap();
        assert!(matches!(spec, TargetSpec::Single(IpAddr::V4(_))));
    }

    #[test]
    fn test_parse_ipv6() {
        let spec = TargetSpec::parse("::1").unwrap();
        assert!(matches!(spec, TargetSpec::Single(IpAddr::V6(_))));
    }

    #[test]
    fn test_hostnames_are_rejected() {
        assert!(matches!(
            TargetSpec::parse("example.com"),
            Err(TargetError::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_cidr_expansion_skips_network_and_broadcast() {
        let spec = TargetSpec::parse("10.0.0.0/30").unwrap();
        let hosts = spec.expand();
        assert_eq!(
            hosts,
            vec![
                "10.0.0.1".parse::<IpAddr>().unwrap(),
                "10.0.0.2".parse::<IpAddr>().unwrap()
            ]
        );
    }

    #[test]
    fn test_cidr_too_large() {
        let result = TargetSpec::parse("10.0.0.0/8");
        assert!(matches!(result, Err(TargetError::CidrTooLarge(_, _))));
    }

    #[test]
    fn test_json_host_list_keeps_order_and_duplicates() {
        let list = HostList::from_json(r#"["192.0.2.7", "192.0.2.1", "192.0.2.7"]"#).unwrap();
        let ips: Vec<String> = list.iter().map(|h| h.ip.to_string()).collect();
        assert_eq!(ips, vec!["192.0.2.7", "192.0.2.1", "192.0.2.7"]);
        assert!(list.iter().all(|h| h.dns_domain.is_none()));
    }

    #[test]
    fn test_json_host_list_rejects_non_array() {
        assert!(matches!(
            HostList::from_json(r#"{"ip": "192.0.2.1"}"#),
            Err(TargetError::InvalidJson(_, _))
        ));
    }

    #[test]
    fn test_csv_host_list_pairs_domain_with_server() {
        let list = HostList::from_csv("example.org, 192.0.2.53\nbroken\nexample.net,198.51.100.9\n")
            .unwrap();
        assert_eq!(list.len(), 2);
        let first = list.iter().next().unwrap();
        assert_eq!(first.ip.to_string(), "192.0.2.53");
        assert_eq!(first.dns_domain.as_deref(), Some("example.org"));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(file, r#"["198.51.100.1", "198.51.100.2"]"#).unwrap();

        let list = HostList::load(file.path()).unwrap();
        assert_eq!(list.len(), 2);
    }

    #[test]
    fn test_load_unknown_extension() {
        let file = tempfile::Builder::new().suffix(".xml").tempfile().unwrap();
        assert!(matches!(
            HostList::load(file.path()),
            Err(TargetError::UnsupportedFormat(_))
        ));
    }
}
