//! Per-protocol probe configuration.
//!
//! A batch is configured with one [`ProbeConfig`] per protocol. Each variant
//! carries only the options its protocol understands, and the whole set is
//! validated for its [`Purpose`] before any packet leaves the machine.

use crate::error::{ConfigError, ConfigResult};
use crate::types::{DnsQueryType, NtpQueryType, Protocol};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use trust_dns_proto::rr::Name;

/// What a batch is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Purpose {
    /// Find hosts that answer at all.
    Discovery,
    /// Size the responses of hosts and compute their BAF.
    Measurement,
}

impl fmt::Display for Purpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Discovery => write!(f, "discovery"),
            Self::Measurement => write!(f, "measurement"),
        }
    }
}

/// DNS probe options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DnsConfig {
    /// Name the resolver is asked to resolve.
    pub domain: String,
    pub query_type: DnsQueryType,
    /// UDP payload size advertised in the EDNS0 OPT record of measurement queries.
    pub edns_payload_size: u16,
}

impl DnsConfig {
    pub const DEFAULT_DOMAIN: &'static str = "google.com";
    pub const DEFAULT_EDNS_PAYLOAD_SIZE: u16 = 4096;

    /// Create a DNS configuration, rejecting names that cannot be encoded.
    pub fn new(domain: impl Into<String>, query_type: DnsQueryType) -> ConfigResult<Self> {
        let domain = domain.into();
        validate_domain(&domain)?;

        Ok(Self {
            domain,
            query_type,
            edns_payload_size: Self::DEFAULT_EDNS_PAYLOAD_SIZE,
        })
    }

    pub fn with_edns_payload_size(mut self, size: u16) -> Self {
        self.edns_payload_size = size;
        self
    }
}

impl Default for DnsConfig {
    fn default() -> Self {
        Self {
            domain: Self::DEFAULT_DOMAIN.to_string(),
            query_type: DnsQueryType::A,
            edns_payload_size: Self::DEFAULT_EDNS_PAYLOAD_SIZE,
        }
    }
}

/// NTP probe options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NtpConfig {
    pub query_type: NtpQueryType,
}

impl NtpConfig {
    pub fn new(query_type: NtpQueryType) -> Self {
        Self { query_type }
    }
}

/// Memcached has a single fixed probe and no options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MemcachedConfig {}

/// Configuration for probing one protocol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "protocol", rename_all = "lowercase")]
pub enum ProbeConfig {
    Dns(DnsConfig),
    Ntp(NtpConfig),
    Memcached(MemcachedConfig),
}

impl ProbeConfig {
    pub fn protocol(&self) -> Protocol {
        match self {
            Self::Dns(_) => Protocol::Dns,
            Self::Ntp(_) => Protocol::Ntp,
            Self::Memcached(_) => Protocol::Memcached,
        }
    }

    /// Check that this configuration makes sense for `purpose`.
    pub fn validate(&self, purpose: Purpose) -> ConfigResult<()> {
        match self {
            Self::Dns(dns) => validate_domain(&dns.domain),
            Self::Ntp(ntp) => {
                if purpose == Purpose::Measurement && ntp.query_type == NtpQueryType::Basic {
                    Err(ConfigError::BasicNtpNotMeasurable)
                } else {
                    Ok(())
                }
            }
            Self::Memcached(_) => Ok(()),
        }
    }

    /// Named parameters describing this configuration.
    ///
    /// Used to label result files the way downstream tooling expects.
    pub fn parameters(&self) -> Vec<(&'static str, String)> {
        match self {
            Self::Dns(dns) => vec![
                ("domain_ip", dns.domain.clone()),
                ("dns_query_type", dns.query_type.to_string()),
            ],
            Self::Ntp(ntp) => vec![("ntp_query_type", ntp.query_type.to_string())],
            Self::Memcached(_) => vec![("theory_max_baf", "True".to_string())],
        }
    }
}

impl fmt::Display for ProbeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Dns(dns) => write!(f, "dns {} {}", dns.query_type, dns.domain),
            Self::Ntp(ntp) => write!(f, "ntp {}", ntp.query_type),
            Self::Memcached(_) => write!(f, "memcached"),
        }
    }
}

/// Validate a whole batch configuration.
///
/// At least one protocol must be selected and none may appear twice.
pub fn validate_all(configs: &[ProbeConfig], purpose: Purpose) -> ConfigResult<()> {
    if configs.is_empty() {
        return Err(ConfigError::NoProtocols);
    }

    let mut seen = HashSet::new();
    for config in configs {
        if !seen.insert(config.protocol()) {
            return Err(ConfigError::DuplicateProtocol(config.protocol().to_string()));
        }
        config.validate(purpose)?;
    }

    Ok(())
}

fn validate_domain(domain: &str) -> ConfigResult<()> {
    if domain.trim().is_empty() {
        return Err(ConfigError::InvalidDomain {
            domain: domain.to_string(),
            reason: "empty name".to_string(),
        });
    }

    Name::from_ascii(domain)
        .map(|_| ())
        .map_err(|e| ConfigError::InvalidDomain {
            domain: domain.to_string(),
            reason: e.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_ntp_rejected_for_measurement() {
        let config = ProbeConfig::Ntp(NtpConfig::new(NtpQueryType::Basic));
        assert!(config.validate(Purpose::Discovery).is_ok());
        assert!(matches!(
            config.validate(Purpose::Measurement),
            Err(ConfigError::BasicNtpNotMeasurable)
        ));
    }

    #[test]
    fn test_duplicate_protocols_rejected() {
        let configs = vec![
            ProbeConfig::Memcached(MemcachedConfig::default()),
            ProbeConfig::Memcached(MemcachedConfig::default()),
        ];
        assert!(matches!(
            validate_all(&configs, Purpose::Measurement),
            Err(ConfigError::DuplicateProtocol(_))
        ));
    }

    #[test]
    fn test_empty_batch_rejected() {
        assert!(matches!(
            validate_all(&[], Purpose::Discovery),
            Err(ConfigError::NoProtocols)
        ));
    }

    #[test]
    fn test_invalid_domain_rejected() {
        assert!(DnsConfig::new("", DnsQueryType::A).is_err());
        let long_label = format!("{}.com", "a".repeat(64));
        assert!(DnsConfig::new(long_label, DnsQueryType::A).is_err());
        assert!(DnsConfig::new("example.com", DnsQueryType::Any).is_ok());
    }

    #[test]
    fn test_parameters_label_configuration() {
        let dns = ProbeConfig::Dns(DnsConfig::new("example.org", DnsQueryType::Any).unwrap());
        assert_eq!(
            dns.parameters(),
            vec![
                ("domain_ip", "example.org".to_string()),
                ("dns_query_type", "ANY".to_string())
            ]
        );
    }

    #[test]
    fn test_serialization_is_tagged_by_protocol() {
        let config = ProbeConfig::Ntp(NtpConfig::new(NtpQueryType::Monlist));
        let json = serde_json::to_string(&config).unwrap();
        assert_eq!(json, r#"{"protocol":"ntp","query_type":"monlist"}"#);

        let parsed: ProbeConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, config);
    }
}
