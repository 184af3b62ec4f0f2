//! What a finished batch hands back.

use crate::amplification::{AmplificationResult, BafSummary};
use crate::config::ProbeConfig;
use crate::types::Protocol;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;

/// Amplifiers found for one protocol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProtocolAmplifiers {
    pub config: ProbeConfig,
    /// Hosts with a BAF of at least 1, in host-list order.
    pub amplifiers: Vec<AmplificationResult>,
}

/// Result of a measurement batch.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MeasurementReport {
    /// One collection per planned protocol, in plan order.
    pub protocols: Vec<ProtocolAmplifiers>,
    /// Memcached upper bounds, host and theoretical BAF.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub theoretical_max: Vec<(IpAddr, f64)>,
    pub hosts_probed: usize,
}

impl MeasurementReport {
    pub(crate) fn new(configs: &[ProbeConfig]) -> Self {
        Self {
            protocols: configs
                .iter()
                .map(|config| ProtocolAmplifiers {
                    config: config.clone(),
                    amplifiers: Vec::new(),
                })
                .collect(),
            theoretical_max: Vec::new(),
            hosts_probed: 0,
        }
    }

    /// Amplifiers for `protocol`, or `None` if it was not planned.
    pub fn results(&self, protocol: Protocol) -> Option<&[AmplificationResult]> {
        self.protocols
            .iter()
            .find(|p| p.config.protocol() == protocol)
            .map(|p| p.amplifiers.as_slice())
    }

    pub fn summary(&self, protocol: Protocol) -> Option<BafSummary> {
        self.results(protocol).and_then(BafSummary::from_results)
    }

    pub fn amplifier_count(&self) -> usize {
        self.protocols.iter().map(|p| p.amplifiers.len()).sum()
    }
}

/// Hosts that answered one protocol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolHosts {
    pub config: ProbeConfig,
    pub hosts: Vec<IpAddr>,
}

/// Result of a discovery batch.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DiscoveryReport {
    pub protocols: Vec<ProtocolHosts>,
    pub hosts_probed: usize,
}

impl DiscoveryReport {
    pub(crate) fn new(configs: &[ProbeConfig]) -> Self {
        Self {
            protocols: configs
                .iter()
                .map(|config| ProtocolHosts {
                    config: config.clone(),
                    hosts: Vec::new(),
                })
                .collect(),
            hosts_probed: 0,
        }
    }

    pub fn open_hosts(&self, protocol: Protocol) -> Option<&[IpAddr]> {
        self.protocols
            .iter()
            .find(|p| p.config.protocol() == protocol)
            .map(|p| p.hosts.as_slice())
    }

    pub fn open_count(&self) -> usize {
        self.protocols.iter().map(|p| p.hosts.len()).sum()
    }
}
