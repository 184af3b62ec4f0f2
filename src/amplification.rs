//! Bandwidth amplification factor (BAF) arithmetic.
//!
//! BAF is response payload bytes divided by request payload bytes. Only hosts
//! with a BAF of at least 1 are recorded as amplifiers; everything below that
//! is dropped from result collections rather than stored as a low score.

use crate::probe::SizePair;
use crate::types::HostEntry;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::IpAddr;
use tracing::warn;

/// EDNS0 UDP payload size recommended by DNS Flag Day 2020.
pub const FLAG_DAY_EDNS_BUFFER: u16 = 1232;

/// Ratio of response to request bytes, 0 when nothing was sent.
pub fn compute_baf(request_size: usize, response_size: usize) -> f64 {
    if request_size == 0 {
        return 0.0;
    }
    response_size as f64 / request_size as f64
}

/// Whether a size pair makes the host an amplifier.
pub fn qualifies(request_size: usize, response_size: usize) -> bool {
    request_size > 0 && response_size > 0 && response_size >= request_size
}

/// One amplifier found by a measurement batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AmplificationResult {
    pub host: IpAddr,
    /// Domain resolved through the host, for per-host DNS domains.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    pub baf: f64,
    pub request_size: usize,
    pub response_size: usize,
    /// EDNS0 buffer size the host advertised in a separate pass, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edns_buffer: Option<u16>,
}

impl AmplificationResult {
    /// Build a result for `entry`, or `None` if the sizes do not qualify.
    pub fn from_sizes(entry: &HostEntry, sizes: SizePair) -> Option<Self> {
        if !sizes.qualifies() {
            return None;
        }

        Some(Self {
            host: entry.ip,
            domain: entry.dns_domain.clone(),
            baf: sizes.baf(),
            request_size: sizes.request,
            response_size: sizes.response,
            edns_buffer: None,
        })
    }

    pub fn with_edns_buffer(mut self, edns_buffer: Option<u16>) -> Self {
        self.edns_buffer = edns_buffer;
        self
    }
}

/// Descriptive statistics over one protocol's BAF scores.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BafSummary {
    pub count: usize,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub median: f64,
    /// Population variance.
    pub variance: f64,
}

impl BafSummary {
    /// Summarize `bafs`. Returns `None` for an empty collection.
    pub fn from_bafs(bafs: &[f64]) -> Option<Self> {
        if bafs.is_empty() {
            warn!("No hosts reached a BAF of 1 or more");
            return None;
        }

        let mut sorted = bafs.to_vec();
        sorted.sort_by(f64::total_cmp);

        let count = sorted.len();
        let mean = sorted.iter().sum::<f64>() / count as f64;
        let median = if count % 2 == 0 {
            (sorted[count / 2 - 1] + sorted[count / 2]) / 2.0
        } else {
            sorted[count / 2]
        };
        let variance = sorted.iter().map(|b| (b - mean).powi(2)).sum::<f64>() / count as f64;

        Some(Self {
            count,
            min: sorted[0],
            max: sorted[count - 1],
            mean,
            median,
            variance,
        })
    }

    pub fn from_results(results: &[AmplificationResult]) -> Option<Self> {
        let bafs: Vec<f64> = results.iter().map(|r| r.baf).collect();
        Self::from_bafs(&bafs)
    }
}

/// DNS amplifiers split by whether they advertise the Flag Day buffer size.
///
/// Hosts missing from the buffer map are left out of both halves.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EdnsSplit {
    /// BAFs of hosts advertising exactly 1232 bytes.
    pub flag_day: Vec<f64>,
    /// BAFs of hosts advertising any other size, or none at all.
    pub other: Vec<f64>,
}

impl EdnsSplit {
    pub fn new(results: &[AmplificationResult], buffers: &HashMap<IpAddr, Option<u16>>) -> Self {
        let mut split = Self::default();

        for result in results {
            match buffers.get(&result.host) {
                Some(Some(FLAG_DAY_EDNS_BUFFER)) => split.flag_day.push(result.baf),
                Some(_) => split.other.push(result.baf),
                None => {}
            }
        }

        split
    }

    pub fn flag_day_summary(&self) -> Option<BafSummary> {
        BafSummary::from_bafs(&self.flag_day)
    }

    pub fn other_summary(&self) -> Option<BafSummary> {
        BafSummary::from_bafs(&self.other)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(ip: &str, baf: f64) -> AmplificationResult {
        AmplificationResult {
            host: ip.parse().unwrap(),
            domain: None,
            baf,
            request_size: 10,
            response_size: (baf * 10.0) as usize,
            edns_buffer: None,
        }
    }

    #[test]
    fn test_baf_is_plain_ratio() {
        assert_eq!(compute_baf(32, 108), 3.375);
        assert_eq!(compute_baf(12, 16), 16.0 / 12.0);
        assert_eq!(compute_baf(5, 2), 0.4);
    }

    #[test]
    fn test_zero_request_gives_zero_baf() {
        assert_eq!(compute_baf(0, 0), 0.0);
        assert_eq!(compute_baf(0, 500), 0.0);
    }

    #[test]
    fn test_qualification_gate() {
        assert!(qualifies(28, 28));
        assert!(qualifies(32, 108));
        assert!(!qualifies(28, 0));
        assert!(!qualifies(0, 0));
        assert!(!qualifies(0, 10));
        assert!(!qualifies(64, 40));
    }

    #[test]
    fn test_from_sizes_only_keeps_amplifiers() {
        let entry = HostEntry::new("192.0.2.1".parse().unwrap()).with_domain("example.org");

        let kept = AmplificationResult::from_sizes(&entry, SizePair::new(32, 108)).unwrap();
        assert_eq!(kept.baf, 3.375);
        assert_eq!(kept.domain.as_deref(), Some("example.org"));

        assert!(AmplificationResult::from_sizes(&entry, SizePair::new(64, 0)).is_none());
        assert!(AmplificationResult::from_sizes(&entry, SizePair::new(0, 0)).is_none());
    }

    #[test]
    fn test_summary_statistics() {
        let summary = BafSummary::from_bafs(&[4.0, 1.0, 3.0, 2.0]).unwrap();
        assert_eq!(summary.count, 4);
        assert_eq!(summary.min, 1.0);
        assert_eq!(summary.max, 4.0);
        assert_eq!(summary.mean, 2.5);
        assert_eq!(summary.median, 2.5);
        assert_eq!(summary.variance, 1.25);
    }

    #[test]
    fn test_summary_of_odd_count_uses_middle_value() {
        let summary = BafSummary::from_bafs(&[9.0, 1.0, 2.0]).unwrap();
        assert_eq!(summary.median, 2.0);
    }

    #[test]
    fn test_empty_summary() {
        assert!(BafSummary::from_bafs(&[]).is_none());
    }

    #[test]
    fn test_edns_split() {
        let results = vec![
            result("192.0.2.1", 2.0),
            result("192.0.2.2", 3.0),
            result("192.0.2.3", 4.0),
            result("192.0.2.4", 5.0),
        ];
        let mut buffers = HashMap::new();
        buffers.insert("192.0.2.1".parse().unwrap(), Some(1232));
        buffers.insert("192.0.2.2".parse().unwrap(), Some(4096));
        buffers.insert("192.0.2.3".parse().unwrap(), None);

        let split = EdnsSplit::new(&results, &buffers);
        assert_eq!(split.flag_day, vec![2.0]);
        assert_eq!(split.other, vec![3.0, 4.0]);
        assert_eq!(split.other_summary().unwrap().mean, 3.5);
    }
}
