//! Probe executor: one request to one host, sized responses back.
//!
//! The executor encodes the request for a [`ProbeConfig`], hands it to a
//! [`Transport`], keeps only the datagrams the [`ResponseFilter`] attributes
//! to the host and sums their sizes. Every per-host failure comes back as a
//! [`ProbeFailure`] value; only configuration mistakes are errors.

pub mod capture;
pub mod rate_limiter;
pub mod slabs;
pub mod traits;
pub mod udp;

use crate::amplification::{compute_baf, qualifies};
use crate::codec::{
    build_dns_query, build_memcached_get, build_memcached_stats_probe, build_ntp_request,
    ntp::is_synchronized_server, response_bytes, CapturedPacket, ResponseFilter,
};
use crate::config::{AppSettings, CaptureMode, ProbeConfig, Purpose};
use crate::error::{ConfigResult, ProbeFailure, ProbeResult};
use crate::types::{HostEntry, NtpQueryType, Protocol};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use tracing::{debug, info, warn};

pub use capture::RawCaptureTransport;
pub use rate_limiter::RateLimiter;
pub use slabs::TcpSlabInspector;
pub use traits::{BoxedKeyEnumerator, BoxedTransport, KeyEnumerator, SlabInventory, Transport};
pub use udp::UdpSocketTransport;

/// A request size and the response size it produced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SizePair {
    pub request: usize,
    pub response: usize,
}

impl SizePair {
    pub fn new(request: usize, response: usize) -> Self {
        Self { request, response }
    }

    pub fn baf(&self) -> f64 {
        compute_baf(self.request, self.response)
    }

    pub fn qualifies(&self) -> bool {
        qualifies(self.request, self.response)
    }
}

/// Sizes observed for one successful probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Measurement {
    pub request_size: usize,
    /// Summed response bytes, or 0 when they fell short of the request.
    pub response_size: usize,
    /// Summed response bytes before the sub-unity cut.
    pub captured_bytes: usize,
    /// Datagrams attributed to the host.
    pub packets: usize,
}

impl Measurement {
    pub fn sizes(&self) -> SizePair {
        SizePair::new(self.request_size, self.response_size)
    }

    pub fn baf(&self) -> f64 {
        self.sizes().baf()
    }
}

/// Everything one measurement probe produced.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeReport {
    pub outcome: ProbeResult<Measurement>,
    /// Memcached only: the request against the advertised size of every large
    /// value it names, an upper bound for a lossless path.
    pub theoretical: Option<SizePair>,
}

impl ProbeReport {
    fn practical(outcome: ProbeResult<Measurement>) -> Self {
        Self {
            outcome,
            theoretical: None,
        }
    }

    /// The `(request, response)` pair this probe scores as.
    pub fn size_pair(&self) -> SizePair {
        size_pair(&self.outcome)
    }
}

/// Collapse a probe outcome to a size pair.
///
/// No response keeps the request size with a zero response; any other failure
/// scores as nothing sent and nothing received.
pub fn size_pair(outcome: &ProbeResult<Measurement>) -> SizePair {
    match outcome {
        Ok(measurement) => measurement.sizes(),
        Err(ProbeFailure::Timeout { request_size }) => SizePair::new(*request_size, 0),
        Err(_) => SizePair::default(),
    }
}

/// Sends probes and sizes their responses.
pub struct ProbeExecutor {
    transport: BoxedTransport,
    keys: BoxedKeyEnumerator,
    window: Duration,
    rate_limiter: Option<RateLimiter>,
}

impl ProbeExecutor {
    pub const DEFAULT_WINDOW: Duration = Duration::from_secs(3);

    pub fn new(transport: BoxedTransport, keys: BoxedKeyEnumerator) -> Self {
        Self {
            transport,
            keys,
            window: Self::DEFAULT_WINDOW,
            rate_limiter: None,
        }
    }

    /// Build an executor from application settings.
    pub fn from_settings(settings: &AppSettings) -> ConfigResult<Self> {
        let transport: BoxedTransport = match settings.capture {
            CaptureMode::Socket => Box::new(UdpSocketTransport::new()),
            CaptureMode::Raw => Box::new(RawCaptureTransport::new(settings.interface.as_deref())?),
        };
        let keys = Box::new(TcpSlabInspector::new(settings.memcached_tcp_timeout()));

        Ok(Self::new(transport, keys)
            .with_window(settings.listen_window())
            .with_rate_limiter(RateLimiter::new(settings.rate_limit)))
    }

    pub fn with_window(mut self, window: Duration) -> Self {
        self.window = window;
        self
    }

    pub fn with_rate_limiter(mut self, rate_limiter: Option<RateLimiter>) -> Self {
        self.rate_limiter = rate_limiter;
        self
    }

    pub fn transport(&self) -> &dyn Transport {
        self.transport.as_ref()
    }

    /// Measure how much `entry` amplifies the probe `config` describes.
    ///
    /// Only an unusable configuration is an error. Per-host trouble is in
    /// the report's outcome.
    pub async fn measure(&self, entry: &HostEntry, config: &ProbeConfig) -> ConfigResult<ProbeReport> {
        config.validate(Purpose::Measurement)?;

        let report = match config {
            ProbeConfig::Dns(dns) => {
                let domain = entry.dns_domain.as_deref().unwrap_or(&dns.domain);
                let request = build_dns_query(domain, dns.query_type, Some(dns.edns_payload_size))?;
                ProbeReport::practical(self.sized_exchange(entry.ip, config, &request).await)
            }
            ProbeConfig::Ntp(ntp) => {
                let request = build_ntp_request(ntp.query_type);
                ProbeReport::practical(self.sized_exchange(entry.ip, config, &request).await)
            }
            ProbeConfig::Memcached(_) => self.measure_memcached(entry.ip, config).await,
        };

        match &report.outcome {
            Ok(m) if m.response_size > 0 => {
                info!(host = %entry.ip, protocol = %config.protocol(), baf = m.baf(), "amplifier measured")
            }
            Ok(m) => info!(
                host = %entry.ip,
                protocol = %config.protocol(),
                request = m.request_size,
                captured = m.captured_bytes,
                "response smaller than request"
            ),
            Err(failure) => warn!(host = %entry.ip, protocol = %config.protocol(), %failure, "no measurement"),
        }

        Ok(report)
    }

    /// Check whether `entry` answers the probe `config` describes.
    pub async fn check(&self, entry: &HostEntry, config: &ProbeConfig) -> ConfigResult<ProbeResult<bool>> {
        config.validate(Purpose::Discovery)?;

        let outcome = match config {
            ProbeConfig::Dns(dns) => {
                let domain = entry.dns_domain.as_deref().unwrap_or(&dns.domain);
                let request = build_dns_query(domain, dns.query_type, None)?;
                self.attributed(entry.ip, config, &request)
                    .await
                    .map(|packets| !packets.is_empty())
            }
            ProbeConfig::Ntp(ntp) if ntp.query_type == NtpQueryType::Basic => {
                let request = build_ntp_request(NtpQueryType::Basic);
                self.attributed(entry.ip, config, &request).await.map(|packets| {
                    packets
                        .iter()
                        .any(|packet| is_synchronized_server(packet.content()))
                })
            }
            ProbeConfig::Ntp(ntp) => {
                let request = build_ntp_request(ntp.query_type);
                self.attributed(entry.ip, config, &request)
                    .await
                    .map(|packets| !packets.is_empty())
            }
            ProbeConfig::Memcached(_) => {
                let request = build_memcached_stats_probe();
                self.attributed(entry.ip, config, &request)
                    .await
                    .map(|packets| {
                        packets
                            .iter()
                            .any(|packet| response_bytes(Protocol::Memcached, packet) > 0)
                    })
            }
        };

        match &outcome {
            Ok(true) => info!(host = %entry.ip, protocol = %config.protocol(), "host is open"),
            Ok(false) => debug!(host = %entry.ip, protocol = %config.protocol(), "no usable response"),
            Err(failure) => warn!(host = %entry.ip, protocol = %config.protocol(), %failure, "check failed"),
        }

        Ok(outcome)
    }

    async fn measure_memcached(&self, ip: IpAddr, config: &ProbeConfig) -> ProbeReport {
        let inventory = match self.keys.enumerate(ip).await {
            Ok(inventory) => inventory,
            Err(failure) => return ProbeReport::practical(Err(failure)),
        };

        let request = build_memcached_get(&inventory.keys);
        let theoretical = (inventory.theoretical_response_bytes > 0).then(|| {
            let response = usize::try_from(inventory.theoretical_response_bytes).unwrap_or(usize::MAX);
            SizePair::new(request.len(), response)
        });

        ProbeReport {
            outcome: self.sized_exchange(ip, config, &request).await,
            theoretical,
        }
    }

    async fn sized_exchange(
        &self,
        ip: IpAddr,
        config: &ProbeConfig,
        request: &[u8],
    ) -> ProbeResult<Measurement> {
        let protocol = config.protocol();
        let packets = self.attributed(ip, config, request).await?;

        if packets.is_empty() {
            return Err(ProbeFailure::Timeout {
                request_size: request.len(),
            });
        }

        let captured_bytes: usize = packets
            .iter()
            .map(|packet| response_bytes(protocol, packet))
            .sum();
        let response_size = if captured_bytes >= request.len() {
            captured_bytes
        } else {
            0
        };

        Ok(Measurement {
            request_size: request.len(),
            response_size,
            captured_bytes,
            packets: packets.len(),
        })
    }

    /// Send `request` and keep the datagrams attributable to `ip`.
    async fn attributed(
        &self,
        ip: IpAddr,
        config: &ProbeConfig,
        request: &[u8],
    ) -> ProbeResult<Vec<CapturedPacket>> {
        if let Some(limiter) = &self.rate_limiter {
            limiter.wait().await;
        }

        let target = SocketAddr::new(ip, config.protocol().well_known_port());
        let captured = self.transport.exchange(target, request, self.window).await?;
        let filter = ResponseFilter::for_config(ip, config);

        Ok(captured
            .into_iter()
            .filter(|packet| {
                let accepted = filter.accepts(packet);
                if !accepted {
                    debug!(source = %packet.source, %target, "datagram not attributed");
                }
                accepted
            })
            .collect())
    }
}
