//! Batch orchestration over a host list.
//!
//! A batch visits every host once per configured protocol and folds the
//! per-probe outcomes into per-protocol collections. Discovery batches keep
//! hosts that answered; measurement batches keep amplifiers with their BAF.
//!
//! Per-host failures never leave the executor as errors, so a batch always
//! runs to completion once it has started. Only a bad plan stops it, and the
//! plan is checked before the first packet is sent.

mod report;

pub use report::{DiscoveryReport, MeasurementReport, ProtocolAmplifiers, ProtocolHosts};

use crate::amplification::AmplificationResult;
use crate::config::{validate_all, DnsConfig, ProbeConfig, Purpose};
use crate::error::{ConfigError, ConfigResult};
use crate::probe::{ProbeExecutor, ProbeReport};
use crate::types::{HostEntry, HostList, Protocol};
use futures::stream::{self, StreamExt, TryStreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::net::IpAddr;
use tracing::{debug, info, warn};

/// Lifecycle of a batch runner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchState {
    Configured,
    Running,
    Completed,
    /// Stopped partway by an error; the runner cannot be reused.
    Failed,
}

impl fmt::Display for BatchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Configured => write!(f, "configured"),
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// A validated set of probe configurations for one purpose.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchPlan {
    configs: Vec<ProbeConfig>,
    purpose: Purpose,
}

impl BatchPlan {
    /// Validate `configs` for `purpose`.
    ///
    /// At least one protocol must be present, none twice, and each must suit
    /// the purpose (a `basic` NTP query cannot be measured).
    pub fn new(configs: Vec<ProbeConfig>, purpose: Purpose) -> ConfigResult<Self> {
        validate_all(&configs, purpose)?;
        Ok(Self { configs, purpose })
    }

    pub fn configs(&self) -> &[ProbeConfig] {
        &self.configs
    }

    pub fn purpose(&self) -> Purpose {
        self.purpose
    }

    /// Check host-specific settings the plan will use.
    ///
    /// Per-host DNS domains are encoded into queries, so a bad one would
    /// otherwise only surface halfway through the batch.
    pub fn validate_hosts(&self, hosts: &HostList) -> ConfigResult<()> {
        let Some(ProbeConfig::Dns(dns)) = self
            .configs
            .iter()
            .find(|config| config.protocol() == Protocol::Dns)
        else {
            return Ok(());
        };

        for domain in hosts.iter().filter_map(|entry| entry.dns_domain.as_deref()) {
            DnsConfig::new(domain, dns.query_type)?;
        }

        Ok(())
    }
}

/// Options shared by both runners.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchOptions {
    /// Hosts probed at the same time.
    pub concurrency: usize,
    /// Draw a progress bar.
    pub progress: bool,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            concurrency: 1,
            progress: false,
        }
    }
}

/// Measures the BAF of every host for every planned protocol.
pub struct MeasurementBatch {
    executor: ProbeExecutor,
    plan: BatchPlan,
    options: BatchOptions,
    edns_buffers: HashMap<IpAddr, Option<u16>>,
    state: BatchState,
}

impl MeasurementBatch {
    pub fn new(executor: ProbeExecutor, plan: BatchPlan) -> ConfigResult<Self> {
        if plan.purpose() != Purpose::Measurement {
            return Err(ConfigError::Invalid(format!(
                "a measurement batch cannot run a {} plan",
                plan.purpose()
            )));
        }

        Ok(Self {
            executor,
            plan,
            options: BatchOptions::default(),
            edns_buffers: HashMap::new(),
            state: BatchState::Configured,
        })
    }

    pub fn with_options(mut self, options: BatchOptions) -> Self {
        self.options = options;
        self
    }

    /// Attach advertised EDNS0 buffer sizes to DNS results.
    pub fn with_edns_buffers(mut self, buffers: HashMap<IpAddr, Option<u16>>) -> Self {
        self.edns_buffers = buffers;
        self
    }

    pub fn state(&self) -> BatchState {
        self.state
    }

    pub fn plan(&self) -> &BatchPlan {
        &self.plan
    }

    /// Probe every host and collect the amplifiers.
    pub async fn run(&mut self, hosts: &HostList) -> ConfigResult<MeasurementReport> {
        start(&mut self.state, &self.plan, hosts)?;

        let progress = progress_bar(hosts.len(), self.options.progress);
        let per_host = {
            let executor = &self.executor;
            let configs = self.plan.configs();
            for_each_host(hosts, self.options.concurrency, progress.as_ref(), |entry| {
                measure_host(executor, configs, entry)
            })
            .await
        };
        let per_host = settle(&mut self.state, progress.as_ref(), per_host)?;

        let mut report = MeasurementReport::new(self.plan.configs());
        for (entry, reports) in hosts.iter().zip(per_host) {
            for (slot, probe) in report.protocols.iter_mut().zip(reports) {
                if let Some(theoretical) = probe.theoretical {
                    report.theoretical_max.push((entry.ip, theoretical.baf()));
                }

                let Some(result) = AmplificationResult::from_sizes(entry, probe.size_pair()) else {
                    continue;
                };
                let result = if slot.config.protocol() == Protocol::Dns {
                    let buffer = self.edns_buffers.get(&entry.ip).copied().flatten();
                    result.with_edns_buffer(buffer)
                } else {
                    result
                };
                slot.amplifiers.push(result);
            }
        }
        report.hosts_probed = hosts.len();

        if let Some(pb) = progress {
            pb.finish_with_message("Measurement complete");
        }
        self.state = BatchState::Completed;
        info!(
            hosts = hosts.len(),
            amplifiers = report.amplifier_count(),
            "measurement batch completed"
        );

        Ok(report)
    }
}

/// Finds the hosts that answer each planned protocol.
pub struct DiscoveryBatch {
    executor: ProbeExecutor,
    plan: BatchPlan,
    options: BatchOptions,
    state: BatchState,
}

impl DiscoveryBatch {
    pub fn new(executor: ProbeExecutor, plan: BatchPlan) -> ConfigResult<Self> {
        if plan.purpose() != Purpose::Discovery {
            return Err(ConfigError::Invalid(format!(
                "a discovery batch cannot run a {} plan",
                plan.purpose()
            )));
        }

        Ok(Self {
            executor,
            plan,
            options: BatchOptions::default(),
            state: BatchState::Configured,
        })
    }

    pub fn with_options(mut self, options: BatchOptions) -> Self {
        self.options = options;
        self
    }

    pub fn state(&self) -> BatchState {
        self.state
    }

    pub fn plan(&self) -> &BatchPlan {
        &self.plan
    }

    /// Probe every host and collect the ones that answered.
    pub async fn run(&mut self, hosts: &HostList) -> ConfigResult<DiscoveryReport> {
        start(&mut self.state, &self.plan, hosts)?;

        let progress = progress_bar(hosts.len(), self.options.progress);
        let per_host = {
            let executor = &self.executor;
            let configs = self.plan.configs();
            for_each_host(hosts, self.options.concurrency, progress.as_ref(), |entry| {
                check_host(executor, configs, entry)
            })
            .await
        };
        let per_host = settle(&mut self.state, progress.as_ref(), per_host)?;

        let mut report = DiscoveryReport::new(self.plan.configs());
        for (entry, answers) in hosts.iter().zip(per_host) {
            for (slot, open) in report.protocols.iter_mut().zip(answers) {
                if open {
                    slot.hosts.push(entry.ip);
                }
            }
        }
        report.hosts_probed = hosts.len();

        if let Some(pb) = progress {
            pb.finish_with_message("Discovery complete");
        }
        self.state = BatchState::Completed;
        info!(hosts = hosts.len(), open = report.open_count(), "discovery batch completed");

        Ok(report)
    }
}

/// Move a configured runner to `Running` once the plan accepts `hosts`.
///
/// A rejected host list leaves the runner `Configured`.
fn start(state: &mut BatchState, plan: &BatchPlan, hosts: &HostList) -> ConfigResult<()> {
    if *state != BatchState::Configured {
        return Err(ConfigError::Invalid(format!("batch already {}", state)));
    }
    plan.validate_hosts(hosts)?;
    *state = BatchState::Running;
    Ok(())
}

/// Mark the runner `Failed` if the host pass stopped with an error.
fn settle<T>(
    state: &mut BatchState,
    progress: Option<&ProgressBar>,
    result: ConfigResult<T>,
) -> ConfigResult<T> {
    if let Err(e) = &result {
        *state = BatchState::Failed;
        if let Some(pb) = progress {
            pb.abandon_with_message("Batch failed");
        }
        warn!(error = %e, "batch stopped");
    }
    result
}

/// Run every planned measurement against one host, in plan order.
async fn measure_host(
    executor: &ProbeExecutor,
    configs: &[ProbeConfig],
    entry: &HostEntry,
) -> ConfigResult<Vec<ProbeReport>> {
    let mut reports = Vec::with_capacity(configs.len());
    for config in configs {
        reports.push(executor.measure(entry, config).await?);
    }
    Ok(reports)
}

/// Run every planned check against one host, in plan order.
async fn check_host(
    executor: &ProbeExecutor,
    configs: &[ProbeConfig],
    entry: &HostEntry,
) -> ConfigResult<Vec<bool>> {
    let mut answers = Vec::with_capacity(configs.len());
    for config in configs {
        let open = match executor.check(entry, config).await? {
            Ok(open) => open,
            Err(failure) => {
                debug!(host = %entry.ip, protocol = %config.protocol(), %failure, "counted as closed");
                false
            }
        };
        answers.push(open);
    }
    Ok(answers)
}

/// Apply `probe` to every host with bounded concurrency.
///
/// Results come back in host order whatever order the probes finish in.
async fn for_each_host<'a, T, F, Fut>(
    hosts: &'a HostList,
    concurrency: usize,
    progress: Option<&ProgressBar>,
    probe: F,
) -> ConfigResult<Vec<T>>
where
    F: FnMut(&'a HostEntry) -> Fut,
    Fut: Future<Output = ConfigResult<T>>,
{
    stream::iter(hosts.iter())
        .map(probe)
        .map(|pending| async move {
            let result = pending.await;
            if let Some(pb) = progress {
                pb.inc(1);
            }
            result
        })
        .buffered(concurrency.max(1))
        .try_collect()
        .await
}

fn progress_bar(len: usize, enabled: bool) -> Option<ProgressBar> {
    if !enabled {
        return None;
    }

    let pb = ProgressBar::new(len as u64);
    let style = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=>-");
    pb.set_style(style);
    Some(pb)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::CapturedPacket;
    use crate::config::{MemcachedConfig, NtpConfig};
    use crate::error::{ProbeFailure, ProbeResult};
    use crate::probe::tests::{addr, executor, executor_with_keys, Reply, ScriptedTransport};
    use crate::probe::{SlabInventory, Transport};
    use crate::types::{DnsQueryType, NtpQueryType};
    use async_trait::async_trait;
    use std::net::SocketAddr;
    use std::time::Duration;

    fn hosts(ips: &[&str]) -> HostList {
        ips.iter().map(|ip| ip.parse::<IpAddr>().unwrap()).collect()
    }

    fn ntp_plan(purpose: Purpose, query_type: NtpQueryType) -> BatchPlan {
        BatchPlan::new(vec![ProbeConfig::Ntp(NtpConfig::new(query_type))], purpose).unwrap()
    }

    fn ntp_reply(ip: &str, bytes: usize) -> Reply {
        Reply::Packets(vec![(addr(&format!("{}:123", ip)), vec![0x5A; bytes], 0)])
    }

    #[tokio::test]
    async fn test_only_amplifiers_are_recorded() {
        let transport = ScriptedTransport::default()
            .reply("192.0.2.1", ntp_reply("192.0.2.1", 80))
            .reply("192.0.2.2", ntp_reply("192.0.2.2", 4))
            .reply("192.0.2.4", ntp_reply("192.0.2.4", 8));
        let plan = ntp_plan(Purpose::Measurement, NtpQueryType::Monlist);
        let mut batch = MeasurementBatch::new(executor(transport), plan).unwrap();

        let report = batch
            .run(&hosts(&["192.0.2.1", "192.0.2.2", "192.0.2.3", "192.0.2.4"]))
            .await
            .unwrap();
        let ntp = report.results(Protocol::Ntp).unwrap();

        let found: Vec<(String, f64)> = ntp.iter().map(|r| (r.host.to_string(), r.baf)).collect();
        assert_eq!(
            found,
            vec![("192.0.2.1".to_string(), 10.0), ("192.0.2.4".to_string(), 1.0)]
        );
        assert!(ntp.iter().all(|r| r.baf >= 1.0));
        assert_eq!(report.hosts_probed, 4);
        assert_eq!(batch.state(), BatchState::Completed);
    }

    #[tokio::test]
    async fn test_transport_failure_does_not_stop_the_batch() {
        let transport = ScriptedTransport::default()
            .reply("192.0.2.1", Reply::Fail(ProbeFailure::Socket("reset".to_string())))
            .reply("192.0.2.2", Reply::Fail(ProbeFailure::Unreachable("no route".to_string())))
            .reply("192.0.2.3", ntp_reply("192.0.2.3", 16));
        let plan = ntp_plan(Purpose::Measurement, NtpQueryType::Version);
        let mut batch = MeasurementBatch::new(executor(transport), plan).unwrap();

        let report = batch
            .run(&hosts(&["192.0.2.1", "192.0.2.2", "192.0.2.3"]))
            .await
            .unwrap();

        let ntp = report.results(Protocol::Ntp).unwrap();
        assert_eq!(ntp.len(), 1);
        assert_eq!(ntp[0].host.to_string(), "192.0.2.3");
        assert_eq!(ntp[0].baf, 2.0);
    }

    #[tokio::test]
    async fn test_memcached_theoretical_map() {
        let inventory = SlabInventory {
            keys: vec!["k".repeat(50)],
            theoretical_response_bytes: 1_000_000,
        };
        let transport = ScriptedTransport::default().reply(
            "192.0.2.11",
            Reply::Packets(vec![(addr("192.0.2.11:11211"), vec![b'x'; 40], 0)]),
        );
        let plan = BatchPlan::new(
            vec![ProbeConfig::Memcached(MemcachedConfig::default())],
            Purpose::Measurement,
        )
        .unwrap();
        let mut batch = MeasurementBatch::new(executor_with_keys(transport, Ok(inventory)), plan).unwrap();

        let report = batch.run(&hosts(&["192.0.2.11"])).await.unwrap();

        assert!(report.results(Protocol::Memcached).unwrap().is_empty());
        assert_eq!(report.theoretical_max.len(), 1);
        assert_eq!(report.theoretical_max[0].1, 1_000_000.0 / 64.0);
    }

    #[tokio::test]
    async fn test_protocols_fill_separate_collections() {
        let transport = ScriptedTransport::default().reply(
            "192.0.2.1",
            Reply::Packets(vec![
                (addr("192.0.2.1:123"), vec![0; 80], 0),
                (addr("192.0.2.1:53"), vec![0xFF; 300], 0),
            ]),
        );
        let plan = BatchPlan::new(
            vec![
                ProbeConfig::Dns(DnsConfig::new("abc", DnsQueryType::Any).unwrap()),
                ProbeConfig::Ntp(NtpConfig::new(NtpQueryType::Monlist)),
            ],
            Purpose::Measurement,
        )
        .unwrap();
        let mut buffers = HashMap::new();
        buffers.insert("192.0.2.1".parse().unwrap(), Some(1232));
        let mut batch = MeasurementBatch::new(executor(transport), plan)
            .unwrap()
            .with_edns_buffers(buffers);

        let report = batch.run(&hosts(&["192.0.2.1"])).await.unwrap();

        let dns = report.results(Protocol::Dns).unwrap();
        let ntp = report.results(Protocol::Ntp).unwrap();
        assert_eq!(dns[0].response_size, 300);
        assert_eq!(dns[0].edns_buffer, Some(1232));
        assert_eq!(ntp[0].response_size, 80);
        assert_eq!(ntp[0].edns_buffer, None);
    }

    #[tokio::test]
    async fn test_batch_runs_once() {
        let plan = ntp_plan(Purpose::Measurement, NtpQueryType::Version);
        let mut batch = MeasurementBatch::new(executor(ScriptedTransport::default()), plan).unwrap();
        let list = hosts(&["192.0.2.1"]);

        batch.run(&list).await.unwrap();
        assert!(matches!(batch.run(&list).await, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_aborted_host_pass_marks_batch_failed() {
        let mut state = BatchState::Running;
        let result: ConfigResult<Vec<bool>> = settle(
            &mut state,
            None,
            Err(ConfigError::Invalid("bad host".to_string())),
        );

        assert!(result.is_err());
        assert_eq!(state, BatchState::Failed);

        let mut state = BatchState::Running;
        assert_eq!(settle(&mut state, None, Ok(3)).unwrap(), 3);
        assert_eq!(state, BatchState::Running);
    }

    #[tokio::test]
    async fn test_failed_batch_cannot_rerun() {
        let plan = ntp_plan(Purpose::Discovery, NtpQueryType::Monlist);
        let transport = ScriptedTransport::default();
        let sent = transport.sent_log();
        let mut batch = DiscoveryBatch::new(executor(transport), plan).unwrap();
        batch.state = BatchState::Failed;

        let result = batch.run(&hosts(&["192.0.2.1"])).await;

        assert!(matches!(result, Err(ConfigError::Invalid(_))));
        assert!(sent.lock().unwrap().is_empty());
        assert_eq!(batch.state(), BatchState::Failed);
    }

    #[test]
    fn test_plan_purpose_must_match_runner() {
        let plan = ntp_plan(Purpose::Discovery, NtpQueryType::Basic);
        assert!(MeasurementBatch::new(executor(ScriptedTransport::default()), plan).is_err());
    }

    #[test]
    fn test_invalid_plan_is_rejected_up_front() {
        let result = BatchPlan::new(
            vec![ProbeConfig::Ntp(NtpConfig::new(NtpQueryType::Basic))],
            Purpose::Measurement,
        );
        assert!(matches!(result, Err(ConfigError::BasicNtpNotMeasurable)));
    }

    #[tokio::test]
    async fn test_bad_host_domain_aborts_before_probing() {
        let transport = ScriptedTransport::default();
        let sent = transport.sent_log();
        let plan = BatchPlan::new(
            vec![ProbeConfig::Dns(DnsConfig::default())],
            Purpose::Measurement,
        )
        .unwrap();
        let mut batch = MeasurementBatch::new(executor(transport), plan).unwrap();
        let list = HostList::new(vec![
            HostEntry::new("192.0.2.1".parse().unwrap()),
            HostEntry::new("192.0.2.2".parse().unwrap()).with_domain(format!("{}.org", "x".repeat(70))),
        ]);

        assert!(matches!(batch.run(&list).await, Err(ConfigError::InvalidDomain { .. })));
        assert!(sent.lock().unwrap().is_empty());
        assert_eq!(batch.state(), BatchState::Configured);
    }

    #[tokio::test]
    async fn test_discovery_keeps_open_hosts_in_order() {
        let transport = ScriptedTransport::default()
            .reply("192.0.2.3", ntp_reply("192.0.2.3", 10))
            .reply("192.0.2.1", ntp_reply("192.0.2.1", 10))
            .reply("192.0.2.2", Reply::Fail(ProbeFailure::Socket("boom".to_string())));
        let plan = ntp_plan(Purpose::Discovery, NtpQueryType::Monlist);
        let mut batch = DiscoveryBatch::new(executor(transport), plan).unwrap();

        let report = batch
            .run(&hosts(&["192.0.2.1", "192.0.2.2", "192.0.2.3"]))
            .await
            .unwrap();

        let open: Vec<String> = report
            .open_hosts(Protocol::Ntp)
            .unwrap()
            .iter()
            .map(|ip| ip.to_string())
            .collect();
        assert_eq!(open, vec!["192.0.2.1", "192.0.2.3"]);
    }

    /// Answers every NTP probe after a delay that shrinks with the host's
    /// last octet, so later hosts finish first.
    struct SlowFirstTransport;

    #[async_trait]
    impl Transport for SlowFirstTransport {
        fn name(&self) -> &'static str {
            "slow-first"
        }

        fn requires_privileges(&self) -> bool {
            false
        }

        async fn exchange(
            &self,
            target: SocketAddr,
            _payload: &[u8],
            _window: Duration,
        ) -> ProbeResult<Vec<CapturedPacket>> {
            let octet = match target.ip() {
                IpAddr::V4(v4) => v4.octets()[3],
                IpAddr::V6(_) => 0,
            };
            tokio::time::sleep(Duration::from_millis(10 * (8 - octet as u64))).await;
            Ok(vec![CapturedPacket::from_datagram(target, vec![0; 8 * octet as usize])])
        }
    }

    #[tokio::test]
    async fn test_concurrent_batch_preserves_host_order() {
        let executor = ProbeExecutor::new(
            Box::new(SlowFirstTransport),
            Box::new(crate::probe::tests::FixedInventory(Ok(SlabInventory::default()))),
        );
        let plan = ntp_plan(Purpose::Measurement, NtpQueryType::Version);
        let mut batch = MeasurementBatch::new(executor, plan)
            .unwrap()
            .with_options(BatchOptions {
                concurrency: 4,
                progress: false,
            });

        let report = batch
            .run(&hosts(&["192.0.2.1", "192.0.2.2", "192.0.2.3", "192.0.2.4"]))
            .await
            .unwrap();

        let bafs: Vec<f64> = report
            .results(Protocol::Ntp)
            .unwrap()
            .iter()
            .map(|r| r.baf)
            .collect();
        assert_eq!(bafs, vec![1.0, 2.0, 3.0, 4.0]);
    }
}
