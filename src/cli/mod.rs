//! CLI subcommand definitions and handlers.
//!
//! Implements a git-like subcommand architecture:
//! - `ampscout discover <file>` - Find hosts that answer each protocol
//! - `ampscout measure <file>` - Measure the BAF of known reflectors
//! - `ampscout history` - View run history
//! - `ampscout export <run-id>` - Export a saved run

mod discover;
mod export;
mod history;
mod measure;

pub use discover::DiscoverCommand;
pub use export::ExportCommand;
pub use history::HistoryCommand;
pub use measure::MeasureCommand;

use crate::batch::{BatchOptions, BatchPlan};
use crate::config::{AppSettings, CaptureMode, DnsConfig, MemcachedConfig, NtpConfig, ProbeConfig, Purpose};
use crate::error::{CliError, CliResult};
use crate::output;
use crate::probe::ProbeExecutor;
use crate::storage::{RunRecord, RunStore};
use crate::types::{DnsQueryType, HostList, NtpQueryType, Protocol};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// ampscout - Find and size UDP amplification reflectors.
///
/// ampscout probes DNS resolvers, NTP servers and Memcached instances from a
/// host list, keeps the ones that answer, and measures how many response
/// bytes each sends back per request byte.
#[derive(Parser, Debug)]
#[command(name = "ampscout")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Discover UDP amplifiers and measure their BAF", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Path to custom configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Find hosts that answer each protocol
    #[command(alias = "d")]
    Discover(DiscoverCommand),

    /// Measure the bandwidth amplification factor of each host
    #[command(alias = "m")]
    Measure(MeasureCommand),

    /// View run history
    #[command(alias = "h")]
    History(HistoryCommand),

    /// Export a saved run
    #[command(alias = "e")]
    Export(ExportCommand),
}

impl Cli {
    /// Load settings from `--config` or the default location.
    pub fn settings(&self) -> CliResult<AppSettings> {
        let settings = match &self.config {
            Some(path) => AppSettings::load_from(path)?,
            None => AppSettings::load()?,
        };
        Ok(settings)
    }
}

/// Output format for results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable plain text
    #[default]
    Plain,
    /// JSON structured output
    Json,
    /// CSV format for data analysis
    Csv,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Plain => write!(f, "plain"),
            Self::Json => write!(f, "json"),
            Self::Csv => write!(f, "csv"),
        }
    }
}

/// Flags shared by `discover` and `measure`.
#[derive(Args, Debug, Clone)]
pub struct ProbeArgs {
    /// Host list: a JSON array of addresses, or `domain,ip` CSV rows
    #[arg(value_name = "FILE")]
    pub file: PathBuf,

    /// Protocols to probe
    #[arg(short, long, value_enum, num_args = 1.., required = true)]
    pub protocols: Vec<Protocol>,

    /// Domain to resolve through DNS hosts
    #[arg(long, default_value = DnsConfig::DEFAULT_DOMAIN)]
    pub domain: String,

    /// DNS query type
    #[arg(long, value_enum, ignore_case = true, default_value = "A")]
    pub dns_query_type: DnsQueryType,

    /// How long to listen for responses after each probe, in milliseconds
    #[arg(short = 'w', long, value_name = "MS")]
    pub window_ms: Option<u64>,

    /// Hosts probed at the same time
    #[arg(short = 'c', long)]
    pub concurrency: Option<usize>,

    /// Rate limit in probes per second (0 = unlimited)
    #[arg(short = 'r', long = "rate")]
    pub rate_limit: Option<u32>,

    /// How responses are captured
    #[arg(long, value_enum)]
    pub capture: Option<CaptureMode>,

    /// Network interface for raw capture
    #[arg(short = 'i', long)]
    pub interface: Option<String>,

    /// Output format for results
    #[arg(short, long, value_enum, default_value = "plain")]
    pub output: OutputFormat,

    /// Don't save the run to history
    #[arg(long)]
    pub no_save: bool,
}

impl ProbeArgs {
    /// Apply command-line overrides to the loaded settings.
    pub fn apply(&self, mut settings: AppSettings) -> AppSettings {
        if let Some(window) = self.window_ms {
            settings.listen_window_ms = window;
        }
        if let Some(concurrency) = self.concurrency {
            settings.concurrency = concurrency;
        }
        if let Some(rate) = self.rate_limit {
            settings.rate_limit = rate;
        }
        if let Some(capture) = self.capture {
            settings.capture = capture;
        }
        if self.interface.is_some() {
            settings.interface = self.interface.clone();
        }
        settings
    }

    /// Build one probe configuration per selected protocol, in the order given.
    pub fn probe_configs(
        &self,
        ntp_query_type: NtpQueryType,
        edns_payload_size: u16,
    ) -> CliResult<Vec<ProbeConfig>> {
        let mut configs = Vec::with_capacity(self.protocols.len());

        for protocol in &self.protocols {
            let config = match protocol {
                Protocol::Dns => ProbeConfig::Dns(
                    DnsConfig::new(&self.domain, self.dns_query_type)?
                        .with_edns_payload_size(edns_payload_size),
                ),
                Protocol::Ntp => ProbeConfig::Ntp(NtpConfig::new(ntp_query_type)),
                Protocol::Memcached => ProbeConfig::Memcached(MemcachedConfig::default()),
            };
            configs.push(config);
        }

        Ok(configs)
    }

    /// Load the host list, refusing an empty one.
    pub fn load_hosts(&self) -> CliResult<HostList> {
        let hosts = HostList::load(&self.file)?;
        if hosts.is_empty() {
            return Err(CliError::Other(format!(
                "no hosts in {}",
                self.file.display()
            )));
        }
        Ok(hosts)
    }
}

/// Everything a probe command needs before the batch starts.
pub(crate) struct Prepared {
    pub settings: AppSettings,
    pub executor: ProbeExecutor,
    pub plan: BatchPlan,
    pub hosts: HostList,
    pub options: BatchOptions,
}

/// Shared setup for `discover` and `measure`.
pub(crate) fn prepare(
    args: &ProbeArgs,
    settings: AppSettings,
    configs: Vec<ProbeConfig>,
    purpose: Purpose,
    verbose: bool,
    quiet: bool,
) -> CliResult<Prepared> {
    let settings = args.apply(settings);
    let plan = BatchPlan::new(configs, purpose)?;
    let hosts = args.load_hosts()?;

    if settings.capture == CaptureMode::Raw && !is_root() {
        output::print_warning("raw capture requires root/sudo privileges for link-layer access.");
        output::print_warning("Probes may fail or see no responses.");
    }

    let executor = ProbeExecutor::from_settings(&settings)?;

    if !quiet && args.output == OutputFormat::Plain {
        output::print_run_header(
            purpose,
            &args.file.display().to_string(),
            plan.configs(),
            hosts.len(),
            executor.transport().name(),
        );
    }

    let options = BatchOptions {
        concurrency: settings.concurrency,
        progress: verbose && !quiet,
    };

    Ok(Prepared {
        settings,
        executor,
        plan,
        hosts,
        options,
    })
}

/// Save a finished run to history unless disabled.
pub(crate) fn save_run(
    record: &RunRecord,
    args: &ProbeArgs,
    settings: &AppSettings,
    quiet: bool,
) -> CliResult<()> {
    if args.no_save || !settings.auto_save_runs {
        return Ok(());
    }

    let store = RunStore::new()?;
    store.save(record)?;

    if !quiet && args.output == OutputFormat::Plain {
        output::print_info(&format!("Run saved as {}", record.id.short()));
    }

    Ok(())
}

/// Announce the result files a run wrote.
pub(crate) fn report_written(files: &[PathBuf], args: &ProbeArgs, quiet: bool) {
    if quiet || args.output != OutputFormat::Plain {
        return;
    }
    for file in files {
        output::print_success(&format!("Wrote {}", file.display()));
    }
}

/// Check if running with root/admin privileges.
fn is_root() -> bool {
    #[cfg(unix)]
    {
        unsafe { libc::geteuid() == 0 }
    }
    #[cfg(not(unix))]
    {
        false
    }
}
