//! Discover subcommand implementation.
//!
//! Handles `ampscout discover <file>`: probes every host once per protocol and
//! writes the hosts that answered next to the input file.

use crate::batch::DiscoveryBatch;
use crate::cli::{prepare, report_written, save_run, ProbeArgs};
use crate::config::{AppSettings, Purpose};
use crate::error::{CliResult, StorageError};
use crate::output;
use crate::storage::results::DISCOVERY_INPUT_MARKER;
use crate::storage::{write_discovery, RunRecord, RunResults};
use crate::types::NtpQueryType;
use chrono::Utc;
use clap::Parser;
use std::time::Instant;

/// Find hosts that answer DNS, NTP or Memcached probes.
#[derive(Parser, Debug)]
pub struct DiscoverCommand {
    #[command(flatten)]
    pub probe: ProbeArgs,

    /// NTP query type; `basic` only accepts synchronised servers
    #[arg(long, value_enum, default_value = "basic")]
    pub ntp_query_type: NtpQueryType,
}

impl DiscoverCommand {
    /// Execute the discover command.
    pub async fn execute(&self, settings: AppSettings, verbose: bool, quiet: bool) -> CliResult<()> {
        let input_name = self
            .probe
            .file
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        if !input_name.contains(DISCOVERY_INPUT_MARKER) {
            return Err(StorageError::InvalidInput {
                path: self.probe.file.clone(),
                reason: format!("discovery input names must contain '{}'", DISCOVERY_INPUT_MARKER),
            }
            .into());
        }

        let configs = self
            .probe
            .probe_configs(self.ntp_query_type, settings.edns_payload_size)?;
        let prepared = prepare(&self.probe, settings, configs, Purpose::Discovery, verbose, quiet)?;

        let started_at = Utc::now();
        let start = Instant::now();
        let mut batch = DiscoveryBatch::new(prepared.executor, prepared.plan.clone())?
            .with_options(prepared.options);
        let report = batch.run(&prepared.hosts).await?;
        let duration_ms = start.elapsed().as_millis() as u64;

        let written = write_discovery(&self.probe.file, &report)?;
        report_written(&written, &self.probe, quiet);

        let record = RunRecord::new(
            &self.probe.file,
            prepared.plan.configs().to_vec(),
            RunResults::Discovery(report),
        )
        .finalize(started_at, duration_ms)
        .with_output_files(written);

        save_run(&record, &self.probe, &prepared.settings, quiet)?;
        output::format_results(&record, self.probe.output, None)?;

        Ok(())
    }
}
