//! Measure subcommand implementation.
//!
//! Handles `ampscout measure <file>`: sizes every host's response per
//! protocol, writes the amplifiers next to the input file and prints BAF
//! statistics.

use crate::batch::MeasurementBatch;
use crate::cli::{prepare, report_written, save_run, ProbeArgs};
use crate::config::{AppSettings, Purpose};
use crate::error::CliResult;
use crate::output;
use crate::storage::{load_max_udp_map, write_measurement, RunRecord, RunResults};
use crate::types::{NtpQueryType, Protocol};
use chrono::Utc;
use clap::Parser;
use std::path::PathBuf;
use std::time::Instant;
use tracing::info;

/// Measure the bandwidth amplification factor of known reflectors.
#[derive(Parser, Debug)]
pub struct MeasureCommand {
    #[command(flatten)]
    pub probe: ProbeArgs,

    /// NTP Mode 7 query type
    #[arg(long, value_enum, default_value = "version")]
    pub ntp_query_type: NtpQueryType,

    /// EDNS0 UDP payload size advertised in DNS queries
    #[arg(long, value_name = "BYTES")]
    pub edns_size: Option<u16>,

    /// EDNS buffer sizes collected earlier: a JSON array of {"ip": size} objects
    #[arg(long, value_name = "PATH")]
    pub max_udp_file: Option<PathBuf>,
}

impl MeasureCommand {
    /// Execute the measure command.
    pub async fn execute(&self, settings: AppSettings, verbose: bool, quiet: bool) -> CliResult<()> {
        let edns_size = self.edns_size.unwrap_or(settings.edns_payload_size);
        let configs = self.probe.probe_configs(self.ntp_query_type, edns_size)?;
        let prepared = prepare(&self.probe, settings, configs, Purpose::Measurement, verbose, quiet)?;

        let buffers = match &self.max_udp_file {
            Some(path) => {
                let map = load_max_udp_map(path)?;
                info!(hosts = map.len(), path = %path.display(), "EDNS buffer sizes loaded");
                Some(map)
            }
            None => None,
        };

        let started_at = Utc::now();
        let start = Instant::now();
        let mut batch = MeasurementBatch::new(prepared.executor, prepared.plan.clone())?
            .with_options(prepared.options)
            .with_edns_buffers(buffers.clone().unwrap_or_default());
        let report = batch.run(&prepared.hosts).await?;
        let duration_ms = start.elapsed().as_millis() as u64;

        let max_udp_size = if buffers.is_some() { "True" } else { "False" };
        let extra = [(Protocol::Dns, "max_udp_size", max_udp_size.to_string())];
        let written = write_measurement(&self.probe.file, &report, &extra)?;
        report_written(&written, &self.probe, quiet);

        let record = RunRecord::new(
            &self.probe.file,
            prepared.plan.configs().to_vec(),
            RunResults::Measurement(report),
        )
        .finalize(started_at, duration_ms)
        .with_output_files(written);

        save_run(&record, &self.probe, &prepared.settings, quiet)?;
        output::format_results(&record, self.probe.output, buffers.as_ref())?;

        Ok(())
    }
}
