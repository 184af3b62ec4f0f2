//! Plain text output formatting.
//!
//! Produces human-readable output with colors and formatting.

use crate::amplification::{BafSummary, EdnsSplit};
use crate::batch::{DiscoveryReport, MeasurementReport};
use crate::config::{ProbeConfig, Purpose};
use crate::storage::{RunRecord, RunResults};
use crate::types::Protocol;
use console::style;
use std::collections::HashMap;
use std::io::{self, Write};
use std::net::IpAddr;

const RULE: &str = "═══════════════════════════════════════════════════════════════";
const THIN_RULE: &str = "───────────────────────────────────────────────────────────────";

/// Print a run in human-readable plain text format.
pub fn print_plain(record: &RunRecord, edns: Option<&HashMap<IpAddr, Option<u16>>>) -> io::Result<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    write_plain(&mut out, record, edns)
}

/// Render a run as plain text.
///
/// With an EDNS buffer map, DNS statistics are also split by whether hosts
/// advertise the Flag Day buffer size.
pub fn write_plain<W: Write>(
    out: &mut W,
    record: &RunRecord,
    edns: Option<&HashMap<IpAddr, Option<u16>>>,
) -> io::Result<()> {
    let title = match record.purpose() {
        Purpose::Discovery => "Discovery Results",
        Purpose::Measurement => "Measurement Results",
    };

    writeln!(out)?;
    writeln!(out, "{}", style(RULE).cyan())?;
    writeln!(out, "                  {} {}", style("ampscout").cyan().bold(), title)?;
    writeln!(out, "{}", style(RULE).cyan())?;
    writeln!(out)?;

    writeln!(out, "  {} {}", style("Input:").bold(), record.input.display())?;
    writeln!(out, "  {} {}", style("Run ID:").bold(), style(record.id.short()).dim())?;
    writeln!(
        out,
        "  {} {} hosts probed in {:.2}s",
        style("Statistics:").bold(),
        record.results.hosts_probed(),
        record.duration_ms as f64 / 1000.0
    )?;
    writeln!(out)?;

    match &record.results {
        RunResults::Discovery(report) => write_discovery(out, report)?,
        RunResults::Measurement(report) => write_measurement(out, report, edns)?,
    }

    if !record.output_files.is_empty() {
        writeln!(out, "  {}", style("Result files:").bold())?;
        for file in &record.output_files {
            writeln!(out, "    {}", file.display())?;
        }
        writeln!(out)?;
    }

    writeln!(out, "{}", style(RULE).cyan())?;
    writeln!(out)?;

    Ok(())
}

fn section_header<W: Write>(out: &mut W, config: &ProbeConfig) -> io::Result<()> {
    writeln!(
        out,
        "  {} {}",
        style(config.protocol().as_str().to_uppercase()).yellow().bold(),
        style(format!("({})", config)).dim()
    )?;
    writeln!(out, "  {}", style(THIN_RULE).dim())
}

fn write_discovery<W: Write>(out: &mut W, report: &DiscoveryReport) -> io::Result<()> {
    for protocol in &report.protocols {
        section_header(out, &protocol.config)?;
        writeln!(
            out,
            "  {} of {} hosts answered",
            style(protocol.hosts.len()).green().bold(),
            report.hosts_probed
        )?;
        for host in &protocol.hosts {
            writeln!(out, "    {}", host)?;
        }
        writeln!(out)?;
    }

    Ok(())
}

fn write_measurement<W: Write>(
    out: &mut W,
    report: &MeasurementReport,
    edns: Option<&HashMap<IpAddr, Option<u16>>>,
) -> io::Result<()> {
    for protocol in &report.protocols {
        section_header(out, &protocol.config)?;

        if protocol.amplifiers.is_empty() {
            writeln!(out, "  {}", style("No hosts reached a BAF of 1 or more.").dim())?;
            writeln!(out)?;
            continue;
        }

        writeln!(
            out,
            "  {:<40}  {:>10}  {:>8}  {:>9}",
            style("HOST").bold(),
            style("BAF").bold(),
            style("REQUEST").bold(),
            style("RESPONSE").bold()
        )?;
        for result in &protocol.amplifiers {
            let host = match &result.domain {
                Some(domain) => format!("{} ({})", result.host, domain),
                None => result.host.to_string(),
            };
            writeln!(
                out,
                "  {:<40}  {:>10}  {:>8}  {:>9}",
                host,
                style(format!("{:.2}", result.baf)).green(),
                result.request_size,
                result.response_size
            )?;
        }
        writeln!(out)?;

        if let Some(summary) = BafSummary::from_results(&protocol.amplifiers) {
            write_summary(out, "BAF statistics", &summary)?;
        }

        if let (Protocol::Dns, Some(buffers)) = (protocol.config.protocol(), edns) {
            let split = EdnsSplit::new(&protocol.amplifiers, buffers);
            if let Some(summary) = split.flag_day_summary() {
                write_summary(out, "EDNS buffer 1232", &summary)?;
            }
            if let Some(summary) = split.other_summary() {
                write_summary(out, "Other EDNS buffers", &summary)?;
            }
        }
    }

    if !report.theoretical_max.is_empty() {
        writeln!(
            out,
            "  {} {}",
            style("MEMCACHED").yellow().bold(),
            style("(theoretical maximum)").dim()
        )?;
        writeln!(out, "  {}", style(THIN_RULE).dim())?;
        for (host, baf) in &report.theoretical_max {
            writeln!(out, "  {:<40}  {:>10.2}", host.to_string(), baf)?;
        }
        writeln!(out)?;

        let bafs: Vec<f64> = report.theoretical_max.iter().map(|(_, baf)| *baf).collect();
        if let Some(summary) = BafSummary::from_bafs(&bafs) {
            write_summary(out, "Theoretical BAF statistics", &summary)?;
        }
    }

    Ok(())
}

fn write_summary<W: Write>(out: &mut W, label: &str, summary: &BafSummary) -> io::Result<()> {
    writeln!(out, "  {} ({} hosts)", style(label).bold(), summary.count)?;
    writeln!(
        out,
        "    min {:.2}  max {:.2}  mean {:.2}  median {:.2}  variance {:.2}",
        summary.min, summary.max, summary.mean, summary.median, summary.variance
    )?;
    writeln!(out)
}

/// Print a header before a batch begins.
pub fn print_run_header(purpose: Purpose, input: &str, configs: &[ProbeConfig], hosts: usize, transport: &str) {
    println!();
    println!(
        "{} {} v{}",
        style("Starting").cyan(),
        style("ampscout").cyan().bold(),
        env!("CARGO_PKG_VERSION")
    );
    println!("{} Mode: {}", style("•").dim(), style(purpose).yellow());
    println!("{} Input: {}", style("•").dim(), style(input).white().bold());
    for config in configs {
        println!("{} Probe: {}", style("•").dim(), config);
    }
    println!(
        "{} Probing {} hosts over {} capture...",
        style("•").dim(),
        style(hosts).white().bold(),
        transport
    );
    println!();
}

/// Print an error message.
pub fn print_error(msg: &str) {
    eprintln!("{} {}", style("Error:").red().bold(), msg);
}

/// Print a warning message.
pub fn print_warning(msg: &str) {
    eprintln!("{} {}", style("Warning:").yellow().bold(), msg);
}

/// Print a success message.
pub fn print_success(msg: &str) {
    println!("{} {}", style("✓").green().bold(), msg);
}

/// Print an info message.
pub fn print_info(msg: &str) {
    println!("{} {}", style("ℹ").blue().bold(), msg);
}
