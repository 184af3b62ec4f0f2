//! Export subcommand implementation.
//!
//! Handles the `ampscout export <run-id>` command for exporting saved runs.

use crate::cli::OutputFormat;
use crate::error::{CliError, CliResult};
use crate::output;
use crate::storage::{RunRecord, RunStore};
use crate::types::RunId;
use clap::Parser;
use std::fs;
use std::path::PathBuf;

/// Export a saved run.
#[derive(Parser, Debug)]
pub struct ExportCommand {
    /// Run ID or prefix to export
    ///
    /// Can be a full UUID or the first few characters (short ID).
    #[arg(value_name = "RUN_ID")]
    pub run_id: String,

    /// Output format
    #[arg(short, long, value_enum, default_value = "json")]
    pub format: OutputFormat,

    /// Output file path (prints to stdout if not specified)
    #[arg(short = 'o', long = "output")]
    pub output_file: Option<PathBuf>,
}

impl ExportCommand {
    /// Execute the export command.
    pub fn execute(&self, quiet: bool) -> CliResult<()> {
        let store = RunStore::new()?;

        let record = if self.run_id.len() < 36 {
            store.find_by_prefix(&self.run_id)?
        } else {
            let id: RunId = self.run_id.parse()?;
            store.load(&id)?
        };

        let content = render(&record, self.format)?;

        if let Some(ref path) = self.output_file {
            fs::write(path, &content)
                .map_err(|e| CliError::Other(format!("failed to write file: {}", e)))?;

            if !quiet {
                output::print_success(&format!(
                    "Exported run {} to {}",
                    record.id.short(),
                    path.display()
                ));
            }
        } else {
            println!("{}", content);
        }

        Ok(())
    }
}

/// Render a run in `format`, without terminal styling.
fn render(record: &RunRecord, format: OutputFormat) -> CliResult<String> {
    match format {
        OutputFormat::Json => {
            serde_json::to_string_pretty(record).map_err(|e| CliError::Other(e.to_string()))
        }
        OutputFormat::Csv => {
            let mut buffer = Vec::new();
            output::write_csv(&mut buffer, record).map_err(|e| CliError::Other(e.to_string()))?;
            String::from_utf8(buffer).map_err(|e| CliError::Other(e.to_string()))
        }
        OutputFormat::Plain => {
            let mut buffer = Vec::new();
            output::write_plain(&mut buffer, record, None)?;
            let text = String::from_utf8_lossy(&buffer);
            Ok(console::strip_ansi_codes(&text).into_owned())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::{DiscoveryReport, ProtocolHosts};
    use crate::config::{MemcachedConfig, ProbeConfig};
    use crate::storage::RunResults;

    fn record() -> RunRecord {
        let config = ProbeConfig::Memcached(MemcachedConfig::default());
        let report = DiscoveryReport {
            protocols: vec![ProtocolHosts {
                config: config.clone(),
                hosts: vec!["203.0.113.5".parse().unwrap()],
            }],
            hosts_probed: 2,
        };
        RunRecord::new("mc_before_filtering.json", vec![config], RunResults::Discovery(report))
    }

    #[test]
    fn test_render_csv() {
        let text = render(&record(), OutputFormat::Csv).unwrap();
        assert_eq!(text, "protocol,host\nmemcached,203.0.113.5\n");
    }

    #[test]
    fn test_render_json_round_trips() {
        let original = record();
        let text = render(&original, OutputFormat::Json).unwrap();
        let parsed: RunRecord = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed, original);
    }

    #[test]
    fn test_render_plain_has_no_escape_codes() {
        let text = render(&record(), OutputFormat::Plain).unwrap();
        assert!(text.contains("203.0.113.5"));
        assert!(!text.contains('\u{1b}'));
    }
}
