//! History subcommand implementation.

use crate::error::CliResult;
use crate::output;
use crate::storage::{RunRecord, RunStore};
use clap::Parser;
use console::style;

/// View and manage run history.
#[derive(Parser, Debug)]
pub struct HistoryCommand {
    /// Number of recent runs to show
    #[arg(short = 'n', long, default_value = "10")]
    pub count: usize,

    /// Show detailed information for each run
    #[arg(short, long)]
    pub detailed: bool,

    /// Clear all run history
    #[arg(long)]
    pub clear: bool,

    /// Delete runs older than N days
    #[arg(long, value_name = "DAYS")]
    pub prune: Option<u32>,
}

impl HistoryCommand {
    /// Execute the history command.
    pub fn execute(&self, quiet: bool) -> CliResult<()> {
        self.execute_with(&RunStore::new()?, quiet)
    }

    fn execute_with(&self, store: &RunStore, quiet: bool) -> CliResult<()> {
        if self.clear {
            let deleted = store.clear()?;
            if !quiet {
                output::print_success(&format!("Deleted {} runs", deleted));
            }
            return Ok(());
        }

        if let Some(days) = self.prune {
            let deleted = store.cleanup(chrono::Duration::days(i64::from(days)))?;
            if !quiet {
                output::print_success(&format!("Pruned {} runs older than {} days", deleted, days));
            }
            return Ok(());
        }

        let records = store.list_recent(self.count)?;
        if records.is_empty() {
            if !quiet {
                output::print_info("No runs recorded yet.");
            }
            return Ok(());
        }

        for record in &records {
            print_entry(record, self.detailed);
        }

        Ok(())
    }
}

fn print_entry(record: &RunRecord, detailed: bool) {
    println!(
        "{}  {}  {:<11}  {}",
        style(record.id.short()).dim(),
        record.started_at.format("%Y-%m-%d %H:%M"),
        style(record.purpose()).yellow(),
        record.summary()
    );

    if detailed {
        for config in &record.configs {
            println!("            probe: {}", config);
        }
        for file in &record.output_files {
            println!("            wrote: {}", file.display());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::DiscoveryReport;
    use crate::storage::RunResults;

    fn command(clear: bool, prune: Option<u32>) -> HistoryCommand {
        HistoryCommand {
            count: 10,
            detailed: true,
            clear,
            prune,
        }
    }

    fn record(age_days: i64) -> RunRecord {
        RunRecord::new("h_before_filtering.json", Vec::new(), RunResults::Discovery(DiscoveryReport::default()))
            .finalize(chrono::Utc::now() - chrono::Duration::days(age_days), 5)
    }

    #[test]
    fn test_prune_and_clear() {
        let dir = tempfile::tempdir().unwrap();
        let store = RunStore::with_dir(dir.path()).unwrap();
        store.save(&record(0)).unwrap();
        store.save(&record(10)).unwrap();

        command(false, Some(7)).execute_with(&store, true).unwrap();
        assert_eq!(store.list_ids().unwrap().len(), 1);

        command(false, None).execute_with(&store, true).unwrap();

        command(true, None).execute_with(&store, true).unwrap();
        assert!(store.list_ids().unwrap().is_empty());
    }
}
