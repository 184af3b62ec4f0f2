//! Output formatting module.
//!
//! Provides formatters for plain text, JSON, and CSV output of batch runs.

mod csv_format;
mod json_format;
mod plain;

pub use csv_format::{print_csv, write_csv};
pub use json_format::print_json;
pub use plain::{
    print_error, print_info, print_plain, print_run_header, print_success, print_warning,
    write_plain,
};

use crate::cli::OutputFormat;
use crate::storage::RunRecord;
use std::collections::HashMap;
use std::io;
use std::net::IpAddr;

/// Format and print a run according to the specified format.
pub fn format_results(
    record: &RunRecord,
    format: OutputFormat,
    edns: Option<&HashMap<IpAddr, Option<u16>>>,
) -> io::Result<()> {
    match format {
        OutputFormat::Plain => plain::print_plain(record, edns),
        OutputFormat::Json => json_format::print_json(record),
        OutputFormat::Csv => csv_format::print_csv(record),
    }
}
