//! JSON output formatting.

use crate::storage::RunRecord;
use std::io;

/// Print results in JSON format.
pub fn print_json(record: &RunRecord) -> io::Result<()> {
    let json = serde_json::to_string_pretty(record).map_err(io::Error::other)?;
    println!("{}", json);
    Ok(())
}
