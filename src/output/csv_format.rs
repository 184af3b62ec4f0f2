//! CSV output formatting.

use crate::storage::{RunRecord, RunResults};
use std::io::{self, Write};

/// Print results in CSV format.
pub fn print_csv(record: &RunRecord) -> io::Result<()> {
    let stdout = io::stdout();
    write_csv(stdout.lock(), record).map_err(io::Error::from)
}

/// Write one row per amplifier (or open host) of a run.
///
/// Memcached theoretical maxima are rows of kind `theoretical`.
pub fn write_csv<W: Write>(writer: W, record: &RunRecord) -> csv::Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);

    match &record.results {
        RunResults::Discovery(report) => {
            wtr.write_record(["protocol", "host"])?;
            for protocol in &report.protocols {
                let name = protocol.config.protocol().to_string();
                for host in &protocol.hosts {
                    wtr.write_record([name.as_str(), &host.to_string()])?;
                }
            }
        }
        RunResults::Measurement(report) => {
            wtr.write_record([
                "protocol",
                "kind",
                "host",
                "domain",
                "baf",
                "request_size",
                "response_size",
                "edns_buffer",
            ])?;
            for protocol in &report.protocols {
                let name = protocol.config.protocol().to_string();
                for result in &protocol.amplifiers {
                    wtr.write_record([
                        name.as_str(),
                        "practical",
                        &result.host.to_string(),
                        result.domain.as_deref().unwrap_or(""),
                        &result.baf.to_string(),
                        &result.request_size.to_string(),
                        &result.response_size.to_string(),
                        &result.edns_buffer.map_or(String::new(), |b| b.to_string()),
                    ])?;
                }
            }
            for (host, baf) in &report.theoretical_max {
                wtr.write_record([
                    "memcached",
                    "theoretical",
                    &host.to_string(),
                    "",
                    &baf.to_string(),
                    "",
                    "",
                    "",
                ])?;
            }
        }
    }

    wtr.flush()?;
    Ok(())
}
