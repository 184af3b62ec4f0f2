//! # ampscout - UDP Amplifier Discovery and Measurement
//!
//! ampscout finds DNS resolvers, NTP servers and Memcached instances that
//! answer unsolicited UDP requests, and measures their bandwidth
//! amplification factor (BAF): response payload bytes per request byte.
//!
//! ## Features
//!
//! - **Discovery**: Keep the hosts of a list that answer each protocol
//! - **Measurement**: Size every response, including multi-datagram ones
//! - **Memcached Upper Bound**: Theoretical BAF from the server's own key sizes
//! - **Two Capture Modes**: Unprivileged sockets, or link-layer capture that
//!   sees padding and partial fragments
//! - **Result Persistence**: Result files for downstream tooling plus a run history
//! - **Multiple Output Formats**: Plain text, JSON, and CSV
//!
//! ## Example Usage
//!
//! ```rust,ignore
//! use ampscout::batch::{BatchPlan, MeasurementBatch};
//! use ampscout::config::{AppSettings, NtpConfig, ProbeConfig, Purpose};
//! use ampscout::probe::ProbeExecutor;
//! use ampscout::types::{HostList, NtpQueryType, Protocol};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let hosts: HostList = ["192.0.2.1".parse()?].into_iter().collect();
//!     let plan = BatchPlan::new(
//!         vec![ProbeConfig::Ntp(NtpConfig::new(NtpQueryType::Monlist))],
//!         Purpose::Measurement,
//!     )?;
//!
//!     let executor = ProbeExecutor::from_settings(&AppSettings::default())?;
//!     let report = MeasurementBatch::new(executor, plan)?.run(&hosts).await?;
//!
//!     for result in report.results(Protocol::Ntp).unwrap_or_default() {
//!         println!("{} amplifies {:.1}x", result.host, result.baf);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! - [`types`] - Protocols, query types, host lists and run ids
//! - [`codec`] - Request encoding and response validation per protocol
//! - [`probe`] - Transports, Memcached key enumeration and the probe executor
//! - [`amplification`] - BAF arithmetic and statistics
//! - [`batch`] - Discovery and measurement over a host list
//! - [`config`] - Probe configuration and application settings
//! - [`storage`] - Result files and run history
//! - [`error`] - Error types
//! - [`output`] - Output formatting utilities

pub mod amplification;
pub mod batch;
pub mod cli;
pub mod codec;
pub mod config;
pub mod error;
pub mod output;
pub mod probe;
pub mod storage;
pub mod types;

// Re-export commonly used types
pub use amplification::{AmplificationResult, BafSummary};
pub use batch::{DiscoveryBatch, MeasurementBatch};
pub use error::{CliError, ConfigError, ProbeFailure, StorageError};
pub use probe::{ProbeExecutor, Transport};
pub use types::{HostEntry, HostList, Protocol, RunId};
