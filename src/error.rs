//! Error types for ampscout.
//!
//! Uses `thiserror` for ergonomic error definitions. Per-host failures
//! ([`ProbeFailure`]) are contained by the probe executor; everything else is
//! a setup or I/O failure that aborts the command.

use std::path::PathBuf;
use thiserror::Error;

/// Why a single probe produced no measurement.
///
/// This is a closed set: the batch runners match on it instead of catching
/// arbitrary errors, and none of these variants abort a batch.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProbeFailure {
    /// Nothing attributable arrived within the listen window.
    #[error("no response within the listen window ({request_size} byte request)")]
    Timeout { request_size: usize },

    #[error("host unreachable: {0}")]
    Unreachable(String),

    /// The host answered, but not in a form the probe could use.
    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("socket error: {0}")]
    Socket(String),
}

impl ProbeFailure {
    /// Classify an I/O error raised while talking to a host.
    pub fn from_io(err: &std::io::Error) -> Self {
        use std::io::ErrorKind;

        match err.kind() {
            ErrorKind::ConnectionRefused
            | ErrorKind::ConnectionReset
            | ErrorKind::AddrNotAvailable
            | ErrorKind::NotConnected => Self::Unreachable(err.to_string()),
            ErrorKind::TimedOut | ErrorKind::WouldBlock => Self::Timeout { request_size: 0 },
            _ => {
                let text = err.to_string().to_lowercase();
                if text.contains("unreachable") {
                    Self::Unreachable(err.to_string())
                } else {
                    Self::Socket(err.to_string())
                }
            }
        }
    }
}

/// Configuration errors. These are fatal and surface before probing starts.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("could not determine configuration directory")]
    DirectoryNotFound,

    #[error("failed to read {path}: {reason}")]
    ReadFailed { path: PathBuf, reason: String },

    #[error("failed to write {path}: {reason}")]
    WriteFailed { path: PathBuf, reason: String },

    #[error("invalid settings format: {0}")]
    InvalidFormat(String),

    #[error("unknown DNS query type: {0}")]
    UnknownDnsQueryType(String),

    #[error("unknown NTP query type: {0}")]
    UnknownNtpQueryType(String),

    #[error("unknown protocol: {0}")]
    UnknownProtocol(String),

    #[error("`basic` NTP queries only detect servers; pick a Mode 7 query to measure amplification")]
    BasicNtpNotMeasurable,

    #[error("invalid DNS domain '{domain}': {reason}")]
    InvalidDomain { domain: String, reason: String },

    #[error("no protocols selected")]
    NoProtocols,

    #[error("protocol {0} configured more than once")]
    DuplicateProtocol(String),

    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors from result files and the run history store.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("storage directory error: {0}")]
    DirectoryError(String),

    #[error("failed to save: {0}")]
    SaveFailed(String),

    #[error("failed to load: {0}")]
    LoadFailed(String),

    #[error("run not found: {0}")]
    RunNotFound(String),

    #[error("invalid input file {path}: {reason}")]
    InvalidInput { path: PathBuf, reason: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Top-level error for CLI commands.
#[derive(Error, Debug)]
pub enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Target(#[from] crate::types::TargetError),

    #[error(transparent)]
    RunId(#[from] crate::types::RunIdError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

/// Result type alias for probe operations.
pub type ProbeResult<T> = Result<T, ProbeFailure>;

/// Result type alias for configuration.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Result type alias for storage.
pub type StorageResult<T> = Result<T, StorageError>;

/// Result type alias for CLI commands.
pub type CliResult<T> = Result<T, CliError>;
