//! Configuration management for ampscout.
//!
//! Provides XDG-compliant settings storage and the per-protocol probe
//! configuration that drives a batch.

mod probe;
mod settings;

pub use probe::{
    validate_all, DnsConfig, MemcachedConfig, NtpConfig, ProbeConfig, Purpose,
};
pub use settings::{AppSettings, CaptureMode, Paths};
