//! Core type definitions.
//!
//! Query types are enums rather than strings so an unknown name is rejected
//! while the configuration is parsed.

mod query;
mod run_id;
mod target;

pub use query::{DnsQueryType, NtpQueryType, Protocol};
pub use run_id::{RunId, RunIdError};
pub use target::{HostEntry, HostList, TargetError, TargetSpec};
