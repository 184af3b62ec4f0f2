//! Result persistence.
//!
//! Result files go next to the host list for downstream tooling; every run
//! is also kept as a JSON record in the history store.

mod json_store;
pub mod results;

pub use json_store::{RunRecord, RunResults, RunStore};
pub use results::{load_max_udp_map, write_discovery, write_measurement};
