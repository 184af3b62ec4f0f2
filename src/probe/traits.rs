//! Transport abstractions for the probe executor.
//!
//! The executor never talks to the network directly. It hands encoded
//! payloads to a [`Transport`] and asks a [`KeyEnumerator`] for Memcached
//! keys, so both can be swapped for in-memory fakes in tests.

use crate::codec::CapturedPacket;
use crate::error::ProbeResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

/// Sends one datagram and collects what comes back.
///
/// # Example
///
/// ```ignore
/// use ampscout::probe::{Transport, UdpSocketTransport};
///
/// async fn ask<T: Transport>(transport: &T, payload: &[u8]) {
///     let packets = transport
///         .exchange("192.0.2.1:123".parse().unwrap(), payload, Duration::from_secs(3))
///         .await;
/// }
/// ```
#[async_trait]
pub trait Transport: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Check if this transport needs elevated privileges.
    fn requires_privileges(&self) -> bool;

    /// Send `payload` to `target` once and return every UDP datagram observed
    /// before `window` elapses.
    ///
    /// The window is always waited out in full, since amplified responses
    /// arrive as bursts of datagrams. Returned packets are unfiltered: the
    /// caller decides which of them belong to the probe.
    async fn exchange(
        &self,
        target: SocketAddr,
        payload: &[u8],
        window: Duration,
    ) -> ProbeResult<Vec<CapturedPacket>>;
}

/// Memcached keys worth requesting, found over TCP.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlabInventory {
    /// Distinct keys whose values fall inside the theoretical size window.
    pub keys: Vec<String>,
    /// Sum of the advertised sizes of those keys.
    pub theoretical_response_bytes: u64,
}

impl SlabInventory {
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// Enumerates the large keys stored on a Memcached server.
#[async_trait]
pub trait KeyEnumerator: Send + Sync {
    async fn enumerate(&self, target: IpAddr) -> ProbeResult<SlabInventory>;
}

/// A boxed transport for dynamic dispatch.
pub type BoxedTransport = Box<dyn Transport>;

/// A boxed key enumerator for dynamic dispatch.
pub type BoxedKeyEnumerator = Box<dyn KeyEnumerator>;
