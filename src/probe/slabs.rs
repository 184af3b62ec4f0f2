//! Memcached key enumeration over TCP.
//!
//! Lists the slab classes with `stats slabs`, then dumps every key of every
//! class with `stats cachedump`. Only keys whose values are large enough to
//! fill a near-maximal response are kept.

use crate::codec::memcached::{
    cachedump_commands, in_theoretical_window, parse_cachedump, parse_slab_ids, STATS_SLABS,
};
use crate::error::{ProbeFailure, ProbeResult};
use crate::probe::traits::{KeyEnumerator, SlabInventory};
use crate::types::Protocol;
use async_trait::async_trait;
use std::collections::HashSet;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::time::{timeout, timeout_at, Instant};
use tracing::debug;

/// Lines that end a text-protocol response.
const TERMINATORS: [&str; 4] = ["END", "ERROR", "CLIENT_ERROR", "SERVER_ERROR"];

/// Largest single response accepted from a server.
const MAX_RESPONSE_BYTES: usize = 4 * 1024 * 1024;

/// Key enumerator speaking the Memcached text protocol.
pub struct TcpSlabInspector {
    timeout: Duration,
    session_timeout: Duration,
    port: u16,
}

impl TcpSlabInspector {
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

    /// Budget for a whole enumeration, however many slab classes there are.
    pub const DEFAULT_SESSION_TIMEOUT: Duration = Duration::from_secs(30);

    /// Create an inspector with a per-step connect/read timeout.
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            session_timeout: Self::DEFAULT_SESSION_TIMEOUT.max(timeout),
            port: Protocol::Memcached.well_known_port(),
        }
    }

    /// Cap the time one host may hold the session, from connect to the last dump.
    pub fn with_session_timeout(mut self, session_timeout: Duration) -> Self {
        self.session_timeout = session_timeout;
        self
    }

    /// Connect to a port other than 11211.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    async fn connect(&self, addr: SocketAddr) -> ProbeResult<TcpStream> {
        match timeout(self.timeout, TcpStream::connect(addr)).await {
            Ok(Ok(stream)) => Ok(stream),
            Ok(Err(e)) => Err(ProbeFailure::from_io(&e)),
            Err(_) => Err(ProbeFailure::Timeout { request_size: 0 }),
        }
    }

    /// Send one command and read its response up to the terminating line.
    ///
    /// Every read must finish within the per-step timeout and before
    /// `deadline`, whichever comes first.
    async fn command(
        &self,
        session: &mut BufReader<TcpStream>,
        command: &[u8],
        deadline: Instant,
    ) -> ProbeResult<String> {
        match timeout_at(deadline, session.get_mut().write_all(command)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(ProbeFailure::from_io(&e)),
            Err(_) => return Err(ProbeFailure::Timeout { request_size: 0 }),
        }

        let mut response = String::new();
        loop {
            let mut line = String::new();
            let step_deadline = deadline.min(Instant::now() + self.timeout);
            let remaining = (MAX_RESPONSE_BYTES + 1 - response.len()) as u64;
            let mut limited = (&mut *session).take(remaining);
            let n = match timeout_at(step_deadline, limited.read_line(&mut line)).await {
                Ok(Ok(n)) => n,
                Ok(Err(e)) => return Err(ProbeFailure::from_io(&e)),
                Err(_) => return Err(ProbeFailure::Timeout { request_size: 0 }),
            };

            if n == 0 {
                return Err(ProbeFailure::Malformed(
                    "connection closed mid-response".to_string(),
                ));
            }

            let trimmed = line.trim_end();
            let first_word = trimmed.split_whitespace().next().unwrap_or_default();
            if TERMINATORS.contains(&first_word) {
                if first_word != "END" {
                    return Err(ProbeFailure::Malformed(trimmed.to_string()));
                }
                response.push_str(&line);
                return Ok(response);
            }

            response.push_str(&line);
            if response.len() > MAX_RESPONSE_BYTES {
                return Err(ProbeFailure::Malformed(format!(
                    "response exceeds {} bytes",
                    MAX_RESPONSE_BYTES
                )));
            }
        }
    }
}

impl Default for TcpSlabInspector {
    fn default() -> Self {
        Self::new(Self::DEFAULT_TIMEOUT)
    }
}

#[async_trait]
impl KeyEnumerator for TcpSlabInspector {
    async fn enumerate(&self, target: IpAddr) -> ProbeResult<SlabInventory> {
        let addr = SocketAddr::new(target, self.port);
        let deadline = Instant::now() + self.session_timeout;
        // The session lives only inside this call and closes on every return.
        let mut session = BufReader::new(self.connect(addr).await?);

        let slabs = self.command(&mut session, STATS_SLABS, deadline).await?;
        let slab_ids = parse_slab_ids(&slabs);
        debug!(%target, slabs = slab_ids.len(), "slab classes listed");

        let mut inventory = SlabInventory::default();
        let mut seen = HashSet::new();

        for command in cachedump_commands(&slab_ids) {
            let dump = self.command(&mut session, &command, deadline).await?;

            for item in parse_cachedump(&dump) {
                if !in_theoretical_window(item.bytes) {
                    continue;
                }
                if seen.insert(item.key.clone()) {
                    inventory.theoretical_response_bytes += item.bytes;
                    inventory.keys.push(item.key);
                }
            }
        }

        debug!(
            %target,
            keys = inventory.keys.len(),
            theoretical_bytes = inventory.theoretical_response_bytes,
            "memcached keys enumerated"
        );

        Ok(inventory)
    }
}
