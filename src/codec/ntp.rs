//! NTP requests: Mode 7 private queries and the Mode 3 client query.

use crate::types::NtpQueryType;

/// Length of an NTP Mode 3/4 header.
pub const NTP_HEADER_LEN: usize = 48;

/// LI=0, VN=3, Mode=7.
const MODE7_VERSION_MODE: u8 = 0x1F;
/// Implementation number for xntpd.
const IMPL_XNTPD: u8 = 0x03;

/// LI=0, VN=4, Mode=3.
const CLIENT_VERSION_MODE: u8 = 0x23;

const MODE_SERVER: u8 = 4;
const STRATUM_UNSYNCHRONIZED: u8 = 16;

/// Encode an 8-byte Mode 7 request carrying `request_code`.
///
/// Byte layout: version/mode, auth/sequence (0), implementation (3), request
/// code, then four zero bytes for the item count and size fields.
pub fn build_mode7_packet(request_code: u8) -> [u8; 8] {
    [
        MODE7_VERSION_MODE,
        0x00,
        IMPL_XNTPD,
        request_code,
        0x00,
        0x00,
        0x00,
        0x00,
    ]
}

/// Encode a plain client request.
pub fn build_client_packet() -> [u8; NTP_HEADER_LEN] {
    let mut packet = [0u8; NTP_HEADER_LEN];
    packet[0] = CLIENT_VERSION_MODE;
    packet
}

/// Encode the request for `query`.
pub fn build_ntp_request(query: NtpQueryType) -> Vec<u8> {
    match query.request_code() {
        Some(code) => build_mode7_packet(code).to_vec(),
        None => build_client_packet().to_vec(),
    }
}

/// Whether a reply to the client query comes from a synchronized server.
///
/// The server must answer in mode 4 with a stratum other than 16.
pub fn is_synchronized_server(payload: &[u8]) -> bool {
    if payload.len() < NTP_HEADER_LEN {
        return false;
    }

    let mode = payload[0] & 0x07;
    let stratum = payload[1];
    mode == MODE_SERVER && stratum != STRATUM_UNSYNCHRONIZED
}
