//! DNS queries and response validation.

use crate::error::{ConfigError, ConfigResult};
use crate::types::DnsQueryType;
use trust_dns_proto::op::{Edns, Message, MessageType, OpCode, Query, ResponseCode};
use trust_dns_proto::rr::{Name, RecordType};

/// Encode a recursive DNS query for `domain`.
///
/// With `edns_payload_size` set, an OPT pseudo-record advertising that UDP
/// payload size with the DO bit is attached, inviting the largest answer the
/// resolver is willing to send.
pub fn build_dns_query(
    domain: &str,
    query_type: DnsQueryType,
    edns_payload_size: Option<u16>,
) -> ConfigResult<Vec<u8>> {
    let name = Name::from_ascii(domain).map_err(|e| ConfigError::InvalidDomain {
        domain: domain.to_string(),
        reason: e.to_string(),
    })?;

    let mut message = Message::new();
    message
        .set_id(rand::random())
        .set_message_type(MessageType::Query)
        .set_op_code(OpCode::Query)
        .set_recursion_desired(true)
        .add_query(Query::query(name, RecordType::from(query_type.code())));

    if let Some(size) = edns_payload_size {
        let mut edns = Edns::new();
        edns.set_max_payload(size);
        edns.set_version(0);
        edns.set_dnssec_ok(true);
        message.set_edns(edns);
    }

    message.to_vec().map_err(|e| ConfigError::InvalidDomain {
        domain: domain.to_string(),
        reason: e.to_string(),
    })
}

/// Whether a payload from a resolver's port 53 counts as a DNS answer.
///
/// A valid answer parses as DNS, has QR set and carries NOERROR or NXDOMAIN.
/// ANY answers are often only partially captured (the first IP fragment of a
/// large datagram), so for ANY a non-empty payload that does not parse at all
/// is accepted too.
pub fn is_valid_dns_response(payload: &[u8], query_type: DnsQueryType) -> bool {
    match Message::from_vec(payload) {
        Ok(message) => {
            message.message_type() == MessageType::Response
                && matches!(
                    message.response_code(),
                    ResponseCode::NoError | ResponseCode::NXDomain
                )
        }
        Err(_) => query_type == DnsQueryType::Any && !payload.is_empty(),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use trust_dns_proto::rr::{RData, Record};

    /// Encode a response to `query` with the given rcode and answer count.
    pub(crate) fn response_for(query: &[u8], rcode: ResponseCode, answers: usize) -> Vec<u8> {
        let request = Message::from_vec(query).unwrap();
        let mut response = Message::new();
        response
            .set_id(request.id())
            .set_message_type(MessageType::Response)
            .set_op_code(OpCode::Query)
            .set_recursion_desired(true)
            .set_recursion_available(true)
            .set_response_code(rcode);
        for q in request.queries() {
            response.add_query(q.clone());
        }
        for i in 0..answers {
            let name = request.queries()[0].name().clone();
            let ip = std::net::Ipv4Addr::new(192, 0, 2, i as u8);
            response.add_answer(Record::from_rdata(name, 300, RData::A(ip.into())));
        }
        response.to_vec().unwrap()
    }

    #[test]
    fn test_plain_query_layout() {
        let query = build_dns_query("google.com", DnsQueryType::A, None).unwrap();
        // 12 header + 12 name + 2 type + 2 class
        assert_eq!(query.len(), 28);

        let parsed = Message::from_vec(&query).unwrap();
        assert!(parsed.recursion_desired());
        assert_eq!(parsed.message_type(), MessageType::Query);
        assert_eq!(parsed.queries()[0].query_type(), RecordType::A);
        assert!(parsed.extensions().is_none());
    }

    #[test]
    fn test_edns_query_advertises_payload_and_do_bit() {
        let query = build_dns_query("abc", DnsQueryType::Any, Some(4096)).unwrap();
        // 12 header + 5 name + 4 question + 11 OPT record
        assert_eq!(query.len(), 32);

        let parsed = Message::from_vec(&query).unwrap();
        let edns = parsed.extensions().as_ref().unwrap();
        assert_eq!(edns.max_payload(), 4096);
        assert!(edns.dnssec_ok());
        assert_eq!(parsed.queries()[0].query_type(), RecordType::ANY);
    }

    #[test]
    fn test_query_type_codes_reach_the_wire() {
        let query = build_dns_query("example.org", DnsQueryType::Dnskey, None).unwrap();
        let parsed = Message::from_vec(&query).unwrap();
        assert_eq!(u16::from(parsed.queries()[0].query_type()), 48);
    }

    #[test]
    fn test_noerror_and_nxdomain_are_valid() {
        let query = build_dns_query("example.org", DnsQueryType::A, None).unwrap();
        let ok = response_for(&query, ResponseCode::NoError, 1);
        let nx = response_for(&query, ResponseCode::NXDomain, 0);
        let refused = response_for(&query, ResponseCode::Refused, 0);

        assert!(is_valid_dns_response(&ok, DnsQueryType::A));
        assert!(is_valid_dns_response(&nx, DnsQueryType::A));
        assert!(!is_valid_dns_response(&refused, DnsQueryType::A));
    }

    #[test]
    fn test_query_echo_is_not_a_response() {
        let query = build_dns_query("example.org", DnsQueryType::A, None).unwrap();
        assert!(!is_valid_dns_response(&query, DnsQueryType::A));
    }

    #[test]
    fn test_unparseable_payload_only_counts_for_any() {
        let garbage = vec![0xFF; 5];
        assert!(is_valid_dns_response(&garbage, DnsQueryType::Any));
        assert!(!is_valid_dns_response(&garbage, DnsQueryType::A));
        assert!(!is_valid_dns_response(&[], DnsQueryType::Any));
    }
}
