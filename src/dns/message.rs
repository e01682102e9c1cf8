//! RFC 1035 message encoding and decoding, just enough for MX and A
//! queries over UDP. No resolver library is involved: queries are built
//! byte by byte and responses parsed with a compression-aware name walker.

/// A record (IPv4 host address).
pub const TYPE_A: u16 = 1;

/// MX record (mail exchange).
pub const TYPE_MX: u16 = 15;

/// IN class.
pub const CLASS_IN: u16 = 1;

/// Standard query with recursion desired.
const FLAGS_RD: u16 = 0x0100;

/// Upper bound on followed compression pointers, against malformed or
/// malicious packets that chain pointers in a loop.
const MAX_POINTER_CHAIN: usize = 10;

/// Build a single-question query packet.
pub fn build_query(id: u16, name: &str, qtype: u16) -> Vec<u8> {
    let mut packet = Vec::with_capacity(17 + name.len());

    // Header: ID, flags, QDCOUNT=1, ANCOUNT/NSCOUNT/ARCOUNT=0.
    packet.extend_from_slice(&id.to_be_bytes());
    packet.extend_from_slice(&FLAGS_RD.to_be_bytes());
    packet.extend_from_slice(&1u16.to_be_bytes());
    packet.extend_from_slice(&0u16.to_be_bytes());
    packet.extend_from_slice(&0u16.to_be_bytes());
    packet.extend_from_slice(&0u16.to_be_bytes());

    // Question: length-prefixed labels, zero terminator, QTYPE, QCLASS.
    for label in name.split('.').filter(|l| !l.is_empty()) {
        packet.push(label.len() as u8);
        packet.extend_from_slice(label.as_bytes());
    }
    packet.push(0);
    packet.extend_from_slice(&qtype.to_be_bytes());
    packet.extend_from_slice(&CLASS_IN.to_be_bytes());

    packet
}

/// The mail exchange with the smallest preference in a response, or `None`
/// when the response is unusable (bad ID, parse failure, empty answers).
pub fn best_mx(packet: &[u8], expected_id: u16) -> Option<String> {
    let mut best: Option<(u16, String)> = None;

    for_each_answer(packet, expected_id, |rtype, rdata_start, rdata_len, packet| {
        if rtype != TYPE_MX || rdata_len < 3 {
            return Some(());
        }
        let preference = read_u16(packet, rdata_start)?;
        let mut cursor = rdata_start + 2;
        let host = read_name(packet, &mut cursor)?;
        if best.as_ref().map_or(true, |(p, _)| preference < *p) {
            best = Some((preference, host));
        }
        Some(())
    })?;

    best.map(|(_, host)| host)
}

/// The first A record in a response rendered as a dotted quad, or `None`.
pub fn first_a(packet: &[u8], expected_id: u16) -> Option<String> {
    let mut address = None;

    for_each_answer(packet, expected_id, |rtype, rdata_start, rdata_len, packet| {
        if rtype != TYPE_A || rdata_len != 4 || address.is_some() {
            return Some(());
        }
        let octets = packet.get(rdata_start..rdata_start + 4)?;
        address = Some(format!(
            "{}.{}.{}.{}",
            octets[0], octets[1], octets[2], octets[3]
        ));
        Some(())
    })?;

    address
}

/// Walk the answer section, invoking `visit` with each record's TYPE and
/// RDATA bounds. `None` from `visit` or from the structural walk aborts the
/// whole parse.
fn for_each_answer(
    packet: &[u8],
    expected_id: u16,
    mut visit: impl FnMut(u16, usize, usize, &[u8]) -> Option<()>,
) -> Option<()> {
    if read_u16(packet, 0)? != expected_id {
        return None;
    }
    let qdcount = read_u16(packet, 4)?;
    let ancount = read_u16(packet, 6)?;

    // Skip the echoed question section.
    let mut cursor = 12;
    for _ in 0..qdcount {
        read_name(packet, &mut cursor)?;
        cursor += 4; // QTYPE + QCLASS
    }

    for _ in 0..ancount {
        read_name(packet, &mut cursor)?;
        let rtype = read_u16(packet, cursor)?;
        // CLASS (2) + TTL (4) sit between TYPE and RDLENGTH.
        let rdata_len = read_u16(packet, cursor + 8)? as usize;
        let rdata_start = cursor + 10;
        packet.get(rdata_start..rdata_start + rdata_len)?;

        visit(rtype, rdata_start, rdata_len, packet)?;
        cursor = rdata_start + rdata_len;
    }

    Some(())
}

/// Read a possibly-compressed domain name starting at `*cursor`.
///
/// A length byte with both top bits set is a pointer whose low 14 bits are
/// an absolute packet offset. The enclosing cursor advances past the 2-byte
/// pointer (not to the end of the pointed-to name); pointer chains are
/// bounded by [`MAX_POINTER_CHAIN`].
fn read_name(packet: &[u8], cursor: &mut usize) -> Option<String> {
    let mut name = String::new();
    let mut pos = *cursor;
    let mut jumped = false;
    let mut jumps = 0;

    loop {
        let len = *packet.get(pos)? as usize;

        if len == 0 {
            if !jumped {
                *cursor = pos + 1;
            }
            break;
        }

        if len & 0xC0 == 0xC0 {
            if jumps >= MAX_POINTER_CHAIN {
                return None;
            }
            jumps += 1;
            let offset = ((len & 0x3F) << 8) | *packet.get(pos + 1)? as usize;
            if !jumped {
                *cursor = pos + 2;
                jumped = true;
            }
            pos = offset;
            continue;
        }

        let label = packet.get(pos + 1..pos + 1 + len)?;
        if !name.is_empty() {
            name.push('.');
        }
        name.push_str(&String::from_utf8_lossy(label));
        pos += 1 + len;
    }

    Some(name)
}

fn read_u16(packet: &[u8], pos: usize) -> Option<u16> {
    let bytes = packet.get(pos..pos + 2)?;
    Some(u16::from_be_bytes([bytes[0], bytes[1]]))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn push_name(packet: &mut Vec<u8>, name: &str) {
        for label in name.split('.').filter(|l| !l.is_empty()) {
            packet.push(label.len() as u8);
            packet.extend_from_slice(label.as_bytes());
        }
        packet.push(0);
    }

    /// Build a response echoing one question and carrying the given answer
    /// records as `(TYPE, RDATA)` pairs. Answer names are compression
    /// pointers back to the question name at offset 12.
    fn build_response(id: u16, qname: &str, qtype: u16, answers: &[(u16, Vec<u8>)]) -> Vec<u8> {
        let mut packet = Vec::new();
        packet.extend_from_slice(&id.to_be_bytes());
        packet.extend_from_slice(&0x8180u16.to_be_bytes());
        packet.extend_from_slice(&1u16.to_be_bytes());
        packet.extend_from_slice(&(answers.len() as u16).to_be_bytes());
        packet.extend_from_slice(&0u16.to_be_bytes());
        packet.extend_from_slice(&0u16.to_be_bytes());

        push_name(&mut packet, qname);
        packet.extend_from_slice(&qtype.to_be_bytes());
        packet.extend_from_slice(&CLASS_IN.to_be_bytes());

        for (rtype, rdata) in answers {
            packet.extend_from_slice(&[0xC0, 12]); // NAME -> question name
            packet.extend_from_slice(&rtype.to_be_bytes());
            packet.extend_from_slice(&CLASS_IN.to_be_bytes());
            packet.extend_from_slice(&300u32.to_be_bytes());
            packet.extend_from_slice(&(rdata.len() as u16).to_be_bytes());
            packet.extend_from_slice(rdata);
        }
        packet
    }

    fn mx_rdata(preference: u16, host: &str) -> Vec<u8> {
        let mut rdata = preference.to_be_bytes().to_vec();
        push_name(&mut rdata, host);
        rdata
    }

    #[test]
    fn query_layout_matches_rfc_1035() {
        let packet = build_query(0x1234, "uliege.be", TYPE_MX);
        assert_eq!(&packet[..2], &[0x12, 0x34]);
        assert_eq!(&packet[2..4], &[0x01, 0x00]);
        assert_eq!(&packet[4..6], &[0x00, 0x01]);
        // QNAME: 6 "uliege" 2 "be" 0
        assert_eq!(packet[12], 6);
        assert_eq!(&packet[13..19], b"uliege");
        assert_eq!(packet[19], 2);
        assert_eq!(&packet[20..22], b"be");
        assert_eq!(packet[22], 0);
        // QTYPE MX, QCLASS IN
        assert_eq!(&packet[23..27], &[0x00, 0x0F, 0x00, 0x01]);
    }

    #[test]
    fn trailing_dot_does_not_produce_an_empty_label() {
        let with_dot = build_query(1, "example.", TYPE_MX);
        let without = build_query(1, "example", TYPE_MX);
        assert_eq!(with_dot, without);
    }

    #[test]
    fn best_mx_picks_smallest_preference() {
        let response = build_response(
            7,
            "example",
            TYPE_MX,
            &[
                (TYPE_MX, mx_rdata(20, "b.example")),
                (TYPE_MX, mx_rdata(10, "a.example")),
            ],
        );
        assert_eq!(best_mx(&response, 7), Some("a.example".to_string()));
    }

    #[test]
    fn first_a_renders_dotted_quad() {
        let response = build_response(9, "mail.example", TYPE_A, &[(TYPE_A, vec![192, 0, 2, 17])]);
        assert_eq!(first_a(&response, 9), Some("192.0.2.17".to_string()));
    }

    #[test]
    fn mismatched_transaction_id_is_rejected() {
        let response = build_response(9, "mail.example", TYPE_A, &[(TYPE_A, vec![192, 0, 2, 17])]);
        assert_eq!(first_a(&response, 10), None);
    }

    #[test]
    fn empty_answer_section_yields_none() {
        let response = build_response(3, "example", TYPE_MX, &[]);
        assert_eq!(best_mx(&response, 3), None);
    }

    #[test]
    fn foreign_record_types_are_skipped_by_rdlength() {
        // A CNAME-ish record precedes the real A answer.
        let mut cname_rdata = Vec::new();
        push_name(&mut cname_rdata, "alias.example");
        let response = build_response(
            4,
            "mail.example",
            TYPE_A,
            &[(5, cname_rdata), (TYPE_A, vec![10, 0, 0, 1])],
        );
        assert_eq!(first_a(&response, 4), Some("10.0.0.1".to_string()));
    }

    #[test]
    fn compressed_names_resolve_through_pointers() {
        // RDATA name is a pointer to the question name.
        let response = build_response(5, "example.be", TYPE_MX, &[(TYPE_MX, {
            let mut rdata = 10u16.to_be_bytes().to_vec();
            rdata.extend_from_slice(&[0xC0, 12]);
            rdata
        })]);
        assert_eq!(best_mx(&response, 5), Some("example.be".to_string()));
    }

    #[test]
    fn pointer_loops_are_bounded() {
        // An answer whose name points at itself, forever.
        let mut packet = Vec::new();
        packet.extend_from_slice(&1u16.to_be_bytes());
        packet.extend_from_slice(&0x8180u16.to_be_bytes());
        packet.extend_from_slice(&0u16.to_be_bytes());
        packet.extend_from_slice(&1u16.to_be_bytes());
        packet.extend_from_slice(&0u16.to_be_bytes());
        packet.extend_from_slice(&0u16.to_be_bytes());
        packet.extend_from_slice(&[0xC0, 12]); // points to itself
        assert_eq!(best_mx(&packet, 1), None);
    }

    #[test]
    fn truncated_packets_never_panic() {
        let response = build_response(6, "example", TYPE_MX, &[(TYPE_MX, mx_rdata(5, "mx.example"))]);
        for cut in 0..response.len() {
            let _ = best_mx(&response[..cut], 6);
        }
    }

    #[test]
    fn parsing_is_idempotent() {
        let response = build_response(
            8,
            "example",
            TYPE_MX,
            &[
                (TYPE_MX, mx_rdata(20, "b.example")),
                (TYPE_MX, mx_rdata(10, "a.example")),
            ],
        );
        assert_eq!(best_mx(&response, 8), best_mx(&response, 8));
    }

    #[test]
    fn cursor_advances_past_pointer_not_target() {
        // Name at offset 12 is "ab" + terminator; a pointer at offset 16
        // must leave the cursor at 18 regardless of the target's length.
        let mut packet = vec![0u8; 12];
        push_name(&mut packet, "ab");
        packet.extend_from_slice(&[0xC0, 12]);
        let mut cursor = 16;
        assert_eq!(read_name(&packet, &mut cursor), Some("ab".to_string()));
        assert_eq!(cursor, 18);
    }
}
