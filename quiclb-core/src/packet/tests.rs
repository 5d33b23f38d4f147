//! RFC-Compliant Tests for the header parser.
//!
//! These tests validate compliance with:
//! - RFC 9000: Section 17.2 (Long Header Packet Format)
//! - RFC 9000: Section 17.3 (Short Header Packet Format)
//! - RFC 8999: Version-Independent Properties (Section 5)

use super::*;
use crate::error::Error;

fn long_header_packet(first_byte: u8, version: u32, dcid: &[u8], scid: &[u8]) -> Vec<u8> {
    let mut packet = vec![first_byte];
    packet.extend_from_slice(&version.to_be_bytes());
    packet.push(dcid.len() as u8);
    packet.extend_from_slice(dcid);
    packet.push(scid.len() as u8);
    packet.extend_from_slice(scid);
    packet
}

// ============================================================================
// RFC 9000 Section 17.2 - Long Header
// ============================================================================

#[test]
fn test_parse_long_header_initial() {
    let packet = [
        0xC0, // Long header, fixed bit, Initial
        0x00, 0x00, 0x00, 0x01, // Version 1
        0x08, // DCID length
        0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, // DCID
        0x04, // SCID length
        0x0A, 0x0B, 0x0C, 0x0D, // SCID
    ];

    let header = parse_header(&packet, 8).unwrap();

    match &header {
        Header::Long(h) => {
            assert_eq!(h.packet_type, PacketType::Initial);
            assert_eq!(h.type_specific, 0);
            assert_eq!(h.version, 1);
            assert_eq!(h.dcid, &[0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08]);
            assert_eq!(h.scid, &[0x0A, 0x0B, 0x0C, 0x0D]);
        }
        _ => panic!("Expected Long header"),
    }
    assert_eq!(header.consumed_len(), packet.len());
}

/// Pins the version 1 packet type table: type = (byte0 >> 4) & 0x3
#[test]
fn test_long_packet_type_table() {
    let cases = [
        (0xC0u8, PacketType::Initial),
        (0xD0, PacketType::ZeroRtt),
        (0xE0, PacketType::Handshake),
        (0xF0, PacketType::Retry),
    ];

    for (first_byte, expected) in cases {
        let packet = long_header_packet(first_byte, 1, &[0xAA], &[]);
        let header = parse_header(&packet, 0).unwrap();
        assert_eq!(header.packet_type(), expected, "first byte {:#04x}", first_byte);
    }
}

#[test]
fn test_long_header_type_specific_bits() {
    let packet = long_header_packet(0xE7, 1, &[0x01], &[0x02]);
    match parse_header(&packet, 0).unwrap() {
        Header::Long(h) => assert_eq!(h.type_specific, 0x07),
        _ => panic!("Expected Long header"),
    }
}

#[test]
fn test_long_header_without_fixed_bit_still_parses() {
    // The router only needs the CID; the fixed bit is not policed here.
    let packet = long_header_packet(0x80, 1, &[0x01, 0x02], &[]);
    let header = parse_header(&packet, 0).unwrap();
    assert_eq!(header.dcid(), &[0x01, 0x02]);
}

/// RFC 8999 Section 6: version 0 identifies Version Negotiation
#[test]
fn test_parse_version_negotiation() {
    let packet = long_header_packet(0xC0, VERSION_NEGOTIATION, &[0xAA, 0xBB], &[0xCC, 0xDD]);
    let header = parse_header(&packet, 0).unwrap();
    assert_eq!(header.packet_type(), PacketType::VersionNegotiation);
    assert_eq!(header.version(), Some(0));
}

/// Scenario: 0xC0, version 1, empty DCID, empty SCID
#[test]
fn test_parse_long_header_empty_cids() {
    let packet = [0xC0, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00];
    let header = parse_header(&packet, 8).unwrap();

    assert_eq!(header.packet_type(), PacketType::Initial);
    assert!(header.dcid().is_empty());
    assert_eq!(header.scid(), Some(&[][..]));
}

/// RFC 8999 Section 5.1: CID lengths are byte-exact and may exceed 20
/// for versions other than 1.
#[test]
fn test_parse_long_header_max_cid_length() {
    let dcid = [0x5Au8; 255];
    let packet = long_header_packet(0xC0, 0xff00_001d, &dcid, &[0x01]);
    let header = parse_header(&packet, 0).unwrap();
    assert_eq!(header.dcid().len(), 255);
}

#[test]
fn test_long_header_truncated_before_dcid_length() {
    for len in 1..6 {
        let packet = [0xC0, 0x00, 0x00, 0x00, 0x01][..len.min(5)].to_vec();
        let err = parse_header(&packet, 0).unwrap_err();
        assert_eq!(
            err,
            Error::Truncated {
                needed: 6,
                available: packet.len()
            }
        );
    }
}

#[test]
fn test_long_header_dcid_length_exceeds_datagram() {
    let packet = [0xC0, 0x00, 0x00, 0x00, 0x01, 0x10, 0x01, 0x02];
    assert!(matches!(
        parse_header(&packet, 0),
        Err(Error::Truncated { .. })
    ));
}

#[test]
fn test_long_header_missing_scid_length_byte() {
    let packet = [0xC0, 0x00, 0x00, 0x00, 0x01, 0x02, 0x01, 0x02];
    assert_eq!(
        parse_header(&packet, 0).unwrap_err(),
        Error::Truncated {
            needed: 9,
            available: 8
        }
    );
}

#[test]
fn test_long_header_scid_length_exceeds_datagram() {
    let packet = [0xC0, 0x00, 0x00, 0x00, 0x01, 0x01, 0xAA, 0x04, 0x01];
    assert_eq!(
        parse_header(&packet, 0).unwrap_err(),
        Error::Truncated {
            needed: 12,
            available: 9
        }
    );
}

#[test]
fn test_empty_datagram_is_truncated() {
    assert_eq!(
        parse_header(&[], 8).unwrap_err(),
        Error::Truncated {
            needed: 1,
            available: 0
        }
    );
    assert!(peek_header_form(&[]).is_err());
}

// ============================================================================
// RFC 9000 Section 17.3 - Short Header
// ============================================================================

#[test]
fn test_parse_short_header_fields() {
    // 0 1 1 10 1 10: spin, reserved=0b10, key phase, pn_len bits=0b10
    let packet = [0x76, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0xFF];

    match parse_header(&packet, 8).unwrap() {
        Header::Short(h) => {
            assert!(h.spin);
            assert_eq!(h.reserved_bits, 0b10);
            assert!(h.key_phase);
            assert_eq!(h.packet_number_length_bits, 0b10);
            assert_eq!(h.packet_number_len(), 3);
            assert_eq!(h.dcid, &[0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08]);
        }
        _ => panic!("Expected Short header"),
    }
}

/// Scenario: 9-byte short header packet with hint 8 parses, hint 9 truncates
#[test]
fn test_short_header_length_hint_boundary() {
    let packet = [0x40, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08];

    let header = parse_header(&packet, 8).unwrap();
    assert_eq!(header.form(), HeaderForm::Short);
    assert_eq!(header.packet_type(), PacketType::OneRtt);
    assert_eq!(header.dcid().len(), 8);

    assert_eq!(
        parse_header(&packet, 9).unwrap_err(),
        Error::Truncated {
            needed: 10,
            available: 9
        }
    );
}

#[test]
fn test_short_header_oversized_hint_is_truncated() {
    let packet = [0x40, 0x01, 0x02, 0x03];
    for hint in [usize::MAX, usize::MAX - 1] {
        assert!(matches!(
            parse_header(&packet, hint),
            Err(Error::Truncated { available: 4, .. })
        ));
    }
}

#[test]
fn test_short_header_zero_length_cid() {
    let packet = [0x40];
    let header = parse_header(&packet, 0).unwrap();
    assert!(header.dcid().is_empty());
    assert_eq!(header.scid(), None);
    assert_eq!(header.version(), None);
}

#[test]
fn test_peek_header_form() {
    assert_eq!(peek_header_form(&[0xC0]).unwrap(), HeaderForm::Long);
    assert_eq!(peek_header_form(&[0x40]).unwrap(), HeaderForm::Short);
}

#[test]
fn test_packet_type_properties() {
    assert!(PacketType::Initial.is_long_header());
    assert!(!PacketType::OneRtt.is_long_header());
    assert!(PacketType::Initial.is_first_contact());
    assert!(PacketType::ZeroRtt.is_first_contact());
    assert!(!PacketType::Handshake.is_first_contact());
    assert!(!PacketType::OneRtt.is_first_contact());
}

// ============================================================================
// Properties
// ============================================================================

mod properties {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn long_header_recovers_exact_cids(
            type_bits in 0u8..4,
            dcid in proptest::collection::vec(any::<u8>(), 0..=20),
            scid in proptest::collection::vec(any::<u8>(), 0..=20),
            trailer in proptest::collection::vec(any::<u8>(), 0..32),
        ) {
            let mut packet = long_header_packet(0xC0 | (type_bits << 4), 1, &dcid, &scid);
            packet.extend_from_slice(&trailer);

            let header = parse_header(&packet, 0).unwrap();
            prop_assert_eq!(header.dcid(), &dcid[..]);
            prop_assert_eq!(header.scid(), Some(&scid[..]));
            prop_assert_eq!(header.packet_type(), LONG_PACKET_TYPES[type_bits as usize]);
        }

        #[test]
        fn short_header_truncates_iff_shorter_than_hint(
            len in 1usize..40,
            hint in 0usize..40,
        ) {
            let mut packet = vec![0x40u8; len];
            packet[0] = 0x41;
            let result = parse_header(&packet, hint);
            if len < 1 + hint {
                prop_assert_eq!(result.unwrap_err(), Error::Truncated { needed: 1 + hint, available: len });
            } else {
                prop_assert_eq!(result.unwrap().dcid().len(), hint);
            }
        }

        #[test]
        fn arbitrary_bytes_never_panic(bytes in proptest::collection::vec(any::<u8>(), 0..64), hint in 0usize..24) {
            let _ = parse_header(&bytes, hint);
        }
    }
}
