//! # QUIC Packet Header Parsing (RFC 9000 Section 17, RFC 8999)
//!
//! Zero-copy header parsing with lifetime-bound return types. Only the
//! fields needed for routing are decoded: header form, packet type, version
//! and connection IDs. Packet numbers stay protected and payloads are never
//! touched.

#![forbid(unsafe_code)]

use crate::error::{Error, Result};

// ============================================================================
// Header Form Constants (RFC 8999 Section 5.1, RFC 9000 Section 17)
// ============================================================================

/// Header Form Bit (most significant bit)
/// 1 = Long Header, 0 = Short Header
pub const HEADER_FORM_BIT: u8 = 0x80;

/// Long Packet Type occupies bits 4-5 of the first byte
const LONG_PACKET_TYPE_SHIFT: u8 = 4;
const LONG_PACKET_TYPE_MASK: u8 = 0x03;

/// Type-specific bits (bottom 4 bits of a long header)
const LONG_TYPE_SPECIFIC_MASK: u8 = 0x0f;

/// Offset of the DCID length byte in a long header (after form byte + version)
pub const LONG_HEADER_DCID_OFFSET: usize = 5;

/// Version field value reserved for Version Negotiation packets
pub const VERSION_NEGOTIATION: u32 = 0x0000_0000;

/// Spin Bit (Short Header, bit 5)
const SPIN_BIT: u8 = 0x20;

/// Reserved Bits (Short Header, bits 3-4)
const SHORT_RESERVED_SHIFT: u8 = 3;
const SHORT_RESERVED_MASK: u8 = 0x03;

/// Key Phase Bit (Short Header, bit 2)
pub const KEY_PHASE_BIT: u8 = 0x04;

/// Packet Number Length Mask (bottom 2 bits)
/// Encodes (packet_number_length - 1)
pub const PACKET_NUMBER_LENGTH_MASK: u8 = 0x03;

/// Long packet type table for QUIC version 1, indexed by `(byte0 >> 4) & 0x3`.
pub const LONG_PACKET_TYPES: [PacketType; 4] = [
    PacketType::Initial,
    PacketType::ZeroRtt,
    PacketType::Handshake,
    PacketType::Retry,
];

// ============================================================================
// Packet Type Enumeration
// ============================================================================

/// Packet Type (RFC 9000 Section 17)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketType {
    /// Initial packet (Long Header, type 0x0)
    Initial,
    /// 0-RTT packet (Long Header, type 0x1)
    ZeroRtt,
    /// Handshake packet (Long Header, type 0x2)
    Handshake,
    /// Retry packet (Long Header, type 0x3)
    Retry,
    /// 1-RTT packet (Short Header)
    OneRtt,
    /// Version Negotiation packet (Long Header with version 0)
    VersionNegotiation,
}

impl PacketType {
    /// Returns true if this is a long header packet type
    pub fn is_long_header(&self) -> bool {
        !matches!(self, PacketType::OneRtt)
    }

    /// Returns true if the client may send this packet before it has learned
    /// a server-chosen connection ID.
    pub fn is_first_contact(&self) -> bool {
        matches!(self, PacketType::Initial | PacketType::ZeroRtt)
    }
}

/// Header Form (Long vs Short)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderForm {
    /// Long Header (handshake packets)
    Long,
    /// Short Header (1-RTT packets)
    Short,
}

// ============================================================================
// Header Structures (Zero-Copy, Lifetime-Bound)
// ============================================================================

/// Long Header (RFC 9000 Section 17.2)
///
/// Self-describing: both connection ID lengths are carried on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LongHeader<'a> {
    /// Packet type (from the version 1 table, or Version Negotiation)
    pub packet_type: PacketType,

    /// Type-specific bits (bottom 4 bits of byte 0, still protected)
    pub type_specific: u8,

    /// QUIC version (0x00000000 for Version Negotiation)
    pub version: u32,

    /// Destination Connection ID (0-255 bytes)
    pub dcid: &'a [u8],

    /// Source Connection ID (0-255 bytes)
    pub scid: &'a [u8],
}

/// Short Header (RFC 9000 Section 17.3)
///
/// The DCID length is not on the wire; it is a property of the deployment
/// and must be supplied by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShortHeader<'a> {
    /// Spin bit (for latency measurement)
    pub spin: bool,

    /// Reserved bits (bits 3-4, still protected)
    pub reserved_bits: u8,

    /// Key phase bit (for key updates)
    pub key_phase: bool,

    /// Raw 2-bit packet number length field (still protected)
    pub packet_number_length_bits: u8,

    /// Destination Connection ID
    pub dcid: &'a [u8],
}

impl ShortHeader<'_> {
    /// Packet number length in bytes as encoded by the (protected) field.
    pub fn packet_number_len(&self) -> usize {
        self.packet_number_length_bits as usize + 1
    }
}

/// Parsed Packet Header (unifies Long and Short headers)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Header<'a> {
    /// Long header packet
    Long(LongHeader<'a>),

    /// Short header packet
    Short(ShortHeader<'a>),
}

/// Accessors shared by every header shape the router needs to look at.
pub trait RoutableHeader {
    /// Header form
    fn form(&self) -> HeaderForm;

    /// Packet classification
    fn packet_type(&self) -> PacketType;

    /// Destination connection ID bytes (the routing key)
    fn dcid(&self) -> &[u8];
}

impl RoutableHeader for LongHeader<'_> {
    fn form(&self) -> HeaderForm {
        HeaderForm::Long
    }

    fn packet_type(&self) -> PacketType {
        self.packet_type
    }

    fn dcid(&self) -> &[u8] {
        self.dcid
    }
}

impl RoutableHeader for ShortHeader<'_> {
    fn form(&self) -> HeaderForm {
        HeaderForm::Short
    }

    fn packet_type(&self) -> PacketType {
        PacketType::OneRtt
    }

    fn dcid(&self) -> &[u8] {
        self.dcid
    }
}

impl RoutableHeader for Header<'_> {
    fn form(&self) -> HeaderForm {
        match self {
            Header::Long(h) => h.form(),
            Header::Short(h) => h.form(),
        }
    }

    fn packet_type(&self) -> PacketType {
        match self {
            Header::Long(h) => h.packet_type,
            Header::Short(_) => PacketType::OneRtt,
        }
    }

    fn dcid(&self) -> &[u8] {
        match self {
            Header::Long(h) => h.dcid,
            Header::Short(h) => h.dcid,
        }
    }
}

impl<'a> Header<'a> {
    /// Get source connection ID (only available in Long Header)
    pub fn scid(&self) -> Option<&'a [u8]> {
        match self {
            Header::Long(h) => Some(h.scid),
            Header::Short(_) => None,
        }
    }

    /// Get the version (only available in Long Header)
    pub fn version(&self) -> Option<u32> {
        match self {
            Header::Long(h) => Some(h.version),
            Header::Short(_) => None,
        }
    }

    /// Number of datagram bytes consumed by the routing-relevant prefix.
    pub fn consumed_len(&self) -> usize {
        match self {
            Header::Long(h) => LONG_HEADER_DCID_OFFSET + 1 + h.dcid.len() + 1 + h.scid.len(),
            Header::Short(h) => 1 + h.dcid.len(),
        }
    }
}

// ============================================================================
// Parsing
// ============================================================================

/// Parse only the first byte to determine header form.
pub fn peek_header_form(datagram: &[u8]) -> Result<HeaderForm> {
    let first_byte = *datagram.first().ok_or(Error::Truncated {
        needed: 1,
        available: 0,
    })?;

    if (first_byte & HEADER_FORM_BIT) != 0 {
        Ok(HeaderForm::Long)
    } else {
        Ok(HeaderForm::Short)
    }
}

/// Parse the routing-relevant header of a datagram.
///
/// `short_cid_len` is the deployment's short-header DCID length; it is only
/// consulted for short headers. Returned slices borrow from `datagram`.
pub fn parse_header(datagram: &[u8], short_cid_len: usize) -> Result<Header<'_>> {
    match peek_header_form(datagram)? {
        HeaderForm::Long => parse_long_header(datagram).map(Header::Long),
        HeaderForm::Short => parse_short_header(datagram, short_cid_len).map(Header::Short),
    }
}

fn ensure_len(datagram: &[u8], needed: usize) -> Result<()> {
    if datagram.len() < needed {
        return Err(Error::Truncated {
            needed,
            available: datagram.len(),
        });
    }
    Ok(())
}

/// Parse Long Header (RFC 9000 Section 17.2)
fn parse_long_header(datagram: &[u8]) -> Result<LongHeader<'_>> {
    // Form byte + version + DCID length byte
    ensure_len(datagram, LONG_HEADER_DCID_OFFSET + 1)?;

    let first_byte = datagram[0];
    let version = u32::from_be_bytes([datagram[1], datagram[2], datagram[3], datagram[4]]);

    let mut offset = LONG_HEADER_DCID_OFFSET;
    let dcid_len = datagram[offset] as usize;
    offset += 1;

    // DCID plus the SCID length byte that follows it
    ensure_len(datagram, offset + dcid_len + 1)?;
    let dcid = &datagram[offset..offset + dcid_len];
    offset += dcid_len;

    let scid_len = datagram[offset] as usize;
    offset += 1;

    ensure_len(datagram, offset + scid_len)?;
    let scid = &datagram[offset..offset + scid_len];

    let packet_type = if version == VERSION_NEGOTIATION {
        PacketType::VersionNegotiation
    } else {
        LONG_PACKET_TYPES[((first_byte >> LONG_PACKET_TYPE_SHIFT) & LONG_PACKET_TYPE_MASK) as usize]
    };

    Ok(LongHeader {
        packet_type,
        type_specific: first_byte & LONG_TYPE_SPECIFIC_MASK,
        version,
        dcid,
        scid,
    })
}

/// Parse Short Header (RFC 9000 Section 17.3)
fn parse_short_header(datagram: &[u8], cid_len: usize) -> Result<ShortHeader<'_>> {
    let end = cid_len.checked_add(1).ok_or(Error::Truncated {
        needed: usize::MAX,
        available: datagram.len(),
    })?;
    ensure_len(datagram, end)?;

    let first_byte = datagram[0];

    Ok(ShortHeader {
        spin: (first_byte & SPIN_BIT) != 0,
        reserved_bits: (first_byte >> SHORT_RESERVED_SHIFT) & SHORT_RESERVED_MASK,
        key_phase: (first_byte & KEY_PHASE_BIT) != 0,
        packet_number_length_bits: first_byte & PACKET_NUMBER_LENGTH_MASK,
        dcid: &datagram[1..end],
    })
}
