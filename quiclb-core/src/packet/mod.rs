//! Packet header parsing.

mod header;

#[cfg(test)]
mod tests;

pub use header::{
    parse_header, peek_header_form, Header, HeaderForm, LongHeader, PacketType, RoutableHeader,
    ShortHeader, HEADER_FORM_BIT, KEY_PHASE_BIT, LONG_HEADER_DCID_OFFSET, LONG_PACKET_TYPES,
    PACKET_NUMBER_LENGTH_MASK, VERSION_NEGOTIATION,
};
