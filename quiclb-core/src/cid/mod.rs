//! Connection ID encoding for load balancer routing.
//!
//! A routable CID carries a rotation tag in the top bits of its first byte
//! and an encoded server identity in the bytes that follow. Three encodings
//! are supported, selected per configuration:
//!
//! - **Plaintext**: server ID and nonce stored as raw bit fields
//! - **Stream**: server ID and nonce obfuscated by a three-pass AES keystream
//! - **Block**: server ID, zero padding and nonce encrypted as one AES block,
//!   or by a four-round Feistel construction for other lengths
//!
//! # CID Format
//!
//! ```text
//! byte 0:  [ tag (rotation_bits) | reserved ]
//! byte 1+: encoded payload (layout depends on the codec kind)
//! ```

mod bits;
mod block;
mod codec;
mod generator;
mod plaintext;
mod stream;

pub use codec::{decode, CidCodec};
pub use generator::CidGenerator;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Longest CID the codecs will mint (RFC 9000 Section 17.2, QUIC version 1)
pub const MAX_CID_LENGTH: usize = 20;

/// Longest encoded payload after the first byte
pub const MAX_PAYLOAD_LENGTH: usize = MAX_CID_LENGTH - 1;

/// Longest server identity in bytes
pub const MAX_SERVER_ID_LENGTH: usize = 15;

/// Default rotation tag width in bits
pub const DEFAULT_ROTATION_BITS: u8 = 2;

/// Widest supported rotation tag
pub const MAX_ROTATION_BITS: u8 = 3;

/// AES-128 key length used by the encrypted codecs
pub const KEY_LENGTH: usize = 16;

// ============================================================================
// Rotation Tag
// ============================================================================

/// Small identifier in the top bits of a CID naming the configuration that
/// minted it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RotationTag(u8);

impl RotationTag {
    pub const fn new(value: u8) -> Self {
        Self(value)
    }

    pub const fn value(self) -> u8 {
        self.0
    }

    /// Extract the tag from the first byte of a CID.
    #[inline]
    pub fn from_first_byte(first_byte: u8, rotation_bits: u8) -> Self {
        Self(first_byte >> (8 - rotation_bits))
    }

    /// First byte of a CID carrying this tag, reserved bits cleared.
    #[inline]
    pub fn first_byte(self, rotation_bits: u8) -> u8 {
        self.0 << (8 - rotation_bits)
    }

    /// Whether the tag fits in `rotation_bits` bits.
    pub fn fits(self, rotation_bits: u8) -> bool {
        (self.0 as u16) < (1u16 << rotation_bits)
    }
}

impl fmt::Display for RotationTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Server Identity
// ============================================================================

/// Opaque fixed-width server identifier recovered from a CID.
///
/// Stored big-endian; identities narrower than a whole number of bytes are
/// right-aligned with the unused high bits cleared.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ServerId {
    len: u8,
    bytes: [u8; MAX_SERVER_ID_LENGTH],
}

impl ServerId {
    /// Build an identity from raw bytes. Returns `None` if longer than
    /// [`MAX_SERVER_ID_LENGTH`] or empty.
    pub fn new(bytes: &[u8]) -> Option<Self> {
        if bytes.is_empty() || bytes.len() > MAX_SERVER_ID_LENGTH {
            return None;
        }
        let mut id = Self {
            len: bytes.len() as u8,
            bytes: [0; MAX_SERVER_ID_LENGTH],
        };
        id.bytes[..bytes.len()].copy_from_slice(bytes);
        Some(id)
    }

    /// Build an identity of `bits` width from an integer, truncating any
    /// higher bits.
    pub fn from_u64(value: u64, bits: u32) -> Self {
        let bits = bits.clamp(1, 64);
        let len = bits.div_ceil(8) as usize;
        let masked = if bits == 64 {
            value
        } else {
            value & ((1u64 << bits) - 1)
        };
        let be = masked.to_be_bytes();
        let mut id = Self {
            len: len as u8,
            bytes: [0; MAX_SERVER_ID_LENGTH],
        };
        id.bytes[..len].copy_from_slice(&be[8 - len..]);
        id
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len as usize]
    }

    pub fn len(&self) -> usize {
        self.len as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Integer value, if the identity fits in 64 bits.
    pub fn to_u64(&self) -> Option<u64> {
        if self.len() > 8 {
            return None;
        }
        Some(
            self.as_bytes()
                .iter()
                .fold(0u64, |acc, b| (acc << 8) | *b as u64),
        )
    }

    /// Whether the identity fits a field of `bits` width.
    pub fn fits_bits(&self, bits: usize) -> bool {
        if self.len() != bits.div_ceil(8) {
            return false;
        }
        let spare = self.len() * 8 - bits;
        spare == 0 || self.bytes[0] >> (8 - spare) == 0
    }
}

impl fmt::Debug for ServerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ServerId({})", hex::encode(self.as_bytes()))
    }
}

impl fmt::Display for ServerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.as_bytes()))
    }
}

impl std::str::FromStr for ServerId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s).map_err(|e| format!("invalid server id '{}': {}", s, e))?;
        ServerId::new(&bytes).ok_or_else(|| {
            format!(
                "server id '{}' must be 1-{} bytes",
                s, MAX_SERVER_ID_LENGTH
            )
        })
    }
}

impl Serialize for ServerId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for ServerId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

// ============================================================================
// Keys and Configuration Records
// ============================================================================

/// AES-128 key for the encrypted codecs. Never printed.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct CidKey([u8; KEY_LENGTH]);

impl CidKey {
    pub const fn new(bytes: [u8; KEY_LENGTH]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; KEY_LENGTH] {
        &self.0
    }
}

impl fmt::Debug for CidKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CidKey(..)")
    }
}

impl std::str::FromStr for CidKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut key = [0u8; KEY_LENGTH];
        hex::decode_to_slice(s, &mut key)
            .map_err(|e| format!("key must be {} hex-encoded bytes: {}", KEY_LENGTH, e))?;
        Ok(Self(key))
    }
}

impl Serialize for CidKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(self.0))
    }
}

impl<'de> Deserialize<'de> for CidKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// CID encoding scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CodecKind {
    Plaintext,
    Stream,
    Block,
}

impl fmt::Display for CodecKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CodecKind::Plaintext => write!(f, "plaintext"),
            CodecKind::Stream => write!(f, "stream"),
            CodecKind::Block => write!(f, "block"),
        }
    }
}

/// Codec configuration record for one rotation tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CidConfig {
    /// Rotation tag embedded in every CID minted under this configuration
    pub tag: RotationTag,

    /// Encoding scheme
    pub kind: CodecKind,

    /// Server identity width in bits (whole bytes for encrypted kinds)
    pub server_id_bits: u16,

    /// Nonce width in bits (whole bytes for encrypted kinds)
    #[serde(default)]
    pub nonce_bits: u16,

    /// Zero bytes checked on decrypt (block kind only)
    #[serde(default)]
    pub zero_pad_bytes: u8,

    /// Symmetric key (stream and block kinds)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<CidKey>,

    /// Optional lifetime after which the configuration stops decoding
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lifetime_secs: Option<u64>,
}

impl CidConfig {
    pub fn plaintext(tag: u8, server_id_bits: u16, nonce_bits: u16) -> Self {
        Self {
            tag: RotationTag::new(tag),
            kind: CodecKind::Plaintext,
            server_id_bits,
            nonce_bits,
            zero_pad_bytes: 0,
            key: None,
            lifetime_secs: None,
        }
    }

    pub fn stream(tag: u8, server_id_bytes: u16, nonce_bytes: u16, key: CidKey) -> Self {
        Self {
            tag: RotationTag::new(tag),
            kind: CodecKind::Stream,
            server_id_bits: server_id_bytes * 8,
            nonce_bits: nonce_bytes * 8,
            zero_pad_bytes: 0,
            key: Some(key),
            lifetime_secs: None,
        }
    }

    pub fn block(
        tag: u8,
        server_id_bytes: u16,
        zero_pad_bytes: u8,
        nonce_bytes: u16,
        key: CidKey,
    ) -> Self {
        Self {
            tag: RotationTag::new(tag),
            kind: CodecKind::Block,
            server_id_bits: server_id_bytes * 8,
            nonce_bits: nonce_bytes * 8,
            zero_pad_bytes,
            key: Some(key),
            lifetime_secs: None,
        }
    }

    pub fn with_lifetime_secs(mut self, secs: u64) -> Self {
        self.lifetime_secs = Some(secs);
        self
    }
}
