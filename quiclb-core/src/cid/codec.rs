//! CID codec dispatch over the closed set of encoding schemes.

use super::block::BlockScheme;
use super::plaintext::PlaintextScheme;
use super::stream::StreamScheme;
use super::{CidConfig, CodecKind, RotationTag, ServerId, MAX_CID_LENGTH, MAX_ROTATION_BITS};
use crate::epoch::EpochStore;
use crate::error::{Error, Result};
use std::time::Instant;

#[derive(Debug, Clone)]
enum Scheme {
    Plaintext(PlaintextScheme),
    Stream(StreamScheme),
    Block(BlockScheme),
}

/// A validated codec bound to one configuration record.
///
/// Decoding is a pure function of the CID bytes and this configuration.
#[derive(Debug, Clone)]
pub struct CidCodec {
    config: CidConfig,
    rotation_bits: u8,
    scheme: Scheme,
}

impl CidCodec {
    /// Validate `config` and build its codec.
    pub fn new(config: &CidConfig, rotation_bits: u8) -> Result<Self> {
        if rotation_bits == 0 || rotation_bits > MAX_ROTATION_BITS {
            return Err(Error::InvalidConfig(format!(
                "rotation_bits must be 1-{}, got {}",
                MAX_ROTATION_BITS, rotation_bits
            )));
        }
        if !config.tag.fits(rotation_bits) {
            return Err(Error::InvalidConfig(format!(
                "rotation tag {} does not fit in {} bits",
                config.tag, rotation_bits
            )));
        }
        if config.kind != CodecKind::Block && config.zero_pad_bytes != 0 {
            return Err(Error::InvalidConfig(
                "zero_pad_bytes only applies to the block codec".into(),
            ));
        }

        let key = config.key.as_ref();
        let scheme = match config.kind {
            CodecKind::Plaintext => {
                Scheme::Plaintext(PlaintextScheme::new(config.server_id_bits, config.nonce_bits)?)
            }
            CodecKind::Stream => {
                Scheme::Stream(StreamScheme::new(config.server_id_bits, config.nonce_bits, key)?)
            }
            CodecKind::Block => Scheme::Block(BlockScheme::new(
                config.server_id_bits,
                config.zero_pad_bytes,
                config.nonce_bits,
                key,
            )?),
        };

        Ok(Self {
            config: config.clone(),
            rotation_bits,
            scheme,
        })
    }

    pub fn config(&self) -> &CidConfig {
        &self.config
    }

    pub fn tag(&self) -> RotationTag {
        self.config.tag
    }

    pub fn kind(&self) -> CodecKind {
        self.config.kind
    }

    pub fn rotation_bits(&self) -> u8 {
        self.rotation_bits
    }

    /// Total CID length in bytes, including the tag byte.
    pub fn cid_len(&self) -> usize {
        1 + match &self.scheme {
            Scheme::Plaintext(s) => s.payload_len(),
            Scheme::Stream(s) => s.payload_len(),
            Scheme::Block(s) => s.payload_len(),
        }
    }

    /// Nonce length in bytes expected by [`CidCodec::mint`].
    pub fn nonce_len(&self) -> usize {
        match &self.scheme {
            Scheme::Plaintext(s) => s.nonce_len(),
            Scheme::Stream(s) => s.nonce_len(),
            Scheme::Block(s) => s.nonce_len(),
        }
    }

    /// Bits of byte 0 below the rotation tag.
    fn reserved_mask(&self) -> u8 {
        0xFF >> self.rotation_bits
    }

    /// Whether the reserved bits of byte 0 are free to carry entropy.
    /// Authenticated block CIDs require them to be zero.
    pub fn reserved_bits_are_free(&self) -> bool {
        !matches!(&self.scheme, Scheme::Block(s) if s.is_authenticated())
    }

    /// Clear nonce bits beyond the configured width (plaintext only).
    pub(crate) fn mask_nonce(&self, nonce: &mut [u8]) {
        if let Scheme::Plaintext(s) = &self.scheme {
            let spare = nonce.len() * 8 - s.nonce_bits();
            if spare > 0 {
                if let Some(first) = nonce.first_mut() {
                    *first &= 0xFF >> spare;
                }
            }
        }
    }

    /// Recover the candidate server identity from a CID.
    ///
    /// Bytes beyond [`CidCodec::cid_len`] are ignored. The identity is not
    /// checked against the server pool here.
    pub fn decode(&self, cid: &[u8]) -> Result<ServerId> {
        if cid.len() < self.cid_len() {
            return Err(Error::CidLength {
                expected: self.cid_len(),
                actual: cid.len(),
            });
        }

        let tag = RotationTag::from_first_byte(cid[0], self.rotation_bits);
        if tag != self.config.tag {
            return Err(Error::UnknownConfig(tag));
        }

        let payload = &cid[1..self.cid_len()];
        match &self.scheme {
            Scheme::Plaintext(s) => s.decode(payload),
            Scheme::Stream(s) => s.decode(payload),
            Scheme::Block(s) => {
                if s.is_authenticated() && cid[0] & self.reserved_mask() != 0 {
                    return Err(Error::AuthenticationFailed);
                }
                s.decode(payload)
            }
        }
    }

    /// Mint a CID for `server_id` with the given nonce. Reserved bits of
    /// byte 0 are left clear.
    pub fn mint(&self, server_id: &ServerId, nonce: &[u8]) -> Result<Vec<u8>> {
        let mut cid = vec![0u8; self.cid_len()];
        debug_assert!(cid.len() <= MAX_CID_LENGTH);
        cid[0] = self.config.tag.first_byte(self.rotation_bits);

        let payload = &mut cid[1..];
        match &self.scheme {
            Scheme::Plaintext(s) => s.encode(server_id, nonce, payload)?,
            Scheme::Stream(s) => s.encode(server_id, nonce, payload)?,
            Scheme::Block(s) => s.encode(server_id, nonce, payload)?,
        }
        Ok(cid)
    }
}

/// Decode a CID against the store's current snapshot.
///
/// The configuration matching the embedded rotation tag is the only one
/// tried.
pub fn decode(cid: &[u8], store: &EpochStore) -> Result<ServerId> {
    store
        .snapshot()
        .decode(cid, Instant::now())
        .map(|decoded| decoded.server_id)
}
