//! Block-encrypted CID layout.
//!
//! ```text
//! byte 0:  tag | reserved (zero)
//! bytes 1..: E(server_id | zero_pad | nonce)
//! ```
//!
//! A 16-byte plaintext is one AES-128 block. Any other length is encrypted
//! with a four-round Feistel network over the two halves, using AES-128 as
//! the round function, so the whole payload behaves as a single wide block.
//! When `zero_pad_bytes > 0` the padding, and the reserved bits of byte 0,
//! must decrypt to zero or the CID is rejected as unauthenticated.

use super::stream::{AesPrf, MAX_PRF_INPUT};
use super::{CidKey, ServerId, MAX_PAYLOAD_LENGTH, MAX_SERVER_ID_LENGTH};
use crate::error::{Error, Result};

const AES_BLOCK_LEN: usize = 16;

/// Shortest payload the Feistel construction accepts
const MIN_BLOCK_PAYLOAD: usize = 3;

#[derive(Debug, Clone)]
pub(crate) struct BlockScheme {
    server_id_len: usize,
    zero_pad_len: usize,
    nonce_len: usize,
    prf: AesPrf,
}

impl BlockScheme {
    pub(crate) fn new(
        server_id_bits: u16,
        zero_pad_bytes: u8,
        nonce_bits: u16,
        key: Option<&CidKey>,
    ) -> Result<Self> {
        let key = key.ok_or_else(|| Error::InvalidConfig("block codec requires a key".into()))?;

        if server_id_bits % 8 != 0 || nonce_bits % 8 != 0 {
            return Err(Error::InvalidConfig(
                "block codec requires whole-byte server ID and nonce widths".into(),
            ));
        }
        let server_id_len = server_id_bits as usize / 8;
        let nonce_len = nonce_bits as usize / 8;
        let zero_pad_len = zero_pad_bytes as usize;
        let total = server_id_len + zero_pad_len + nonce_len;

        if server_id_len == 0 || server_id_len > MAX_SERVER_ID_LENGTH {
            return Err(Error::InvalidConfig(format!(
                "block server ID must be 1-{} bytes, got {}",
                MAX_SERVER_ID_LENGTH, server_id_len
            )));
        }
        if !(MIN_BLOCK_PAYLOAD..=MAX_PAYLOAD_LENGTH).contains(&total) {
            return Err(Error::InvalidConfig(format!(
                "block payload must be {}-{} bytes, got {}",
                MIN_BLOCK_PAYLOAD, MAX_PAYLOAD_LENGTH, total
            )));
        }

        Ok(Self {
            server_id_len,
            zero_pad_len,
            nonce_len,
            prf: AesPrf::new(key),
        })
    }

    pub(crate) fn payload_len(&self) -> usize {
        self.server_id_len + self.zero_pad_len + self.nonce_len
    }

    pub(crate) fn nonce_len(&self) -> usize {
        self.nonce_len
    }

    pub(crate) fn is_authenticated(&self) -> bool {
        self.zero_pad_len > 0
    }

    pub(crate) fn decode(&self, payload: &[u8]) -> Result<ServerId> {
        let mut buf = [0u8; MAX_PAYLOAD_LENGTH];
        let buf = &mut buf[..self.payload_len()];
        buf.copy_from_slice(&payload[..self.payload_len()]);

        self.decrypt(buf);

        let pad = &buf[self.server_id_len..self.server_id_len + self.zero_pad_len];
        if pad.iter().any(|b| *b != 0) {
            return Err(Error::AuthenticationFailed);
        }

        ServerId::new(&buf[..self.server_id_len]).ok_or(Error::AuthenticationFailed)
    }

    pub(crate) fn encode(&self, server_id: &ServerId, nonce: &[u8], payload: &mut [u8]) -> Result<()> {
        if server_id.len() != self.server_id_len {
            return Err(Error::InvalidConfig(format!(
                "server id {} must be {} bytes",
                server_id, self.server_id_len
            )));
        }
        if nonce.len() != self.nonce_len {
            return Err(Error::InvalidConfig(format!(
                "nonce must be {} bytes",
                self.nonce_len
            )));
        }

        let buf = &mut payload[..self.payload_len()];
        buf.fill(0);
        buf[..self.server_id_len].copy_from_slice(server_id.as_bytes());
        buf[self.server_id_len + self.zero_pad_len..].copy_from_slice(nonce);

        self.encrypt(buf);
        Ok(())
    }

    fn encrypt(&self, buf: &mut [u8]) {
        if let Ok(block) = <&mut [u8; AES_BLOCK_LEN]>::try_from(&mut *buf) {
            self.prf.encrypt_block(block);
            return;
        }

        let (left, right) = buf.split_at_mut(buf.len() / 2);
        debug_assert!(right.len() <= MAX_PRF_INPUT);
        self.prf.xor_keystream(left, 1, right);
        self.prf.xor_keystream(right, 2, left);
        self.prf.xor_keystream(left, 3, right);
        self.prf.xor_keystream(right, 4, left);
    }

    fn decrypt(&self, buf: &mut [u8]) {
        if let Ok(block) = <&mut [u8; AES_BLOCK_LEN]>::try_from(&mut *buf) {
            self.prf.decrypt_block(block);
            return;
        }

        let (left, right) = buf.split_at_mut(buf.len() / 2);
        self.prf.xor_keystream(right, 4, left);
        self.prf.xor_keystream(left, 3, right);
        self.prf.xor_keystream(right, 2, left);
        self.prf.xor_keystream(left, 1, right);
    }
}
