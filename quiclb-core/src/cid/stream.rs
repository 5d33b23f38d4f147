//! Stream-obfuscated CID layout.
//!
//! ```text
//! byte 0:  tag | reserved
//! bytes 1..: nonce' (nonce_len) | server_id' (server_id_len)
//! ```
//!
//! Three XOR passes, each keystream being AES-128 of the other half:
//!
//! ```text
//! s1 = sid   ^ F(nonce, 1)
//! n1 = nonce ^ F(s1, 2)
//! s2 = s1    ^ F(n1, 3)
//! ```
//!
//! There is no integrity check. A wrong key yields a garbage identity that
//! the server pool rejects.

use super::{CidKey, ServerId, MAX_PAYLOAD_LENGTH};
use crate::error::{Error, Result};
use aes::cipher::{BlockDecrypt, BlockEncrypt, KeyInit};
use aes::{Aes128, Block};
use std::fmt;

/// Largest input to the keystream function (room for length and pass bytes)
pub(crate) const MAX_PRF_INPUT: usize = 14;

/// Minimum stream nonce length in bytes
pub(crate) const MIN_STREAM_NONCE: usize = 4;

/// AES-128 keyed pseudo-random function over short inputs.
#[derive(Clone)]
pub(crate) struct AesPrf {
    cipher: Aes128,
}

impl AesPrf {
    pub(crate) fn new(key: &CidKey) -> Self {
        Self {
            cipher: Aes128::new(key.as_bytes().into()),
        }
    }

    /// XOR `AES(pad(input) | len | pass)` into `target`.
    #[inline]
    pub(crate) fn xor_keystream(&self, input: &[u8], pass: u8, target: &mut [u8]) {
        debug_assert!(input.len() <= MAX_PRF_INPUT);
        debug_assert!(target.len() <= 16);

        let mut block = Block::default();
        block[..input.len()].copy_from_slice(input);
        block[14] = input.len() as u8;
        block[15] = pass;
        self.cipher.encrypt_block(&mut block);

        for (t, k) in target.iter_mut().zip(block.iter()) {
            *t ^= k;
        }
    }

    pub(crate) fn encrypt_block(&self, data: &mut [u8; 16]) {
        let mut block = Block::clone_from_slice(&data[..]);
        self.cipher.encrypt_block(&mut block);
        data.copy_from_slice(block.as_slice());
    }

    pub(crate) fn decrypt_block(&self, data: &mut [u8; 16]) {
        let mut block = Block::clone_from_slice(&data[..]);
        self.cipher.decrypt_block(&mut block);
        data.copy_from_slice(block.as_slice());
    }
}

impl fmt::Debug for AesPrf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AesPrf(..)")
    }
}

#[derive(Debug, Clone)]
pub(crate) struct StreamScheme {
    server_id_len: usize,
    nonce_len: usize,
    prf: AesPrf,
}

impl StreamScheme {
    pub(crate) fn new(server_id_bits: u16, nonce_bits: u16, key: Option<&CidKey>) -> Result<Self> {
        let key = key.ok_or_else(|| Error::InvalidConfig("stream codec requires a key".into()))?;

        if server_id_bits % 8 != 0 || nonce_bits % 8 != 0 {
            return Err(Error::InvalidConfig(
                "stream codec requires whole-byte server ID and nonce widths".into(),
            ));
        }
        let server_id_len = server_id_bits as usize / 8;
        let nonce_len = nonce_bits as usize / 8;

        if server_id_len == 0 || server_id_len > MAX_PRF_INPUT {
            return Err(Error::InvalidConfig(format!(
                "stream server ID must be 1-{} bytes, got {}",
                MAX_PRF_INPUT, server_id_len
            )));
        }
        if !(MIN_STREAM_NONCE..=MAX_PRF_INPUT).contains(&nonce_len) {
            return Err(Error::InvalidConfig(format!(
                "stream nonce must be {}-{} bytes, got {}",
                MIN_STREAM_NONCE, MAX_PRF_INPUT, nonce_len
            )));
        }
        if server_id_len + nonce_len > MAX_PAYLOAD_LENGTH {
            return Err(Error::InvalidConfig(format!(
                "stream server ID and nonce exceed {} bytes",
                MAX_PAYLOAD_LENGTH
            )));
        }

        Ok(Self {
            server_id_len,
            nonce_len,
            prf: AesPrf::new(key),
        })
    }

    pub(crate) fn payload_len(&self) -> usize {
        self.server_id_len + self.nonce_len
    }

    pub(crate) fn nonce_len(&self) -> usize {
        self.nonce_len
    }

    pub(crate) fn decode(&self, payload: &[u8]) -> Result<ServerId> {
        let mut buf = [0u8; MAX_PAYLOAD_LENGTH];
        let buf = &mut buf[..self.payload_len()];
        buf.copy_from_slice(&payload[..self.payload_len()]);
        let (nonce, sid) = buf.split_at_mut(self.nonce_len);

        self.prf.xor_keystream(nonce, 3, sid);
        self.prf.xor_keystream(sid, 2, nonce);
        self.prf.xor_keystream(nonce, 1, sid);

        ServerId::new(sid).ok_or(Error::AuthenticationFailed)
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

        let (n, s) = payload[..self.payload_len()].split_at_mut(self.nonce_len);
        n.copy_from_slice(nonce);
        s.copy_from_slice(server_id.as_bytes());

        self.prf.xor_keystream(n, 1, s);
        self.prf.xor_keystream(s, 2, n);
        self.prf.xor_keystream(n, 3, s);
        Ok(())
    }
}
