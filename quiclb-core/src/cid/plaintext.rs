//! Plaintext CID layout.
//!
//! ```text
//! byte 0:  tag | reserved
//! bits 8.. server ID (server_id_bits), then nonce (nonce_bits), MSB-first
//! ```
//!
//! No integrity protection: any CID with a known tag decodes to some
//! identity, and the server pool decides whether it exists.

use super::bits::{fits, read_bits, write_bits};
use super::{ServerId, MAX_PAYLOAD_LENGTH, MAX_SERVER_ID_LENGTH};
use crate::error::{Error, Result};

#[derive(Debug, Clone)]
pub(crate) struct PlaintextScheme {
    server_id_bits: usize,
    nonce_bits: usize,
}

impl PlaintextScheme {
    pub(crate) fn new(server_id_bits: u16, nonce_bits: u16) -> Result<Self> {
        let server_id_bits = server_id_bits as usize;
        let nonce_bits = nonce_bits as usize;

        if server_id_bits == 0 || server_id_bits > MAX_SERVER_ID_LENGTH * 8 {
            return Err(Error::InvalidConfig(format!(
                "plaintext server_id_bits must be 1-{}, got {}",
                MAX_SERVER_ID_LENGTH * 8,
                server_id_bits
            )));
        }
        if (server_id_bits + nonce_bits).div_ceil(8) > MAX_PAYLOAD_LENGTH {
            return Err(Error::InvalidConfig(format!(
                "plaintext server ID and nonce exceed {} bytes",
                MAX_PAYLOAD_LENGTH
            )));
        }

        Ok(Self {
            server_id_bits,
            nonce_bits,
        })
    }

    pub(crate) fn payload_len(&self) -> usize {
        (self.server_id_bits + self.nonce_bits).div_ceil(8)
    }

    pub(crate) fn nonce_len(&self) -> usize {
        self.nonce_bits.div_ceil(8)
    }

    pub(crate) fn nonce_bits(&self) -> usize {
        self.nonce_bits
    }

    pub(crate) fn decode(&self, payload: &[u8]) -> Result<ServerId> {
        let mut out = [0u8; MAX_SERVER_ID_LENGTH];
        let out = &mut out[..self.server_id_bits.div_ceil(8)];
        read_bits(payload, 0, self.server_id_bits, out);
        ServerId::new(out).ok_or(Error::AuthenticationFailed)
    }

    pub(crate) fn encode(&self, server_id: &ServerId, nonce: &[u8], payload: &mut [u8]) -> Result<()> {
        if !server_id.fits_bits(self.server_id_bits) {
            return Err(Error::InvalidConfig(format!(
                "server id {} does not fit {} bits",
                server_id, self.server_id_bits
            )));
        }
        if !fits(nonce, self.nonce_bits) {
            return Err(Error::InvalidConfig(format!(
                "nonce must be {} bits",
                self.nonce_bits
            )));
        }

        payload.fill(0);
        write_bits(payload, 0, self.server_id_bits, server_id.as_bytes());
        if self.nonce_bits > 0 {
            write_bits(payload, self.server_id_bits, self.nonce_bits, nonce);
        }
        Ok(())
    }
}
