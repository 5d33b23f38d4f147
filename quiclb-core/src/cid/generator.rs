//! Connection ID generator for backend servers.
//!
//! Mints CIDs that route back to one server identity using whichever
//! configuration the epoch store currently marks active, so rotation takes
//! effect on the next generated CID without restarting the server.

use super::{ServerId, MAX_PAYLOAD_LENGTH};
use crate::epoch::EpochStore;
use crate::error::{Error, Result};
use std::sync::Arc;

/// CID generator bound to one server identity.
///
/// # Format
///
/// - Byte 0: rotation tag of the active configuration, random reserved bits
///   (cleared for block codecs with integrity padding)
/// - Bytes 1..: encoded server ID and random nonce
#[derive(Debug, Clone)]
pub struct CidGenerator {
    epochs: Arc<EpochStore>,
    server_id: ServerId,
}

impl CidGenerator {
    pub fn new(epochs: Arc<EpochStore>, server_id: ServerId) -> Self {
        Self { epochs, server_id }
    }

    pub fn server_id(&self) -> ServerId {
        self.server_id
    }

    /// Length of the CIDs [`CidGenerator::generate`] currently produces.
    pub fn cid_len(&self) -> Option<usize> {
        self.epochs.active().map(|epoch| epoch.codec().cid_len())
    }

    /// Mint a fresh CID with the active configuration.
    pub fn generate(&self) -> Result<Vec<u8>> {
        let epoch = self.epochs.active().ok_or(Error::NoActiveConfig)?;
        let codec = epoch.codec();

        // One extra byte supplies the reserved bits of byte 0
        let mut entropy = [0u8; MAX_PAYLOAD_LENGTH + 1];
        let entropy = &mut entropy[..codec.nonce_len() + 1];
        getrandom::getrandom(entropy).map_err(|e| Error::Randomness(e.to_string()))?;

        let (reserved, nonce) = entropy.split_at_mut(1);
        codec.mask_nonce(nonce);
        let mut cid = codec.mint(&self.server_id, nonce)?;

        if codec.reserved_bits_are_free() {
            cid[0] |= reserved[0] & (0xFF >> codec.rotation_bits());
        }
        Ok(cid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cid::{decode, CidConfig, CidKey, RotationTag};
    use crate::epoch::EpochStoreConfig;

    fn store() -> Arc<EpochStore> {
        Arc::new(EpochStore::new(EpochStoreConfig::default()).unwrap())
    }

    #[test]
    fn test_generate_without_active_config() {
        let generator = CidGenerator::new(store(), ServerId::from_u64(1, 8));
        assert_eq!(generator.generate().unwrap_err(), Error::NoActiveConfig);
        assert!(generator.cid_len().is_none());
    }

    #[test]
    fn test_generated_cids_route_back() {
        let epochs = store();
        epochs
            .install(CidConfig::stream(1, 2, 8, CidKey::new([7; 16])))
            .unwrap();
        let server = ServerId::from_u64(0x0203, 16);
        let generator = CidGenerator::new(Arc::clone(&epochs), server);

        let cid1 = generator.generate().unwrap();
        let cid2 = generator.generate().unwrap();

        assert_eq!(cid1.len(), 11);
        assert_eq!(generator.cid_len(), Some(11));
        assert_ne!(cid1, cid2);
        assert_eq!(decode(&cid1, &epochs).unwrap(), server);
        assert_eq!(decode(&cid2, &epochs).unwrap(), server);
    }

    #[test]
    fn test_generator_follows_rotation() {
        let epochs = store();
        epochs.install(CidConfig::plaintext(1, 8, 24)).unwrap();
        let generator = CidGenerator::new(Arc::clone(&epochs), ServerId::from_u64(9, 8));

        let before = generator.generate().unwrap();
        assert_eq!(RotationTag::from_first_byte(before[0], 2), RotationTag::new(1));

        epochs.install(CidConfig::plaintext(2, 8, 24)).unwrap();
        let after = generator.generate().unwrap();
        assert_eq!(RotationTag::from_first_byte(after[0], 2), RotationTag::new(2));

        // Both still decode while tag 1 is retiring
        assert_eq!(decode(&before, &epochs).unwrap().to_u64(), Some(9));
        assert_eq!(decode(&after, &epochs).unwrap().to_u64(), Some(9));
    }

    #[test]
    fn test_authenticated_block_keeps_reserved_bits_clear() {
        let epochs = store();
        epochs
            .install(CidConfig::block(3, 2, 4, 6, CidKey::new([1; 16])))
            .unwrap();
        let generator = CidGenerator::new(Arc::clone(&epochs), ServerId::from_u64(4, 16));

        for _ in 0..32 {
            let cid = generator.generate().unwrap();
            assert_eq!(cid[0], 0xC0);
            assert_eq!(decode(&cid, &epochs).unwrap().to_u64(), Some(4));
        }
    }
}
