//! CID codec section.
//!
//! ```toml
//! [cid]
//! rotation_bits = 2
//! grace_period_secs = 300
//! active = 1
//!
//! [[cid.configs]]
//! tag = 1
//! kind = "block"
//! server_id_bits = 16
//! zero_pad_bytes = 4
//! nonce_bits = 64
//! key = "00112233445566778899aabbccddeeff"
//! ```

use super::validation::ConfigValidator;
use quiclb_core::cid::{DEFAULT_ROTATION_BITS, MAX_ROTATION_BITS};
use quiclb_core::epoch::DEFAULT_GRACE_PERIOD;
use quiclb_core::{CidCodec, CidConfig, EpochStoreConfig, RotationTag};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;

/// CID encoding and rotation settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CidSection {
    /// Width of the rotation tag in the first CID byte (1-3).
    ///
    /// **Default:** `2`
    pub rotation_bits: u8,

    /// How long a replaced configuration keeps decoding, in seconds.
    ///
    /// Should exceed the longest expected connection lifetime.
    ///
    /// **Default:** `300`
    pub grace_period_secs: u64,

    /// Tag of the configuration used for minting. Defaults to the last
    /// configuration listed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active: Option<u8>,

    /// Codec configurations, one per rotation tag
    pub configs: Vec<CidConfig>,
}

impl Default for CidSection {
    fn default() -> Self {
        Self {
            rotation_bits: DEFAULT_ROTATION_BITS,
            grace_period_secs: DEFAULT_GRACE_PERIOD.as_secs(),
            active: None,
            configs: Vec::new(),
        }
    }
}

impl CidSection {
    pub fn store_config(&self) -> EpochStoreConfig {
        EpochStoreConfig {
            rotation_bits: self.rotation_bits,
            grace_period: Duration::from_secs(self.grace_period_secs),
        }
    }

    /// Tag that should end up active.
    pub fn active_tag(&self) -> Option<RotationTag> {
        self.active
            .map(RotationTag::new)
            .or_else(|| self.configs.last().map(|c| c.tag))
    }

    /// The configuration that should end up active.
    pub fn active_config(&self) -> Option<&CidConfig> {
        let tag = self.active_tag()?;
        self.configs.iter().find(|c| c.tag == tag)
    }
}

impl ConfigValidator for CidSection {
    fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.rotation_bits == 0 || self.rotation_bits > MAX_ROTATION_BITS {
            errors.push(format!(
                "cid.rotation_bits must be 1-{}, got {}",
                MAX_ROTATION_BITS, self.rotation_bits
            ));
            return Err(errors);
        }

        if self.configs.is_empty() {
            errors.push("at least one [[cid.configs]] entry is required".to_string());
        }

        let mut seen = HashSet::new();
        for config in &self.configs {
            if !seen.insert(config.tag) {
                errors.push(format!("duplicate CID configuration for tag {}", config.tag));
            }
            if let Err(e) = CidCodec::new(config, self.rotation_bits) {
                errors.push(format!("CID configuration tag {}: {}", config.tag, e));
            }
        }

        if let Some(active) = self.active {
            if !self.configs.iter().any(|c| c.tag.value() == active) {
                errors.push(format!("cid.active = {} does not name a configured tag", active));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
