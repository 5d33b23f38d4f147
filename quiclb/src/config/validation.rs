//! Configuration validation utilities.
//!
//! Sections validate themselves through [`ConfigValidator`]; checks that
//! span sections (server identities against codec widths, policy
//! combinations) live here.

use super::LbConfig;
use std::collections::HashSet;

/// Configuration validator trait.
pub trait ConfigValidator {
    /// Validate the configuration.
    ///
    /// Returns `Ok(())` if valid, or a list of error messages if invalid.
    fn validate(&self) -> Result<(), Vec<String>>;
}

/// Every server identity must be encodable by every CID configuration,
/// otherwise CIDs minted for it under a rotated key would not decode.
pub fn validate_servers(config: &LbConfig) -> Result<(), Vec<String>> {
    let mut errors = Vec::new();

    if config.servers.is_empty() {
        errors.push("at least one [[servers]] entry is required".to_string());
    }

    let mut seen_ids = HashSet::new();
    let mut seen_addrs = HashSet::new();
    for server in &config.servers {
        if !seen_ids.insert(server.id) {
            errors.push(format!("duplicate server id {}", server.id));
        }
        if !seen_addrs.insert(server.address) {
            errors.push(format!(
                "server {} reuses address {}",
                server.id, server.address
            ));
        }

        for cid in &config.cid.configs {
            let bits = cid.server_id_bits as usize;
            if !server.id.fits_bits(bits) {
                errors.push(format!(
                    "server id {} does not fit the {}-bit server ID of CID configuration tag {}",
                    server.id, bits, cid.tag
                ));
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Warn about policy combinations that are valid but probably unintended.
pub fn check_policy_warnings(config: &LbConfig) -> Vec<String> {
    let mut warnings = Vec::new();

    if config.routing.failover && config.routing.placement == super::PlacementKind::None {
        warnings.push(
            "routing.failover is enabled but placement = \"none\": unhealthy servers' \
             traffic will be delegated without a suggested server"
                .to_string(),
        );
    }

    if !config.servers.is_empty() && config.servers.iter().all(|s| s.weight == 0) {
        warnings.push(
            "every server has weight 0: first-contact placement will never suggest a server"
                .to_string(),
        );
    }

    if !config.servers.is_empty() && config.servers.iter().all(|s| !s.healthy) {
        warnings.push("every server starts unhealthy".to_string());
    }

    for warning in &warnings {
        tracing::warn!("{}", warning);
    }
    warnings
}
