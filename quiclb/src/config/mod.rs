//! Load balancer configuration.
//!
//! # Architecture
//!
//! - **Logging:** level and output format
//! - **CID:** rotation tag width, grace period and codec configurations
//! - **Servers:** backend identities and addresses
//! - **Routing:** failover, first-contact placement and connection cache
//!
//! # Example
//!
//! ```toml
//! [logging]
//! level = "info"
//!
//! [cid]
//! rotation_bits = 2
//! grace_period_secs = 300
//! active = 1
//!
//! [[cid.configs]]
//! tag = 1
//! kind = "plaintext"
//! server_id_bits = 8
//! nonce_bits = 32
//!
//! [[servers]]
//! id = "05"
//! address = "10.0.0.5:4433"
//!
//! [routing]
//! placement = "consistent_hash"
//! ```

pub mod cid;
pub mod global;
pub mod loader;
pub mod routing;
pub mod validation;


pub use cid::CidSection;
pub use global::{LogLevel, LoggingConfig};
pub use loader::{load_config, CliArgs, Command};
pub use routing::{PlacementKind, RoutingConfig, ServerEntry};
pub use validation::ConfigValidator;

use serde::{Deserialize, Serialize};

/// Top-level configuration composing all sections.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LbConfig {
    /// Logging configuration
    pub logging: LoggingConfig,

    /// CID encoding and rotation
    pub cid: CidSection,

    /// Routing policy
    pub routing: RoutingConfig,

    /// Backend servers
    pub servers: Vec<ServerEntry>,
}

impl LbConfig {
    /// Validate the entire configuration.
    ///
    /// Collects every problem rather than stopping at the first one.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if let Err(e) = self.cid.validate() {
            errors.extend(e);
        }
        if let Err(e) = self.routing.validate() {
            errors.extend(e);
        }
        if let Err(e) = validation::validate_servers(self) {
            errors.extend(e);
        }

        if errors.is_empty() {
            validation::check_policy_warnings(self);
            Ok(())
        } else {
            Err(errors)
        }
    }
}
