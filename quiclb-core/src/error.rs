//! Error types for the routing core.
//!
//! Packet-level errors (`Truncated`, `UnknownConfig`, `AuthenticationFailed`,
//! `UnknownServer`, `CidLength`) are expected on the hot path and are turned
//! into drop decisions by the dispatcher. The remaining variants come from
//! configuration management and are surfaced to the operator.

use crate::cid::{RotationTag, ServerId};
use thiserror::Error;

/// Result type for routing core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced by the header parser, CID codecs, epoch store and pool.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Datagram is shorter than the header requires.
    #[error("datagram truncated: need {needed} bytes, have {available}")]
    Truncated { needed: usize, available: usize },

    /// No decodable configuration is stored under the CID's rotation tag.
    #[error("no configuration for rotation tag {0}")]
    UnknownConfig(RotationTag),

    /// Encrypted CID failed its integrity check.
    #[error("connection ID failed authentication")]
    AuthenticationFailed,

    /// Decoded server identity is not a member of the server pool.
    #[error("unknown server {0}")]
    UnknownServer(ServerId),

    /// An active or still-retiring configuration already occupies the tag.
    #[error("rotation tag {0} is occupied by a configuration that is still decodable")]
    ConfigConflict(RotationTag),

    /// CID is shorter than the configuration requires.
    #[error("connection ID length {actual} is shorter than the configured {expected}")]
    CidLength { expected: usize, actual: usize },

    /// A configuration record is malformed.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Server identity is already present in the pool.
    #[error("server {0} is already registered")]
    DuplicateServer(ServerId),

    /// No configuration is currently active for minting.
    #[error("no active CID configuration")]
    NoActiveConfig,

    /// The operating system random source failed.
    #[error("randomness unavailable: {0}")]
    Randomness(String),
}

impl Error {
    /// Returns true for errors caused by a single packet rather than by
    /// configuration. These are counted, never escalated.
    pub fn is_packet_level(&self) -> bool {
        matches!(
            self,
            Error::Truncated { .. }
                | Error::UnknownConfig(_)
                | Error::AuthenticationFailed
                | Error::UnknownServer(_)
                | Error::CidLength { .. }
        )
    }

    /// Returns true if the error should be reported to the operator.
    pub fn is_operator_facing(&self) -> bool {
        !self.is_packet_level()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_packet_level_classification() {
        assert!(Error::Truncated { needed: 6, available: 2 }.is_packet_level());
        assert!(Error::AuthenticationFailed.is_packet_level());
        assert!(Error::UnknownConfig(RotationTag::new(1)).is_packet_level());
        assert!(Error::UnknownServer(ServerId::from_u64(7, 8)).is_packet_level());
    }

    #[test]
    fn test_operator_facing_classification() {
        assert!(Error::ConfigConflict(RotationTag::new(0)).is_operator_facing());
        assert!(Error::InvalidConfig("bad".into()).is_operator_facing());
        assert!(Error::NoActiveConfig.is_operator_facing());
    }

    #[test]
    fn test_display_messages() {
        let err = Error::Truncated { needed: 9, available: 4 };
        assert_eq!(err.to_string(), "datagram truncated: need 9 bytes, have 4");
        assert_eq!(
            Error::ConfigConflict(RotationTag::new(2)).to_string(),
            "rotation tag 2 is occupied by a configuration that is still decodable"
        );
    }
}
