//! Server list and routing policy sections.

use super::validation::ConfigValidator;
use quiclb_core::dispatch::DEFAULT_CACHE_CAPACITY;
use quiclb_core::{Endpoint, HealthPolicy, ServerId};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

/// One backend server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerEntry {
    /// Hex-encoded server identity, as embedded in CIDs
    pub id: ServerId,

    /// Address datagrams for this server are forwarded to
    pub address: SocketAddr,

    /// Share of first-contact placements; 0 excludes the server
    #[serde(default = "default_weight")]
    pub weight: u32,

    /// Initial health state
    #[serde(default = "default_true")]
    pub healthy: bool,
}

fn default_weight() -> u32 {
    1
}

fn default_true() -> bool {
    true
}

impl ServerEntry {
    pub fn endpoint(&self) -> Endpoint {
        Endpoint::new(self.id, self.address)
            .with_weight(self.weight)
            .with_health(self.healthy)
    }
}

/// First-contact placement policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlacementKind {
    /// Delegate without a suggestion
    None,
    #[default]
    RoundRobin,
    ConsistentHash,
}

impl std::str::FromStr for PlacementKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "none" => Ok(PlacementKind::None),
            "round_robin" => Ok(PlacementKind::RoundRobin),
            "consistent_hash" => Ok(PlacementKind::ConsistentHash),
            _ => Err(format!("Invalid placement policy: {}", s)),
        }
    }
}

/// Dispatcher policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingConfig {
    /// Delegate packets for unhealthy servers instead of forwarding them.
    ///
    /// **Default:** `false`
    pub failover: bool,

    /// Policy suggesting a server for delegated packets.
    ///
    /// **Default:** `round_robin`
    pub placement: PlacementKind,

    /// Track recently decoded CIDs.
    ///
    /// **Default:** `false`
    pub connection_cache: bool,

    /// Maximum number of tracked CIDs.
    ///
    /// **Default:** `65536`
    pub cache_capacity: usize,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            failover: false,
            placement: PlacementKind::default(),
            connection_cache: false,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
        }
    }
}

impl RoutingConfig {
    pub fn health_policy(&self) -> HealthPolicy {
        if self.failover {
            HealthPolicy::Failover
        } else {
            HealthPolicy::RouteToUnhealthy
        }
    }
}

impl ConfigValidator for RoutingConfig {
    fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.connection_cache && self.cache_capacity == 0 {
            errors.push("routing.cache_capacity must be > 0 when connection_cache is enabled".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
