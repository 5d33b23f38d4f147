//! First-contact placement policies.
//!
//! Packets the core cannot attribute to a server (empty DCID, a client's
//! first Initial, failover away from an unhealthy server) are delegated. If
//! a placement policy is installed, the delegation carries its suggested
//! endpoint; the connection-establishment layer makes the final call.

use crate::packet::{Header, RoutableHeader};
use crate::pool::{Endpoint, PoolSnapshot};
use siphasher::sip::SipHasher13;
use std::hash::Hasher;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Extension point for choosing a server for unroutable packets.
pub trait FirstContactPlacement: Send + Sync {
    /// Suggest an endpoint, or `None` if no server is eligible.
    fn place(&self, header: &Header<'_>, pool: &PoolSnapshot) -> Option<Endpoint>;
}

/// Cycles through healthy, non-zero-weight servers.
#[derive(Debug, Default)]
pub struct RoundRobin {
    cursor: AtomicUsize,
}

impl RoundRobin {
    pub fn new() -> Self {
        Self::default()
    }
}

impl FirstContactPlacement for RoundRobin {
    fn place(&self, _header: &Header<'_>, pool: &PoolSnapshot) -> Option<Endpoint> {
        let eligible = pool.iter().filter(|e| e.is_placeable()).count();
        if eligible == 0 {
            return None;
        }
        let index = self.cursor.fetch_add(1, Ordering::Relaxed) % eligible;
        pool.iter().filter(|e| e.is_placeable()).nth(index).copied()
    }
}

/// Default SipHash-1-3 keys for rendezvous scoring
const RENDEZVOUS_KEY: (u64, u64) = (0x7175_6963_6c62_2d68, 0x7277_2d72_656e_6476);

/// Weighted rendezvous hashing of the client-chosen CID.
///
/// Retransmitted Initials carry the same DCID and therefore land on the same
/// server, and removing a server only moves the connections it owned.
#[derive(Debug, Clone)]
pub struct ConsistentHash {
    keys: (u64, u64),
}

impl ConsistentHash {
    pub fn new() -> Self {
        Self {
            keys: RENDEZVOUS_KEY,
        }
    }

    pub fn with_keys(k0: u64, k1: u64) -> Self {
        Self { keys: (k0, k1) }
    }

    fn score(&self, flow_key: &[u8], endpoint: &Endpoint) -> f64 {
        let mut hasher = SipHasher13::new_with_keys(self.keys.0, self.keys.1);
        hasher.write(endpoint.id.as_bytes());
        hasher.write(flow_key);
        let hash = hasher.finish();

        // Map to (0, 1) and apply the weighted rendezvous transform
        let unit = (hash as f64 + 1.0) / (u64::MAX as f64 + 2.0);
        endpoint.weight as f64 / -unit.ln()
    }
}

impl Default for ConsistentHash {
    fn default() -> Self {
        Self::new()
    }
}

impl FirstContactPlacement for ConsistentHash {
    fn place(&self, header: &Header<'_>, pool: &PoolSnapshot) -> Option<Endpoint> {
        let flow_key = match header.dcid() {
            [] => header.scid().unwrap_or_default(),
            dcid => dcid,
        };

        pool.iter()
            .filter(|e| e.is_placeable())
            .map(|e| (self.score(flow_key, e), e))
            .max_by(|a, b| a.0.total_cmp(&b.0))
            .map(|(_, e)| *e)
    }
}
