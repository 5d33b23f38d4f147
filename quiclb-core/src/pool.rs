//! Server pool: backend endpoints keyed by server identity.
//!
//! `resolve` is on the per-packet path and only loads an atomic snapshot.
//! Membership and health changes are rare; each one copies the table and
//! swaps the new snapshot in under a writer lock.

use crate::cid::ServerId;
use crate::error::{Error, Result};
use ahash::AHashMap;
use arc_swap::ArcSwap;
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{debug, info};

/// Backend server as seen by the router.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Endpoint {
    pub id: ServerId,
    pub addr: SocketAddr,
    /// Relative share of first-contact placements; 0 excludes the server
    pub weight: u32,
    pub healthy: bool,
}

impl Endpoint {
    pub fn new(id: ServerId, addr: SocketAddr) -> Self {
        Self {
            id,
            addr,
            weight: 1,
            healthy: true,
        }
    }

    pub fn with_weight(mut self, weight: u32) -> Self {
        self.weight = weight;
        self
    }

    pub fn with_health(mut self, healthy: bool) -> Self {
        self.healthy = healthy;
        self
    }

    /// Eligible for first-contact placement.
    pub fn is_placeable(&self) -> bool {
        self.healthy && self.weight > 0
    }
}

/// Immutable view of the pool.
#[derive(Debug, Clone, Default)]
pub struct PoolSnapshot {
    servers: AHashMap<ServerId, Endpoint>,
    /// Identities in ascending order, for stable iteration
    order: Vec<ServerId>,
}

impl PoolSnapshot {
    fn from_endpoints(endpoints: impl IntoIterator<Item = Endpoint>) -> Result<Self> {
        let mut servers = AHashMap::new();
        for endpoint in endpoints {
            if servers.insert(endpoint.id, endpoint).is_some() {
                return Err(Error::DuplicateServer(endpoint.id));
            }
        }
        let mut order: Vec<ServerId> = servers.keys().copied().collect();
        order.sort_unstable();
        Ok(Self { servers, order })
    }

    pub fn resolve(&self, id: &ServerId) -> Result<Endpoint> {
        self.servers
            .get(id)
            .copied()
            .ok_or(Error::UnknownServer(*id))
    }

    pub fn get(&self, id: &ServerId) -> Option<&Endpoint> {
        self.servers.get(id)
    }

    /// Endpoints ordered by server identity.
    pub fn iter(&self) -> impl Iterator<Item = &Endpoint> + '_ {
        self.order.iter().filter_map(|id| self.servers.get(id))
    }

    pub fn len(&self) -> usize {
        self.servers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.servers.is_empty()
    }
}

/// Copy-on-write registry of backend servers.
#[derive(Debug, Default)]
pub struct ServerPool {
    current: ArcSwap<PoolSnapshot>,
    writer: Mutex<()>,
}

impl ServerPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a pool from a server list. Duplicate identities are rejected.
    pub fn with_endpoints(endpoints: impl IntoIterator<Item = Endpoint>) -> Result<Self> {
        Ok(Self {
            current: ArcSwap::from_pointee(PoolSnapshot::from_endpoints(endpoints)?),
            writer: Mutex::new(()),
        })
    }

    pub fn snapshot(&self) -> Arc<PoolSnapshot> {
        self.current.load_full()
    }

    /// Map a decoded identity to its endpoint. Unknown identities are an
    /// expected outcome for garbage or stale CIDs.
    pub fn resolve(&self, id: &ServerId) -> Result<Endpoint> {
        self.current.load().resolve(id)
    }

    pub fn health_of(&self, id: &ServerId) -> Option<bool> {
        self.current.load().get(id).map(|endpoint| endpoint.healthy)
    }

    /// Copy of every endpoint, not a live view.
    pub fn list_endpoints(&self) -> Vec<Endpoint> {
        self.current.load().iter().copied().collect()
    }

    pub fn healthy_endpoints(&self) -> Vec<Endpoint> {
        self.current
            .load()
            .iter()
            .filter(|endpoint| endpoint.healthy)
            .copied()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.current.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.current.load().is_empty()
    }

    /// Record a health signal. Returns the previous state.
    pub fn set_health(&self, id: &ServerId, healthy: bool) -> Result<bool> {
        let previous = self.update(|endpoints| {
            let endpoint = endpoints
                .iter_mut()
                .find(|endpoint| endpoint.id == *id)
                .ok_or(Error::UnknownServer(*id))?;
            Ok(std::mem::replace(&mut endpoint.healthy, healthy))
        })?;

        if previous != healthy {
            debug!(server = %id, healthy, "server health changed");
        }
        Ok(previous)
    }

    pub fn add(&self, endpoint: Endpoint) -> Result<()> {
        self.update(|endpoints| {
            if endpoints.iter().any(|existing| existing.id == endpoint.id) {
                return Err(Error::DuplicateServer(endpoint.id));
            }
            endpoints.push(endpoint);
            Ok(())
        })?;

        debug!(server = %endpoint.id, addr = %endpoint.addr, "server added");
        Ok(())
    }

    pub fn remove(&self, id: &ServerId) -> Result<Endpoint> {
        let removed = self.update(|endpoints| {
            let index = endpoints
                .iter()
                .position(|endpoint| endpoint.id == *id)
                .ok_or(Error::UnknownServer(*id))?;
            Ok(endpoints.swap_remove(index))
        })?;

        debug!(server = %id, "server removed");
        Ok(removed)
    }

    /// Replace the whole membership, e.g. on configuration reload.
    pub fn replace_all(&self, endpoints: impl IntoIterator<Item = Endpoint>) -> Result<()> {
        let snapshot = PoolSnapshot::from_endpoints(endpoints)?;
        let _writer = self.writer.lock();
        let count = snapshot.len();
        self.current.store(Arc::new(snapshot));

        info!(servers = count, "server pool replaced");
        Ok(())
    }

    fn update<T>(&self, f: impl FnOnce(&mut Vec<Endpoint>) -> Result<T>) -> Result<T> {
        let _writer = self.writer.lock();
        let mut endpoints: Vec<Endpoint> = self.current.load().iter().copied().collect();
        let out = f(&mut endpoints)?;
        self.current.store(Arc::new(PoolSnapshot::from_endpoints(endpoints)?));
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn endpoint(id: u64) -> Endpoint {
        let addr = format!("10.0.0.{}:4433", id).parse().unwrap();
        Endpoint::new(ServerId::from_u64(id, 8), addr)
    }

    fn sid(id: u64) -> ServerId {
        ServerId::from_u64(id, 8)
    }

    #[test]
    fn test_resolve_known_and_unknown() {
        let pool = ServerPool::with_endpoints([endpoint(1), endpoint(5)]).unwrap();

        assert_eq!(pool.resolve(&sid(5)).unwrap().addr.to_string(), "10.0.0.5:4433");
        assert_eq!(pool.resolve(&sid(9)).unwrap_err(), Error::UnknownServer(sid(9)));
        assert_eq!(pool.len(), 2);
    }

    #[test]
    fn test_duplicate_rejected() {
        assert_eq!(
            ServerPool::with_endpoints([endpoint(1), endpoint(1)]).unwrap_err(),
            Error::DuplicateServer(sid(1))
        );

        let pool = ServerPool::new();
        pool.add(endpoint(2)).unwrap();
        assert_eq!(pool.add(endpoint(2)).unwrap_err(), Error::DuplicateServer(sid(2)));
    }

    #[test]
    fn test_unhealthy_still_resolves() {
        let pool = ServerPool::with_endpoints([endpoint(1)]).unwrap();
        assert!(pool.set_health(&sid(1), false).unwrap());

        let resolved = pool.resolve(&sid(1)).unwrap();
        assert!(!resolved.healthy);
        assert_eq!(pool.health_of(&sid(1)), Some(false));
        assert!(pool.healthy_endpoints().is_empty());
        assert_eq!(pool.health_of(&sid(2)), None);
        assert!(pool.set_health(&sid(2), true).is_err());
    }

    #[test]
    fn test_list_endpoints_is_a_snapshot() {
        let pool = ServerPool::with_endpoints([endpoint(3), endpoint(1)]).unwrap();
        let listed = pool.list_endpoints();
        pool.remove(&sid(1)).unwrap();

        assert_eq!(listed.iter().map(|e| e.id).collect::<Vec<_>>(), vec![sid(1), sid(3)]);
        assert_eq!(pool.list_endpoints().len(), 1);
    }

    #[test]
    fn test_replace_all() {
        let pool = ServerPool::with_endpoints([endpoint(1), endpoint(2)]).unwrap();
        pool.replace_all([endpoint(7)]).unwrap();

        assert!(pool.resolve(&sid(1)).is_err());
        assert!(pool.resolve(&sid(7)).is_ok());
        // Failed replace leaves the pool untouched
        assert!(pool.replace_all([endpoint(8), endpoint(8)]).is_err());
        assert!(pool.resolve(&sid(7)).is_ok());
    }

    #[test]
    fn test_placeable() {
        assert!(endpoint(1).is_placeable());
        assert!(!endpoint(1).with_weight(0).is_placeable());
        assert!(!endpoint(1).with_health(false).is_placeable());
    }

    #[test]
    fn test_concurrent_readers_and_writer() {
        let pool = Arc::new(ServerPool::with_endpoints((1..=4).map(endpoint)).unwrap());

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let pool = Arc::clone(&pool);
                thread::spawn(move || {
                    for _ in 0..1000 {
                        let snapshot = pool.snapshot();
                        // A snapshot never changes underneath the reader
                        assert_eq!(snapshot.len(), snapshot.iter().count());
                        let _ = pool.resolve(&sid(1));
                    }
                })
            })
            .collect();

        for round in 0..100 {
            pool.set_health(&sid(1), round % 2 == 0).unwrap();
        }
        for reader in readers {
            reader.join().unwrap();
        }
        assert_eq!(pool.len(), 4);
    }
}
