//! Per-datagram routing.
//!
//! ```text
//! Received -> HeaderParsed -> CidDecoded -> ServerResolved -> Forward
//!     |             |              |               |
//!     +-> Drop      +-> Delegate   +-> Drop /      +-> Drop / Delegate
//!                     (empty CID)      Delegate        (unknown, failover)
//!                                      (first contact)
//! ```
//!
//! The dispatcher holds no per-connection state required for correctness.
//! It reads the epoch store and server pool through atomic snapshots, so
//! `route_datagram` can be called from any number of threads at once.

mod cache;
mod placement;
mod stats;


pub use cache::DEFAULT_CACHE_CAPACITY;
pub use placement::{ConsistentHash, FirstContactPlacement, RoundRobin};
pub use stats::{DispatchStats, StatsSnapshot};

use crate::cid::{RotationTag, ServerId};
use crate::epoch::{EpochSnapshot, EpochStore};
use crate::error::{Error, Result};
use crate::packet::{parse_header, peek_header_form, Header, HeaderForm, RoutableHeader};
use crate::pool::{Endpoint, PoolSnapshot, ServerPool};
use cache::{CachedRoute, ConnectionCache};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::trace;

/// Why a datagram was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DropReason {
    Truncated,
    CidLength,
    UnknownConfig,
    /// Possible attack traffic
    AuthenticationFailed,
    UnknownServer,
    /// No short-header CID length is known because nothing is active
    Misconfigured,
}

impl DropReason {
    fn from_error(error: &Error) -> Self {
        match error {
            Error::Truncated { .. } => DropReason::Truncated,
            Error::CidLength { .. } => DropReason::CidLength,
            Error::UnknownConfig(_) => DropReason::UnknownConfig,
            Error::AuthenticationFailed => DropReason::AuthenticationFailed,
            Error::UnknownServer(_) => DropReason::UnknownServer,
            _ => DropReason::Misconfigured,
        }
    }
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DropReason::Truncated => "truncated",
            DropReason::CidLength => "cid_length",
            DropReason::UnknownConfig => "unknown_config",
            DropReason::AuthenticationFailed => "authentication_failed",
            DropReason::UnknownServer => "unknown_server",
            DropReason::Misconfigured => "misconfigured",
        };
        f.write_str(s)
    }
}

/// Why a datagram was handed to the connection-establishment layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DelegateReason {
    /// Zero-length destination CID
    EmptyCid,
    /// Initial or 0-RTT packet whose CID was chosen by the client
    FirstContact,
    /// CID resolved to an unhealthy server and failover is enabled
    ServerUnhealthy,
}

impl fmt::Display for DelegateReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DelegateReason::EmptyCid => "empty_cid",
            DelegateReason::FirstContact => "first_contact",
            DelegateReason::ServerUnhealthy => "server_unhealthy",
        };
        f.write_str(s)
    }
}

/// A delegated datagram, with the placement policy's suggestion if one is
/// installed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Delegation {
    pub reason: DelegateReason,
    pub endpoint: Option<Endpoint>,
}

/// Outcome of routing one datagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoutingDecision {
    Forward(Endpoint),
    Drop(DropReason),
    Delegate(Delegation),
}

impl RoutingDecision {
    pub fn endpoint(&self) -> Option<&Endpoint> {
        match self {
            RoutingDecision::Forward(endpoint) => Some(endpoint),
            RoutingDecision::Delegate(delegation) => delegation.endpoint.as_ref(),
            RoutingDecision::Drop(_) => None,
        }
    }
}

impl fmt::Display for RoutingDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoutingDecision::Forward(endpoint) => {
                write!(f, "forward to server {} at {}", endpoint.id, endpoint.addr)
            }
            RoutingDecision::Drop(reason) => write!(f, "drop ({})", reason),
            RoutingDecision::Delegate(Delegation {
                reason,
                endpoint: Some(endpoint),
            }) => write!(
                f,
                "delegate ({}), suggested server {} at {}",
                reason, endpoint.id, endpoint.addr
            ),
            RoutingDecision::Delegate(Delegation { reason, endpoint: None }) => {
                write!(f, "delegate ({})", reason)
            }
        }
    }
}

/// What to do when a CID resolves to an unhealthy server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HealthPolicy {
    /// Forward anyway; the surrounding system decides
    #[default]
    RouteToUnhealthy,
    /// Delegate to the first-contact placement policy
    Failover,
}

/// Routes datagrams using the epoch store and server pool.
pub struct Dispatcher {
    epochs: Arc<EpochStore>,
    pool: Arc<ServerPool>,
    health_policy: HealthPolicy,
    placement: Option<Box<dyn FirstContactPlacement>>,
    cache: Option<ConnectionCache>,
    stats: DispatchStats,
}

impl Dispatcher {
    pub fn builder(epochs: Arc<EpochStore>, pool: Arc<ServerPool>) -> DispatcherBuilder {
        DispatcherBuilder::new(epochs, pool)
    }

    pub fn epochs(&self) -> &Arc<EpochStore> {
        &self.epochs
    }

    pub fn pool(&self) -> &Arc<ServerPool> {
        &self.pool
    }

    pub fn stats(&self) -> &DispatchStats {
        &self.stats
    }

    /// Route a datagram, taking the short-header CID length from the
    /// configuration named by the DCID's rotation tag, or from the active
    /// configuration when that tag does not decode.
    pub fn route(&self, datagram: &[u8]) -> RoutingDecision {
        let now = Instant::now();
        let hint = match peek_header_form(datagram) {
            Ok(HeaderForm::Short) => {
                let epochs = self.epochs.snapshot();
                match datagram.get(1) {
                    Some(&first) => epochs.short_cid_len_for(first, now),
                    None => epochs.short_cid_len(now),
                }
            }
            _ => Some(0),
        };

        match hint {
            Some(hint) => self.route_datagram_at(datagram, hint, now),
            None => self.finish(RoutingDecision::Drop(DropReason::Misconfigured)),
        }
    }

    /// Route a datagram whose short-header CID length is `short_cid_len`.
    pub fn route_datagram(&self, datagram: &[u8], short_cid_len: usize) -> RoutingDecision {
        self.route_datagram_at(datagram, short_cid_len, Instant::now())
    }

    pub fn route_datagram_at(&self, datagram: &[u8], short_cid_len: usize, now: Instant) -> RoutingDecision {
        let decision = self.decide(datagram, short_cid_len, now);
        self.finish(decision)
    }

    fn finish(&self, decision: RoutingDecision) -> RoutingDecision {
        self.stats.record(&decision);
        trace!(%decision, "routed datagram");
        decision
    }

    fn decide(&self, datagram: &[u8], short_cid_len: usize, now: Instant) -> RoutingDecision {
        let header = match parse_header(datagram, short_cid_len) {
            Ok(header) => header,
            Err(e) => return RoutingDecision::Drop(DropReason::from_error(&e)),
        };
        let pool = self.pool.snapshot();

        let dcid = header.dcid();
        if dcid.is_empty() {
            return self.delegate(DelegateReason::EmptyCid, &header, &pool);
        }

        let first_contact = header.packet_type().is_first_contact();
        let failed = |e: Error| {
            if first_contact {
                self.delegate(DelegateReason::FirstContact, &header, &pool)
            } else {
                RoutingDecision::Drop(DropReason::from_error(&e))
            }
        };

        let epochs = self.epochs.snapshot();
        let server_id = match self.decode(dcid, &epochs, now) {
            Ok(server_id) => server_id,
            Err(e) => return failed(e),
        };

        let endpoint = match pool.resolve(&server_id) {
            Ok(endpoint) => endpoint,
            Err(e) => {
                if let Some(cache) = &self.cache {
                    cache.remove(cache_key(dcid, &epochs));
                }
                return failed(e);
            }
        };

        if !endpoint.healthy && self.health_policy == HealthPolicy::Failover {
            return self.delegate(DelegateReason::ServerUnhealthy, &header, &pool);
        }
        RoutingDecision::Forward(endpoint)
    }

    fn decode(&self, dcid: &[u8], epochs: &EpochSnapshot, now: Instant) -> Result<ServerId> {
        let Some(cache) = &self.cache else {
            return epochs.decode(dcid, now).map(|decoded| decoded.server_id);
        };

        let key = cache_key(dcid, epochs);
        if let Some(route) = cache.get(key) {
            let current = epochs.get(route.tag).is_some_and(|epoch| {
                epoch.revision() == route.revision && epoch.is_decodable_at(now)
            });
            if current {
                self.stats.record_cache(true);
                return Ok(route.server_id);
            }
        }

        self.stats.record_cache(false);
        let decoded = epochs.decode(dcid, now)?;
        cache.insert(
            key,
            CachedRoute {
                server_id: decoded.server_id,
                tag: decoded.tag,
                revision: decoded.revision,
            },
        );
        Ok(decoded.server_id)
    }

    fn delegate(&self, reason: DelegateReason, header: &Header<'_>, pool: &PoolSnapshot) -> RoutingDecision {
        let endpoint = self
            .placement
            .as_ref()
            .and_then(|placement| placement.place(header, pool));
        RoutingDecision::Delegate(Delegation { reason, endpoint })
    }
}

/// Routable prefix of `dcid`. Bytes past the configured CID length belong
/// to the packet, not the connection, and must not split its cache entry.
fn cache_key<'a>(dcid: &'a [u8], epochs: &EpochSnapshot) -> &'a [u8] {
    let Some(&first) = dcid.first() else {
        return dcid;
    };
    let tag = RotationTag::from_first_byte(first, epochs.rotation_bits());
    match epochs.get(tag) {
        Some(epoch) => &dcid[..epoch.codec().cid_len().min(dcid.len())],
        None => dcid,
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("health_policy", &self.health_policy)
            .field("placement", &self.placement.is_some())
            .field("cache_entries", &self.cache.as_ref().map(|c| c.len()))
            .field("stats", &self.stats.snapshot())
            .finish()
    }
}

/// Builder for [`Dispatcher`].
pub struct DispatcherBuilder {
    epochs: Arc<EpochStore>,
    pool: Arc<ServerPool>,
    health_policy: HealthPolicy,
    placement: Option<Box<dyn FirstContactPlacement>>,
    cache_capacity: Option<usize>,
}

impl DispatcherBuilder {
    pub fn new(epochs: Arc<EpochStore>, pool: Arc<ServerPool>) -> Self {
        Self {
            epochs,
            pool,
            health_policy: HealthPolicy::default(),
            placement: None,
            cache_capacity: None,
        }
    }

    pub fn health_policy(mut self, policy: HealthPolicy) -> Self {
        self.health_policy = policy;
        self
    }

    pub fn placement(mut self, placement: impl FirstContactPlacement + 'static) -> Self {
        self.placement = Some(Box::new(placement));
        self
    }

    pub fn boxed_placement(mut self, placement: Option<Box<dyn FirstContactPlacement>>) -> Self {
        self.placement = placement;
        self
    }

    /// Enable the connection-tracking cache with room for `capacity` CIDs.
    pub fn connection_cache(mut self, capacity: usize) -> Self {
        self.cache_capacity = Some(capacity);
        self
    }

    pub fn build(self) -> Dispatcher {
        Dispatcher {
            epochs: self.epochs,
            pool: self.pool,
            health_policy: self.health_policy,
            placement: self.placement,
            cache: self.cache_capacity.map(ConnectionCache::new),
            stats: DispatchStats::new(),
        }
    }
}
