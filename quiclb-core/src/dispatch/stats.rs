//! Routing counters.
//!
//! Packet-level failures are counted here instead of being logged one by
//! one. Counters are relaxed atomics; a snapshot is not a consistent cut
//! across counters.

use super::{DelegateReason, DropReason, RoutingDecision};
use std::sync::atomic::{AtomicU64, Ordering};

/// Live counters shared by every routing thread.
#[derive(Debug, Default)]
pub struct DispatchStats {
    received: AtomicU64,
    forwarded: AtomicU64,
    delegated_empty_cid: AtomicU64,
    delegated_first_contact: AtomicU64,
    delegated_unhealthy: AtomicU64,
    dropped_truncated: AtomicU64,
    dropped_cid_length: AtomicU64,
    dropped_unknown_config: AtomicU64,
    dropped_auth_failed: AtomicU64,
    dropped_unknown_server: AtomicU64,
    dropped_misconfigured: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
}

/// Point-in-time copy of [`DispatchStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub received: u64,
    pub forwarded: u64,
    pub delegated_empty_cid: u64,
    pub delegated_first_contact: u64,
    pub delegated_unhealthy: u64,
    pub dropped_truncated: u64,
    pub dropped_cid_length: u64,
    pub dropped_unknown_config: u64,
    pub dropped_auth_failed: u64,
    pub dropped_unknown_server: u64,
    pub dropped_misconfigured: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
}

impl StatsSnapshot {
    pub fn delegated(&self) -> u64 {
        self.delegated_empty_cid + self.delegated_first_contact + self.delegated_unhealthy
    }

    pub fn dropped(&self) -> u64 {
        self.dropped_truncated
            + self.dropped_cid_length
            + self.dropped_unknown_config
            + self.dropped_auth_failed
            + self.dropped_unknown_server
            + self.dropped_misconfigured
    }
}

#[inline]
fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

impl DispatchStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record(&self, decision: &RoutingDecision) {
        bump(&self.received);
        let counter = match decision {
            RoutingDecision::Forward(_) => &self.forwarded,
            RoutingDecision::Delegate(delegation) => match delegation.reason {
                DelegateReason::EmptyCid => &self.delegated_empty_cid,
                DelegateReason::FirstContact => &self.delegated_first_contact,
                DelegateReason::ServerUnhealthy => &self.delegated_unhealthy,
            },
            RoutingDecision::Drop(reason) => match reason {
                DropReason::Truncated => &self.dropped_truncated,
                DropReason::CidLength => &self.dropped_cid_length,
                DropReason::UnknownConfig => &self.dropped_unknown_config,
                DropReason::AuthenticationFailed => &self.dropped_auth_failed,
                DropReason::UnknownServer => &self.dropped_unknown_server,
                DropReason::Misconfigured => &self.dropped_misconfigured,
            },
        };
        bump(counter);
    }

    pub(crate) fn record_cache(&self, hit: bool) {
        bump(if hit { &self.cache_hits } else { &self.cache_misses });
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let load = |counter: &AtomicU64| counter.load(Ordering::Relaxed);
        StatsSnapshot {
            received: load(&self.received),
            forwarded: load(&self.forwarded),
            delegated_empty_cid: load(&self.delegated_empty_cid),
            delegated_first_contact: load(&self.delegated_first_contact),
            delegated_unhealthy: load(&self.delegated_unhealthy),
            dropped_truncated: load(&self.dropped_truncated),
            dropped_cid_length: load(&self.dropped_cid_length),
            dropped_unknown_config: load(&self.dropped_unknown_config),
            dropped_auth_failed: load(&self.dropped_auth_failed),
            dropped_unknown_server: load(&self.dropped_unknown_server),
            dropped_misconfigured: load(&self.dropped_misconfigured),
            cache_hits: load(&self.cache_hits),
            cache_misses: load(&self.cache_misses),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::Delegation;

    #[test]
    fn test_record_and_totals() {
        let stats = DispatchStats::new();
        stats.record(&RoutingDecision::Drop(DropReason::Truncated));
        stats.record(&RoutingDecision::Drop(DropReason::UnknownServer));
        stats.record(&RoutingDecision::Delegate(Delegation {
            reason: DelegateReason::EmptyCid,
            endpoint: None,
        }));
        stats.record_cache(true);
        stats.record_cache(false);

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.received, 3);
        assert_eq!(snapshot.dropped(), 2);
        assert_eq!(snapshot.delegated(), 1);
        assert_eq!(snapshot.forwarded, 0);
        assert_eq!((snapshot.cache_hits, snapshot.cache_misses), (1, 1));
    }
}
