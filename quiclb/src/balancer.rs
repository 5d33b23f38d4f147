//! Routing core assembled from configuration.

use crate::config::{LbConfig, PlacementKind};
use anyhow::{Context, Result};
use quiclb_core::{
    ConsistentHash, Dispatcher, EpochStore, FirstContactPlacement, RoundRobin, ServerPool,
};
use std::sync::Arc;
use tracing::info;

/// Epoch store, server pool and dispatcher built from one configuration.
#[derive(Debug)]
pub struct Balancer {
    pub epochs: Arc<EpochStore>,
    pub pool: Arc<ServerPool>,
    pub dispatcher: Dispatcher,
}

impl Balancer {
    /// Build the routing core.
    ///
    /// Configurations other than the active one are installed first, so
    /// they end up retiring and only decode for the grace period.
    pub fn from_config(config: &LbConfig) -> Result<Self> {
        let epochs = Arc::new(
            EpochStore::new(config.cid.store_config()).context("invalid CID rotation settings")?,
        );

        let active = config.cid.active_tag();
        let previous = config.cid.configs.iter().filter(|c| Some(c.tag) != active);
        for cid in previous.chain(config.cid.active_config()) {
            epochs
                .install(cid.clone())
                .with_context(|| format!("failed to install CID configuration tag {}", cid.tag))?;
        }

        let pool = Arc::new(
            ServerPool::with_endpoints(config.servers.iter().map(|s| s.endpoint()))
                .context("invalid server list")?,
        );

        let placement: Option<Box<dyn FirstContactPlacement>> = match config.routing.placement {
            PlacementKind::None => None,
            PlacementKind::RoundRobin => Some(Box::new(RoundRobin::new())),
            PlacementKind::ConsistentHash => Some(Box::new(ConsistentHash::new())),
        };

        let mut builder = Dispatcher::builder(Arc::clone(&epochs), Arc::clone(&pool))
            .health_policy(config.routing.health_policy())
            .boxed_placement(placement);
        if config.routing.connection_cache {
            builder = builder.connection_cache(config.routing.cache_capacity);
        }

        info!(
            cid_configs = config.cid.configs.len(),
            active_tag = ?active.map(|t| t.value()),
            servers = pool.len(),
            placement = ?config.routing.placement,
            failover = config.routing.failover,
            "routing core initialized"
        );

        Ok(Self {
            epochs,
            pool,
            dispatcher: builder.build(),
        })
    }
}
