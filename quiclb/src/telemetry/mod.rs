//! # Telemetry
//!
//! Structured logging via `tracing`, plus a one-line summary of the
//! dispatcher's counters. Per-packet failures are never logged one by one;
//! they are counted in [`quiclb_core::DispatchStats`] and summarized here.

use crate::config::LoggingConfig;
use anyhow::{Context, Result};
use quiclb_core::StatsSnapshot;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize structured logging.
///
/// `RUST_LOG` takes precedence over the configured level. Logs go to
/// stderr so command output on stdout stays machine-readable.
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.level.to_string()))
        .context("invalid log filter")?;

    let registry = tracing_subscriber::registry().with(filter);

    if config.json_format {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_file(config.include_file_line)
                    .with_line_number(config.include_file_line)
                    .with_writer(std::io::stderr),
            )
            .try_init()
            .context("failed to install log subscriber")?;
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_ansi(config.enable_colors)
                    .with_file(config.include_file_line)
                    .with_line_number(config.include_file_line)
                    .with_writer(std::io::stderr),
            )
            .try_init()
            .context("failed to install log subscriber")?;
    }

    tracing::debug!(level = %config.level, json = config.json_format, "Logging initialized");
    Ok(())
}

/// Emit one structured line summarizing routing counters.
pub fn log_stats(stats: &StatsSnapshot) {
    tracing::info!(
        received = stats.received,
        forwarded = stats.forwarded,
        delegated = stats.delegated(),
        dropped = stats.dropped(),
        dropped_truncated = stats.dropped_truncated,
        dropped_cid_length = stats.dropped_cid_length,
        dropped_unknown_config = stats.dropped_unknown_config,
        dropped_auth_failed = stats.dropped_auth_failed,
        dropped_unknown_server = stats.dropped_unknown_server,
        cache_hits = stats.cache_hits,
        cache_misses = stats.cache_misses,
        "routing statistics"
    );
}
