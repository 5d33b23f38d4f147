//! Configuration loading and parsing.
//!
//! This module handles loading configuration from files, environment variables,
//! and command-line arguments, with proper precedence handling.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use config::Config as ConfigLoader;
use quiclb_core::ServerId;
use std::collections::HashMap;
use std::path::Path;

use super::LbConfig;

/// Environment variable prefix for overrides
pub const ENV_PREFIX: &str = "QUICLB";

/// Command-line interface for the load balancer tooling.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct CliArgs {
    /// Path to configuration file (TOML format)
    #[arg(long, short = 'c', default_value = "quiclb.toml", global = true)]
    pub config: String,

    /// Log level (overrides config file)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Tag of the CID configuration used for minting (overrides config file)
    #[arg(long, global = true)]
    pub active_tag: Option<u8>,

    /// Delegate traffic for unhealthy servers (overrides config file)
    #[arg(long, global = true)]
    pub failover: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Operator commands.
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Validate configuration and print a summary
    Check,

    /// Print default configuration and exit
    PrintDefaultConfig,

    /// Mint CIDs for a server with the active configuration
    Mint {
        /// Hex-encoded server identity
        #[arg(long)]
        server: ServerId,

        /// Number of CIDs to mint
        #[arg(long, default_value_t = 1)]
        count: usize,
    },

    /// Decode a hex-encoded CID to its server
    Decode {
        /// Hex-encoded connection ID
        cid: String,
    },

    /// Route a hex-encoded datagram and print the decision
    Route {
        /// Hex-encoded datagram
        datagram: String,

        /// Short-header CID length (defaults to the active configuration's)
        #[arg(long)]
        cid_len: Option<usize>,
    },
}

/// Load and parse configuration.
///
/// This function implements the configuration precedence:
/// 1. Default values (lowest priority)
/// 2. Configuration file
/// 3. Environment variables (QUICLB_ prefix)
/// 4. Command-line arguments (highest priority)
///
/// # Errors
///
/// Returns an error if:
/// - Configuration file cannot be parsed
/// - An override has an invalid value
/// - Validation fails
pub fn load_config(cli: &CliArgs) -> Result<LbConfig> {
    let mut config = load_config_file(&cli.config)?;

    apply_env_overrides(&mut config, None)?;
    apply_cli_overrides(&mut config, cli)?;

    config.validate().map_err(|errors| {
        anyhow::anyhow!("Configuration validation failed:\n{}", errors.join("\n"))
    })?;

    Ok(config)
}

/// Load configuration from a TOML file.
pub fn load_config_file(path: &str) -> Result<LbConfig> {
    let path_obj = Path::new(path);

    // If file doesn't exist, use default config
    if !path_obj.exists() {
        tracing::warn!(
            config_path = %path,
            "Configuration file not found, using defaults"
        );
        return Ok(LbConfig::default());
    }

    let config_str = std::fs::read_to_string(path_obj)
        .with_context(|| format!("Failed to read config file: {}", path))?;

    toml::from_str(&config_str).with_context(|| format!("Failed to parse TOML config: {}", path))
}

/// Apply environment variable overrides.
///
/// Environment variables are prefixed with `QUICLB_` and use `__` as a
/// separator. `source` replaces the process environment when given.
///
/// Examples:
/// - `QUICLB_LOGGING__LEVEL=debug`
/// - `QUICLB_CID__GRACE_PERIOD_SECS=600`
/// - `QUICLB_ROUTING__PLACEMENT=consistent_hash`
pub fn apply_env_overrides(
    config: &mut LbConfig,
    source: Option<HashMap<String, String>>,
) -> Result<()> {
    let env_config = ConfigLoader::builder()
        .add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .source(source),
        )
        .build()
        .context("Failed to load environment variables")?;

    // Manually apply known overrides to avoid full deserialization
    if let Ok(level) = env_config.get_string("logging.level") {
        config.logging.level = level
            .parse()
            .map_err(|e: String| anyhow::anyhow!("{}_LOGGING__LEVEL: {}", ENV_PREFIX, e))?;
    }
    if let Ok(json) = env_config.get_bool("logging.json_format") {
        config.logging.json_format = json;
    }
    if let Ok(secs) = env_config.get_int("cid.grace_period_secs") {
        config.cid.grace_period_secs = u64::try_from(secs)
            .with_context(|| format!("{}_CID__GRACE_PERIOD_SECS must be >= 0", ENV_PREFIX))?;
    }
    if let Ok(active) = env_config.get_int("cid.active") {
        config.cid.active = Some(
            u8::try_from(active)
                .with_context(|| format!("{}_CID__ACTIVE out of range", ENV_PREFIX))?,
        );
    }
    if let Ok(failover) = env_config.get_bool("routing.failover") {
        config.routing.failover = failover;
    }
    if let Ok(placement) = env_config.get_string("routing.placement") {
        config.routing.placement = placement
            .parse()
            .map_err(|e: String| anyhow::anyhow!("{}_ROUTING__PLACEMENT: {}", ENV_PREFIX, e))?;
    }
    if let Ok(cache) = env_config.get_bool("routing.connection_cache") {
        config.routing.connection_cache = cache;
    }
    if let Ok(capacity) = env_config.get_int("routing.cache_capacity") {
        config.routing.cache_capacity = usize::try_from(capacity)
            .with_context(|| format!("{}_ROUTING__CACHE_CAPACITY must be >= 0", ENV_PREFIX))?;
    }

    Ok(())
}

/// Apply command-line argument overrides.
pub fn apply_cli_overrides(config: &mut LbConfig, cli: &CliArgs) -> Result<()> {
    if let Some(ref level_str) = cli.log_level {
        config.logging.level = level_str
            .parse()
            .map_err(|e: String| anyhow::anyhow!("--log-level: {}", e))?;
    }

    if let Some(tag) = cli.active_tag {
        config.cid.active = Some(tag);
    }

    if cli.failover {
        config.routing.failover = true;
    }

    Ok(())
}

/// The default configuration in TOML format.
pub fn default_config_toml() -> Result<String> {
    toml::to_string_pretty(&LbConfig::default()).context("Failed to serialize default config")
}
