//! Operator commands.
//!
//! Each command returns the text to print so it can be exercised without a
//! terminal.

use crate::balancer::Balancer;
use crate::config::{loader, Command, LbConfig};
use crate::telemetry;
use anyhow::{Context, Result};
use quiclb_core::{CidGenerator, EpochState, ServerId};
use std::fmt::Write;
use std::time::Instant;

/// Run `command` against a loaded configuration.
pub fn run(command: &Command, config: &LbConfig) -> Result<String> {
    match command {
        Command::PrintDefaultConfig => loader::default_config_toml(),
        Command::Check => check(config),
        Command::Mint { server, count } => mint(config, *server, *count),
        Command::Decode { cid } => decode(config, cid),
        Command::Route { datagram, cid_len } => route(config, datagram, *cid_len),
    }
}

fn parse_hex(what: &str, input: &str) -> Result<Vec<u8>> {
    let trimmed = input.trim().trim_start_matches("0x");
    hex::decode(trimmed).with_context(|| format!("{} is not valid hex: {}", what, input))
}

fn check(config: &LbConfig) -> Result<String> {
    let balancer = Balancer::from_config(config)?;
    let snapshot = balancer.epochs.snapshot();
    let now = Instant::now();

    let mut out = String::from("configuration is valid\n");
    for epoch in snapshot.epochs() {
        let state = match epoch.state() {
            EpochState::Active => "active",
            EpochState::Retiring { .. } => "retiring",
            EpochState::Retired => "retired",
        };
        let codec = epoch.codec();
        writeln!(
            out,
            "  cid tag {}: {} ({} byte CIDs, {} byte nonce), {}",
            epoch.tag(),
            codec.kind(),
            codec.cid_len(),
            codec.nonce_len(),
            state
        )?;
    }
    match snapshot.short_cid_len(now) {
        Some(len) => writeln!(out, "  short header CID length: {}", len)?,
        None => writeln!(out, "  no active CID configuration")?,
    }
    for endpoint in balancer.pool.list_endpoints() {
        writeln!(
            out,
            "  server {} -> {} (weight {}, {})",
            endpoint.id,
            endpoint.addr,
            endpoint.weight,
            if endpoint.healthy { "healthy" } else { "unhealthy" }
        )?;
    }
    Ok(out)
}

fn mint(config: &LbConfig, server: ServerId, count: usize) -> Result<String> {
    let balancer = Balancer::from_config(config)?;
    if balancer.pool.resolve(&server).is_err() {
        tracing::warn!(server = %server, "minting for a server that is not in the pool");
    }

    let generator = CidGenerator::new(balancer.epochs, server);
    let mut out = String::new();
    for _ in 0..count {
        let cid = generator.generate().context("failed to mint CID")?;
        writeln!(out, "{}", hex::encode(cid))?;
    }
    Ok(out)
}

fn decode(config: &LbConfig, cid: &str) -> Result<String> {
    let balancer = Balancer::from_config(config)?;
    let cid = parse_hex("CID", cid)?;

    let decoded = balancer
        .epochs
        .decode_at(&cid, Instant::now())
        .context("failed to decode CID")?;

    let mut out = format!("tag {} -> server {}", decoded.tag, decoded.server_id);
    match balancer.pool.resolve(&decoded.server_id) {
        Ok(endpoint) => write!(out, " at {}", endpoint.addr)?,
        Err(e) => write!(out, " ({})", e)?,
    }
    out.push('\n');
    Ok(out)
}

fn route(config: &LbConfig, datagram: &str, cid_len: Option<usize>) -> Result<String> {
    let balancer = Balancer::from_config(config)?;
    let datagram = parse_hex("datagram", datagram)?;

    let decision = match cid_len {
        Some(len) => balancer.dispatcher.route_datagram(&datagram, len),
        None => balancer.dispatcher.route(&datagram),
    };
    telemetry::log_stats(&balancer.dispatcher.stats().snapshot());

    Ok(format!("{}\n", decision))
}

#[cfg(test)]
mod tests {
    use super::*;
    use quiclb_core::CidConfig;

    fn config() -> LbConfig {
        toml::from_str(
            r#"
            [cid]
            active = 1

            [[cid.configs]]
            tag = 1
            kind = "plaintext"
            server_id_bits = 8
            nonce_bits = 0

            [[servers]]
            id = "05"
            address = "10.0.0.5:4433"

            [[servers]]
            id = "06"
            address = "10.0.0.6:4433"
            "#,
        )
        .unwrap()
    }

    #[test]
    fn test_check_summary() {
        let out = run(&Command::Check, &config()).unwrap();
        assert!(out.starts_with("configuration is valid"));
        assert!(out.contains("cid tag 1: plaintext (2 byte CIDs, 0 byte nonce), active"));
        assert!(out.contains("short header CID length: 2"));
        assert!(out.contains("server 05 -> 10.0.0.5:4433 (weight 1, healthy)"));
    }

    #[test]
    fn test_decode_scenario() {
        let out = run(&Command::Decode { cid: "4005".into() }, &config()).unwrap();
        assert_eq!(out, "tag 1 -> server 05 at 10.0.0.5:4433\n");

        let unknown = run(&Command::Decode { cid: "0x4009".into() }, &config()).unwrap();
        assert_eq!(unknown, "tag 1 -> server 09 (unknown server 09)\n");

        assert!(run(&Command::Decode { cid: "c005".into() }, &config()).is_err());
        assert!(run(&Command::Decode { cid: "zz".into() }, &config()).is_err());
    }

    #[test]
    fn test_mint_then_decode() {
        let mut config = config();
        config.cid.configs = vec![CidConfig::plaintext(1, 8, 32)];

        let server: ServerId = "06".parse().unwrap();
        let out = run(&Command::Mint { server, count: 3 }, &config).unwrap();
        let cids: Vec<&str> = out.lines().collect();
        assert_eq!(cids.len(), 3);

        for cid in cids {
            assert_eq!(cid.len(), 12);
            let decoded = run(&Command::Decode { cid: cid.into() }, &config).unwrap();
            assert!(decoded.contains("server 06 at 10.0.0.6:4433"), "{}", decoded);
        }
    }

    #[test]
    fn test_route_decisions() {
        let forward = run(
            &Command::Route {
                datagram: "414005aaaa".into(),
                cid_len: None,
            },
            &config(),
        )
        .unwrap();
        assert_eq!(forward, "forward to server 05 at 10.0.0.5:4433\n");

        let delegated = run(
            &Command::Route {
                datagram: "c0000000010000".into(),
                cid_len: Some(8),
            },
            &config(),
        )
        .unwrap();
        assert!(delegated.starts_with("delegate (empty_cid)"), "{}", delegated);

        let truncated = run(
            &Command::Route {
                datagram: "404005".into(),
                cid_len: Some(9),
            },
            &config(),
        )
        .unwrap();
        assert_eq!(truncated, "drop (truncated)\n");
    }

    #[test]
    fn test_print_default_config_parses_back() {
        let out = run(&Command::PrintDefaultConfig, &LbConfig::default()).unwrap();
        let parsed: LbConfig = toml::from_str(&out).unwrap();
        assert_eq!(parsed, LbConfig::default());
    }
}
