use anyhow::Context;
use clap::{CommandFactory, FromArgMatches};
use quiclb::config::{self, CliArgs, Command, LbConfig};
use quiclb::{commands, telemetry};
use tracing::info;

fn main() -> anyhow::Result<()> {
    let matches = CliArgs::command().get_matches();
    let cli =
        CliArgs::from_arg_matches(&matches).context("Failed to parse command-line arguments")?;

    // Printing defaults needs no configuration file and no logging
    if cli.command == Command::PrintDefaultConfig {
        print!("{}", commands::run(&cli.command, &LbConfig::default())?);
        return Ok(());
    }

    let config = config::load_config(&cli)?;
    telemetry::init_logging(&config.logging).context("failed to initialize logging")?;

    info!(config_path = %cli.config, "Configuration loaded successfully");

    let output = commands::run(&cli.command, &config)?;
    print!("{}", output);
    Ok(())
}
