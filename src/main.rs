mod aprs;
mod beacon;
mod cli;
mod config;
mod influx;
mod wx;

use crate::cli::Cli;
use crate::config::Config;
use crate::influx::InfluxReader;
use anyhow::Result;
use clap::Parser;

fn init_tracing(debug: bool) -> Result<()> {
    let default_directive = if debug {
        "debug,wx_beacon=debug"
    } else {
        "info,wx_beacon=info"
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_directive.into());
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .try_init()
        .map_err(|err| anyhow::anyhow!(err.to_string()))?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;

    if cli.print_config {
        print!("{}", serde_yaml::to_string(&config)?);
        return Ok(());
    }

    init_tracing(cli.debug)?;

    let reader = InfluxReader::new(&config.influxdb)?;
    tokio::select! {
        res = beacon::run(&config, &reader, cli.once) => res,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown signal received");
            Ok(())
        }
    }
}
