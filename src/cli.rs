use clap::Parser;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "wx-beacon",
    version,
    about = "InfluxDB -> APRS-IS weather station beacon"
)]
pub struct Cli {
    /// Config file (YAML). Also settable via BEACON_CONFIG.
    #[arg(short, long)]
    pub config: Option<PathBuf>,
    /// Enable debug output.
    #[arg(short, long, default_value_t = false)]
    pub debug: bool,
    /// Exit after the first successfully transmitted report.
    #[arg(short, long, default_value_t = false)]
    pub once: bool,
    /// Print the effective configuration and exit.
    #[arg(short = 'P', long, default_value_t = false)]
    pub print_config: bool,
}
