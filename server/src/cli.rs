use clap::{Parser, Subcommand};
use shared::DatasetKind;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(about = "Air quality forecast API.")]
pub struct Cli {
    /// Directory holding the dataset snapshots
    #[arg(env = "AQCAST_CACHE_DIR", long, default_value = "cache")]
    pub cache_dir: PathBuf,
    #[command(subcommand)]
    pub cmd: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Serve the cached datasets over HTTP
    Serve {
        #[arg(env = "AQCAST_SERVER_ADDRESS", long, default_value = "0.0.0.0:8000")]
        address: std::net::SocketAddr,
        /// Seconds between two snapshot polls
        #[arg(long, default_value_t = 60, value_parser = clap::value_parser!(u64).range(1..))]
        poll_interval_secs: u64,
    },
    /// Fetch forecasts from the database and write the snapshots
    Update(UpdateArgs),
}

#[derive(Debug, Parser)]
pub struct UpdateArgs {
    /// Datasets to update (all when omitted)
    #[arg(long = "kind")]
    pub kinds: Vec<DatasetKind>,
    /// Keep running and update every hour
    #[arg(long)]
    pub schedule: bool,
    /// Minute of the hour of scheduled runs
    #[arg(long, default_value_t = 45, value_parser = clap::value_parser!(u32).range(0..60))]
    pub minute: u32,
}
