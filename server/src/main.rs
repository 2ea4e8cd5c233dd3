use aqcast::cache::Cache;
use aqcast::cli::{Cli, Command, UpdateArgs};
use aqcast::clickhouse::ClickHouseSource;
use aqcast::config::DbConfig;
use aqcast::metrics::Metrics;
use aqcast::producer::Producer;
use aqcast::server;
use aqcast::snapshot::SnapshotStore;
use clap::Parser;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    env_logger::init();

    let args = Cli::parse();
    let store = SnapshotStore::new(args.cache_dir);

    match args.cmd {
        Command::Serve {
            address,
            poll_interval_secs,
        } => {
            let metrics = match Metrics::new() {
                Ok(metrics) => Arc::new(metrics),
                Err(e) => {
                    log::error!("Failed to register metrics: {}", e);
                    return ExitCode::FAILURE;
                }
            };
            let cache = Cache::new(store);
            let report = cache.load_all().await;
            if !report.failed.is_empty() {
                log::warn!(
                    "Starting with {} dataset(s) not loaded, /health reports not ready",
                    report.failed.len()
                );
            }
            cache.spawn_refresh(Duration::from_secs(poll_interval_secs));
            server::run(address, cache, metrics).await;
            ExitCode::SUCCESS
        }
        Command::Update(update_args) => match update(store, update_args).await {
            Ok(true) => ExitCode::SUCCESS,
            Ok(false) => ExitCode::FAILURE,
            Err(e) => {
                log::error!("{:#}", e);
                ExitCode::FAILURE
            }
        },
    }
}

/// Returns false when at least one dataset failed to update.
async fn update(store: SnapshotStore, args: UpdateArgs) -> anyhow::Result<bool> {
    let source = ClickHouseSource::new(DbConfig::from_env()?)?;
    let producer = Producer::new(source, store);

    if args.schedule {
        producer.run_hourly(args.minute).await;
        return Ok(true);
    }

    let report = if args.kinds.is_empty() {
        producer.update_all().await
    } else {
        producer.update(&args.kinds).await
    };
    Ok(report.is_success())
}
