pub mod assemble;
pub mod cache;
pub mod cli;
pub mod clickhouse;
pub mod config;
pub mod error;
pub mod metrics;
pub mod models;
pub mod producer;
pub mod server;
pub mod snapshot;
pub mod stopwatch;
pub mod transform;
