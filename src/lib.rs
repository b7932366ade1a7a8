pub mod aggregator;
pub mod cache;
pub mod config;
pub mod dedup;
pub mod error;
pub mod fanout;
pub mod guard;
pub mod logging;
pub mod metrics;
pub mod providers;
pub mod query;
pub mod ranking;
pub mod server;
pub mod types;
