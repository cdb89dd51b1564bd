// Copyright 2025 Cowboy AI, LLC.

//! Service configuration
//!
//! One explicit configuration value, parsed from flags or the
//! environment and passed to constructors. There is no shared global
//! configuration object.

use std::net::IpAddr;
use std::path::PathBuf;

/// Configuration for the aggregation service binary.
#[derive(Debug, Clone, clap::Parser)]
#[clap(author, version, about, long_about = None)]
pub struct ServiceConfig {
    /// Connection string of the backing document store
    #[clap(long, env = "MONGOURL", default_value = "mongodb://localhost:27017")]
    pub mongo_url: String,

    /// Database name within the backing store
    #[clap(long, env = "MONGODB", default_value = "gameday")]
    pub mongo_db: String,

    /// Collection the materialised aggregations are written into
    #[clap(
        long,
        env = "MAT_AGG_COLLECTION_NAME",
        default_value = "materialisedAggregations"
    )]
    pub materialised_collection: String,

    /// Port the HTTP adapter listens on
    #[clap(long, env = "EXPRESS_PORT", default_value = "3000")]
    pub port: u16,

    /// Address the HTTP adapter binds to
    #[clap(long, env = "BIND_ADDR", default_value = "0.0.0.0")]
    pub bind_addr: IpAddr,

    /// Optional log file; JSON lines when set, stderr otherwise
    #[clap(long, env = "LOG_PATH")]
    pub log_path: Option<PathBuf>,

    /// Service name reported by the healthcheck
    #[clap(long, env = "SERVICE_NAME", default_value = "gameday-aggregations")]
    pub service_name: String,

    /// Initial log level; adjustable at runtime through the log routes
    #[clap(long = "log-level", env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}
