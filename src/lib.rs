pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod inspections;
pub mod jobs;
pub mod lifecycle;
pub mod mailer;
pub mod maintenance;
pub mod models;
pub mod rams;
pub mod routes;
pub mod s3;
pub mod schema;
pub mod state;
pub mod storage;
pub mod sync;
pub mod timesheets;
pub mod utils;
pub mod vehicle_data;
pub mod workers;

pub use workers::{default_handlers, Worker};

use tracing_subscriber::EnvFilter;

/// Compact log output filtered by `RUST_LOG`, defaulting to `info`.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}
