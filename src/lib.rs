pub mod config;
pub mod constants;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod pipeline;
pub mod scrapers;
pub mod sink;
pub mod types;

// Ports and their adapters
pub mod app;
pub mod infra;
