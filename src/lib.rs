//! Sander: in-process compressed LRU response cache for the community site
//! backend, with the configuration, telemetry and HTTP glue that host it.

pub mod cache;
pub mod config;
pub mod error;
pub mod http;
pub mod infra;
