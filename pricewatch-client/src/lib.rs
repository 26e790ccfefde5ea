//! Pricewatch client library exports.
//!
//! Wires the REST API into the cache engine and hosts the pieces of the
//! `pricewatch` command-line front end.

pub mod api_client;
pub mod catalog;
pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod fetchers;
pub mod render;
pub mod telemetry;

pub use api_client::{ClientError, RestClient};
pub use catalog::Catalog;
pub use cli::{Command, Invocation};
pub use config::{CacheConfig, ClientConfig, ConfigError, LogFormat};
pub use error::CliError;
