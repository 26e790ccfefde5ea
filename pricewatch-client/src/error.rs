//! Error types for the command-line client.

use crate::api_client::ClientError;
use crate::config::ConfigError;
use pricewatch_core::{QueryError, ValidationError};

#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Client(#[from] ClientError),
    #[error(transparent)]
    Query(#[from] QueryError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("Failed to initialize logging: {0}")]
    Telemetry(String),
}

impl CliError {
    /// Process exit code: 2 for input the user can fix, 1 otherwise.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Validation(_) | Self::Config(_) => 2,
            _ => 1,
        }
    }
}
