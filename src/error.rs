//! Engine-level errors for ripl
//!
//! Evaluation failures are *data* (see [`crate::failure::Failure`]) and never
//! show up here. `ReplError` covers the infrastructure around the loop:
//! reading lines, loading configuration, persisting history and running
//! commands.

use crate::failure::Failure;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReplError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Input error: {0}")]
    Input(String),
    #[error("Config error: {0}")]
    Config(#[from] toml::de::Error),
    #[error("{0}")]
    Command(String),
    #[error("Display error: {0}")]
    Display(String),
    #[error("Could not bind session variable: {0}")]
    Binding(Failure),
    #[error("No execution context to evaluate in")]
    EmptyContextStack,
}

impl ReplError {
    /// Shorthand for a command failure that should be reported and skipped
    pub fn command(message: impl Into<String>) -> Self {
        ReplError::Command(message.into())
    }
}
