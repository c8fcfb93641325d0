//! CLI-specific error types
//!
//! Every CLI error ends the process with a non-zero exit code.

use std::io;

use thiserror::Error;

use crate::kv::KvError;

/// CLI result type
pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug, Error)]
pub enum CliError {
    /// Config file unreadable, malformed or failing validation
    #[error("{0}")]
    Config(String),

    /// `init` would overwrite an existing file
    #[error("Config file already exists: {0}")]
    AlreadyExists(String),

    /// Runtime, listener or server failure
    #[error("{0}")]
    BootFailed(String),

    #[error(transparent)]
    Storage(#[from] KvError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl CliError {
    pub fn config_error(msg: impl Into<String>) -> Self {
        CliError::Config(msg.into())
    }

    pub fn boot_failed(msg: impl Into<String>) -> Self {
        CliError::BootFailed(msg.into())
    }

    /// Get the error code string
    pub fn code(&self) -> &'static str {
        match self {
            CliError::Config(_) => "KVGATE_CLI_CONFIG_ERROR",
            CliError::AlreadyExists(_) => "KVGATE_CLI_ALREADY_EXISTS",
            CliError::BootFailed(_) => "KVGATE_CLI_BOOT_FAILED",
            CliError::Storage(_) => "KVGATE_CLI_STORAGE_ERROR",
            CliError::Io(_) => "KVGATE_CLI_IO_ERROR",
        }
    }

    /// Process exit status for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Config(_) | CliError::AlreadyExists(_) => 2,
            _ => 1,
        }
    }
}

impl From<serde_json::Error> for CliError {
    fn from(e: serde_json::Error) -> Self {
        Self::config_error(format!("JSON error: {}", e))
    }
}
