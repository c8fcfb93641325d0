//! CLI module for kvgate
//!
//! Provides command-line interface for:
//! - serve: Run the HTTP gateway
//! - init: Write a default configuration file
//! - purge: One-shot removal of expired relational rows

mod args;
mod commands;
mod errors;

pub use args::{Cli, Command};
pub use commands::{
    build_state, init, open_backend, purge, run, run_command, serve, BackendKind, Config,
    SECRET_ENV,
};
pub use errors::{CliError, CliResult};
