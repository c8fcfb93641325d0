//! CLI argument definitions using clap
//!
//! Commands:
//! - kvgate serve --config <path> [--port <u16>]
//! - kvgate init --config <path>
//! - kvgate purge --config <path>

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// kvgate - authenticated HTTP gateway over a key-value store
#[derive(Parser, Debug)]
#[command(name = "kvgate")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the HTTP gateway
    Serve {
        /// Path to configuration file
        #[arg(long, default_value = "./kvgate.json")]
        config: PathBuf,

        /// Override the configured port
        #[arg(long)]
        port: Option<u16>,
    },

    /// Write a default configuration file
    Init {
        /// Path to configuration file
        #[arg(long, default_value = "./kvgate.json")]
        config: PathBuf,
    },

    /// Remove expired entries from the relational store and exit
    Purge {
        /// Path to configuration file
        #[arg(long, default_value = "./kvgate.json")]
        config: PathBuf,
    },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}
