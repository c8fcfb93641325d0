//! CLI command implementations
//!
//! `serve` is the only long-running command. `init` and `purge` do their
//! work and return.

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::auth::{AuthGate, SIGNATURE_WINDOW_MS};
use crate::bulk::{BulkWriteOrchestrator, RetryPolicy};
use crate::http_server::{AppState, HttpServer, HttpServerConfig};
use crate::kv::{
    Clock, ExpirySweeper, HostedBackend, KvBackend, MemoryNamespace, RelationalBackend,
    SystemClock,
};
use crate::observability::{init_tracing, LogFormat};

use super::args::Command;
use super::errors::{CliError, CliResult};

/// Environment variable that overrides `api_secret`
pub const SECRET_ENV: &str = "KVGATE_API_SECRET";

/// Which storage backend serves requests
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Relational,
    Hosted,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Relational => "relational",
            BackendKind::Hosted => "hosted",
        }
    }
}

/// Configuration file structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(flatten)]
    pub server: HttpServerConfig,

    #[serde(default)]
    pub backend: BackendKind,

    /// SQLite database file; `:memory:` keeps data in process
    #[serde(default = "default_sqlite_path")]
    pub sqlite_path: String,

    /// Shared secret for bearer and signed requests
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_secret: Option<String>,

    #[serde(default = "default_signature_window_ms")]
    pub signature_window_ms: i64,

    /// Seconds between expiry sweeps; 0 disables the sweeper
    #[serde(default = "default_cleanup_interval_secs")]
    pub cleanup_interval_secs: u64,

    /// Attempts per bulk write entry, counting the first
    #[serde(default = "default_bulk_max_attempts")]
    pub bulk_max_attempts: u32,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub log_json: bool,

    /// Per-key write spacing of the in-process hosted namespace; 0 disables
    #[serde(default = "default_hosted_write_interval_ms")]
    pub hosted_write_interval_ms: i64,
}

fn default_sqlite_path() -> String {
    "./kvgate.db".to_string()
}
fn default_signature_window_ms() -> i64 {
    SIGNATURE_WINDOW_MS
}
fn default_cleanup_interval_secs() -> u64 {
    3600
}
fn default_bulk_max_attempts() -> u32 {
    3
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_hosted_write_interval_ms() -> i64 {
    1000
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: HttpServerConfig::default(),
            backend: BackendKind::default(),
            sqlite_path: default_sqlite_path(),
            api_secret: None,
            signature_window_ms: default_signature_window_ms(),
            cleanup_interval_secs: default_cleanup_interval_secs(),
            bulk_max_attempts: default_bulk_max_attempts(),
            log_level: default_log_level(),
            log_json: false,
            hosted_write_interval_ms: default_hosted_write_interval_ms(),
        }
    }
}

impl Config {
    /// Load configuration from file, applying the secret override
    pub fn load(path: &Path) -> CliResult<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            CliError::config_error(format!("Failed to read config {}: {}", path.display(), e))
        })?;

        let mut config = Self::parse(&content)?;
        config.override_secret(std::env::var(SECRET_ENV).ok());
        config.validate()?;

        Ok(config)
    }

    /// Parse without consulting the environment
    pub fn parse(content: &str) -> CliResult<Self> {
        serde_json::from_str(content)
            .map_err(|e| CliError::config_error(format!("Invalid config JSON: {}", e)))
    }

    /// A non-empty value replaces the configured secret
    pub fn override_secret(&mut self, secret: Option<String>) {
        if let Some(secret) = secret.filter(|s| !s.is_empty()) {
            self.api_secret = Some(secret);
        }
    }

    pub fn validate(&self) -> CliResult<()> {
        if self.backend == BackendKind::Relational && self.sqlite_path.trim().is_empty() {
            return Err(CliError::config_error("sqlite_path must not be empty"));
        }
        if self.signature_window_ms <= 0 {
            return Err(CliError::config_error("signature_window_ms must be > 0"));
        }
        if self.server.max_body_bytes == 0 {
            return Err(CliError::config_error("max_body_bytes must be > 0"));
        }
        if self.bulk_max_attempts == 0 {
            return Err(CliError::config_error("bulk_max_attempts must be >= 1"));
        }
        if self.hosted_write_interval_ms < 0 {
            return Err(CliError::config_error("hosted_write_interval_ms must be >= 0"));
        }
        if let Err(e) = EnvFilter::try_new(&self.log_level) {
            return Err(CliError::config_error(format!(
                "Invalid log_level '{}': {}",
                self.log_level, e
            )));
        }
        Ok(())
    }
}

/// Main CLI entry point
pub fn run() -> CliResult<()> {
    let cli = super::args::Cli::parse_args();
    run_command(cli.command)
}

/// Run the appropriate command based on CLI args
pub fn run_command(cmd: Command) -> CliResult<()> {
    match cmd {
        Command::Serve { config, port } => serve(&config, port),
        Command::Init { config } => init(&config),
        Command::Purge { config } => purge(&config),
    }
}

/// Write a default configuration file; never overwrites
pub fn init(config_path: &Path) -> CliResult<()> {
    if config_path.exists() {
        return Err(CliError::AlreadyExists(config_path.display().to_string()));
    }
    if let Some(parent) = config_path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let content = serde_json::to_string_pretty(&Config::default())?;
    fs::write(config_path, content + "\n")?;
    println!("Wrote default configuration to {}", config_path.display());
    Ok(())
}

/// Open the configured backend. The relational handle is returned
/// separately for maintenance tasks.
pub fn open_backend(
    config: &Config,
    clock: Arc<dyn Clock>,
) -> CliResult<(Arc<dyn KvBackend>, Option<RelationalBackend>)> {
    match config.backend {
        BackendKind::Relational => {
            let db = RelationalBackend::open(&config.sqlite_path, clock)?;
            let backend: Arc<dyn KvBackend> = Arc::new(db.clone());
            Ok((backend, Some(db)))
        }
        BackendKind::Hosted => {
            let namespace = MemoryNamespace::new(clock, config.hosted_write_interval_ms);
            let backend: Arc<dyn KvBackend> = Arc::new(HostedBackend::new(Arc::new(namespace)));
            Ok((backend, None))
        }
    }
}

/// Assemble handler state from configuration
pub fn build_state(
    config: &Config,
    clock: Arc<dyn Clock>,
) -> CliResult<(AppState, Option<RelationalBackend>)> {
    let (backend, relational) = open_backend(config, clock.clone())?;

    let gate = AuthGate::new(config.api_secret.clone(), clock.clone())
        .with_window_ms(config.signature_window_ms);
    let writer = BulkWriteOrchestrator::new(backend.clone(), clock.clone())
        .with_policy(RetryPolicy::with_max_attempts(config.bulk_max_attempts));

    let state = AppState::new(backend, clock, gate).with_writer(writer);
    Ok((state, relational))
}

/// Start the HTTP gateway and serve until ctrl-c
pub fn serve(config_path: &Path, port: Option<u16>) -> CliResult<()> {
    let mut config = Config::load(config_path)?;
    if let Some(port) = port {
        config.server.port = port;
    }

    init_tracing(&config.log_level, LogFormat::from_json_flag(config.log_json));

    let rt = tokio::runtime::Runtime::new()
        .map_err(|e| CliError::boot_failed(format!("Failed to create tokio runtime: {}", e)))?;

    rt.block_on(async {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let (state, relational) = build_state(&config, clock)?;

        if !state.gate.is_configured() {
            warn!(
                env = SECRET_ENV,
                "no api_secret configured; authenticated routes will answer 500"
            );
        }

        let _sweeper = match relational {
            Some(db) if config.cleanup_interval_secs > 0 => Some(ExpirySweeper::start(
                db,
                Duration::from_secs(config.cleanup_interval_secs),
            )),
            _ => None,
        };

        info!(
            backend = config.backend.as_str(),
            addr = %config.server.socket_addr(),
            "starting kvgate"
        );

        HttpServer::new(config.server.clone(), state)
            .start()
            .await
            .map_err(|e| CliError::boot_failed(format!("HTTP server failed: {}", e)))
    })
}

/// Purge expired rows once and print the count
pub fn purge(config_path: &Path) -> CliResult<()> {
    let removed = purge_expired(&Config::load(config_path)?)?;
    println!("Purged {} expired entries", removed);
    Ok(())
}

fn purge_expired(config: &Config) -> CliResult<usize> {
    if config.backend != BackendKind::Relational {
        return Err(CliError::config_error(
            "purge requires the relational backend; hosted entries expire on their own",
        ));
    }

    let rt = tokio::runtime::Runtime::new()
        .map_err(|e| CliError::boot_failed(format!("Failed to create tokio runtime: {}", e)))?;

    rt.block_on(async {
        let db = RelationalBackend::open(&config.sqlite_path, Arc::new(SystemClock))?;
        Ok(db.purge_expired().await?)
    })
}
