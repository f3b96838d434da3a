//! Configuration system for the Taskdeck server.
//!
//! Supports layered configuration with the following priority (highest first):
//! 1. CLI arguments
//! 2. Environment variables (via clap `env` attribute)
//! 3. TOML config file (`~/.config/taskdeck/config.toml`)
//! 4. Compiled defaults

use std::path::PathBuf;

use axum::http::HeaderName;
use taskdeck::ratelimit::{InvalidPolicy, Operation, RateLimitConfig, RateLimitPolicy};
use taskdeck_proto::task::DEFAULT_RECENT_LIMIT;

/// Errors that can occur when loading server configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadFile {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Failed to parse the TOML configuration.
    #[error("failed to parse config file: {0}")]
    ParseToml(#[from] toml::de::Error),

    /// The identity header is not a valid HTTP header name.
    #[error("invalid identity header name: {0:?}")]
    IdentityHeader(String),

    /// A rate-limit override can never admit a call.
    #[error(transparent)]
    RateLimit(#[from] InvalidPolicy),
}

// ---------------------------------------------------------------------------
// TOML file structs (all fields Option for partial overrides)
// ---------------------------------------------------------------------------

/// Top-level TOML config file structure.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ServerConfigFile {
    server: ServerFileConfig,
    logging: LoggingFileConfig,
    rate_limits: RateLimitsFileConfig,
}

/// `[server]` section.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ServerFileConfig {
    bind_addr: Option<String>,
    identity_header: Option<String>,
    recent_limit: Option<usize>,
}

/// `[logging]` section.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct LoggingFileConfig {
    level: Option<String>,
    file: Option<PathBuf>,
}

/// `[rate_limits]` section. Each operation table replaces that operation's
/// default policy wholesale.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct RateLimitsFileConfig {
    max_tracked_callers: Option<usize>,
    create_task: Option<RateLimitPolicy>,
    update_task: Option<RateLimitPolicy>,
    delete_task: Option<RateLimitPolicy>,
    bulk_delete: Option<RateLimitPolicy>,
}

impl RateLimitsFileConfig {
    fn overrides(&self) -> [(Operation, Option<RateLimitPolicy>); 4] {
        [
            (Operation::CreateTask, self.create_task),
            (Operation::UpdateTask, self.update_task),
            (Operation::DeleteTask, self.delete_task),
            (Operation::BulkDelete, self.bulk_delete),
        ]
    }
}

// ---------------------------------------------------------------------------
// CLI arguments
// ---------------------------------------------------------------------------

/// CLI arguments for the server.
#[derive(clap::Parser, Debug, Default)]
#[command(version, about = "Taskdeck task tracking server")]
pub struct ServerCliArgs {
    /// Address to bind the server to.
    #[arg(short, long, env = "TASKDECK_ADDR")]
    pub bind: Option<String>,

    /// Path to config file (default: `~/.config/taskdeck/config.toml`).
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Request header carrying the authenticated user id.
    #[arg(long, env = "TASKDECK_IDENTITY_HEADER")]
    pub identity_header: Option<String>,

    /// Default number of tasks in the dashboard recent view.
    #[arg(long)]
    pub recent_limit: Option<usize>,

    /// Log level filter (trace, debug, info, warn, error).
    #[arg(long, env = "TASKDECK_LOG")]
    pub log_level: Option<String>,

    /// Write logs to this file instead of stdout.
    #[arg(long, env = "TASKDECK_LOG_FILE")]
    pub log_file: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// Resolved configuration
// ---------------------------------------------------------------------------

/// Fully resolved server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind the server to (e.g., `0.0.0.0:8080`).
    pub bind_addr: String,
    /// Header set by the fronting proxy with the caller's user id.
    pub identity_header: HeaderName,
    /// Default size of the dashboard recent view.
    pub recent_limit: usize,
    /// Log level filter string.
    pub log_level: String,
    /// Optional log file; stdout when `None`.
    pub log_file: Option<PathBuf>,
    /// Rate-limit policies.
    pub rate_limits: RateLimitConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".to_string(),
            identity_header: HeaderName::from_static("x-user-id"),
            recent_limit: DEFAULT_RECENT_LIMIT,
            log_level: "info".to_string(),
            log_file: None,
            rate_limits: RateLimitConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Load configuration by merging CLI args, env vars, and a TOML file.
    ///
    /// If `--config` is given and the file does not exist, returns an error.
    /// If no `--config` is given, the default path is tried and a missing
    /// file is treated as empty config.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the config file cannot be read or parsed,
    /// or if a resolved value is invalid.
    pub fn load(cli: &ServerCliArgs) -> Result<Self, ConfigError> {
        let file = load_config_file(cli.config.as_deref())?;
        Self::resolve(cli, &file)
    }

    /// Resolve a `ServerConfig` from CLI args and a parsed config file.
    ///
    /// Priority: CLI > file > default.
    fn resolve(cli: &ServerCliArgs, file: &ServerConfigFile) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let identity_header = match cli
            .identity_header
            .as_deref()
            .or(file.server.identity_header.as_deref())
        {
            Some(name) => HeaderName::try_from(name.to_ascii_lowercase())
                .map_err(|_| ConfigError::IdentityHeader(name.to_string()))?,
            None => defaults.identity_header,
        };

        let mut rate_limits = defaults.rate_limits;
        for (operation, policy) in file.rate_limits.overrides() {
            if let Some(policy) = policy {
                rate_limits = rate_limits.with_policy(operation, policy);
            }
        }
        if let Some(max) = file.rate_limits.max_tracked_callers {
            rate_limits = rate_limits.with_max_tracked_callers(max);
        }
        rate_limits.validate()?;

        Ok(Self {
            bind_addr: cli
                .bind
                .clone()
                .or_else(|| file.server.bind_addr.clone())
                .unwrap_or(defaults.bind_addr),
            identity_header,
            recent_limit: cli
                .recent_limit
                .or(file.server.recent_limit)
                .unwrap_or(defaults.recent_limit),
            log_level: cli
                .log_level
                .clone()
                .or_else(|| file.logging.level.clone())
                .unwrap_or(defaults.log_level),
            log_file: cli.log_file.clone().or_else(|| file.logging.file.clone()),
            rate_limits,
        })
    }
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

/// Load and parse the TOML config file.
fn load_config_file(
    explicit_path: Option<&std::path::Path>,
) -> Result<ServerConfigFile, ConfigError> {
    let path = if let Some(p) = explicit_path {
        let contents = std::fs::read_to_string(p).map_err(|e| ConfigError::ReadFile {
            path: p.to_path_buf(),
            source: e,
        })?;
        return Ok(toml::from_str(&contents)?);
    } else {
        let Some(config_dir) = dirs::config_dir() else {
            return Ok(ServerConfigFile::default());
        };
        config_dir.join("taskdeck").join("config.toml")
    };

    match std::fs::read_to_string(&path) {
        Ok(contents) => Ok(toml::from_str(&contents)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ServerConfigFile::default()),
        Err(e) => Err(ConfigError::ReadFile { path, source: e }),
    }
}
