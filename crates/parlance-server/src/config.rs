//! Server configuration loading from file and environment variables.

use parlance_agent::AgentConfig;
use serde::Deserialize;
use std::net::{IpAddr, Ipv4Addr};
use thiserror::Error;

/// Signing secret used when none is configured. Only suitable for local
/// development; startup logs a warning when it is in effect.
pub const DEV_JWT_SECRET: &str = "parlance-dev-secret";

/// Top-level server configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub auth: AuthConfig,

    /// AI backend and persona.
    #[serde(default)]
    pub agent: AgentConfig,

    #[serde(default)]
    pub uploads: UploadsConfig,
}

/// Network configuration for the HTTP server.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to.
    #[serde(default = "default_host")]
    pub host: IpAddr,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Origins allowed by CORS. Empty allows any origin.
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_db_path")]
    pub path: String,

    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,

    #[serde(default = "default_pool_max_size")]
    pub pool_max_size: u32,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "parlance_server=debug,info").
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether to output logs in JSON format.
    #[serde(default)]
    pub json: bool,
}

/// Bearer token verification.
#[derive(Clone, Deserialize)]
pub struct AuthConfig {
    /// HMAC secret the token issuer signs with.
    #[serde(default = "default_jwt_secret")]
    pub jwt_secret: String,
}

/// Where reply audio is written and served from.
#[derive(Debug, Clone, Deserialize)]
pub struct UploadsConfig {
    #[serde(default = "default_upload_dir")]
    pub dir: String,
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1))
}

fn default_port() -> u16 {
    5001
}

fn default_db_path() -> String {
    "parlance.db".to_string()
}

fn default_busy_timeout_ms() -> u64 {
    5_000
}

fn default_pool_max_size() -> u32 {
    8
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_jwt_secret() -> String {
    DEV_JWT_SECRET.to_string()
}

fn default_upload_dir() -> String {
    "public/uploads".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origins: Vec::new(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            busy_timeout_ms: default_busy_timeout_ms(),
            pool_max_size: default_pool_max_size(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: default_jwt_secret(),
        }
    }
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("jwt_secret", &"[REDACTED]")
            .finish()
    }
}

impl AuthConfig {
    /// Whether the built-in development secret is in effect.
    pub fn uses_dev_secret(&self) -> bool {
        self.jwt_secret == DEV_JWT_SECRET
    }
}

impl Default for UploadsConfig {
    fn default() -> Self {
        Self {
            dir: default_upload_dir(),
        }
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    /// Failed to parse the configuration file.
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Loads configuration from a TOML file, falling back to defaults.
///
/// Environment variable overrides:
/// - `PARLANCE_HOST` overrides `server.host`
/// - `PARLANCE_PORT` overrides `server.port`
/// - `PARLANCE_DB_PATH` overrides `database.path`
/// - `PARLANCE_LOG_LEVEL` overrides `logging.level`
/// - `PARLANCE_LOG_JSON` overrides `logging.json` (set to "true" to enable)
/// - `PARLANCE_JWT_SECRET` overrides `auth.jwt_secret`
/// - `PARLANCE_AGENT_BASE_URL` overrides `agent.base_url`
/// - `PARLANCE_AGENT_API_KEY` overrides `agent.api_key`
/// - `PARLANCE_AGENT_MODEL` overrides `agent.model`
/// - `PARLANCE_UPLOAD_DIR` overrides `uploads.dir`
///
/// # Errors
///
/// Returns `ConfigError` if the file exists but cannot be read or parsed.
pub fn load_config(path: Option<&str>) -> Result<Config, ConfigError> {
    let mut config = match path {
        Some(p) => match std::fs::read_to_string(p) {
            Ok(contents) => toml::from_str(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = p, "config file not found, using defaults");
                Config::default()
            }
            Err(e) => return Err(ConfigError::FileRead(e)),
        },
        None => Config::default(),
    };

    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    Ok(config)
}

fn apply_env_overrides(config: &mut Config, var: impl Fn(&str) -> Option<String>) {
    if let Some(host) = var("PARLANCE_HOST") {
        if let Ok(parsed) = host.parse() {
            config.server.host = parsed;
        }
    }
    if let Some(port) = var("PARLANCE_PORT") {
        if let Ok(parsed) = port.parse() {
            config.server.port = parsed;
        }
    }
    if let Some(db_path) = var("PARLANCE_DB_PATH") {
        config.database.path = db_path;
    }
    if let Some(level) = var("PARLANCE_LOG_LEVEL") {
        config.logging.level = level;
    }
    if let Some(json) = var("PARLANCE_LOG_JSON") {
        config.logging.json = json == "true" || json == "1";
    }
    if let Some(secret) = var("PARLANCE_JWT_SECRET") {
        config.auth.jwt_secret = secret;
    }
    if let Some(url) = var("PARLANCE_AGENT_BASE_URL") {
        config.agent.base_url = url;
    }
    if let Some(key) = var("PARLANCE_AGENT_API_KEY") {
        config.agent.api_key = key;
    }
    if let Some(model) = var("PARLANCE_AGENT_MODEL") {
        config.agent.model = model;
    }
    if let Some(dir) = var("PARLANCE_UPLOAD_DIR") {
        config.uploads.dir = dir;
    }
}
