use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::permissions::PermissionSet;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub portal: PortalConfig,
    #[serde(default)]
    pub permissions: PermissionsConfig,
    #[serde(default)]
    pub http_server: HttpServerConfig,
}

/// Core portal configuration
#[derive(Debug, Clone, Deserialize)]
pub struct PortalConfig {
    pub db_path: PathBuf,
    #[serde(default = "default_migrations_dir")]
    pub migrations_dir: PathBuf,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Permission defaults
#[derive(Debug, Clone, Deserialize)]
pub struct PermissionsConfig {
    /// Permission strings granted to unauthenticated visitors when the
    /// `guest_permissions` setting is absent.
    #[serde(default = "default_guest_permissions")]
    pub guest: Vec<String>,
}

impl Default for PermissionsConfig {
    fn default() -> Self {
        Self {
            guest: default_guest_permissions(),
        }
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct HttpServerConfig {
    #[serde(default = "default_http_port")]
    pub port: u16,
    #[serde(default)]
    pub allowed_origins: Vec<String>,
    /// Header carrying the authenticated user id (set by the login proxy).
    #[serde(default = "default_actor_header")]
    pub actor_header: String,
}

impl Default for HttpServerConfig {
    fn default() -> Self {
        Self {
            port: default_http_port(),
            allowed_origins: Vec::new(),
            actor_header: default_actor_header(),
        }
    }
}

fn default_migrations_dir() -> PathBuf {
    PathBuf::from("migrations")
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_guest_permissions() -> Vec<String> {
    vec![
        "news:read".to_string(),
        "events:read".to_string(),
        "faq:read".to_string(),
    ]
}

fn default_http_port() -> u16 {
    8080
}

fn default_actor_header() -> String {
    "x-actor-id".to_string()
}

impl Config {
    /// Load configuration from file
    ///
    /// Loads environment variables from .env file (if present) before loading config.
    /// Looks for config file in this order:
    /// 1. Path specified in PORTAL_CONFIG environment variable
    /// 2. ./config.toml in current directory
    pub fn load() -> Result<Self> {
        // .env is optional
        let _ = dotenv::dotenv();

        let config_path = std::env::var("PORTAL_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config.toml"));

        let config_str = std::fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        Self::from_toml(&config_str)
    }

    /// Parse and validate configuration from a TOML string
    pub fn from_toml(config_str: &str) -> Result<Self> {
        let config: Config = toml::from_str(config_str).context("Failed to parse config.toml")?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    fn validate(&self) -> Result<()> {
        if self.http_server.port == 0 {
            anyhow::bail!("http_server.port must be greater than 0");
        }

        if self.http_server.actor_header.trim().is_empty() {
            anyhow::bail!("http_server.actor_header must not be empty");
        }

        PermissionSet::parse_all(&self.permissions.guest)
            .context("permissions.guest contains an invalid permission string")?;

        Ok(())
    }

    /// Guest permission defaults as a typed set
    pub fn guest_permissions(&self) -> Result<PermissionSet> {
        Ok(PermissionSet::parse_all(&self.permissions.guest)?)
    }

    /// Get database path
    pub fn db_path(&self) -> &Path {
        &self.portal.db_path
    }

    /// Get migrations directory
    pub fn migrations_dir(&self) -> &Path {
        &self.portal.migrations_dir
    }
}
