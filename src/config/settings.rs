//! # Configuration Settings
//!
//! Defines the configuration structure for the postbranch control plane.
//! Every section has sane defaults and an environment override
//! (`POSTBRANCH_*` variables), loaded by [`AppConfig::from_env`].

use crate::errors::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use validator::Validate;

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key).ok().and_then(|s| s.parse::<T>().ok()).unwrap_or(default)
}

fn env_string(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_bool(key: &str, default: bool) -> bool {
    std::env::var(key).map(|s| s.to_lowercase() == "true" || s == "1").unwrap_or(default)
}

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate, Default)]
pub struct AppConfig {
    /// HTTP server configuration
    #[validate(nested)]
    pub server: ServerConfig,

    /// Control-plane database configuration
    #[validate(nested)]
    pub database: DatabaseConfig,

    /// Lifecycle orchestrator configuration
    #[validate(nested)]
    pub orchestrator: OrchestratorConfig,

    /// Observability configuration
    #[validate(nested)]
    pub observability: ObservabilityConfig,
}

impl AppConfig {
    /// Load the full configuration from environment variables
    pub fn from_env() -> Self {
        Self {
            server: ServerConfig::from_env(),
            database: DatabaseConfig::from_env(),
            orchestrator: OrchestratorConfig::from_env(),
            observability: ObservabilityConfig::from_env(),
        }
    }

    /// Validate the entire configuration
    pub fn validate(&self) -> Result<()> {
        Validate::validate(self).map_err(Error::from)?;
        self.validate_custom()
    }

    /// Custom validation logic that goes beyond what the validator crate can do
    fn validate_custom(&self) -> Result<()> {
        if !self.database.url.starts_with("sqlite://") {
            return Err(Error::validation("Database URL must start with 'sqlite://'"));
        }

        let range = &self.orchestrator;
        if range.port_range_start >= range.port_range_end {
            return Err(Error::validation("Branch port range start must be below its end"));
        }
        if (self.server.port as u32) >= range.port_range_start as u32
            && (self.server.port as u32) < range.port_range_end as u32
        {
            return Err(Error::validation("API server port falls inside the branch port range"));
        }

        Ok(())
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ServerConfig {
    /// Server bind address
    #[validate(length(min = 1, message = "Host cannot be empty"))]
    pub host: String,

    /// Server port
    #[validate(range(min = 1, message = "Port must be between 1 and 65535"))]
    pub port: u16,

    /// Enable CORS
    pub enable_cors: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { host: "127.0.0.1".to_string(), port: 8080, enable_cors: true }
    }
}

impl ServerConfig {
    /// Get the server bind address
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn from_env() -> Self {
        Self {
            host: env_string("POSTBRANCH_HOST", "127.0.0.1"),
            port: env_parse("POSTBRANCH_PORT", 8080),
            enable_cors: env_bool("POSTBRANCH_ENABLE_CORS", true),
        }
    }
}

/// Control-plane database configuration (SQLite)
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct DatabaseConfig {
    /// Database connection URL
    #[validate(length(min = 1, message = "Database URL cannot be empty"))]
    pub url: String,

    /// Maximum number of connections in the pool
    #[validate(range(min = 1, max = 100, message = "Max connections must be between 1 and 100"))]
    pub max_connections: u32,

    /// Minimum number of connections in the pool
    #[validate(range(max = 50, message = "Min connections must be between 0 and 50"))]
    pub min_connections: u32,

    /// Connection timeout in seconds
    #[validate(range(
        min = 1,
        max = 60,
        message = "Connect timeout must be between 1 and 60 seconds"
    ))]
    pub connect_timeout_seconds: u64,

    /// Idle timeout in seconds (0 = no timeout)
    pub idle_timeout_seconds: u64,

    /// Enable automatic migrations
    pub auto_migrate: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://./data/postbranch.db".to_string(),
            max_connections: 10,
            min_connections: 0,
            connect_timeout_seconds: 10,
            idle_timeout_seconds: 600,
            auto_migrate: true,
        }
    }
}

impl DatabaseConfig {
    /// Get connection timeout as Duration
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_seconds)
    }

    /// Get idle timeout as Duration (None if 0)
    pub fn idle_timeout(&self) -> Option<Duration> {
        if self.idle_timeout_seconds == 0 {
            None
        } else {
            Some(Duration::from_secs(self.idle_timeout_seconds))
        }
    }

    pub fn from_env() -> Self {
        Self {
            url: env_string("DATABASE_URL", "sqlite://./data/postbranch.db"),
            max_connections: env_parse("DATABASE_MAX_CONNECTIONS", 10),
            min_connections: env_parse("DATABASE_MIN_CONNECTIONS", 0),
            connect_timeout_seconds: env_parse("DATABASE_CONNECT_TIMEOUT_SECONDS", 10),
            idle_timeout_seconds: env_parse("DATABASE_IDLE_TIMEOUT_SECONDS", 600),
            auto_migrate: env_bool("DATABASE_AUTO_MIGRATE", true),
        }
    }
}

/// Lifecycle orchestrator configuration: storage layout, branch port range
/// and Postgres supervision tunables.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct OrchestratorConfig {
    /// Directory holding virtual pool disk images
    #[validate(length(min = 1, message = "Image directory cannot be empty"))]
    pub image_dir: String,

    /// Prefix for pool mount points; a repo named `orders` mounts at
    /// `{mount_prefix}orders`
    #[validate(length(min = 1, message = "Mount prefix cannot be empty"))]
    pub mount_prefix: String,

    /// First port handed out to branches (inclusive)
    pub port_range_start: u16,

    /// End of the branch port range (exclusive)
    pub port_range_end: u16,

    /// How many times a starting Postgres is polled before giving up
    #[validate(range(min = 1, max = 600, message = "Health attempts must be between 1 and 600"))]
    pub health_check_attempts: u32,

    /// Delay between health polls, in milliseconds
    #[validate(range(min = 10, message = "Health interval must be at least 10ms"))]
    pub health_check_interval_ms: u64,

    /// Interval between liveness checks on RUNNING branches, in milliseconds
    #[validate(range(min = 100, message = "Monitor interval must be at least 100ms"))]
    pub monitor_interval_ms: u64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            image_dir: "/var/lib/postbranch/images".to_string(),
            mount_prefix: "/mnt/pb-".to_string(),
            port_range_start: 5450,
            port_range_end: 8542,
            health_check_attempts: 20,
            health_check_interval_ms: 500,
            monitor_interval_ms: 5000,
        }
    }
}

impl OrchestratorConfig {
    pub fn health_check_interval(&self) -> Duration {
        Duration::from_millis(self.health_check_interval_ms)
    }

    pub fn monitor_interval(&self) -> Duration {
        Duration::from_millis(self.monitor_interval_ms)
    }

    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            image_dir: env_string("POSTBRANCH_IMAGE_DIR", &defaults.image_dir),
            mount_prefix: env_string("POSTBRANCH_MOUNT_PREFIX", &defaults.mount_prefix),
            port_range_start: env_parse("POSTBRANCH_PORT_RANGE_START", defaults.port_range_start),
            port_range_end: env_parse("POSTBRANCH_PORT_RANGE_END", defaults.port_range_end),
            health_check_attempts: env_parse(
                "POSTBRANCH_HEALTH_CHECK_ATTEMPTS",
                defaults.health_check_attempts,
            ),
            health_check_interval_ms: env_parse(
                "POSTBRANCH_HEALTH_CHECK_INTERVAL_MS",
                defaults.health_check_interval_ms,
            ),
            monitor_interval_ms: env_parse(
                "POSTBRANCH_MONITOR_INTERVAL_MS",
                defaults.monitor_interval_ms,
            ),
        }
    }
}

/// Observability configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ObservabilityConfig {
    /// Default log filter when RUST_LOG is not set
    #[validate(length(min = 1, message = "Log level cannot be empty"))]
    pub log_level: String,

    /// Emit logs as JSON lines instead of human-readable text
    pub json_logs: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self { log_level: "info".to_string(), json_logs: false }
    }
}

impl ObservabilityConfig {
    pub fn from_env() -> Self {
        Self {
            log_level: env_string("POSTBRANCH_LOG_LEVEL", "info"),
            json_logs: env_bool("POSTBRANCH_LOG_JSON", false),
        }
    }
}
