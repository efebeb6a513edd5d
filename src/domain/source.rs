//! Import source configuration.
//!
//! A source describes the external Postgres cluster a repository is imported
//! from. The two variants share a single validation and import surface; the
//! adapter-specific parts (how to connect, how to authenticate) live behind
//! the `SourceProbe` capability.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use utoipa::ToSchema;

use crate::errors::{Error, Result};

/// Supported Postgres major versions for import
pub const MIN_PG_VERSION: i64 = 15;
pub const MAX_PG_VERSION: i64 = 17;

/// SSL mode used when connecting to a host source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub enum SslMode {
    #[serde(rename = "disable")]
    Disable,
    #[serde(rename = "require")]
    Require,
    #[serde(rename = "verify-ca")]
    VerifyCa,
    #[serde(rename = "verify-full")]
    VerifyFull,
}

impl SslMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SslMode::Disable => "disable",
            SslMode::Require => "require",
            SslMode::VerifyCa => "verify-ca",
            SslMode::VerifyFull => "verify-full",
        }
    }
}

impl fmt::Display for SslMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SslMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "disable" => Ok(SslMode::Disable),
            "require" => Ok(SslMode::Require),
            "verify-ca" => Ok(SslMode::VerifyCa),
            "verify-full" => Ok(SslMode::VerifyFull),
            other => Err(Error::validation(format!("Unknown sslMode: '{}'", other))),
        }
    }
}

/// Import source, tagged by adapter kind.
///
/// `local` connects over the Unix socket as an OS user with peer
/// authentication; `host` connects over TCP with password authentication.
#[derive(Clone, Serialize, Deserialize, ToSchema)]
#[serde(tag = "type")]
pub enum SourceConfig {
    #[serde(rename = "local", rename_all = "camelCase")]
    Local {
        /// Postgres installation directory (contains bin/)
        postgres_path: String,
        /// Declared Postgres major version
        version: i64,
        /// OS user owning the source cluster
        os_user: String,
        /// Stop the source cluster before copying its data
        #[serde(default)]
        stop_pg: bool,
    },
    #[serde(rename = "host", rename_all = "camelCase")]
    Host {
        /// Postgres installation directory (contains bin/)
        postgres_path: String,
        /// Declared Postgres major version
        version: i64,
        host: String,
        port: u16,
        ssl_mode: SslMode,
        db_username: String,
        password: String,
    },
}

impl SourceConfig {
    /// Adapter kind as a short label (for logs and errors)
    pub fn kind(&self) -> &'static str {
        match self {
            SourceConfig::Local { .. } => "local",
            SourceConfig::Host { .. } => "host",
        }
    }

    /// Postgres installation directory for the source's binaries
    pub fn postgres_path(&self) -> &str {
        match self {
            SourceConfig::Local { postgres_path, .. } => postgres_path,
            SourceConfig::Host { postgres_path, .. } => postgres_path,
        }
    }

    /// Declared Postgres major version
    pub fn version(&self) -> i64 {
        match self {
            SourceConfig::Local { version, .. } => *version,
            SourceConfig::Host { version, .. } => *version,
        }
    }

    /// Whether the source cluster should be stopped before copying
    pub fn stop_pg(&self) -> bool {
        match self {
            SourceConfig::Local { stop_pg, .. } => *stop_pg,
            SourceConfig::Host { .. } => false,
        }
    }

    /// Structural validation of the config, before any probing
    pub fn validate(&self) -> Result<()> {
        if self.postgres_path().is_empty() {
            return Err(Error::validation_field("postgresPath cannot be empty", "postgresPath"));
        }
        let version = self.version();
        if !(MIN_PG_VERSION..=MAX_PG_VERSION).contains(&version) {
            return Err(Error::validation_field(
                format!(
                    "version must be between {} and {}, got {}",
                    MIN_PG_VERSION, MAX_PG_VERSION, version
                ),
                "version",
            ));
        }
        match self {
            SourceConfig::Local { os_user, .. } => {
                if os_user.is_empty() {
                    return Err(Error::validation_field("osUser cannot be empty", "osUser"));
                }
            }
            SourceConfig::Host { host, port, db_username, password, .. } => {
                if host.is_empty() {
                    return Err(Error::validation_field("host cannot be empty", "host"));
                }
                if *port == 0 {
                    return Err(Error::validation_field("port cannot be 0", "port"));
                }
                if db_username.is_empty() {
                    return Err(Error::validation_field(
                        "dbUsername cannot be empty",
                        "dbUsername",
                    ));
                }
                if password.is_empty() {
                    return Err(Error::validation_field("password cannot be empty", "password"));
                }
            }
        }
        Ok(())
    }
}

// Manual Debug keeps source passwords out of logs.
impl fmt::Debug for SourceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceConfig::Local { postgres_path, version, os_user, stop_pg } => f
                .debug_struct("Local")
                .field("postgres_path", postgres_path)
                .field("version", version)
                .field("os_user", os_user)
                .field("stop_pg", stop_pg)
                .finish(),
            SourceConfig::Host { postgres_path, version, host, port, ssl_mode, db_username, .. } => {
                f.debug_struct("Host")
                    .field("postgres_path", postgres_path)
                    .field("version", version)
                    .field("host", host)
                    .field("port", port)
                    .field("ssl_mode", ssl_mode)
                    .field("db_username", db_username)
                    .field("password", &"***")
                    .finish()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn host_config() -> SourceConfig {
        SourceConfig::Host {
            postgres_path: "/usr/lib/postgresql/16".to_string(),
            version: 16,
            host: "127.0.0.1".to_string(),
            port: 5432,
            ssl_mode: SslMode::Disable,
            db_username: "postgres".to_string(),
            password: "secret".to_string(),
        }
    }

    #[test]
    fn host_config_deserializes_from_tagged_json() {
        let json = r#"{
            "type": "host",
            "postgresPath": "/usr/lib/postgresql/16",
            "version": 16,
            "host": "127.0.0.1",
            "port": 5432,
            "sslMode": "disable",
            "dbUsername": "postgres",
            "password": "secret"
        }"#;

        let config: SourceConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.kind(), "host");
        assert_eq!(config.version(), 16);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn local_config_defaults_stop_pg() {
        let json = r#"{
            "type": "local",
            "postgresPath": "/usr/lib/postgresql/16",
            "version": 16,
            "osUser": "postgres"
        }"#;

        let config: SourceConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.kind(), "local");
        assert!(!config.stop_pg());
    }

    #[test]
    fn version_outside_supported_range_fails() {
        let mut config = host_config();
        if let SourceConfig::Host { ref mut version, .. } = config {
            *version = 14;
        }
        assert!(config.validate().is_err());
    }

    #[test]
    fn empty_host_fails_validation() {
        let mut config = host_config();
        if let SourceConfig::Host { ref mut host, .. } = config {
            host.clear();
        }
        assert!(config.validate().is_err());
    }

    #[test]
    fn debug_masks_password() {
        let rendered = format!("{:?}", host_config());
        assert!(!rendered.contains("secret"));
        assert!(rendered.contains("***"));
    }

    #[test]
    fn ssl_mode_parses_all_forms() {
        for s in ["disable", "require", "verify-ca", "verify-full"] {
            assert_eq!(s.parse::<SslMode>().unwrap().as_str(), s);
        }
        assert!("prefer".parse::<SslMode>().is_err());
    }
}
