//! Source inspection over the sqlx Postgres driver.
//!
//! Host sources connect over TCP with password auth; local sources connect
//! through the Unix socket as the configured OS user. The probe is read-only
//! except for [`SourceProbe::base_backup`], which shells out to
//! pg_basebackup from the source's own installation.

use std::path::Path;

use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgSslMode};
use sqlx::{ConnectOptions, Connection, PgConnection, Row};

use crate::domain::{SourceConfig, SslMode};
use crate::errors::{Error, Result};
use crate::platform::{CommandRunner, SourceProbe};

/// Socket directory used for local peer-authenticated connections
const LOCAL_SOCKET_DIR: &str = "/var/run/postgresql";

/// On-disk size of the whole cluster in whole megabytes
const CLUSTER_SIZE_QUERY: &str = "SELECT CAST(CEIL(SUM(pg_database_size(datname)) / (1024 * 1024)) AS BIGINT) AS total_db_size_mb FROM pg_database";

const SUPERUSER_QUERY: &str = "SELECT usesuper FROM pg_user WHERE usename = CURRENT_USER";

fn ssl_mode(mode: SslMode) -> PgSslMode {
    match mode {
        SslMode::Disable => PgSslMode::Disable,
        SslMode::Require => PgSslMode::Require,
        SslMode::VerifyCa => PgSslMode::VerifyCa,
        SslMode::VerifyFull => PgSslMode::VerifyFull,
    }
}

#[derive(Debug, Clone, Default)]
pub struct SqlxSourceProbe {
    runner: CommandRunner,
}

impl SqlxSourceProbe {
    pub fn new(runner: CommandRunner) -> Self {
        Self { runner }
    }

    fn connect_options(config: &SourceConfig) -> PgConnectOptions {
        match config {
            SourceConfig::Local { os_user, .. } => PgConnectOptions::new()
                .socket(LOCAL_SOCKET_DIR)
                .username(os_user)
                .database("postgres"),
            SourceConfig::Host { host, port, ssl_mode: mode, db_username, password, .. } => {
                PgConnectOptions::new()
                    .host(host)
                    .port(*port)
                    .username(db_username)
                    .password(password)
                    .ssl_mode(ssl_mode(*mode))
                    .database("postgres")
            }
        }
    }

    async fn open(&self, config: &SourceConfig) -> Result<PgConnection> {
        Self::connect_options(config).connect().await.map_err(|e| {
            Error::connection(format!("Failed to connect to {} source: {}", config.kind(), e))
        })
    }
}

#[async_trait]
impl SourceProbe for SqlxSourceProbe {
    async fn connect(&self, config: &SourceConfig) -> Result<()> {
        let mut conn = self.open(config).await?;
        conn.ping()
            .await
            .map_err(|e| Error::connection(format!("Source did not answer ping: {}", e)))?;
        let _ = conn.close().await;
        Ok(())
    }

    async fn is_superuser(&self, config: &SourceConfig) -> Result<bool> {
        let mut conn = self.open(config).await?;
        let row = sqlx::query(SUPERUSER_QUERY)
            .fetch_one(&mut conn)
            .await
            .map_err(|e| Error::connection(format!("Superuser check failed: {}", e)))?;
        let _ = conn.close().await;
        Ok(row.get::<bool, _>("usesuper"))
    }

    async fn server_version(&self, config: &SourceConfig) -> Result<String> {
        let mut conn = self.open(config).await?;
        let row = sqlx::query("SHOW server_version")
            .fetch_one(&mut conn)
            .await
            .map_err(|e| Error::connection(format!("Version check failed: {}", e)))?;
        let _ = conn.close().await;

        let full: String = row.get(0);
        // "16.4 (Debian ...)" -> "16"
        Ok(full.split('.').next().unwrap_or(&full).trim().to_string())
    }

    async fn cluster_size_mb(&self, config: &SourceConfig) -> Result<i64> {
        let mut conn = self.open(config).await?;
        let row = sqlx::query(CLUSTER_SIZE_QUERY)
            .fetch_one(&mut conn)
            .await
            .map_err(|e| Error::connection(format!("Cluster size query failed: {}", e)))?;
        let _ = conn.close().await;
        Ok(row.get::<i64, _>("total_db_size_mb"))
    }

    async fn base_backup(&self, config: &SourceConfig, dest: &Path) -> Result<()> {
        let binary = Path::new(config.postgres_path()).join("bin/pg_basebackup");
        let binary = binary.to_string_lossy();
        let dest_str = dest.to_string_lossy();

        match config {
            SourceConfig::Local { os_user, .. } => {
                self.runner
                    .run(
                        binary.as_ref(),
                        &[
                            "-h",
                            LOCAL_SOCKET_DIR,
                            "-U",
                            os_user,
                            "-D",
                            dest_str.as_ref(),
                            "-c",
                            "fast",
                        ],
                    )
                    .await?;
            }
            SourceConfig::Host { host, port, db_username, password, .. } => {
                let port = port.to_string();
                self.runner
                    .run_with_env(
                        binary.as_ref(),
                        &[
                            "-h",
                            host,
                            "-p",
                            &port,
                            "-U",
                            db_username,
                            "-D",
                            dest_str.as_ref(),
                            "-c",
                            "fast",
                        ],
                        &[("PGPASSWORD", password)],
                    )
                    .await?;
            }
        }

        tracing::info!(dest = %dest.display(), "Base backup completed");
        Ok(())
    }

    async fn stop_source(&self, config: &SourceConfig) -> Result<()> {
        match config {
            SourceConfig::Local { postgres_path, .. } => {
                let mut conn = self.open(config).await?;
                let row = sqlx::query("SHOW data_directory")
                    .fetch_one(&mut conn)
                    .await
                    .map_err(|e| {
                        Error::connection(format!("Could not resolve source data directory: {}", e))
                    })?;
                let data_dir: String = row.get(0);
                let _ = conn.close().await;

                let pg_ctl = Path::new(postgres_path).join("bin/pg_ctl");
                let pg_ctl = pg_ctl.to_string_lossy();
                self.runner
                    .run(pg_ctl.as_ref(), &["stop", "-w", "-m", "fast", "-D", &data_dir])
                    .await?;

                tracing::info!(data_dir = %data_dir, "Stopped source cluster");
                Ok(())
            }
            SourceConfig::Host { .. } => {
                Err(Error::validation("Stopping the source is only supported for local sources"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_options_carry_ssl_mode_and_credentials() {
        let config = SourceConfig::Host {
            postgres_path: "/usr/lib/postgresql/16".to_string(),
            version: 16,
            host: "db.example.com".to_string(),
            port: 5433,
            ssl_mode: SslMode::Require,
            db_username: "postgres".to_string(),
            password: "secret".to_string(),
        };

        let options = SqlxSourceProbe::connect_options(&config);
        assert_eq!(options.get_host(), "db.example.com");
        assert_eq!(options.get_port(), 5433);
        assert_eq!(options.get_username(), "postgres");
    }

    #[test]
    fn local_options_use_socket_dir() {
        let config = SourceConfig::Local {
            postgres_path: "/usr/lib/postgresql/16".to_string(),
            version: 16,
            os_user: "postgres".to_string(),
            stop_pg: false,
        };

        let options = SqlxSourceProbe::connect_options(&config);
        assert_eq!(options.get_socket().map(|p| p.to_string_lossy().into_owned()),
            Some(LOCAL_SOCKET_DIR.to_string()));
    }
}
