//! Postgres process control through pg_ctl.
//!
//! Branch instances log to `pg.log` inside their data directory. `pg_ctl
//! status` exit code 3 means "no server running"; any other non-zero exit is
//! an error.

use std::path::Path;

use async_trait::async_trait;
use tokio::fs;

use crate::errors::{Error, Result};
use crate::platform::{CommandRunner, ProcessBackend};

/// Branch instances are development copies; keep their footprint small
const MAX_CONNECTIONS: u32 = 20;

/// Log file name inside a branch data directory
pub const PG_LOG_FILE: &str = "pg.log";

/// Control files invalidated by cloning a running cluster's data directory
const STALE_FILES: &[&str] = &["postmaster.pid", "postmaster.opts", PG_LOG_FILE];

#[derive(Debug, Clone, Default)]
pub struct PgCtlBackend {
    runner: CommandRunner,
}

impl PgCtlBackend {
    pub fn new(runner: CommandRunner) -> Self {
        Self { runner }
    }

    fn pg_ctl(postgres_path: &Path) -> String {
        postgres_path.join("bin/pg_ctl").to_string_lossy().into_owned()
    }

    fn postgresql_conf(port: u16) -> String {
        // full_page_writes is redundant on a CoW filesystem and doubles the
        // write volume of every clone.
        format!(
            "listen_addresses = '*'\n\
             port = {}\n\
             max_connections = {}\n\
             full_page_writes = off\n\
             logging_collector = off\n",
            port, MAX_CONNECTIONS
        )
    }

    fn pg_hba_conf() -> &'static str {
        "local all all trust\n\
         host all all 0.0.0.0/0 md5\n\
         host all all ::0/0 md5\n"
    }
}

#[async_trait]
impl ProcessBackend for PgCtlBackend {
    async fn validate_install(&self, postgres_path: &Path) -> Result<()> {
        let mut missing = Vec::new();
        for binary in ["pg_ctl", "postgres", "pg_basebackup"] {
            let path = postgres_path.join("bin").join(binary);
            if fs::metadata(&path).await.is_err() {
                missing.push(path.display().to_string());
            }
        }

        if missing.is_empty() {
            Ok(())
        } else {
            Err(Error::path(format!(
                "Postgres installation at {} is missing: {}",
                postgres_path.display(),
                missing.join(", ")
            )))
        }
    }

    async fn prepare_data_dir(&self, data_dir: &Path, port: u16) -> Result<()> {
        for name in STALE_FILES {
            let path = data_dir.join(name);
            if fs::metadata(&path).await.is_ok() {
                fs::remove_file(&path)
                    .await
                    .map_err(|e| Error::io(e, format!("Failed to remove {}", path.display())))?;
            }
        }

        fs::write(data_dir.join("postgresql.conf"), Self::postgresql_conf(port))
            .await
            .map_err(|e| Error::io(e, "Failed to write postgresql.conf"))?;
        fs::write(data_dir.join("pg_hba.conf"), Self::pg_hba_conf())
            .await
            .map_err(|e| Error::io(e, "Failed to write pg_hba.conf"))?;

        tracing::debug!(data_dir = %data_dir.display(), port = port, "Prepared data directory");
        Ok(())
    }

    async fn start(&self, postgres_path: &Path, data_dir: &Path) -> Result<()> {
        let data = data_dir.to_string_lossy();
        let log = data_dir.join(PG_LOG_FILE);
        let log = log.to_string_lossy();

        self.runner
            .run(
                &Self::pg_ctl(postgres_path),
                &["start", "-w", "-t", "60", "-D", data.as_ref(), "-l", log.as_ref()],
            )
            .await?;

        tracing::info!(data_dir = %data_dir.display(), "Started Postgres");
        Ok(())
    }

    async fn stop(&self, postgres_path: &Path, data_dir: &Path) -> Result<()> {
        let data = data_dir.to_string_lossy();
        let (code, output) = self
            .runner
            .run_status(
                &Self::pg_ctl(postgres_path),
                &["stop", "-w", "-m", "fast", "-D", data.as_ref()],
            )
            .await?;

        if code != 0 && !output.contains("is not running") && !output.contains("No such file") {
            return Err(Error::internal(format!("pg_ctl stop failed: {}", output)));
        }

        tracing::info!(data_dir = %data_dir.display(), "Stopped Postgres");
        Ok(())
    }

    async fn is_running(&self, postgres_path: &Path, data_dir: &Path) -> Result<bool> {
        let data = data_dir.to_string_lossy();
        let (code, output) = self
            .runner
            .run_status(&Self::pg_ctl(postgres_path), &["status", "-D", data.as_ref()])
            .await?;

        match code {
            0 => Ok(true),
            // 3 = no server running, 4 = inaccessible data directory
            3 | 4 => Ok(false),
            _ => Err(Error::internal(format!("pg_ctl status failed: {}", output))),
        }
    }

    async fn tail_log(&self, data_dir: &Path, lines: usize) -> Result<Vec<String>> {
        let path = data_dir.join(PG_LOG_FILE);
        match fs::read_to_string(&path).await {
            Ok(content) => {
                let all: Vec<&str> = content.lines().collect();
                let start = all.len().saturating_sub(lines);
                Ok(all[start..].iter().map(|s| s.to_string()).collect())
            }
            Err(_) => Ok(Vec::new()),
        }
    }
}
