//! Branch Postgres supervision.
//!
//! Starting a branch prepares its data directory, launches Postgres and
//! polls it until it answers or the attempt budget runs out. A RUNNING
//! branch gets a monitor task that notices the process dying out-of-band and
//! records the failure on the branch row. There is no automatic restart; a
//! failed instance stays FAILED until an operator intervenes.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::config::OrchestratorConfig;
use crate::domain::{BranchId, BranchStatus, PgStatus};
use crate::errors::{Error, Result};
use crate::platform::ProcessBackend;
use crate::storage::{BranchData, BranchRepository};

/// How many log lines are captured when an instance fails
const FAILURE_LOG_LINES: usize = 20;

pub struct PgSupervisor {
    processes: Arc<dyn ProcessBackend>,
    branches: BranchRepository,
    config: OrchestratorConfig,
    monitors: Mutex<HashMap<BranchId, JoinHandle<()>>>,
}

impl PgSupervisor {
    pub fn new(
        processes: Arc<dyn ProcessBackend>,
        branches: BranchRepository,
        config: OrchestratorConfig,
    ) -> Arc<Self> {
        Arc::new(Self { processes, branches, config, monitors: Mutex::new(HashMap::new()) })
    }

    /// Start Postgres for a branch and keep watching it
    pub async fn start_branch(
        self: &Arc<Self>,
        postgres_path: &Path,
        data_dir: &Path,
        branch: &BranchData,
    ) -> Result<()> {
        self.branches.update_pg_status(&branch.id, PgStatus::Starting).await?;
        self.processes.prepare_data_dir(data_dir, branch.port).await?;

        if let Err(e) = self.processes.start(postgres_path, data_dir).await {
            self.mark_failed(&branch.id, data_dir).await;
            return Err(e);
        }

        if !self.wait_until_up(postgres_path, data_dir).await? {
            let _ = self.processes.stop(postgres_path, data_dir).await;
            self.mark_failed(&branch.id, data_dir).await;
            return Err(Error::internal(format!(
                "Postgres for branch '{}' did not become ready within {} attempts",
                branch.name, self.config.health_check_attempts
            )));
        }

        self.branches.update_pg_status(&branch.id, PgStatus::Running).await?;
        tracing::info!(branch = %branch.name, port = branch.port, "Branch Postgres is running");

        self.spawn_monitor(postgres_path.to_path_buf(), data_dir.to_path_buf(), branch.id.clone())
            .await;
        Ok(())
    }

    /// Stop a branch's Postgres and its monitor
    pub async fn stop_branch(
        &self,
        postgres_path: &Path,
        data_dir: &Path,
        branch: &BranchData,
    ) -> Result<()> {
        if let Some(handle) = self.monitors.lock().await.remove(&branch.id) {
            handle.abort();
        }

        self.processes.stop(postgres_path, data_dir).await?;
        self.branches.update_pg_status(&branch.id, PgStatus::Stopped).await?;
        tracing::info!(branch = %branch.name, "Stopped branch Postgres");
        Ok(())
    }

    /// Stop whatever serves the data directory without touching the branch
    /// record (startup reconciliation)
    pub async fn ensure_stopped(&self, postgres_path: &Path, data_dir: &Path) -> Result<()> {
        self.processes.stop(postgres_path, data_dir).await
    }

    async fn wait_until_up(&self, postgres_path: &Path, data_dir: &Path) -> Result<bool> {
        for _ in 0..self.config.health_check_attempts {
            if self.processes.is_running(postgres_path, data_dir).await? {
                return Ok(true);
            }
            tokio::time::sleep(self.config.health_check_interval()).await;
        }
        Ok(false)
    }

    async fn mark_failed(&self, id: &BranchId, data_dir: &Path) {
        let tail = self.processes.tail_log(data_dir, FAILURE_LOG_LINES).await.unwrap_or_default();
        if !tail.is_empty() {
            tracing::error!(branch_id = %id, log = %tail.join("; "), "Branch Postgres failed");
        }
        if let Err(e) = self.branches.update_pg_status(id, PgStatus::Failed).await {
            tracing::error!(error = %e, branch_id = %id, "Failed to record branch failure");
        }
    }

    async fn spawn_monitor(self: &Arc<Self>, postgres_path: PathBuf, data_dir: PathBuf, id: BranchId) {
        let supervisor = Arc::clone(self);
        let monitor_id = id.clone();

        let handle = tokio::spawn(async move {
            loop {
                tokio::time::sleep(supervisor.config.monitor_interval()).await;

                let branch = match supervisor.branches.get_by_id(&monitor_id).await {
                    Ok(branch) => branch,
                    Err(_) => break,
                };
                if branch.status != BranchStatus::Open || branch.pg_status != PgStatus::Running {
                    break;
                }

                match supervisor.processes.is_running(&postgres_path, &data_dir).await {
                    Ok(true) => {}
                    Ok(false) => {
                        tracing::warn!(branch = %branch.name, "Branch Postgres exited unexpectedly");
                        supervisor.mark_failed(&monitor_id, &data_dir).await;
                        break;
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, branch = %branch.name, "Branch liveness check failed");
                    }
                }
            }
        });

        if let Some(old) = self.monitors.lock().await.insert(id, handle) {
            old.abort();
        }
    }
}
