//! Import engine: source validation and the asynchronous primary import.
//!
//! Validation probes the source without touching any state. The import runs
//! detached from the request that triggered it: the repo row stays STARTED
//! while the base backup streams into the main dataset, then flips to READY
//! (with the main branch created and started) or FAILED with diagnostics in
//! the repo's output column.

use std::path::Path;
use std::sync::Arc;

use serde::Serialize;
use utoipa::ToSchema;

use crate::domain::{RepoStatus, SourceConfig, MAIN_BRANCH};
use crate::errors::{Error, Result};
use crate::platform::{ProcessBackend, SourceProbe};
use crate::services::{PgSupervisor, PoolManager, PortAllocator};
use crate::storage::{
    BranchRepository, CreateBranchRecord, PoolData, RepoData, RepoRepository,
};

/// Facts established about a source during validation
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SourceValidation {
    /// Measured on-disk size of the source cluster
    pub cluster_size_in_mb: i64,
    /// Major version the server actually reports
    pub server_version: String,
}

pub struct ImportEngine {
    probe: Arc<dyn SourceProbe>,
    processes: Arc<dyn ProcessBackend>,
    pools: Arc<PoolManager>,
    ports: Arc<PortAllocator>,
    supervisor: Arc<PgSupervisor>,
    repos: RepoRepository,
    branches: BranchRepository,
}

impl ImportEngine {
    pub fn new(
        probe: Arc<dyn SourceProbe>,
        processes: Arc<dyn ProcessBackend>,
        pools: Arc<PoolManager>,
        ports: Arc<PortAllocator>,
        supervisor: Arc<PgSupervisor>,
        repos: RepoRepository,
        branches: BranchRepository,
    ) -> Self {
        Self { probe, processes, pools, ports, supervisor, repos, branches }
    }

    /// Validate a source end to end: config shape, local binaries,
    /// reachability, privileges, version agreement and cluster size.
    pub async fn validate_source(&self, config: &SourceConfig) -> Result<SourceValidation> {
        config.validate()?;
        self.processes.validate_install(Path::new(config.postgres_path())).await?;
        self.probe.connect(config).await?;

        if !self.probe.is_superuser(config).await? {
            return Err(Error::privilege(
                "Source user must be a superuser to take a base backup",
            ));
        }

        let server_version = self.probe.server_version(config).await?;
        if server_version != config.version().to_string() {
            return Err(Error::validation_field(
                format!(
                    "Source server reports Postgres {} but the config declares {}",
                    server_version,
                    config.version()
                ),
                "version",
            ));
        }

        let cluster_size_in_mb = self.probe.cluster_size_mb(config).await?;
        Ok(SourceValidation { cluster_size_in_mb, server_version })
    }

    /// Run the import to completion, recording the outcome on the repo row.
    /// Meant to be spawned; never returns an error to the caller.
    pub async fn run(&self, repo: RepoData, pool: PoolData, config: SourceConfig) {
        tracing::info!(repo = %repo.name, source = config.kind(), "Starting import");

        if let Err(e) = self.import(&repo, &pool, &config).await {
            tracing::error!(repo = %repo.name, error = %e, "Import failed");
            // Captured process output is stored as one semicolon-delimited line
            let output = e
                .to_string()
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .collect::<Vec<_>>()
                .join("; ");
            if let Err(update_err) = self
                .repos
                .update_status(&repo.id, RepoStatus::Failed, Some(output))
                .await
            {
                tracing::error!(repo = %repo.name, error = %update_err, "Failed to record import failure");
            }
        }
    }

    async fn import(&self, repo: &RepoData, pool: &PoolData, config: &SourceConfig) -> Result<()> {
        if config.stop_pg() {
            self.probe.stop_source(config).await?;
        }

        // A reimport may find the dataset of the failed attempt still there
        self.pools.destroy_dataset(&repo.name, MAIN_BRANCH).await?;
        self.pools.create_dataset(&repo.name, MAIN_BRANCH).await?;
        let data_dir = self.pools.data_dir(pool, MAIN_BRANCH);

        if let Err(e) = self.probe.base_backup(config, &data_dir).await {
            let _ = self.pools.destroy_dataset(&repo.name, MAIN_BRANCH).await;
            return Err(e);
        }

        let port = match self.ports.acquire().await {
            Ok(port) => port,
            Err(e) => {
                let _ = self.pools.destroy_dataset(&repo.name, MAIN_BRANCH).await;
                return Err(e);
            }
        };

        let branch = match self
            .branches
            .create(CreateBranchRecord {
                repo_id: repo.id.clone(),
                name: MAIN_BRANCH.to_string(),
                port,
                parent_id: None,
            })
            .await
        {
            Ok(branch) => branch,
            Err(e) => {
                self.ports.release(port).await;
                let _ = self.pools.destroy_dataset(&repo.name, MAIN_BRANCH).await;
                return Err(e);
            }
        };
        // The branch row holds the port from here on
        self.ports.release(port).await;

        self.repos.update_status(&repo.id, RepoStatus::Ready, None).await?;
        tracing::info!(repo = %repo.name, port = port, "Import finished, repo is ready");

        let postgres_path = Path::new(config.postgres_path()).to_path_buf();
        if let Err(e) = self.supervisor.start_branch(&postgres_path, &data_dir, &branch).await {
            // The repo stays READY; the failure lives on the branch row
            tracing::warn!(repo = %repo.name, error = %e, "Main branch did not start after import");
        }

        Ok(())
    }
}
