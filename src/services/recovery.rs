//! Startup reconciliation.
//!
//! The control plane may have been stopped mid-import or with branches
//! running. On boot, interrupted imports are marked FAILED, surviving pools
//! are re-attached and the open branches of READY repos get their Postgres
//! instances started again. A pool that does not come back marks its repo
//! FAILED instead of aborting the whole startup.

use std::path::Path;

use crate::domain::{BranchStatus, PgStatus, RepoStatus};
use crate::errors::{Error, Result};
use crate::services::Orchestrator;
use crate::storage::RepoData;

impl Orchestrator {
    /// Bring persisted state and the host back in line after a restart
    pub async fn recover(&self) -> Result<()> {
        let repos = self.repos.list().await?;
        tracing::info!(repos = repos.len(), "Running startup reconciliation");

        for repo in repos {
            let name = repo.name.clone();
            if let Err(e) = self.recover_repo(repo).await {
                tracing::error!(repo = %name, error = %e, "Repo reconciliation failed");
            }
        }
        Ok(())
    }

    async fn recover_repo(&self, repo: RepoData) -> Result<()> {
        if repo.status == RepoStatus::Started {
            tracing::warn!(repo = %repo.name, "Marking interrupted import as failed");
            self.repos
                .update_status(
                    &repo.id,
                    RepoStatus::Failed,
                    Some("import interrupted by restart".to_string()),
                )
                .await?;
            return Ok(());
        }

        let pool = match self.pools.get_by_repo(&repo.id).await {
            Ok(pool) => pool,
            Err(Error::NotFound(_)) => return Ok(()),
            Err(e) => return Err(e),
        };

        if let Err(e) = self.pools.attach(&repo.name, &pool).await {
            tracing::error!(repo = %repo.name, error = %e, "Pool did not come back, marking repo failed");
            self.repos
                .update_status(&repo.id, RepoStatus::Failed, Some(format!("pool attach failed: {}", e)))
                .await?;
            return Ok(());
        }

        if repo.status != RepoStatus::Ready {
            return Ok(());
        }

        let source = self.sources.get_by_repo(&repo.id).await?;
        let postgres_path = Path::new(source.postgres_path()).to_path_buf();

        for branch in self.branches.list_by_repo(&repo.id).await? {
            if branch.status != BranchStatus::Open {
                continue;
            }
            match branch.pg_status {
                // An instance the operator stopped stays stopped; a failed
                // one stays failed until a manual restart.
                PgStatus::Stopped | PgStatus::Failed => continue,
                PgStatus::Starting | PgStatus::Running => {}
            }

            let data_dir = self.pools.data_dir(&pool, &branch.name);

            // A dangling instance from before the restart would make
            // pg_ctl start fail on a live postmaster.
            if let Err(e) = self.supervisor.ensure_stopped(&postgres_path, &data_dir).await {
                tracing::warn!(branch = %branch.name, error = %e, "Could not stop dangling instance");
            }

            if let Err(e) = self.supervisor.start_branch(&postgres_path, &data_dir, &branch).await {
                tracing::error!(branch = %branch.name, error = %e, "Branch did not restart");
            }
        }

        Ok(())
    }
}
