//! Lifecycle orchestrator.
//!
//! The single entry point for every repo and branch operation. Mutations on
//! a repo serialize on a per-repo lock, so an import, a branch creation and
//! a deletion can never interleave on the same repo. Long-running work
//! (imports, instance startup) is spawned; the caller gets the row in its
//! initial state and polls for the outcome.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::Instrument;

use crate::config::OrchestratorConfig;
use crate::domain::{
    format_short, to_mb, BranchStatus, PgStatus, RepoStatus, SourceConfig, MAIN_BRANCH,
    MIN_HEADROOM_MB,
};
use crate::errors::{Error, Result};
use crate::platform::{ProcessBackend, SourceProbe, VolumeBackend};
use crate::services::{ImportEngine, PgSupervisor, PoolManager, PortAllocator, SourceValidation};
use crate::storage::{
    BranchData, BranchRepository, CreateBranchRecord, CreateRepoRecord, DbPool, PoolData,
    PoolRepository, RepoData, RepoRepository, SourceRepository,
};
use crate::validation::validate_slug;

/// Parameters of a repo import
#[derive(Debug, Clone)]
pub struct CreateRepoRequest {
    pub name: String,
    /// Virtual pool size as a literal like "3.5GB"
    pub size: Option<String>,
    /// Virtual pool size in megabytes; alternative to `size`
    pub size_in_mb: Option<i64>,
    /// Raw block device for a block pool instead of a virtual one
    pub block_device: Option<String>,
    pub source: SourceConfig,
}

/// Parameters of a branch creation
#[derive(Debug, Clone)]
pub struct CreateBranchRequest {
    pub name: String,
    /// Branch to clone from; defaults to main
    pub parent: Option<String>,
}

/// A repo with its pool and branches, as returned by list and get
#[derive(Debug, Clone)]
pub struct RepoOverview {
    pub repo: RepoData,
    pub pool: Option<PoolData>,
    pub branches: Vec<BranchData>,
}

#[derive(Debug)]
enum PoolSpec {
    Virtual(i64),
    Block(String),
}

pub struct Orchestrator {
    pub(crate) repos: RepoRepository,
    pub(crate) branches: BranchRepository,
    pub(crate) sources: SourceRepository,
    pub(crate) pools: Arc<PoolManager>,
    pub(crate) ports: Arc<PortAllocator>,
    pub(crate) supervisor: Arc<PgSupervisor>,
    pub(crate) importer: Arc<ImportEngine>,
    repo_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl Orchestrator {
    pub fn new(
        db: DbPool,
        config: OrchestratorConfig,
        volumes: Arc<dyn VolumeBackend>,
        processes: Arc<dyn ProcessBackend>,
        probe: Arc<dyn SourceProbe>,
    ) -> Arc<Self> {
        let repos = RepoRepository::new(db.clone());
        let branches = BranchRepository::new(db.clone());
        let sources = SourceRepository::new(db.clone());

        let pools =
            Arc::new(PoolManager::new(volumes, PoolRepository::new(db), config.clone()));
        let ports = Arc::new(PortAllocator::new(
            config.port_range_start,
            config.port_range_end,
            branches.clone(),
        ));
        let supervisor = PgSupervisor::new(Arc::clone(&processes), branches.clone(), config);
        let importer = Arc::new(ImportEngine::new(
            probe,
            processes,
            Arc::clone(&pools),
            Arc::clone(&ports),
            Arc::clone(&supervisor),
            repos.clone(),
            branches.clone(),
        ));

        Arc::new(Self {
            repos,
            branches,
            sources,
            pools,
            ports,
            supervisor,
            importer,
            repo_locks: Mutex::new(HashMap::new()),
        })
    }

    async fn repo_lock(&self, name: &str) -> Arc<Mutex<()>> {
        let mut locks = self.repo_locks.lock().await;
        locks.entry(name.to_string()).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
    }

    /// Probe a source without creating anything
    pub async fn validate_source(&self, config: &SourceConfig) -> Result<SourceValidation> {
        self.importer.validate_source(config).await
    }

    /// Validate a source, provision a pool and kick off the import.
    /// Returns the repo in STARTED state; the import finishes in the
    /// background.
    pub async fn create_repo(&self, request: CreateRepoRequest) -> Result<RepoData> {
        validate_slug(&request.name, "Repo name")?;
        let lock = self.repo_lock(&request.name).await;
        let _guard = lock.lock().await;

        if self.repos.exists_by_name(&request.name).await? {
            return Err(Error::name_conflict(format!(
                "Repo '{}' already exists",
                request.name
            )));
        }

        let validation = self.importer.validate_source(&request.source).await?;
        let spec = Self::resolve_pool_spec(&request, validation.cluster_size_in_mb)?;

        let repo = self
            .repos
            .create(CreateRepoRecord {
                name: request.name.clone(),
                pg_version: request.source.version(),
            })
            .await?;

        let allocated = match &spec {
            PoolSpec::Virtual(size_in_mb) => {
                self.pools.allocate_virtual(&repo.id, &repo.name, *size_in_mb).await
            }
            PoolSpec::Block(device) => {
                self.pools.allocate_block(&repo.id, &repo.name, device).await
            }
        };
        let pool = match allocated {
            Ok(pool) => pool,
            Err(e) => {
                let _ = self.repos.delete(&repo.id).await;
                return Err(e);
            }
        };

        // Without the source row the import can never run or be retried, so
        // the repo and pool roll back like an allocation failure.
        if let Err(e) = self.sources.upsert(&repo.id, &request.source).await {
            let _ = self.pools.destroy(&repo.name, &pool).await;
            let _ = self.repos.delete(&repo.id).await;
            return Err(e);
        }

        self.spawn_import(repo.clone(), pool, request.source);
        Ok(repo)
    }

    /// Re-run a failed import. A new source config supersedes the stored one,
    /// so an import that failed on bad credentials or a wrong path can be
    /// retried with a corrected config.
    pub async fn reimport(
        &self,
        repo_name: &str,
        new_source: Option<SourceConfig>,
    ) -> Result<RepoData> {
        let lock = self.repo_lock(repo_name).await;
        let _guard = lock.lock().await;

        let repo = self.repos.get_by_name(repo_name).await?;
        if repo.status != RepoStatus::Failed {
            return Err(Error::invalid_state(format!(
                "Repo '{}' is {}; only a FAILED import can be retried",
                repo.name, repo.status
            )));
        }

        let pool = self.pools.get_by_repo(&repo.id).await?;

        let source = match new_source {
            Some(source) => {
                let validation = self.importer.validate_source(&source).await?;
                let required = validation.cluster_size_in_mb + MIN_HEADROOM_MB;
                if pool.size_in_mb < required {
                    return Err(Error::insufficient_space(format!(
                        "Existing pool of {} cannot hold the {} source cluster; at least {} is required",
                        format_short(pool.size_in_mb),
                        format_short(validation.cluster_size_in_mb),
                        format_short(required)
                    )));
                }
                self.sources.upsert(&repo.id, &source).await?;
                source
            }
            None => self.sources.get_by_repo(&repo.id).await?,
        };

        // Drop leftovers of the failed attempt so the import starts clean
        if let Ok(main) = self.branches.get_by_repo_and_name(&repo.id, MAIN_BRANCH).await {
            self.branches.delete(&main.id).await?;
        }

        let repo = self.repos.update_status(&repo.id, RepoStatus::Started, None).await?;
        self.spawn_import(repo.clone(), pool, source);
        Ok(repo)
    }

    pub async fn list_repos(&self) -> Result<Vec<RepoOverview>> {
        let mut overviews = Vec::new();
        for repo in self.repos.list().await? {
            overviews.push(self.overview(repo).await?);
        }
        Ok(overviews)
    }

    pub async fn get_repo(&self, name: &str) -> Result<RepoOverview> {
        let repo = self.repos.get_by_name(name).await?;
        self.overview(repo).await
    }

    /// Delete a repo, stopping its branches and destroying its pool
    pub async fn delete_repo(&self, name: &str) -> Result<()> {
        let lock = self.repo_lock(name).await;
        let _guard = lock.lock().await;

        let repo = self.repos.get_by_name(name).await?;
        if repo.status == RepoStatus::Started {
            return Err(Error::invalid_state(format!(
                "Repo '{}' is still importing; wait for it to finish or fail",
                repo.name
            )));
        }

        let pool = match self.pools.get_by_repo(&repo.id).await {
            Ok(pool) => Some(pool),
            Err(Error::NotFound(_)) => None,
            Err(e) => return Err(e),
        };

        if let Some(pool) = &pool {
            // Stop live instances before the pool is pulled out from under them
            if let Ok(source) = self.sources.get_by_repo(&repo.id).await {
                let postgres_path = Path::new(source.postgres_path()).to_path_buf();
                for branch in self.branches.list_by_repo(&repo.id).await? {
                    if branch.status != BranchStatus::Open
                        || branch.pg_status == PgStatus::Stopped
                    {
                        continue;
                    }
                    let data_dir = self.pools.data_dir(pool, &branch.name);
                    if let Err(e) =
                        self.supervisor.stop_branch(&postgres_path, &data_dir, &branch).await
                    {
                        tracing::warn!(
                            branch = %branch.name,
                            error = %e,
                            "Failed to stop branch during repo deletion"
                        );
                    }
                }
            }
            self.pools.destroy(&repo.name, pool).await?;
        }

        self.repos.delete(&repo.id).await
    }

    /// Clone a parent branch into a new one with its own Postgres instance.
    /// Returns the branch with its Postgres still STARTING; startup finishes
    /// in the background.
    pub async fn create_branch(
        &self,
        repo_name: &str,
        request: CreateBranchRequest,
    ) -> Result<BranchData> {
        validate_slug(&request.name, "Branch name")?;
        let lock = self.repo_lock(repo_name).await;
        let _guard = lock.lock().await;

        let repo = self.repos.get_by_name(repo_name).await?;
        if repo.status != RepoStatus::Ready {
            return Err(Error::invalid_state(format!(
                "Repo '{}' is {}; branches need a READY repo",
                repo.name, repo.status
            )));
        }

        if self.branches.get_by_repo_and_name(&repo.id, &request.name).await.is_ok() {
            return Err(Error::name_conflict(format!(
                "Branch '{}' already exists in repo '{}'",
                request.name, repo.name
            )));
        }

        let parent_name = request.parent.as_deref().unwrap_or(MAIN_BRANCH);
        let parent = self.branches.get_by_repo_and_name(&repo.id, parent_name).await?;
        if parent.status != BranchStatus::Open {
            return Err(Error::invalid_state(format!(
                "Parent branch '{}' is {}; only open branches can be branched from",
                parent.name, parent.status
            )));
        }
        if parent.pg_status == PgStatus::Failed {
            return Err(Error::invalid_state(format!(
                "Parent branch '{}' has a failed Postgres instance",
                parent.name
            )));
        }

        let pool = self.pools.get_by_repo(&repo.id).await?;
        let source = self.sources.get_by_repo(&repo.id).await?;

        let port = self.ports.acquire().await?;
        if let Err(e) =
            self.pools.clone_for_branch(&pool, &repo.name, &parent.name, &request.name).await
        {
            self.ports.release(port).await;
            return Err(e);
        }

        let branch = match self
            .branches
            .create(CreateBranchRecord {
                repo_id: repo.id.clone(),
                name: request.name.clone(),
                port,
                parent_id: Some(parent.id.clone()),
            })
            .await
        {
            Ok(branch) => branch,
            Err(e) => {
                let _ = self.pools.release_branch(&repo.name, &parent.name, &request.name).await;
                self.ports.release(port).await;
                return Err(e);
            }
        };
        // The branch row holds the port from here on
        self.ports.release(port).await;

        let supervisor = Arc::clone(&self.supervisor);
        let data_dir = self.pools.data_dir(&pool, &branch.name);
        let postgres_path = Path::new(source.postgres_path()).to_path_buf();
        let starting = branch.clone();
        let span = crate::job_span!("branch_start", repo.name, branch = %starting.name);
        tokio::spawn(
            async move {
                if let Err(e) =
                    supervisor.start_branch(&postgres_path, &data_dir, &starting).await
                {
                    tracing::error!(branch = %starting.name, error = %e, "Branch Postgres failed to start");
                }
            }
            .instrument(span),
        );

        Ok(branch)
    }

    /// Close a branch: stop its instance, destroy its clone, release its port
    pub async fn close_branch(&self, repo_name: &str, branch_name: &str) -> Result<BranchData> {
        let lock = self.repo_lock(repo_name).await;
        let _guard = lock.lock().await;

        if branch_name == MAIN_BRANCH {
            return Err(Error::invalid_state("The main branch cannot be closed"));
        }

        let repo = self.repos.get_by_name(repo_name).await?;
        let branch = self.branches.get_by_repo_and_name(&repo.id, branch_name).await?;
        if branch.status != BranchStatus::Open {
            return Err(Error::invalid_state(format!(
                "Branch '{}' is {}; only open branches can be closed",
                branch.name, branch.status
            )));
        }

        let pool = self.pools.get_by_repo(&repo.id).await?;
        let source = self.sources.get_by_repo(&repo.id).await?;
        let data_dir = self.pools.data_dir(&pool, &branch.name);
        self.supervisor
            .stop_branch(Path::new(source.postgres_path()), &data_dir, &branch)
            .await?;

        let parent = match &branch.parent_id {
            Some(id) => self.branches.get_by_id(id).await?.name,
            None => MAIN_BRANCH.to_string(),
        };
        self.pools.release_branch(&repo.name, &parent, &branch.name).await?;

        self.branches.update_status(&branch.id, BranchStatus::Closed).await
    }

    async fn overview(&self, repo: RepoData) -> Result<RepoOverview> {
        let pool = match self.pools.get_by_repo(&repo.id).await {
            Ok(pool) => Some(pool),
            Err(Error::NotFound(_)) => None,
            Err(e) => return Err(e),
        };
        let branches = self.branches.list_by_repo(&repo.id).await?;
        Ok(RepoOverview { repo, pool, branches })
    }

    fn resolve_pool_spec(request: &CreateRepoRequest, cluster_size_in_mb: i64) -> Result<PoolSpec> {
        if let Some(device) = &request.block_device {
            if request.size.is_some() || request.size_in_mb.is_some() {
                return Err(Error::validation(
                    "A block pool takes its size from the device; do not pass a size",
                ));
            }
            return Ok(PoolSpec::Block(device.clone()));
        }

        let size_in_mb = match (&request.size, request.size_in_mb) {
            (Some(literal), None) => to_mb(literal)?,
            (None, Some(mb)) => mb,
            (Some(_), Some(_)) => {
                return Err(Error::validation("Pass either size or sizeInMb, not both"))
            }
            (None, None) => {
                return Err(Error::validation_field("A virtual pool needs a size", "size"))
            }
        };

        let required = cluster_size_in_mb + MIN_HEADROOM_MB;
        if size_in_mb < required {
            return Err(Error::insufficient_space(format!(
                "Pool size {} cannot hold the {} source cluster; at least {} is required",
                format_short(size_in_mb),
                format_short(cluster_size_in_mb),
                format_short(required)
            )));
        }
        Ok(PoolSpec::Virtual(size_in_mb))
    }

    fn spawn_import(&self, repo: RepoData, pool: PoolData, source: SourceConfig) {
        let importer = Arc::clone(&self.importer);
        let span = crate::job_span!("import", repo.name);
        tokio::spawn(
            async move {
                importer.run(repo, pool, source).await;
            }
            .instrument(span),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(size_in_mb: Option<i64>, size: Option<&str>) -> CreateRepoRequest {
        CreateRepoRequest {
            name: "orders".to_string(),
            size: size.map(str::to_string),
            size_in_mb,
            block_device: None,
            source: SourceConfig::Local {
                postgres_path: "/usr/lib/postgresql/16".to_string(),
                version: 16,
                os_user: "postgres".to_string(),
                stop_pg: false,
            },
        }
    }

    #[test]
    fn pool_spec_enforces_headroom() {
        // 2048MB cluster needs 2048 + 512
        let err = Orchestrator::resolve_pool_spec(&request(Some(2100), None), 2048).unwrap_err();
        assert!(matches!(err, Error::InsufficientSpace(_)));
        assert!(err.to_string().contains("2.50GB"));

        assert!(Orchestrator::resolve_pool_spec(&request(Some(3072), None), 2048).is_ok());
    }

    #[test]
    fn pool_spec_accepts_size_literal() {
        match Orchestrator::resolve_pool_spec(&request(None, Some("3GB")), 2048).unwrap() {
            PoolSpec::Virtual(mb) => assert_eq!(mb, 3072),
            PoolSpec::Block(_) => panic!("expected a virtual pool"),
        }
    }

    #[test]
    fn pool_spec_rejects_ambiguous_sizing() {
        assert!(Orchestrator::resolve_pool_spec(&request(Some(3072), Some("3GB")), 10).is_err());
        assert!(Orchestrator::resolve_pool_spec(&request(None, None), 10).is_err());
    }

    #[test]
    fn block_pool_takes_no_size() {
        let mut req = request(Some(3072), None);
        req.block_device = Some("/dev/sdb".to_string());
        assert!(Orchestrator::resolve_pool_spec(&req, 10).is_err());

        req.size_in_mb = None;
        match Orchestrator::resolve_pool_spec(&req, 10).unwrap() {
            PoolSpec::Block(device) => assert_eq!(device, "/dev/sdb"),
            PoolSpec::Virtual(_) => panic!("expected a block pool"),
        }
    }
}
