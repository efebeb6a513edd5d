//! Storage pool management.
//!
//! Each repo owns exactly one pool. Virtual pools are backed by a sparse
//! disk image under the configured image directory; block pools sit on a raw
//! device handed in by the operator. Branch datasets are CoW clones of their
//! parent's dataset, guarded by a per-parent lock so concurrent branch
//! creations from the same parent serialize instead of racing on the
//! snapshot.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::config::OrchestratorConfig;
use crate::domain::{format_short, PoolKind, RepoId};
use crate::errors::{Error, Result};
use crate::platform::{branch_data_dir, VolumeBackend};
use crate::storage::{CreatePoolRecord, PoolData, PoolRepository};

pub struct PoolManager {
    volumes: Arc<dyn VolumeBackend>,
    pools: PoolRepository,
    config: OrchestratorConfig,
    clone_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl PoolManager {
    pub fn new(volumes: Arc<dyn VolumeBackend>, pools: PoolRepository, config: OrchestratorConfig) -> Self {
        Self { volumes, pools, config, clone_locks: Mutex::new(HashMap::new()) }
    }

    /// Disk image backing a repo's virtual pool
    pub fn image_path(&self, repo_name: &str) -> PathBuf {
        Path::new(&self.config.image_dir).join(format!("{}.img", repo_name))
    }

    /// Mount point of a repo's pool
    pub fn mount_path(&self, repo_name: &str) -> String {
        format!("{}{}", self.config.mount_prefix, repo_name)
    }

    /// Data directory of a branch inside the pool
    pub fn data_dir(&self, pool: &PoolData, branch: &str) -> PathBuf {
        branch_data_dir(&pool.mount_path, branch)
    }

    pub async fn get_by_repo(&self, repo_id: &RepoId) -> Result<PoolData> {
        self.pools.get_by_repo(repo_id).await
    }

    /// Provision an image-backed pool for a repo
    pub async fn allocate_virtual(
        &self,
        repo_id: &RepoId,
        repo_name: &str,
        size_in_mb: i64,
    ) -> Result<PoolData> {
        let image = self.image_path(repo_name);
        let path = image.to_string_lossy().into_owned();
        if self.pools.exists_by_path(&path).await? {
            return Err(Error::path_conflict(format!(
                "Pool image '{}' is already claimed by another repo",
                path
            )));
        }

        let mount = self.mount_path(repo_name);
        self.volumes.create_pool(repo_name, &image, size_in_mb, Path::new(&mount)).await?;

        self.pools
            .create(CreatePoolRecord {
                repo_id: repo_id.clone(),
                kind: PoolKind::Virtual,
                size_in_mb,
                path,
                mount_path: mount,
            })
            .await
    }

    /// Provision a pool on a raw block device; its size is whatever the
    /// device provides
    pub async fn allocate_block(
        &self,
        repo_id: &RepoId,
        repo_name: &str,
        device: &str,
    ) -> Result<PoolData> {
        if self.pools.exists_by_path(device).await? {
            return Err(Error::path_conflict(format!(
                "Device '{}' is already claimed by another repo",
                device
            )));
        }

        let mount = self.mount_path(repo_name);
        self.volumes.create_block_pool(repo_name, Path::new(device), Path::new(&mount)).await?;
        let size_in_mb = self.volumes.free_space_mb(repo_name).await?;

        self.pools
            .create(CreatePoolRecord {
                repo_id: repo_id.clone(),
                kind: PoolKind::Block,
                size_in_mb,
                path: device.to_string(),
                mount_path: mount,
            })
            .await
    }

    /// Re-attach a surviving pool after a control plane restart
    pub async fn attach(&self, repo_name: &str, pool: &PoolData) -> Result<()> {
        self.volumes.attach_pool(repo_name, Path::new(&pool.path)).await
    }

    /// Tear down a pool and its backing image or device binding
    pub async fn destroy(&self, repo_name: &str, pool: &PoolData) -> Result<()> {
        self.volumes.destroy_pool(repo_name, Path::new(&pool.path)).await
    }

    pub async fn create_dataset(&self, repo_name: &str, dataset: &str) -> Result<()> {
        self.volumes.create_dataset(repo_name, dataset).await
    }

    /// Destroy a dataset subtree; safe to call on a missing dataset
    pub async fn destroy_dataset(&self, repo_name: &str, dataset: &str) -> Result<()> {
        self.volumes.destroy_dataset(repo_name, dataset).await
    }

    async fn parent_lock(&self, pool: &PoolData, parent: &str) -> Arc<Mutex<()>> {
        let key = format!("{}/{}", pool.id, parent);
        let mut locks = self.clone_locks.lock().await;
        locks.entry(key).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
    }

    /// Clone a parent branch's dataset for a new child branch
    pub async fn clone_for_branch(
        &self,
        pool: &PoolData,
        repo_name: &str,
        parent: &str,
        child: &str,
    ) -> Result<()> {
        let lock = self.parent_lock(pool, parent).await;
        let _guard = lock.lock().await;

        // Exhaustion detected later, during writes, is StorageFull; here the
        // clone is refused up front.
        let free = self.volumes.free_space_mb(repo_name).await?;
        if free <= 0 {
            return Err(Error::insufficient_space(format!(
                "Pool '{}' has no free space left ({} provisioned)",
                repo_name,
                format_short(pool.size_in_mb)
            )));
        }

        self.volumes.snapshot_clone(repo_name, parent, child).await
    }

    /// Tear down a branch's clone; safe to call repeatedly
    pub async fn release_branch(&self, repo_name: &str, parent: &str, child: &str) -> Result<()> {
        self.volumes.destroy_clone(repo_name, parent, child).await
    }
}
