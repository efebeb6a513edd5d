//! In-memory platform doubles for tests.
//!
//! These track just enough state to exercise the orchestrator: which pools
//! and datasets exist, which data directories have a "running" Postgres, and
//! what a probed source looks like. Failure injection flags let tests drive
//! the rollback paths.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::domain::SourceConfig;
use crate::errors::{Error, Result};
use crate::platform::{ProcessBackend, SourceProbe, VolumeBackend};

#[derive(Debug, Default)]
struct MemoryPool {
    datasets: HashSet<String>,
}

/// Volume backend keeping pools and datasets in a map
#[derive(Debug, Default)]
pub struct MemoryVolumeBackend {
    pools: Mutex<HashMap<String, MemoryPool>>,
    free_mb: Mutex<i64>,
    pub fail_clone: AtomicBool,
    pub fail_create_pool: AtomicBool,
}

impl MemoryVolumeBackend {
    pub fn new() -> Self {
        Self { free_mb: Mutex::new(i64::MAX / 2), ..Default::default() }
    }

    pub fn set_free_mb(&self, mb: i64) {
        *self.free_mb.lock().unwrap() = mb;
    }

    pub fn has_dataset(&self, pool: &str, dataset: &str) -> bool {
        self.pools
            .lock()
            .unwrap()
            .get(pool)
            .map(|p| p.datasets.contains(dataset))
            .unwrap_or(false)
    }

    pub fn has_pool(&self, pool: &str) -> bool {
        self.pools.lock().unwrap().contains_key(pool)
    }
}

#[async_trait]
impl VolumeBackend for MemoryVolumeBackend {
    async fn create_pool(
        &self,
        name: &str,
        _image_path: &Path,
        _size_in_mb: i64,
        _mount_path: &Path,
    ) -> Result<()> {
        if self.fail_create_pool.load(Ordering::SeqCst) {
            return Err(Error::internal("injected pool creation failure"));
        }
        let mut pools = self.pools.lock().unwrap();
        if pools.contains_key(name) {
            return Err(Error::internal(format!("pool '{}' already exists", name)));
        }
        pools.insert(name.to_string(), MemoryPool::default());
        Ok(())
    }

    async fn create_block_pool(&self, name: &str, device: &Path, _mount_path: &Path) -> Result<()> {
        let mut pools = self.pools.lock().unwrap();
        if pools.contains_key(name) {
            return Err(Error::internal(format!("pool '{}' already exists", name)));
        }
        pools.insert(name.to_string(), MemoryPool::default());
        Ok(())
    }

    async fn attach_pool(&self, name: &str, _image_path: &Path) -> Result<()> {
        let mut pools = self.pools.lock().unwrap();
        pools.entry(name.to_string()).or_default();
        Ok(())
    }

    async fn destroy_pool(&self, name: &str, _image_path: &Path) -> Result<()> {
        self.pools.lock().unwrap().remove(name);
        Ok(())
    }

    async fn create_dataset(&self, pool: &str, dataset: &str) -> Result<()> {
        let mut pools = self.pools.lock().unwrap();
        let entry = pools
            .get_mut(pool)
            .ok_or_else(|| Error::internal(format!("pool '{}' does not exist", pool)))?;
        entry.datasets.insert(dataset.to_string());
        Ok(())
    }

    async fn snapshot_clone(&self, pool: &str, parent: &str, child: &str) -> Result<()> {
        if self.fail_clone.load(Ordering::SeqCst) {
            return Err(Error::internal("injected clone failure"));
        }
        let mut pools = self.pools.lock().unwrap();
        let entry = pools
            .get_mut(pool)
            .ok_or_else(|| Error::internal(format!("pool '{}' does not exist", pool)))?;
        if !entry.datasets.contains(parent) {
            return Err(Error::internal(format!("dataset '{}/{}' does not exist", pool, parent)));
        }
        entry.datasets.insert(child.to_string());
        Ok(())
    }

    async fn destroy_clone(&self, pool: &str, _parent: &str, child: &str) -> Result<()> {
        self.destroy_dataset(pool, child).await
    }

    async fn destroy_dataset(&self, pool: &str, dataset: &str) -> Result<()> {
        if let Some(entry) = self.pools.lock().unwrap().get_mut(pool) {
            entry.datasets.remove(dataset);
        }
        Ok(())
    }

    async fn free_space_mb(&self, _pool: &str) -> Result<i64> {
        Ok(*self.free_mb.lock().unwrap())
    }
}

/// Process backend tracking "running" data directories in a set
#[derive(Debug, Default)]
pub struct MemoryProcessBackend {
    running: Mutex<HashSet<PathBuf>>,
    pub fail_start: AtomicBool,
    log_lines: Mutex<Vec<String>>,
}

impl MemoryProcessBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_log_lines(&self, lines: Vec<String>) {
        *self.log_lines.lock().unwrap() = lines;
    }

    /// Simulate an instance dying outside the supervisor's control
    pub fn kill(&self, data_dir: &Path) {
        self.running.lock().unwrap().remove(data_dir);
    }

    pub fn running_count(&self) -> usize {
        self.running.lock().unwrap().len()
    }
}

#[async_trait]
impl ProcessBackend for MemoryProcessBackend {
    async fn validate_install(&self, _postgres_path: &Path) -> Result<()> {
        Ok(())
    }

    async fn prepare_data_dir(&self, _data_dir: &Path, _port: u16) -> Result<()> {
        Ok(())
    }

    async fn start(&self, _postgres_path: &Path, data_dir: &Path) -> Result<()> {
        if self.fail_start.load(Ordering::SeqCst) {
            return Err(Error::internal("injected start failure"));
        }
        self.running.lock().unwrap().insert(data_dir.to_path_buf());
        Ok(())
    }

    async fn stop(&self, _postgres_path: &Path, data_dir: &Path) -> Result<()> {
        self.running.lock().unwrap().remove(data_dir);
        Ok(())
    }

    async fn is_running(&self, _postgres_path: &Path, data_dir: &Path) -> Result<bool> {
        Ok(self.running.lock().unwrap().contains(data_dir))
    }

    async fn tail_log(&self, _data_dir: &Path, lines: usize) -> Result<Vec<String>> {
        let log = self.log_lines.lock().unwrap();
        let start = log.len().saturating_sub(lines);
        Ok(log[start..].to_vec())
    }
}

/// Probe answering with canned source facts
#[derive(Debug)]
pub struct StaticSourceProbe {
    cluster_size_mb: AtomicI64,
    pub superuser: bool,
    pub version: String,
    pub reachable: AtomicBool,
    pub fail_backup: AtomicBool,
}

impl StaticSourceProbe {
    pub fn new(cluster_size_mb: i64, version: &str) -> Self {
        Self {
            cluster_size_mb: AtomicI64::new(cluster_size_mb),
            superuser: true,
            version: version.to_string(),
            reachable: AtomicBool::new(true),
            fail_backup: AtomicBool::new(false),
        }
    }

    pub fn non_superuser(mut self) -> Self {
        self.superuser = false;
        self
    }

    /// Simulate the source cluster growing or shrinking between probes
    pub fn set_cluster_size_mb(&self, mb: i64) {
        self.cluster_size_mb.store(mb, Ordering::SeqCst);
    }
}

#[async_trait]
impl SourceProbe for StaticSourceProbe {
    async fn connect(&self, config: &SourceConfig) -> Result<()> {
        if self.reachable.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(Error::connection(format!("Failed to connect to {} source", config.kind())))
        }
    }

    async fn is_superuser(&self, _config: &SourceConfig) -> Result<bool> {
        Ok(self.superuser)
    }

    async fn server_version(&self, _config: &SourceConfig) -> Result<String> {
        Ok(self.version.clone())
    }

    async fn cluster_size_mb(&self, _config: &SourceConfig) -> Result<i64> {
        Ok(self.cluster_size_mb.load(Ordering::SeqCst))
    }

    async fn base_backup(&self, _config: &SourceConfig, _dest: &Path) -> Result<()> {
        if self.fail_backup.load(Ordering::SeqCst) {
            // Multi-line like real pg_basebackup stderr
            Err(Error::internal(
                "injected base backup failure\npg_basebackup: error: backup aborted",
            ))
        } else {
            Ok(())
        }
    }

    async fn stop_source(&self, _config: &SourceConfig) -> Result<()> {
        Ok(())
    }
}
