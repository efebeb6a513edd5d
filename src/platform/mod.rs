//! Platform capabilities.
//!
//! The orchestrator talks to the outside world through three traits:
//! [`VolumeBackend`] for copy-on-write storage, [`ProcessBackend`] for the
//! Postgres processes backing branches, and [`SourceProbe`] for inspecting
//! and copying import sources. Production implementations shell out to zfs
//! and pg_ctl; [`testing`] provides in-memory doubles.

mod command;
pub mod pg;
pub mod probe;
pub mod testing;
pub mod zfs;

pub use command::CommandRunner;
pub use pg::PgCtlBackend;
pub use probe::SqlxSourceProbe;
pub use zfs::ZfsVolumeBackend;

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::domain::SourceConfig;
use crate::errors::Result;

/// Copy-on-write storage pools and datasets.
///
/// A pool carries one dataset per branch; branch datasets are CoW clones of
/// their parent's dataset taken at branch-creation time.
#[async_trait]
pub trait VolumeBackend: Send + Sync {
    /// Create a virtual pool backed by a sparse disk image and mount it
    async fn create_pool(
        &self,
        name: &str,
        image_path: &Path,
        size_in_mb: i64,
        mount_path: &Path,
    ) -> Result<()>;

    /// Create a pool on a pre-existing raw block device and mount it
    async fn create_block_pool(&self, name: &str, device: &Path, mount_path: &Path) -> Result<()>;

    /// Re-attach an existing pool after a restart
    async fn attach_pool(&self, name: &str, image_path: &Path) -> Result<()>;

    /// Destroy a pool and its backing image
    async fn destroy_pool(&self, name: &str, image_path: &Path) -> Result<()>;

    /// Create an empty dataset (the main branch's data directory)
    async fn create_dataset(&self, pool: &str, dataset: &str) -> Result<()>;

    /// Snapshot `parent` and clone it as `child`
    async fn snapshot_clone(&self, pool: &str, parent: &str, child: &str) -> Result<()>;

    /// Destroy a branch clone and its origin snapshot; idempotent
    async fn destroy_clone(&self, pool: &str, parent: &str, child: &str) -> Result<()>;

    /// Destroy a dataset subtree; idempotent
    async fn destroy_dataset(&self, pool: &str, dataset: &str) -> Result<()>;

    /// Unallocated space left in the pool
    async fn free_space_mb(&self, pool: &str) -> Result<i64>;
}

/// Postgres process control for branch instances
#[async_trait]
pub trait ProcessBackend: Send + Sync {
    /// Verify the Postgres installation has the binaries we need
    async fn validate_install(&self, postgres_path: &Path) -> Result<()>;

    /// Clean stale control files and write branch-local configuration
    async fn prepare_data_dir(&self, data_dir: &Path, port: u16) -> Result<()>;

    /// Start Postgres on the data directory
    async fn start(&self, postgres_path: &Path, data_dir: &Path) -> Result<()>;

    /// Stop Postgres; succeeds if it is already down
    async fn stop(&self, postgres_path: &Path, data_dir: &Path) -> Result<()>;

    /// Whether a Postgres instance is currently serving the data directory
    async fn is_running(&self, postgres_path: &Path, data_dir: &Path) -> Result<bool>;

    /// Last lines of the instance's log, for failure diagnostics
    async fn tail_log(&self, data_dir: &Path, lines: usize) -> Result<Vec<String>>;
}

/// Read-only inspection of an import source plus the one copying operation
#[async_trait]
pub trait SourceProbe: Send + Sync {
    /// Open and close a connection, proving reachability and credentials
    async fn connect(&self, config: &SourceConfig) -> Result<()>;

    /// Whether the configured role is a superuser
    async fn is_superuser(&self, config: &SourceConfig) -> Result<bool>;

    /// Server major version, e.g. "16"
    async fn server_version(&self, config: &SourceConfig) -> Result<String>;

    /// On-disk size of the source cluster, in whole megabytes rounded up
    async fn cluster_size_mb(&self, config: &SourceConfig) -> Result<i64>;

    /// Stream a base backup of the source into `dest`
    async fn base_backup(&self, config: &SourceConfig, dest: &Path) -> Result<()>;

    /// Stop the source cluster (local sources only)
    async fn stop_source(&self, config: &SourceConfig) -> Result<()>;
}

/// Data directory of a branch inside its pool's mount
pub fn branch_data_dir(mount_path: &str, branch: &str) -> PathBuf {
    Path::new(mount_path).join(branch)
}
