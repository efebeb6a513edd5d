//! ZFS-backed volume implementation.
//!
//! Virtual pools are sparse disk images attached through a loop device and
//! formed into a single-vdev zpool mounted at the repo's mount path. Branch
//! datasets are zfs clones of a snapshot of their parent dataset.

use std::path::Path;

use async_trait::async_trait;
use tokio::fs;

use crate::errors::{Error, Result};
use crate::platform::{CommandRunner, VolumeBackend};

/// Snapshot name used for a branch clone: `{pool}/{parent}@pb-branch-{child}`
fn branch_snapshot(pool: &str, parent: &str, child: &str) -> String {
    format!("{}/{}@pb-branch-{}", pool, parent, child)
}

#[derive(Debug, Clone, Default)]
pub struct ZfsVolumeBackend {
    runner: CommandRunner,
}

impl ZfsVolumeBackend {
    pub fn new(runner: CommandRunner) -> Self {
        Self { runner }
    }

    /// Attach the image to a free loop device, returning the device path
    async fn attach_loop(&self, image_path: &Path) -> Result<String> {
        let image = image_path.to_string_lossy();
        self.runner.run("losetup", &["-f", "--show", image.as_ref()]).await
    }

    /// Loop device currently backing the image, if any
    async fn find_loop(&self, image_path: &Path) -> Result<Option<String>> {
        let image = image_path.to_string_lossy();
        let out = self.runner.run("losetup", &["-j", image.as_ref()]).await?;
        // Output format: /dev/loop3: [64769]:131074 (/var/lib/.../orders.img)
        Ok(out.lines().next().and_then(|l| l.split(':').next()).map(str::to_string))
    }

    fn is_missing_dataset(err: &Error) -> bool {
        matches!(err, Error::Internal(msg) if msg.contains("does not exist"))
    }
}

#[async_trait]
impl VolumeBackend for ZfsVolumeBackend {
    async fn create_pool(
        &self,
        name: &str,
        image_path: &Path,
        size_in_mb: i64,
        mount_path: &Path,
    ) -> Result<()> {
        if let Some(parent) = image_path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::io(e, format!("Failed to create {}", parent.display())))?;
        }

        // Sparse image: allocates on write, so the pool can be large without
        // consuming host space upfront.
        let file = fs::File::create(image_path)
            .await
            .map_err(|e| Error::io(e, format!("Failed to create {}", image_path.display())))?;
        file.set_len((size_in_mb as u64) * 1024 * 1024)
            .await
            .map_err(|e| Error::io(e, format!("Failed to size {}", image_path.display())))?;

        let device = self.attach_loop(image_path).await?;
        let mount = mount_path.to_string_lossy();

        let created =
            self.runner.run("zpool", &["create", "-m", mount.as_ref(), name, &device]).await;

        if let Err(e) = created {
            // Unwind the loop device and image so a retry starts clean
            let _ = self.runner.run("losetup", &["-d", &device]).await;
            let _ = fs::remove_file(image_path).await;
            return Err(e);
        }

        tracing::info!(pool = name, device = %device, mount = %mount, "Created zpool");
        Ok(())
    }

    async fn create_block_pool(&self, name: &str, device: &Path, mount_path: &Path) -> Result<()> {
        if fs::metadata(device).await.is_err() {
            return Err(Error::path(format!("Block device {} does not exist", device.display())));
        }

        let device = device.to_string_lossy();
        let mount = mount_path.to_string_lossy();
        self.runner.run("zpool", &["create", "-m", mount.as_ref(), name, device.as_ref()]).await?;

        tracing::info!(pool = name, device = %device, mount = %mount, "Created zpool on block device");
        Ok(())
    }

    async fn attach_pool(&self, name: &str, image_path: &Path) -> Result<()> {
        if fs::metadata(image_path).await.is_err() {
            return Err(Error::path(format!(
                "Pool image {} is missing",
                image_path.display()
            )));
        }

        if self.find_loop(image_path).await?.is_none() {
            self.attach_loop(image_path).await?;
        }

        // Import is a no-op if the pool is already online
        let (code, output) = self.runner.run_status("zpool", &["import", "-d", "/dev", name]).await?;
        if code != 0 && !output.contains("a pool with that name already exists")
            && !output.contains("cannot import")
        {
            return Err(Error::internal(format!("zpool import {} failed: {}", name, output)));
        }

        tracing::info!(pool = name, "Attached zpool");
        Ok(())
    }

    async fn destroy_pool(&self, name: &str, image_path: &Path) -> Result<()> {
        let (code, output) = self.runner.run_status("zpool", &["destroy", "-f", name]).await?;
        if code != 0 && !output.contains("no such pool") {
            return Err(Error::internal(format!("zpool destroy {} failed: {}", name, output)));
        }

        if let Some(device) = self.find_loop(image_path).await? {
            let _ = self.runner.run("losetup", &["-d", &device]).await;
        }

        if fs::metadata(image_path).await.is_ok() {
            fs::remove_file(image_path)
                .await
                .map_err(|e| Error::io(e, format!("Failed to remove {}", image_path.display())))?;
        }

        tracing::info!(pool = name, "Destroyed zpool");
        Ok(())
    }

    async fn create_dataset(&self, pool: &str, dataset: &str) -> Result<()> {
        self.runner.run("zfs", &["create", &format!("{}/{}", pool, dataset)]).await?;
        Ok(())
    }

    async fn snapshot_clone(&self, pool: &str, parent: &str, child: &str) -> Result<()> {
        let snapshot = branch_snapshot(pool, parent, child);
        self.runner.run("zfs", &["snapshot", &snapshot]).await?;

        let clone = format!("{}/{}", pool, child);
        if let Err(e) = self.runner.run("zfs", &["clone", &snapshot, &clone]).await {
            let _ = self.runner.run("zfs", &["destroy", &snapshot]).await;
            return Err(e);
        }

        tracing::info!(pool = pool, parent = parent, child = child, "Cloned branch dataset");
        Ok(())
    }

    async fn destroy_clone(&self, pool: &str, parent: &str, child: &str) -> Result<()> {
        self.destroy_dataset(pool, child).await?;

        // The origin snapshot survives the clone; drop it so the parent can
        // be destroyed later without -R.
        let snapshot = branch_snapshot(pool, parent, child);
        if let Err(e) = self.runner.run("zfs", &["destroy", &snapshot]).await {
            if !Self::is_missing_dataset(&e) {
                return Err(e);
            }
        }

        Ok(())
    }

    async fn destroy_dataset(&self, pool: &str, dataset: &str) -> Result<()> {
        let target = format!("{}/{}", pool, dataset);
        match self.runner.run("zfs", &["destroy", "-r", &target]).await {
            Ok(_) => Ok(()),
            Err(e) if Self::is_missing_dataset(&e) => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn free_space_mb(&self, pool: &str) -> Result<i64> {
        let out = self.runner.run("zpool", &["list", "-Hp", "-o", "free", pool]).await?;
        let bytes: i64 = out
            .trim()
            .parse()
            .map_err(|_| Error::internal(format!("Unexpected zpool free output: '{}'", out)))?;
        Ok(bytes / (1024 * 1024))
    }
}
