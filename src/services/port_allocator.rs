//! Branch port allocation.
//!
//! Every branch instance listens on its own port taken from a fixed
//! administrative window. A port is unavailable if a non-closed branch row
//! holds it, if an in-flight creation has reserved it, or if something else
//! on the host already listens on it. Closing a branch returns its port to
//! the window.

use std::collections::HashSet;
use std::net::TcpListener;

use tokio::sync::Mutex;

use crate::errors::{Error, Result};
use crate::storage::BranchRepository;

#[derive(Debug)]
pub struct PortAllocator {
    start: u16,
    end: u16,
    branches: BranchRepository,
    /// Ports handed out but not yet persisted on a branch row
    reserved: Mutex<HashSet<u16>>,
}

impl PortAllocator {
    pub fn new(start: u16, end: u16, branches: BranchRepository) -> Self {
        Self { start, end, branches, reserved: Mutex::new(HashSet::new()) }
    }

    fn is_free_on_host(port: u16) -> bool {
        TcpListener::bind(("127.0.0.1", port)).is_ok()
    }

    /// Reserve the lowest free port in the window.
    ///
    /// The reservation must be released once the branch row holding the port
    /// exists, or via [`release`](Self::release) on a rolled-back creation.
    pub async fn acquire(&self) -> Result<u16> {
        let mut reserved = self.reserved.lock().await;
        let held: HashSet<u16> = self.branches.active_ports().await?.into_iter().collect();

        for port in self.start..self.end {
            if reserved.contains(&port) || held.contains(&port) {
                continue;
            }
            if !Self::is_free_on_host(port) {
                tracing::debug!(port = port, "Port in window is busy on the host, skipping");
                continue;
            }
            reserved.insert(port);
            tracing::debug!(port = port, "Reserved branch port");
            return Ok(port);
        }

        Err(Error::internal(format!(
            "No free branch port left in range {}..{}",
            self.start, self.end
        )))
    }

    /// Drop an in-flight reservation
    pub async fn release(&self, port: u16) {
        self.reserved.lock().await.remove(&port);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::BranchStatus;
    use crate::storage::test_helpers::memory_pool;
    use crate::storage::{
        BranchRepository, CreateBranchRecord, CreateRepoRecord, RepoData, RepoRepository,
    };

    async fn setup(start: u16, end: u16) -> (PortAllocator, BranchRepository, RepoData) {
        let pool = memory_pool().await;
        let repos = RepoRepository::new(pool.clone());
        let branches = BranchRepository::new(pool);
        let repo = repos
            .create(CreateRepoRecord { name: "orders".to_string(), pg_version: 16 })
            .await
            .unwrap();
        (PortAllocator::new(start, end, branches.clone()), branches, repo)
    }

    #[tokio::test]
    async fn hands_out_distinct_ports() {
        let (allocator, _, _) = setup(47310, 47320).await;
        let a = allocator.acquire().await.unwrap();
        let b = allocator.acquire().await.unwrap();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn skips_ports_held_by_branches() {
        let (allocator, branches, repo) = setup(47330, 47340).await;
        branches
            .create(CreateBranchRecord {
                repo_id: repo.id.clone(),
                name: "main".to_string(),
                port: 47330,
                parent_id: None,
            })
            .await
            .unwrap();

        assert_ne!(allocator.acquire().await.unwrap(), 47330);
    }

    #[tokio::test]
    async fn closed_branches_free_their_port() {
        let (allocator, branches, repo) = setup(47350, 47360).await;
        let branch = branches
            .create(CreateBranchRecord {
                repo_id: repo.id.clone(),
                name: "dev".to_string(),
                port: 47350,
                parent_id: None,
            })
            .await
            .unwrap();
        branches.update_status(&branch.id, BranchStatus::Closed).await.unwrap();

        assert_eq!(allocator.acquire().await.unwrap(), 47350);
    }

    #[tokio::test]
    async fn released_reservation_is_reusable() {
        let (allocator, _, _) = setup(47370, 47380).await;
        let port = allocator.acquire().await.unwrap();
        allocator.release(port).await;
        assert_eq!(allocator.acquire().await.unwrap(), port);
    }

    #[tokio::test]
    async fn exhausted_window_errors() {
        let (allocator, _, _) = setup(47390, 47390).await;
        let err = allocator.acquire().await.unwrap_err();
        assert!(matches!(err, Error::Internal(_)));
    }
}
