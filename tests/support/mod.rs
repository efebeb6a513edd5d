//! Shared harness: an orchestrator wired to in-memory platform doubles and a
//! throwaway SQLite database, with tight supervision intervals so lifecycle
//! tests finish quickly.

// Each test binary uses a different slice of this harness.
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use postbranch::config::OrchestratorConfig;
use postbranch::domain::{PgStatus, RepoStatus, SourceConfig};
use postbranch::platform::testing::{
    MemoryProcessBackend, MemoryVolumeBackend, StaticSourceProbe,
};
use postbranch::platform::{ProcessBackend, SourceProbe, VolumeBackend};
use postbranch::services::Orchestrator;
use postbranch::storage::test_helpers::memory_pool;
use postbranch::storage::{BranchData, BranchRepository, DbPool, RepoData, RepoRepository};

pub const PORT_RANGE_START: u16 = 47500;

pub struct TestWorld {
    pub orchestrator: Arc<Orchestrator>,
    pub volumes: Arc<MemoryVolumeBackend>,
    pub processes: Arc<MemoryProcessBackend>,
    pub probe: Arc<StaticSourceProbe>,
    pub db: DbPool,
}

impl TestWorld {
    pub fn repos(&self) -> RepoRepository {
        RepoRepository::new(self.db.clone())
    }

    pub fn branches(&self) -> BranchRepository {
        BranchRepository::new(self.db.clone())
    }
}

/// World with a healthy 2048MB Postgres 16 source
pub async fn world() -> TestWorld {
    world_with_probe(StaticSourceProbe::new(2048, "16")).await
}

fn fast_config() -> OrchestratorConfig {
    OrchestratorConfig {
        port_range_start: PORT_RANGE_START,
        port_range_end: PORT_RANGE_START + 100,
        health_check_attempts: 3,
        health_check_interval_ms: 10,
        monitor_interval_ms: 50,
        ..OrchestratorConfig::default()
    }
}

pub async fn world_with_probe(probe: StaticSourceProbe) -> TestWorld {
    let db = memory_pool().await;
    let volumes = Arc::new(MemoryVolumeBackend::new());
    let processes = Arc::new(MemoryProcessBackend::new());
    let probe = Arc::new(probe);
    let config = fast_config();

    let orchestrator = Orchestrator::new(
        db.clone(),
        config,
        Arc::clone(&volumes) as Arc<dyn VolumeBackend>,
        Arc::clone(&processes) as Arc<dyn ProcessBackend>,
        Arc::clone(&probe) as Arc<dyn SourceProbe>,
    );

    TestWorld { orchestrator, volumes, processes, probe, db }
}

/// New orchestrator over the same database and platform doubles, as if the
/// control plane process had been restarted
pub fn reboot(world: &TestWorld) -> TestWorld {
    let orchestrator = Orchestrator::new(
        world.db.clone(),
        fast_config(),
        Arc::clone(&world.volumes) as Arc<dyn VolumeBackend>,
        Arc::clone(&world.processes) as Arc<dyn ProcessBackend>,
        Arc::clone(&world.probe) as Arc<dyn SourceProbe>,
    );

    TestWorld {
        orchestrator,
        volumes: Arc::clone(&world.volumes),
        processes: Arc::clone(&world.processes),
        probe: Arc::clone(&world.probe),
        db: world.db.clone(),
    }
}

pub fn local_source() -> SourceConfig {
    SourceConfig::Local {
        postgres_path: "/usr/lib/postgresql/16".to_string(),
        version: 16,
        os_user: "postgres".to_string(),
        stop_pg: false,
    }
}

pub async fn wait_for_repo_status(
    world: &TestWorld,
    name: &str,
    status: RepoStatus,
) -> RepoData {
    let repos = world.repos();
    for _ in 0..500 {
        let repo = repos.get_by_name(name).await.expect("repo should exist");
        if repo.status == status {
            return repo;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("repo '{}' never reached {}", name, status);
}

pub async fn wait_for_pg_status(
    world: &TestWorld,
    repo_name: &str,
    branch_name: &str,
    status: PgStatus,
) -> BranchData {
    let repos = world.repos();
    let branches = world.branches();
    for _ in 0..500 {
        let repo = repos.get_by_name(repo_name).await.expect("repo should exist");
        if let Ok(branch) = branches.get_by_repo_and_name(&repo.id, branch_name).await {
            if branch.pg_status == status {
                return branch;
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("branch '{}/{}' never reached pg status {}", repo_name, branch_name, status);
}
