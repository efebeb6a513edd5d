//! Startup reconciliation after a control plane restart.

mod support;

use postbranch::domain::{BranchStatus, PgStatus, PoolKind, RepoStatus, MAIN_BRANCH};
use postbranch::platform::VolumeBackend;
use postbranch::storage::{
    BranchData, CreateBranchRecord, CreatePoolRecord, CreateRepoRecord, PoolRepository, RepoData,
    SourceRepository,
};

use support::{local_source, reboot, wait_for_pg_status, world, TestWorld};

/// Persisted state of a READY repo whose control plane died: rows are in
/// place but no Postgres instance is running and no pool is attached.
async fn seed_ready_repo(w: &TestWorld, pg_status: PgStatus) -> (RepoData, BranchData) {
    let repo = w
        .repos()
        .create(CreateRepoRecord { name: "orders".to_string(), pg_version: 16 })
        .await
        .unwrap();
    let repo = w.repos().update_status(&repo.id, RepoStatus::Ready, None).await.unwrap();

    PoolRepository::new(w.db.clone())
        .create(CreatePoolRecord {
            repo_id: repo.id.clone(),
            kind: PoolKind::Virtual,
            size_in_mb: 4096,
            path: "/var/lib/postbranch/images/orders.img".to_string(),
            mount_path: "/mnt/pb-orders".to_string(),
        })
        .await
        .unwrap();

    SourceRepository::new(w.db.clone()).upsert(&repo.id, &local_source()).await.unwrap();

    let branch = w
        .branches()
        .create(CreateBranchRecord {
            repo_id: repo.id.clone(),
            name: MAIN_BRANCH.to_string(),
            port: support::PORT_RANGE_START,
            parent_id: None,
        })
        .await
        .unwrap();
    let branch = w.branches().update_pg_status(&branch.id, pg_status).await.unwrap();

    (repo, branch)
}

#[tokio::test]
async fn interrupted_import_is_marked_failed() {
    let w = world().await;
    let repo = w
        .repos()
        .create(CreateRepoRecord { name: "orders".to_string(), pg_version: 16 })
        .await
        .unwrap();
    assert_eq!(repo.status, RepoStatus::Started);

    let w = reboot(&w);
    w.orchestrator.recover().await.unwrap();

    let repo = w.repos().get_by_name("orders").await.unwrap();
    assert_eq!(repo.status, RepoStatus::Failed);
    assert_eq!(repo.output.unwrap(), "import interrupted by restart");
}

#[tokio::test]
async fn running_branches_come_back_after_a_restart() {
    let w = world().await;
    seed_ready_repo(&w, PgStatus::Running).await;
    assert_eq!(w.processes.running_count(), 0);

    let w = reboot(&w);
    w.orchestrator.recover().await.unwrap();

    wait_for_pg_status(&w, "orders", MAIN_BRANCH, PgStatus::Running).await;
    assert_eq!(w.processes.running_count(), 1);
    assert!(w.volumes.has_pool("orders"));
}

#[tokio::test]
async fn branches_caught_mid_start_are_restarted() {
    let w = world().await;
    seed_ready_repo(&w, PgStatus::Starting).await;

    let w = reboot(&w);
    w.orchestrator.recover().await.unwrap();

    wait_for_pg_status(&w, "orders", MAIN_BRANCH, PgStatus::Running).await;
}

#[tokio::test]
async fn stopped_branches_stay_stopped() {
    let w = world().await;
    seed_ready_repo(&w, PgStatus::Stopped).await;

    let w = reboot(&w);
    w.orchestrator.recover().await.unwrap();

    let repo = w.repos().get_by_name("orders").await.unwrap();
    let main = w.branches().get_by_repo_and_name(&repo.id, MAIN_BRANCH).await.unwrap();
    assert_eq!(main.pg_status, PgStatus::Stopped);
    assert_eq!(w.processes.running_count(), 0);
    // The pool is still re-attached for the branches that may come later
    assert!(w.volumes.has_pool("orders"));
}

#[tokio::test]
async fn failed_branches_are_not_resurrected() {
    let w = world().await;
    seed_ready_repo(&w, PgStatus::Failed).await;

    let w = reboot(&w);
    w.orchestrator.recover().await.unwrap();

    let repo = w.repos().get_by_name("orders").await.unwrap();
    let main = w.branches().get_by_repo_and_name(&repo.id, MAIN_BRANCH).await.unwrap();
    assert_eq!(main.pg_status, PgStatus::Failed);
    assert_eq!(w.processes.running_count(), 0);
}

#[tokio::test]
async fn closed_branches_are_skipped() {
    let w = world().await;
    let (repo, _) = seed_ready_repo(&w, PgStatus::Running).await;
    let closed = w
        .branches()
        .create(CreateBranchRecord {
            repo_id: repo.id.clone(),
            name: "dev".to_string(),
            port: support::PORT_RANGE_START + 1,
            parent_id: None,
        })
        .await
        .unwrap();
    w.branches().update_status(&closed.id, BranchStatus::Closed).await.unwrap();
    w.branches().update_pg_status(&closed.id, PgStatus::Stopped).await.unwrap();

    let w = reboot(&w);
    w.orchestrator.recover().await.unwrap();

    wait_for_pg_status(&w, "orders", MAIN_BRANCH, PgStatus::Running).await;
    // Only main came back
    assert_eq!(w.processes.running_count(), 1);
}

#[tokio::test]
async fn failed_repos_only_get_their_pool_back() {
    let w = world().await;
    let (repo, _) = seed_ready_repo(&w, PgStatus::Running).await;
    w.repos()
        .update_status(&repo.id, RepoStatus::Failed, Some("base backup failed".to_string()))
        .await
        .unwrap();

    let w = reboot(&w);
    w.orchestrator.recover().await.unwrap();

    assert!(w.volumes.has_pool("orders"));
    assert_eq!(w.processes.running_count(), 0);
    let repo = w.repos().get_by_name("orders").await.unwrap();
    assert_eq!(repo.status, RepoStatus::Failed);
}

#[tokio::test]
async fn recovery_reports_ok_with_nothing_to_do() {
    let w = world().await;
    w.orchestrator.recover().await.unwrap();
    assert_eq!(w.repos().list().await.unwrap().len(), 0);
}

#[tokio::test]
async fn recovered_repo_accepts_new_branches() {
    use postbranch::services::CreateBranchRequest;

    let w = world().await;
    seed_ready_repo(&w, PgStatus::Running).await;
    w.volumes.attach_pool("orders", std::path::Path::new("/var/lib/postbranch/images/orders.img")).await.unwrap();
    w.volumes.create_dataset("orders", MAIN_BRANCH).await.unwrap();

    let w = reboot(&w);
    w.orchestrator.recover().await.unwrap();
    wait_for_pg_status(&w, "orders", MAIN_BRANCH, PgStatus::Running).await;

    let branch = w
        .orchestrator
        .create_branch("orders", CreateBranchRequest { name: "dev".to_string(), parent: None })
        .await
        .unwrap();
    assert_eq!(branch.port, support::PORT_RANGE_START + 1);
    wait_for_pg_status(&w, "orders", "dev", PgStatus::Running).await;
    assert_eq!(w.processes.running_count(), 2);
}
