//! Branch lifecycle: creation from a parent, port allocation, closing,
//! rollback on clone failure.

mod support;

use std::sync::atomic::Ordering;

use postbranch::domain::{BranchStatus, PgStatus, RepoStatus, MAIN_BRANCH};
use postbranch::errors::Error;
use postbranch::services::{CreateBranchRequest, CreateRepoRequest};

use support::{local_source, wait_for_pg_status, wait_for_repo_status, world, TestWorld};

async fn ready_world() -> TestWorld {
    let w = world().await;
    w.orchestrator
        .create_repo(CreateRepoRequest {
            name: "orders".to_string(),
            size: None,
            size_in_mb: Some(4096),
            block_device: None,
            source: local_source(),
        })
        .await
        .unwrap();
    wait_for_repo_status(&w, "orders", RepoStatus::Ready).await;
    wait_for_pg_status(&w, "orders", MAIN_BRANCH, PgStatus::Running).await;
    w
}

fn branch_request(name: &str) -> CreateBranchRequest {
    CreateBranchRequest { name: name.to_string(), parent: None }
}

#[tokio::test]
async fn branch_runs_on_its_own_port() {
    let w = ready_world().await;

    let branch = w.orchestrator.create_branch("orders", branch_request("dev")).await.unwrap();
    assert_eq!(branch.status, BranchStatus::Open);

    let branch = wait_for_pg_status(&w, "orders", "dev", PgStatus::Running).await;
    let main = w
        .branches()
        .get_by_repo_and_name(&branch.repo_id, MAIN_BRANCH)
        .await
        .unwrap();

    assert_ne!(branch.port, main.port);
    assert_eq!(branch.parent_id, Some(main.id));
    assert!(w.volumes.has_dataset("orders", "dev"));
    assert_eq!(w.processes.running_count(), 2);
}

#[tokio::test]
async fn branches_can_stack_on_a_named_parent() {
    let w = ready_world().await;
    w.orchestrator.create_branch("orders", branch_request("dev")).await.unwrap();
    wait_for_pg_status(&w, "orders", "dev", PgStatus::Running).await;

    let grandchild = w
        .orchestrator
        .create_branch(
            "orders",
            CreateBranchRequest { name: "dev-fix".to_string(), parent: Some("dev".to_string()) },
        )
        .await
        .unwrap();

    let dev = w
        .branches()
        .get_by_repo_and_name(&grandchild.repo_id, "dev")
        .await
        .unwrap();
    assert_eq!(grandchild.parent_id, Some(dev.id));
}

#[tokio::test]
async fn closing_a_branch_frees_dataset_and_port() {
    let w = ready_world().await;
    let dev = w.orchestrator.create_branch("orders", branch_request("dev")).await.unwrap();
    wait_for_pg_status(&w, "orders", "dev", PgStatus::Running).await;

    let closed = w.orchestrator.close_branch("orders", "dev").await.unwrap();
    assert_eq!(closed.status, BranchStatus::Closed);
    assert_eq!(closed.pg_status, PgStatus::Stopped);
    assert!(!w.volumes.has_dataset("orders", "dev"));
    assert_eq!(w.processes.running_count(), 1);

    // The closed branch's port goes back into the window
    let next = w.orchestrator.create_branch("orders", branch_request("dev2")).await.unwrap();
    assert_eq!(next.port, dev.port);
}

#[tokio::test]
async fn main_branch_cannot_be_closed() {
    let w = ready_world().await;
    let err = w.orchestrator.close_branch("orders", MAIN_BRANCH).await.unwrap_err();
    assert!(matches!(err, Error::InvalidState(_)));
}

#[tokio::test]
async fn closing_twice_is_an_invalid_state() {
    let w = ready_world().await;
    w.orchestrator.create_branch("orders", branch_request("dev")).await.unwrap();
    wait_for_pg_status(&w, "orders", "dev", PgStatus::Running).await;

    w.orchestrator.close_branch("orders", "dev").await.unwrap();
    let err = w.orchestrator.close_branch("orders", "dev").await.unwrap_err();
    assert!(matches!(err, Error::InvalidState(_)));
}

#[tokio::test]
async fn closed_parent_cannot_be_branched_from() {
    let w = ready_world().await;
    w.orchestrator.create_branch("orders", branch_request("dev")).await.unwrap();
    wait_for_pg_status(&w, "orders", "dev", PgStatus::Running).await;
    w.orchestrator.close_branch("orders", "dev").await.unwrap();

    let err = w
        .orchestrator
        .create_branch(
            "orders",
            CreateBranchRequest { name: "child".to_string(), parent: Some("dev".to_string()) },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidState(_)));
}

#[tokio::test]
async fn branch_names_stay_unique_even_after_closing() {
    let w = ready_world().await;
    w.orchestrator.create_branch("orders", branch_request("dev")).await.unwrap();
    wait_for_pg_status(&w, "orders", "dev", PgStatus::Running).await;

    let err = w.orchestrator.create_branch("orders", branch_request("dev")).await.unwrap_err();
    assert!(matches!(err, Error::NameConflict(_)));

    // A closed branch still owns its name
    w.orchestrator.close_branch("orders", "dev").await.unwrap();
    let err = w.orchestrator.create_branch("orders", branch_request("dev")).await.unwrap_err();
    assert!(matches!(err, Error::NameConflict(_)));
}

#[tokio::test]
async fn failed_clone_leaves_no_row_and_no_leaked_port() {
    let w = ready_world().await;
    w.volumes.fail_clone.store(true, Ordering::SeqCst);

    let err = w.orchestrator.create_branch("orders", branch_request("dev")).await.unwrap_err();
    assert!(matches!(err, Error::Internal(_)));

    let repo = w.repos().get_by_name("orders").await.unwrap();
    assert_eq!(w.branches().list_by_repo(&repo.id).await.unwrap().len(), 1);

    // The reserved port came back; the retry gets the first free one again
    w.volumes.fail_clone.store(false, Ordering::SeqCst);
    let main = w.branches().get_by_repo_and_name(&repo.id, MAIN_BRANCH).await.unwrap();
    let branch = w.orchestrator.create_branch("orders", branch_request("dev")).await.unwrap();
    assert_eq!(branch.port, main.port + 1);
}

#[tokio::test]
async fn full_pool_rejects_new_branches_up_front() {
    let w = ready_world().await;
    w.volumes.set_free_mb(0);

    let err = w.orchestrator.create_branch("orders", branch_request("dev")).await.unwrap_err();
    assert!(matches!(err, Error::InsufficientSpace(_)));

    // No row was written and nothing was cloned
    let repo = w.repos().get_by_name("orders").await.unwrap();
    assert_eq!(w.branches().list_by_repo(&repo.id).await.unwrap().len(), 1);
    assert!(!w.volumes.has_dataset("orders", "dev"));
}

#[tokio::test]
async fn branches_need_a_ready_repo() {
    let w = world().await;
    w.probe.fail_backup.store(true, Ordering::SeqCst);
    w.orchestrator
        .create_repo(CreateRepoRequest {
            name: "orders".to_string(),
            size: None,
            size_in_mb: Some(4096),
            block_device: None,
            source: local_source(),
        })
        .await
        .unwrap();
    wait_for_repo_status(&w, "orders", RepoStatus::Failed).await;

    let err = w.orchestrator.create_branch("orders", branch_request("dev")).await.unwrap_err();
    assert!(matches!(err, Error::InvalidState(_)));
}

#[tokio::test]
async fn dead_instance_is_recorded_by_the_monitor() {
    let w = ready_world().await;
    w.orchestrator.create_branch("orders", branch_request("dev")).await.unwrap();
    wait_for_pg_status(&w, "orders", "dev", PgStatus::Running).await;

    w.processes.kill(std::path::Path::new("/mnt/pb-orders/dev"));
    wait_for_pg_status(&w, "orders", "dev", PgStatus::Failed).await;
}
