//! HTTP surface: routing, status codes and JSON shapes over the real router.

mod support;

use std::time::Duration;

use axum::http::StatusCode;
use axum_test::TestServer;
use serde_json::{json, Value};

use support::world;

fn local_source_json() -> Value {
    json!({
        "type": "local",
        "postgresPath": "/usr/lib/postgresql/16",
        "version": 16,
        "osUser": "postgres"
    })
}

async fn server() -> TestServer {
    let w = world().await;
    TestServer::new(postbranch::api::build_router(w.orchestrator.clone(), false)).unwrap()
}

/// Import a repo and poll it to READY over the API
async fn import_ready_repo(server: &TestServer, name: &str) {
    let response = server
        .post("/api/repos/import")
        .json(&json!({
            "name": name,
            "sizeInMb": 4096,
            "source": local_source_json()
        }))
        .await;
    assert_eq!(response.status_code(), StatusCode::ACCEPTED);
    assert_eq!(response.json::<Value>()["status"], "STARTED");

    for _ in 0..500 {
        let detail = server.get(&format!("/api/repos/{}", name)).await.json::<Value>();
        match detail["status"].as_str() {
            Some("READY") => return,
            Some("FAILED") => panic!("import of '{}' failed: {:?}", name, detail["output"]),
            _ => tokio::time::sleep(Duration::from_millis(10)).await,
        }
    }
    panic!("import of '{}' never finished", name);
}

#[tokio::test]
async fn health_reports_ok_and_version() {
    let server = server().await;

    let response = server.get("/health").await;
    assert_eq!(response.status_code(), StatusCode::OK);

    let body = response.json::<Value>();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["version"], postbranch::VERSION);
}

#[tokio::test]
async fn repo_list_starts_empty() {
    let server = server().await;

    let response = server.get("/api/repos").await;
    assert_eq!(response.status_code(), StatusCode::OK);
    assert_eq!(response.json::<Value>(), json!([]));
}

#[tokio::test]
async fn validate_reports_cluster_facts() {
    let server = server().await;

    let response = server.post("/api/repos/postgres/validate").json(&local_source_json()).await;
    assert_eq!(response.status_code(), StatusCode::OK);

    let body = response.json::<Value>();
    assert_eq!(body["clusterSizeInMb"], 2048);
    assert_eq!(body["serverVersion"], "16");
}

#[tokio::test]
async fn import_turns_ready_and_lists_its_main_branch() {
    let server = server().await;
    import_ready_repo(&server, "orders").await;

    let detail = server.get("/api/repos/orders").await.json::<Value>();
    assert_eq!(detail["name"], "orders");
    assert_eq!(detail["pool"]["sizeInMb"], 4096);

    let branches = detail["branches"].as_array().unwrap();
    assert_eq!(branches.len(), 1);
    assert_eq!(branches[0]["name"], "main");
    assert_eq!(branches[0]["status"], "OPEN");
    assert!(branches[0]["port"].as_u64().unwrap() >= u64::from(support::PORT_RANGE_START));

    let list = server.get("/api/repos").await.json::<Value>();
    assert_eq!(list.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn unknown_repo_is_not_found() {
    let server = server().await;

    let response = server.get("/api/repos/nope").await;
    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);

    let body = response.json::<Value>();
    assert_eq!(body["error"], "not_found");
    assert!(body["message"].as_str().unwrap().contains("nope"));
}

#[tokio::test]
async fn malformed_repo_name_is_rejected() {
    let server = server().await;

    let response = server
        .post("/api/repos/import")
        .json(&json!({
            "name": "Bad Name!",
            "sizeInMb": 4096,
            "source": local_source_json()
        }))
        .await;

    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    assert_eq!(response.json::<Value>()["error"], "bad_request");
}

#[tokio::test]
async fn import_without_a_size_is_rejected() {
    let server = server().await;

    let response = server
        .post("/api/repos/import")
        .json(&json!({ "name": "orders", "source": local_source_json() }))
        .await;

    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn undersized_import_is_rejected() {
    let server = server().await;

    // 2100MB cannot hold the 2048MB cluster plus headroom
    let response = server
        .post("/api/repos/import")
        .json(&json!({
            "name": "orders",
            "sizeInMb": 2100,
            "source": local_source_json()
        }))
        .await;

    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    assert!(response.json::<Value>()["message"].as_str().unwrap().contains("2.50GB"));
}

#[tokio::test]
async fn duplicate_import_is_a_conflict() {
    let server = server().await;
    import_ready_repo(&server, "orders").await;

    let response = server
        .post("/api/repos/import")
        .json(&json!({
            "name": "orders",
            "sizeInMb": 4096,
            "source": local_source_json()
        }))
        .await;

    assert_eq!(response.status_code(), StatusCode::CONFLICT);
    assert_eq!(response.json::<Value>()["error"], "conflict");
}

#[tokio::test]
async fn reimport_of_a_ready_repo_is_a_conflict() {
    let server = server().await;
    import_ready_repo(&server, "orders").await;

    // Without a body the stored source would be replayed
    let response = server.post("/api/repos/import/orders").await;
    assert_eq!(response.status_code(), StatusCode::CONFLICT);

    // A replacement source does not bypass the state guard
    let response = server
        .post("/api/repos/import/orders")
        .json(&json!({ "source": local_source_json() }))
        .await;
    assert_eq!(response.status_code(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn branch_lifecycle_over_http() {
    let server = server().await;
    import_ready_repo(&server, "orders").await;

    let response =
        server.post("/api/repos/orders/branch").json(&json!({ "name": "dev" })).await;
    assert_eq!(response.status_code(), StatusCode::CREATED);

    let branch = response.json::<Value>();
    assert_eq!(branch["name"], "dev");
    assert_eq!(branch["status"], "OPEN");
    assert!(branch["port"].as_u64().unwrap() > u64::from(support::PORT_RANGE_START));

    let response =
        server.post("/api/repos/orders/branch/close").json(&json!({ "name": "dev" })).await;
    assert_eq!(response.status_code(), StatusCode::OK);
    assert_eq!(response.json::<Value>()["status"], "CLOSED");
}

#[tokio::test]
async fn closing_main_over_http_is_a_conflict() {
    let server = server().await;
    import_ready_repo(&server, "orders").await;

    let response =
        server.post("/api/repos/orders/branch/close").json(&json!({ "name": "main" })).await;

    assert_eq!(response.status_code(), StatusCode::CONFLICT);
    assert_eq!(response.json::<Value>()["error"], "conflict");
}

#[tokio::test]
async fn delete_over_http_removes_the_repo() {
    let server = server().await;
    import_ready_repo(&server, "orders").await;

    let response = server.delete("/api/repos/orders").await;
    assert_eq!(response.status_code(), StatusCode::NO_CONTENT);

    let response = server.get("/api/repos/orders").await;
    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn openapi_document_is_served() {
    let server = server().await;

    let response = server.get("/api-docs/openapi.json").await;
    assert_eq!(response.status_code(), StatusCode::OK);
    assert!(response.text().contains("/api/repos/import"));
}
