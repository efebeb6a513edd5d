use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::services::Orchestrator;

use super::docs;
use super::handlers::{
    close_branch_handler, create_branch_handler, delete_repo_handler, get_repo_handler,
    health_handler, import_repo_handler, list_repos_handler, reimport_repo_handler,
    validate_source_handler,
};

#[derive(Clone)]
pub struct ApiState {
    pub orchestrator: Arc<Orchestrator>,
}

pub fn build_router(orchestrator: Arc<Orchestrator>, enable_cors: bool) -> Router {
    let state = ApiState { orchestrator };

    let api = Router::new()
        .route("/repos", get(list_repos_handler))
        .route("/repos/postgres/validate", post(validate_source_handler))
        .route("/repos/import", post(import_repo_handler))
        .route("/repos/import/{name}", post(reimport_repo_handler))
        .route("/repos/{name}", get(get_repo_handler).delete(delete_repo_handler))
        .route("/repos/{name}/branch", post(create_branch_handler))
        .route("/repos/{name}/branch/close", post(close_branch_handler))
        .with_state(state);

    let router = Router::new()
        .route("/health", get(health_handler))
        .nest("/api", api)
        .merge(docs::docs_router())
        .layer(TraceLayer::new_for_http());

    if enable_cors {
        router.layer(CorsLayer::permissive())
    } else {
        router
    }
}
