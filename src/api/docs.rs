use axum::Router;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[allow(unused_imports)]
use crate::api::handlers::branches::{BranchResponse, CloseBranchBody, CreateBranchBody};
#[allow(unused_imports)]
use crate::api::handlers::repos::{
    ImportRepoBody, PoolResponse, ReimportRepoBody, RepoDetailResponse, RepoResponse,
};
#[allow(unused_imports)]
use crate::domain::{BranchStatus, PgStatus, PoolKind, RepoStatus, SourceConfig, SslMode};
#[allow(unused_imports)]
use crate::services::SourceValidation;

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::api::handlers::health::health_handler,
        crate::api::handlers::repos::list_repos_handler,
        crate::api::handlers::repos::get_repo_handler,
        crate::api::handlers::repos::import_repo_handler,
        crate::api::handlers::repos::reimport_repo_handler,
        crate::api::handlers::repos::delete_repo_handler,
        crate::api::handlers::sources::validate_source_handler,
        crate::api::handlers::branches::create_branch_handler,
        crate::api::handlers::branches::close_branch_handler
    ),
    components(schemas(
        crate::api::handlers::health::HealthResponse,
        ImportRepoBody,
        ReimportRepoBody,
        RepoResponse,
        PoolResponse,
        RepoDetailResponse,
        CreateBranchBody,
        CloseBranchBody,
        BranchResponse,
        SourceConfig,
        SslMode,
        SourceValidation,
        RepoStatus,
        BranchStatus,
        PgStatus,
        PoolKind
    )),
    tags(
        (name = "health", description = "Service health"),
        (name = "repos", description = "Repo imports and lifecycle"),
        (name = "branches", description = "Branch lifecycle")
    ),
    info(
        title = "Postbranch API",
        description = "Control plane for branchable Postgres repositories"
    )
)]
pub struct ApiDoc;

pub fn docs_router() -> Router {
    SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openapi_document_builds() {
        let doc = ApiDoc::openapi();
        let json = serde_json::to_string(&doc).unwrap();
        assert!(json.contains("/api/repos/import"));
        assert!(json.contains("/api/repos/{name}/branch/close"));
    }
}
