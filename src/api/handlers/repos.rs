//! Repo endpoints: import, reimport, list, get, delete.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::api::error::ApiError;
use crate::api::handlers::branches::BranchResponse;
use crate::api::routes::ApiState;
use crate::domain::{PoolKind, RepoStatus, SourceConfig};
use crate::services::{CreateRepoRequest, RepoOverview};
use crate::storage::{PoolData, RepoData};

/// Request body for importing a repo
#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ImportRepoBody {
    /// Repo name; becomes the pool name and mount directory
    #[validate(custom(function = crate::validation::slug_rule))]
    #[schema(example = "orders")]
    pub name: String,

    /// Virtual pool size as a literal like "3.5GB"
    #[serde(default)]
    #[schema(example = "10GB")]
    pub size: Option<String>,

    /// Virtual pool size in megabytes; alternative to `size`
    #[serde(default)]
    pub size_in_mb: Option<i64>,

    /// Raw block device for a block pool instead of a virtual one
    #[serde(default)]
    #[schema(example = "/dev/sdb")]
    pub block_device: Option<String>,

    /// The Postgres cluster to import from
    pub source: SourceConfig,
}

/// Repo as rendered by the API
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RepoResponse {
    pub id: String,
    pub name: String,
    pub pg_version: i64,
    pub status: RepoStatus,
    /// Diagnostics of the last failed import, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl From<RepoData> for RepoResponse {
    fn from(repo: RepoData) -> Self {
        Self {
            id: repo.id.into_string(),
            name: repo.name,
            pg_version: repo.pg_version,
            status: repo.status,
            output: repo.output,
            created_at: repo.created_at,
            updated_at: repo.updated_at,
        }
    }
}

/// Storage pool as rendered by the API
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PoolResponse {
    pub id: String,
    pub kind: PoolKind,
    pub size_in_mb: i64,
    pub path: String,
    pub mount_path: String,
}

impl From<PoolData> for PoolResponse {
    fn from(pool: PoolData) -> Self {
        Self {
            id: pool.id.into_string(),
            kind: pool.kind,
            size_in_mb: pool.size_in_mb,
            path: pool.path,
            mount_path: pool.mount_path,
        }
    }
}

/// Repo with its pool and branches
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RepoDetailResponse {
    #[serde(flatten)]
    pub repo: RepoResponse,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pool: Option<PoolResponse>,
    pub branches: Vec<BranchResponse>,
}

impl From<RepoOverview> for RepoDetailResponse {
    fn from(overview: RepoOverview) -> Self {
        Self {
            repo: RepoResponse::from(overview.repo),
            pool: overview.pool.map(PoolResponse::from),
            branches: overview.branches.into_iter().map(BranchResponse::from).collect(),
        }
    }
}

/// List repos
#[utoipa::path(
    get,
    path = "/api/repos",
    tag = "repos",
    responses(
        (status = 200, description = "All repos with their pools and branches", body = [RepoDetailResponse])
    )
)]
pub async fn list_repos_handler(
    State(state): State<ApiState>,
) -> Result<Json<Vec<RepoDetailResponse>>, ApiError> {
    let overviews = state.orchestrator.list_repos().await?;
    Ok(Json(overviews.into_iter().map(RepoDetailResponse::from).collect()))
}

/// Get a repo by name
#[utoipa::path(
    get,
    path = "/api/repos/{name}",
    tag = "repos",
    params(("name" = String, Path, description = "Repo name")),
    responses(
        (status = 200, description = "Repo detail", body = RepoDetailResponse),
        (status = 404, description = "Repo not found")
    )
)]
pub async fn get_repo_handler(
    State(state): State<ApiState>,
    Path(name): Path<String>,
) -> Result<Json<RepoDetailResponse>, ApiError> {
    let overview = state.orchestrator.get_repo(&name).await?;
    Ok(Json(RepoDetailResponse::from(overview)))
}

/// Import a repo
///
/// Validates the source, provisions a storage pool and kicks off the import.
/// Returns 202 with the repo in STARTED state; poll the repo until it turns
/// READY or FAILED.
#[utoipa::path(
    post,
    path = "/api/repos/import",
    tag = "repos",
    request_body = ImportRepoBody,
    responses(
        (status = 202, description = "Import started", body = RepoResponse),
        (status = 400, description = "Source rejected or pool too small"),
        (status = 409, description = "Name or storage path already taken")
    )
)]
pub async fn import_repo_handler(
    State(state): State<ApiState>,
    Json(body): Json<ImportRepoBody>,
) -> Result<(StatusCode, Json<RepoResponse>), ApiError> {
    body.validate()?;

    let repo = state
        .orchestrator
        .create_repo(CreateRepoRequest {
            name: body.name,
            size: body.size,
            size_in_mb: body.size_in_mb,
            block_device: body.block_device,
            source: body.source,
        })
        .await?;

    Ok((StatusCode::ACCEPTED, Json(RepoResponse::from(repo))))
}

/// Request body for retrying a failed import
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReimportRepoBody {
    /// Replacement source config; the stored one is reused when omitted
    #[serde(default)]
    pub source: Option<SourceConfig>,
}

/// Retry a failed import
///
/// Re-runs the import of a FAILED repo. The body may carry a corrected
/// source config; without one the stored config is replayed.
#[utoipa::path(
    post,
    path = "/api/repos/import/{name}",
    tag = "repos",
    params(("name" = String, Path, description = "Repo name")),
    request_body = Option<ReimportRepoBody>,
    responses(
        (status = 202, description = "Import restarted", body = RepoResponse),
        (status = 400, description = "Replacement source rejected"),
        (status = 404, description = "Repo not found"),
        (status = 409, description = "Repo is not in FAILED state")
    )
)]
pub async fn reimport_repo_handler(
    State(state): State<ApiState>,
    Path(name): Path<String>,
    body: Option<Json<ReimportRepoBody>>,
) -> Result<(StatusCode, Json<RepoResponse>), ApiError> {
    let source = body.and_then(|Json(body)| body.source);
    let repo = state.orchestrator.reimport(&name, source).await?;
    Ok((StatusCode::ACCEPTED, Json(RepoResponse::from(repo))))
}

/// Delete a repo
///
/// Stops every branch instance, destroys the pool and removes all records.
#[utoipa::path(
    delete,
    path = "/api/repos/{name}",
    tag = "repos",
    params(("name" = String, Path, description = "Repo name")),
    responses(
        (status = 204, description = "Repo deleted"),
        (status = 404, description = "Repo not found"),
        (status = 409, description = "Import still in progress")
    )
)]
pub async fn delete_repo_handler(
    State(state): State<ApiState>,
    Path(name): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.orchestrator.delete_repo(&name).await?;
    Ok(StatusCode::NO_CONTENT)
}
