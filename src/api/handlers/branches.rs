//! Branch endpoints: create a branch from a parent, close a branch.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::api::error::ApiError;
use crate::api::routes::ApiState;
use crate::domain::{BranchStatus, PgStatus};
use crate::services::CreateBranchRequest;
use crate::storage::BranchData;
use crate::validation::slug_rule;

/// Request body for creating a branch
#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateBranchBody {
    /// Name of the new branch
    #[validate(custom(function = slug_rule))]
    #[schema(example = "feature-x")]
    pub name: String,

    /// Branch to clone from; defaults to main
    #[serde(default)]
    pub parent: Option<String>,
}

/// Request body for closing a branch
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CloseBranchBody {
    pub name: String,
}

/// Branch as rendered by the API
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BranchResponse {
    pub id: String,
    pub name: String,
    pub status: BranchStatus,
    pub pg_status: PgStatus,
    pub port: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl From<BranchData> for BranchResponse {
    fn from(branch: BranchData) -> Self {
        Self {
            id: branch.id.into_string(),
            name: branch.name,
            status: branch.status,
            pg_status: branch.pg_status,
            port: branch.port,
            parent_id: branch.parent_id.map(|id| id.into_string()),
            created_at: branch.created_at,
            updated_at: branch.updated_at,
        }
    }
}

/// Create a branch
///
/// Clones the parent branch's dataset and starts an independent Postgres
/// instance on its own port. The branch is returned with its instance still
/// STARTING; poll the repo until it reports RUNNING.
#[utoipa::path(
    post,
    path = "/api/repos/{name}/branch",
    tag = "branches",
    params(("name" = String, Path, description = "Repo name")),
    request_body = CreateBranchBody,
    responses(
        (status = 201, description = "Branch created, instance starting", body = BranchResponse),
        (status = 400, description = "Bad branch name or pool out of space"),
        (status = 404, description = "Repo or parent branch not found"),
        (status = 409, description = "Name taken, repo not ready or parent not open")
    )
)]
pub async fn create_branch_handler(
    State(state): State<ApiState>,
    Path(name): Path<String>,
    Json(body): Json<CreateBranchBody>,
) -> Result<(StatusCode, Json<BranchResponse>), ApiError> {
    body.validate()?;

    let branch = state
        .orchestrator
        .create_branch(&name, CreateBranchRequest { name: body.name, parent: body.parent })
        .await?;

    Ok((StatusCode::CREATED, Json(BranchResponse::from(branch))))
}

/// Close a branch
///
/// Stops the branch's Postgres instance, destroys its dataset clone and
/// releases its port. The main branch cannot be closed.
#[utoipa::path(
    post,
    path = "/api/repos/{name}/branch/close",
    tag = "branches",
    params(("name" = String, Path, description = "Repo name")),
    request_body = CloseBranchBody,
    responses(
        (status = 200, description = "Branch closed", body = BranchResponse),
        (status = 404, description = "Repo or branch not found"),
        (status = 409, description = "Branch is main or not open")
    )
)]
pub async fn close_branch_handler(
    State(state): State<ApiState>,
    Path(name): Path<String>,
    Json(body): Json<CloseBranchBody>,
) -> Result<Json<BranchResponse>, ApiError> {
    let branch = state.orchestrator.close_branch(&name, &body.name).await?;
    Ok(Json(BranchResponse::from(branch)))
}
