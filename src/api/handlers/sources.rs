//! Source validation endpoint.

use axum::extract::State;
use axum::Json;

use crate::api::error::ApiError;
use crate::api::routes::ApiState;
use crate::domain::SourceConfig;
use crate::services::SourceValidation;

/// Validate an import source
///
/// Probes the source without creating anything: config shape, binaries,
/// reachability, superuser privilege, version agreement and cluster size.
/// The reported size is what pool sizing is checked against.
#[utoipa::path(
    post,
    path = "/api/repos/postgres/validate",
    tag = "repos",
    request_body = SourceConfig,
    responses(
        (status = 200, description = "Source is importable", body = SourceValidation),
        (status = 400, description = "Source unreachable, underprivileged or misdeclared")
    )
)]
pub async fn validate_source_handler(
    State(state): State<ApiState>,
    Json(config): Json<SourceConfig>,
) -> Result<Json<SourceValidation>, ApiError> {
    let validation = state.orchestrator.validate_source(&config).await?;
    Ok(Json(validation))
}
