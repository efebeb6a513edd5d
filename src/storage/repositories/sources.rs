//! Source repository: the validated import source of each repo, stored as
//! JSON for reimport and startup reconciliation.

use crate::domain::{RepoId, SourceConfig};
use crate::errors::{Error, Result};
use crate::storage::DbPool;
use sqlx::Row;
use tracing::instrument;
use uuid::Uuid;

/// Repository for import source data access
#[derive(Debug, Clone)]
pub struct SourceRepository {
    pool: DbPool,
}

impl SourceRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Insert or replace the source config for a repo
    #[instrument(skip(self, config), fields(repo_id = %repo_id, kind = %config.kind()), name = "db_upsert_source")]
    pub async fn upsert(&self, repo_id: &RepoId, config: &SourceConfig) -> Result<()> {
        let json = serde_json::to_string(config)
            .map_err(|e| Error::validation(format!("Invalid source config: {}", e)))?;
        let now = chrono::Utc::now();

        sqlx::query(
            "INSERT INTO sources (id, repo_id, config, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $4) \
             ON CONFLICT(repo_id) DO UPDATE SET config = excluded.config, updated_at = excluded.updated_at",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(repo_id)
        .bind(&json)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, repo_id = %repo_id, "Failed to upsert source config");
            Error::Database {
                source: e,
                context: format!("Failed to save source config for repo '{}'", repo_id),
            }
        })?;

        tracing::info!(repo_id = %repo_id, kind = %config.kind(), "Saved source config");

        Ok(())
    }

    /// Get the source config of a repo
    #[instrument(skip(self), fields(repo_id = %repo_id), name = "db_get_source")]
    pub async fn get_by_repo(&self, repo_id: &RepoId) -> Result<SourceConfig> {
        let row = sqlx::query("SELECT config FROM sources WHERE repo_id = $1")
            .bind(repo_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, repo_id = %repo_id, "Failed to get source config");
                Error::Database {
                    source: e,
                    context: format!("Failed to get source config for repo '{}'", repo_id),
                }
            })?;

        match row {
            Some(row) => {
                let json: String = row.get("config");
                serde_json::from_str(&json).map_err(|e| {
                    Error::internal(format!(
                        "Corrupt source config for repo '{}': {}",
                        repo_id, e
                    ))
                })
            }
            None => Err(Error::not_found(format!("No source config for repo '{}'", repo_id))),
        }
    }
}
