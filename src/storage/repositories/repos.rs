//! Repo repository: lifecycle rows for Postgres repositories.

use crate::domain::{RepoId, RepoStatus};
use crate::errors::{Error, Result};
use crate::storage::DbPool;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use tracing::instrument;

/// Database row structure for repos
#[derive(Debug, Clone, FromRow)]
struct RepoRow {
    pub id: String,
    pub name: String,
    pub pg_version: i64,
    pub status: RepoStatus,
    pub output: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

/// Repo data
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepoData {
    pub id: RepoId,
    pub name: String,
    pub pg_version: i64,
    pub status: RepoStatus,
    /// Diagnostic output of the last import attempt, `;`-joined lines
    pub output: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl From<RepoRow> for RepoData {
    fn from(row: RepoRow) -> Self {
        Self {
            id: RepoId::from_string(row.id),
            name: row.name,
            pg_version: row.pg_version,
            status: row.status,
            output: row.output,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Create repo request (always starts in STARTED, import pending)
#[derive(Debug, Clone)]
pub struct CreateRepoRecord {
    pub name: String,
    pub pg_version: i64,
}

const REPO_COLUMNS: &str = "id, name, pg_version, status, output, created_at, updated_at";

/// Repository for repo data access
#[derive(Debug, Clone)]
pub struct RepoRepository {
    pool: DbPool,
}

impl RepoRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Insert a new repo in STARTED state
    #[instrument(skip(self, record), fields(repo_name = %record.name), name = "db_create_repo")]
    pub async fn create(&self, record: CreateRepoRecord) -> Result<RepoData> {
        let id = RepoId::new();
        let now = chrono::Utc::now();

        sqlx::query(
            "INSERT INTO repos (id, name, pg_version, status, output, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, NULL, $5, $6)",
        )
        .bind(&id)
        .bind(&record.name)
        .bind(record.pg_version)
        .bind(RepoStatus::Started)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, repo_name = %record.name, "Failed to create repo");
            Error::Database { source: e, context: format!("Failed to create repo '{}'", record.name) }
        })?;

        tracing::info!(repo_id = %id, repo_name = %record.name, "Created new repo");

        self.get_by_id(&id).await
    }

    /// Get repo by ID
    #[instrument(skip(self), fields(repo_id = %id), name = "db_get_repo_by_id")]
    pub async fn get_by_id(&self, id: &RepoId) -> Result<RepoData> {
        let row = sqlx::query_as::<sqlx::Sqlite, RepoRow>(&format!(
            "SELECT {} FROM repos WHERE id = $1",
            REPO_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, repo_id = %id, "Failed to get repo by ID");
            Error::Database { source: e, context: format!("Failed to get repo with ID '{}'", id) }
        })?;

        match row {
            Some(row) => Ok(RepoData::from(row)),
            None => Err(Error::not_found(format!("Repo with ID '{}' not found", id))),
        }
    }

    /// Get repo by name
    #[instrument(skip(self), fields(repo_name = %name), name = "db_get_repo_by_name")]
    pub async fn get_by_name(&self, name: &str) -> Result<RepoData> {
        let row = sqlx::query_as::<sqlx::Sqlite, RepoRow>(&format!(
            "SELECT {} FROM repos WHERE name = $1",
            REPO_COLUMNS
        ))
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, repo_name = %name, "Failed to get repo by name");
            Error::Database { source: e, context: format!("Failed to get repo '{}'", name) }
        })?;

        match row {
            Some(row) => Ok(RepoData::from(row)),
            None => Err(Error::not_found(format!("Repo '{}' not found", name))),
        }
    }

    /// List all repos, newest first
    #[instrument(skip(self), name = "db_list_repos")]
    pub async fn list(&self) -> Result<Vec<RepoData>> {
        let rows = sqlx::query_as::<sqlx::Sqlite, RepoRow>(&format!(
            "SELECT {} FROM repos ORDER BY created_at DESC",
            REPO_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to list repos");
            Error::Database { source: e, context: "Failed to list repos".to_string() }
        })?;

        Ok(rows.into_iter().map(RepoData::from).collect())
    }

    /// Check if a repo exists by name
    #[instrument(skip(self), fields(repo_name = %name), name = "db_exists_repo_by_name")]
    pub async fn exists_by_name(&self, name: &str) -> Result<bool> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM repos WHERE name = $1")
            .bind(name)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, repo_name = %name, "Failed to check repo existence");
                Error::Database {
                    source: e,
                    context: format!("Failed to check existence of repo '{}'", name),
                }
            })?;

        Ok(count > 0)
    }

    /// Update a repo's status and diagnostic output
    #[instrument(skip(self, output), fields(repo_id = %id, status = %status), name = "db_update_repo_status")]
    pub async fn update_status(
        &self,
        id: &RepoId,
        status: RepoStatus,
        output: Option<String>,
    ) -> Result<RepoData> {
        let now = chrono::Utc::now();

        let result =
            sqlx::query("UPDATE repos SET status = $1, output = $2, updated_at = $3 WHERE id = $4")
                .bind(status)
                .bind(&output)
                .bind(now)
                .bind(id)
                .execute(&self.pool)
                .await
                .map_err(|e| {
                    tracing::error!(error = %e, repo_id = %id, "Failed to update repo status");
                    Error::Database {
                        source: e,
                        context: format!("Failed to update status of repo '{}'", id),
                    }
                })?;

        if result.rows_affected() == 0 {
            return Err(Error::not_found(format!("Repo with ID '{}' not found", id)));
        }

        tracing::info!(repo_id = %id, status = %status, "Updated repo status");

        self.get_by_id(id).await
    }

    /// Delete a repo; pools, branches and sources cascade
    #[instrument(skip(self), fields(repo_id = %id), name = "db_delete_repo")]
    pub async fn delete(&self, id: &RepoId) -> Result<()> {
        let repo = self.get_by_id(id).await?;

        sqlx::query("DELETE FROM repos WHERE id = $1").bind(id).execute(&self.pool).await.map_err(
            |e| {
                tracing::error!(error = %e, repo_id = %id, "Failed to delete repo");
                Error::Database { source: e, context: format!("Failed to delete repo '{}'", id) }
            },
        )?;

        tracing::info!(repo_id = %id, repo_name = %repo.name, "Deleted repo");

        Ok(())
    }
}
