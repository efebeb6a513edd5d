//! Branch repository: branch rows with their lifecycle and process status.

use crate::domain::{BranchId, BranchStatus, PgStatus, RepoId};
use crate::errors::{Error, Result};
use crate::storage::DbPool;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use tracing::instrument;

/// Database row structure for branches
#[derive(Debug, Clone, FromRow)]
struct BranchRow {
    pub id: String,
    pub repo_id: String,
    pub name: String,
    pub status: BranchStatus,
    pub pg_status: PgStatus,
    pub port: i64,
    pub parent_id: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

/// Branch data
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BranchData {
    pub id: BranchId,
    pub repo_id: RepoId,
    pub name: String,
    pub status: BranchStatus,
    pub pg_status: PgStatus,
    pub port: u16,
    /// NULL only for the main branch
    pub parent_id: Option<BranchId>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl From<BranchRow> for BranchData {
    fn from(row: BranchRow) -> Self {
        Self {
            id: BranchId::from_string(row.id),
            repo_id: RepoId::from_string(row.repo_id),
            name: row.name,
            status: row.status,
            pg_status: row.pg_status,
            port: row.port as u16,
            parent_id: row.parent_id.map(BranchId::from_string),
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Create branch request; new branches are always OPEN with Postgres STARTING
#[derive(Debug, Clone)]
pub struct CreateBranchRecord {
    pub repo_id: RepoId,
    pub name: String,
    pub port: u16,
    pub parent_id: Option<BranchId>,
}

const BRANCH_COLUMNS: &str =
    "id, repo_id, name, status, pg_status, port, parent_id, created_at, updated_at";

/// Repository for branch data access
#[derive(Debug, Clone)]
pub struct BranchRepository {
    pool: DbPool,
}

impl BranchRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Insert a new branch
    #[instrument(skip(self, record), fields(repo_id = %record.repo_id, branch_name = %record.name), name = "db_create_branch")]
    pub async fn create(&self, record: CreateBranchRecord) -> Result<BranchData> {
        let id = BranchId::new();
        let now = chrono::Utc::now();

        sqlx::query(
            "INSERT INTO branches (id, repo_id, name, status, pg_status, port, parent_id, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(&id)
        .bind(&record.repo_id)
        .bind(&record.name)
        .bind(BranchStatus::Open)
        .bind(PgStatus::Starting)
        .bind(record.port as i64)
        .bind(&record.parent_id)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, branch_name = %record.name, "Failed to create branch");
            Error::Database {
                source: e,
                context: format!("Failed to create branch '{}'", record.name),
            }
        })?;

        tracing::info!(
            branch_id = %id,
            repo_id = %record.repo_id,
            branch_name = %record.name,
            port = record.port,
            "Created new branch"
        );

        self.get_by_id(&id).await
    }

    /// Get branch by ID
    #[instrument(skip(self), fields(branch_id = %id), name = "db_get_branch_by_id")]
    pub async fn get_by_id(&self, id: &BranchId) -> Result<BranchData> {
        let row = sqlx::query_as::<sqlx::Sqlite, BranchRow>(&format!(
            "SELECT {} FROM branches WHERE id = $1",
            BRANCH_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, branch_id = %id, "Failed to get branch by ID");
            Error::Database { source: e, context: format!("Failed to get branch with ID '{}'", id) }
        })?;

        match row {
            Some(row) => Ok(BranchData::from(row)),
            None => Err(Error::not_found(format!("Branch with ID '{}' not found", id))),
        }
    }

    /// Get a branch by repo and name
    #[instrument(skip(self), fields(repo_id = %repo_id, branch_name = %name), name = "db_get_branch_by_name")]
    pub async fn get_by_repo_and_name(&self, repo_id: &RepoId, name: &str) -> Result<BranchData> {
        let row = sqlx::query_as::<sqlx::Sqlite, BranchRow>(&format!(
            "SELECT {} FROM branches WHERE repo_id = $1 AND name = $2",
            BRANCH_COLUMNS
        ))
        .bind(repo_id)
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, branch_name = %name, "Failed to get branch by name");
            Error::Database { source: e, context: format!("Failed to get branch '{}'", name) }
        })?;

        match row {
            Some(row) => Ok(BranchData::from(row)),
            None => Err(Error::not_found(format!("Branch '{}' not found", name))),
        }
    }

    /// List a repo's branches, oldest first (main comes first)
    #[instrument(skip(self), fields(repo_id = %repo_id), name = "db_list_branches")]
    pub async fn list_by_repo(&self, repo_id: &RepoId) -> Result<Vec<BranchData>> {
        let rows = sqlx::query_as::<sqlx::Sqlite, BranchRow>(&format!(
            "SELECT {} FROM branches WHERE repo_id = $1 ORDER BY created_at",
            BRANCH_COLUMNS
        ))
        .bind(repo_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, repo_id = %repo_id, "Failed to list branches");
            Error::Database {
                source: e,
                context: format!("Failed to list branches of repo '{}'", repo_id),
            }
        })?;

        Ok(rows.into_iter().map(BranchData::from).collect())
    }

    /// List every OPEN branch across all repos (startup reconciliation)
    #[instrument(skip(self), name = "db_list_open_branches")]
    pub async fn list_open(&self) -> Result<Vec<BranchData>> {
        let rows = sqlx::query_as::<sqlx::Sqlite, BranchRow>(&format!(
            "SELECT {} FROM branches WHERE status = $1 ORDER BY created_at",
            BRANCH_COLUMNS
        ))
        .bind(BranchStatus::Open)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to list open branches");
            Error::Database { source: e, context: "Failed to list open branches".to_string() }
        })?;

        Ok(rows.into_iter().map(BranchData::from).collect())
    }

    /// Ports held by branches that have not been closed. Closed branches give
    /// their port back to the allocator.
    #[instrument(skip(self), name = "db_active_branch_ports")]
    pub async fn active_ports(&self) -> Result<Vec<u16>> {
        let ports: Vec<i64> =
            sqlx::query_scalar("SELECT port FROM branches WHERE status != $1")
                .bind(BranchStatus::Closed)
                .fetch_all(&self.pool)
                .await
                .map_err(|e| {
                    tracing::error!(error = %e, "Failed to collect active branch ports");
                    Error::Database {
                        source: e,
                        context: "Failed to collect active branch ports".to_string(),
                    }
                })?;

        Ok(ports.into_iter().map(|p| p as u16).collect())
    }

    /// Update a branch's lifecycle status
    #[instrument(skip(self), fields(branch_id = %id, status = %status), name = "db_update_branch_status")]
    pub async fn update_status(&self, id: &BranchId, status: BranchStatus) -> Result<BranchData> {
        let now = chrono::Utc::now();

        let result =
            sqlx::query("UPDATE branches SET status = $1, updated_at = $2 WHERE id = $3")
                .bind(status)
                .bind(now)
                .bind(id)
                .execute(&self.pool)
                .await
                .map_err(|e| {
                    tracing::error!(error = %e, branch_id = %id, "Failed to update branch status");
                    Error::Database {
                        source: e,
                        context: format!("Failed to update status of branch '{}'", id),
                    }
                })?;

        if result.rows_affected() == 0 {
            return Err(Error::not_found(format!("Branch with ID '{}' not found", id)));
        }

        self.get_by_id(id).await
    }

    /// Update the status of a branch's Postgres process
    #[instrument(skip(self), fields(branch_id = %id, pg_status = %pg_status), name = "db_update_branch_pg_status")]
    pub async fn update_pg_status(&self, id: &BranchId, pg_status: PgStatus) -> Result<BranchData> {
        let now = chrono::Utc::now();

        let result =
            sqlx::query("UPDATE branches SET pg_status = $1, updated_at = $2 WHERE id = $3")
                .bind(pg_status)
                .bind(now)
                .bind(id)
                .execute(&self.pool)
                .await
                .map_err(|e| {
                    tracing::error!(error = %e, branch_id = %id, "Failed to update branch pg status");
                    Error::Database {
                        source: e,
                        context: format!("Failed to update pg status of branch '{}'", id),
                    }
                })?;

        if result.rows_affected() == 0 {
            return Err(Error::not_found(format!("Branch with ID '{}' not found", id)));
        }

        self.get_by_id(id).await
    }

    /// Delete a branch row (rollback of a failed creation)
    #[instrument(skip(self), fields(branch_id = %id), name = "db_delete_branch")]
    pub async fn delete(&self, id: &BranchId) -> Result<()> {
        sqlx::query("DELETE FROM branches WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, branch_id = %id, "Failed to delete branch");
                Error::Database { source: e, context: format!("Failed to delete branch '{}'", id) }
            })?;

        Ok(())
    }
}
