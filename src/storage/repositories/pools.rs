//! Pool repository: storage pool rows, one per repo.

use crate::domain::{PoolId, PoolKind, RepoId};
use crate::errors::{Error, Result};
use crate::storage::DbPool;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use tracing::instrument;

/// Database row structure for pools
#[derive(Debug, Clone, FromRow)]
struct PoolRow {
    pub id: String,
    pub repo_id: String,
    pub kind: PoolKind,
    pub size_in_mb: i64,
    pub path: String,
    pub mount_path: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

/// Storage pool data
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolData {
    pub id: PoolId,
    pub repo_id: RepoId,
    pub kind: PoolKind,
    /// Provisioned size; immutable after creation
    pub size_in_mb: i64,
    /// Backing device or disk image path
    pub path: String,
    /// Filesystem mount point of the pool
    pub mount_path: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl From<PoolRow> for PoolData {
    fn from(row: PoolRow) -> Self {
        Self {
            id: PoolId::from_string(row.id),
            repo_id: RepoId::from_string(row.repo_id),
            kind: row.kind,
            size_in_mb: row.size_in_mb,
            path: row.path,
            mount_path: row.mount_path,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Create pool request
#[derive(Debug, Clone)]
pub struct CreatePoolRecord {
    pub repo_id: RepoId,
    pub kind: PoolKind,
    pub size_in_mb: i64,
    pub path: String,
    pub mount_path: String,
}

const POOL_COLUMNS: &str = "id, repo_id, kind, size_in_mb, path, mount_path, created_at, updated_at";

/// Repository for pool data access
#[derive(Debug, Clone)]
pub struct PoolRepository {
    pool: DbPool,
}

impl PoolRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Insert a new pool
    #[instrument(skip(self, record), fields(repo_id = %record.repo_id, path = %record.path), name = "db_create_pool")]
    pub async fn create(&self, record: CreatePoolRecord) -> Result<PoolData> {
        let id = PoolId::new();
        let now = chrono::Utc::now();

        sqlx::query(
            "INSERT INTO pools (id, repo_id, kind, size_in_mb, path, mount_path, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(&id)
        .bind(&record.repo_id)
        .bind(record.kind)
        .bind(record.size_in_mb)
        .bind(&record.path)
        .bind(&record.mount_path)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, repo_id = %record.repo_id, "Failed to create pool");
            Error::Database {
                source: e,
                context: format!("Failed to create pool at '{}'", record.path),
            }
        })?;

        tracing::info!(
            pool_id = %id,
            repo_id = %record.repo_id,
            kind = %record.kind,
            size_in_mb = record.size_in_mb,
            "Created new pool"
        );

        self.get_by_id(&id).await
    }

    /// Get pool by ID
    #[instrument(skip(self), fields(pool_id = %id), name = "db_get_pool_by_id")]
    pub async fn get_by_id(&self, id: &PoolId) -> Result<PoolData> {
        let row = sqlx::query_as::<sqlx::Sqlite, PoolRow>(&format!(
            "SELECT {} FROM pools WHERE id = $1",
            POOL_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, pool_id = %id, "Failed to get pool by ID");
            Error::Database { source: e, context: format!("Failed to get pool with ID '{}'", id) }
        })?;

        match row {
            Some(row) => Ok(PoolData::from(row)),
            None => Err(Error::not_found(format!("Pool with ID '{}' not found", id))),
        }
    }

    /// Get the pool owned by a repo
    #[instrument(skip(self), fields(repo_id = %repo_id), name = "db_get_pool_by_repo")]
    pub async fn get_by_repo(&self, repo_id: &RepoId) -> Result<PoolData> {
        let row = sqlx::query_as::<sqlx::Sqlite, PoolRow>(&format!(
            "SELECT {} FROM pools WHERE repo_id = $1",
            POOL_COLUMNS
        ))
        .bind(repo_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, repo_id = %repo_id, "Failed to get pool by repo");
            Error::Database {
                source: e,
                context: format!("Failed to get pool for repo '{}'", repo_id),
            }
        })?;

        match row {
            Some(row) => Ok(PoolData::from(row)),
            None => Err(Error::not_found(format!("No pool found for repo '{}'", repo_id))),
        }
    }

    /// Check if any pool claims the given backing path
    #[instrument(skip(self), fields(path = %path), name = "db_exists_pool_by_path")]
    pub async fn exists_by_path(&self, path: &str) -> Result<bool> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM pools WHERE path = $1")
            .bind(path)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, path = %path, "Failed to check pool path");
                Error::Database {
                    source: e,
                    context: format!("Failed to check pool path '{}'", path),
                }
            })?;

        Ok(count > 0)
    }

    /// List all pools (startup reconciliation)
    #[instrument(skip(self), name = "db_list_pools")]
    pub async fn list(&self) -> Result<Vec<PoolData>> {
        let rows = sqlx::query_as::<sqlx::Sqlite, PoolRow>(&format!(
            "SELECT {} FROM pools ORDER BY created_at",
            POOL_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to list pools");
            Error::Database { source: e, context: "Failed to list pools".to_string() }
        })?;

        Ok(rows.into_iter().map(PoolData::from).collect())
    }
}
