//! Test database utilities for in-library and integration tests.
//!
//! Provides an in-memory SQLite pool with all migrations applied. The pool is
//! capped at a single connection because every SQLite `:memory:` connection is
//! its own database.

use crate::config::DatabaseConfig;
use crate::storage::{create_pool, DbPool};

/// Create an in-memory database with all migrations applied.
///
/// Migrations are loaded from the `migrations/` directory, so tests must run
/// from the crate root (cargo's default).
pub async fn memory_pool() -> DbPool {
    let config = DatabaseConfig {
        url: "sqlite://:memory:".to_string(),
        max_connections: 1,
        min_connections: 1,
        auto_migrate: true,
        ..Default::default()
    };

    create_pool(&config).await.expect("failed to create in-memory test database")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::RepoStatus;
    use crate::storage::{CreateRepoRecord, RepoRepository};

    #[tokio::test]
    async fn memory_pool_applies_schema() {
        let pool = memory_pool().await;
        let repos = RepoRepository::new(pool);

        let created = repos
            .create(CreateRepoRecord { name: "schema-check".to_string(), pg_version: 16 })
            .await
            .unwrap();

        assert_eq!(created.status, RepoStatus::Started);
        assert!(repos.exists_by_name("schema-check").await.unwrap());
    }
}
