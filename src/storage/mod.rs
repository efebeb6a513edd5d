//! Control-plane persistence: SQLite connection pool, schema migrations and
//! per-table repositories.

pub mod migrations;
pub mod pool;
pub mod repositories;
pub mod test_helpers;

pub use pool::{create_pool, get_pool_stats, DbPool, PoolStats};
pub use repositories::{
    BranchData, BranchRepository, CreateBranchRecord, CreatePoolRecord, CreateRepoRecord, PoolData,
    PoolRepository, RepoData, RepoRepository, SourceRepository,
};
