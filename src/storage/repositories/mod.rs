//! Per-table data access. Each repository follows the same shape: a private
//! `*Row` struct decoded by sqlx, a public `*Data` struct with typed ids and
//! statuses, and instrumented CRUD methods returning crate errors.

mod branches;
mod pools;
mod repos;
mod sources;

pub use branches::{BranchData, BranchRepository, CreateBranchRecord};
pub use pools::{CreatePoolRecord, PoolData, PoolRepository};
pub use repos::{CreateRepoRecord, RepoData, RepoRepository};
pub use sources::SourceRepository;
