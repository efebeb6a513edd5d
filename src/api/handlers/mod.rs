//! HTTP request handlers.

pub mod branches;
pub mod health;
pub mod repos;
pub mod sources;

pub use branches::{close_branch_handler, create_branch_handler};
pub use health::health_handler;
pub use repos::{
    delete_repo_handler, get_repo_handler, import_repo_handler, list_repos_handler,
    reimport_repo_handler,
};
pub use sources::validate_source_handler;
