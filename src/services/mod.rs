//! Lifecycle services: the orchestrator and the machinery it composes.
//!
//! The [`Orchestrator`] is the single entry point the API layer talks to. It
//! wires the persistence repositories to the platform backends through four
//! focused services: [`PortAllocator`] for branch ports, [`PoolManager`] for
//! CoW storage, [`PgSupervisor`] for the Postgres processes and
//! [`ImportEngine`] for source validation and the primary import.

pub mod import;
pub mod orchestrator;
pub mod pool_manager;
pub mod port_allocator;
mod recovery;
pub mod supervisor;

pub use import::{ImportEngine, SourceValidation};
pub use orchestrator::{CreateBranchRequest, CreateRepoRequest, Orchestrator, RepoOverview};
pub use pool_manager::PoolManager;
pub use port_allocator::PortAllocator;
pub use supervisor::PgSupervisor;
