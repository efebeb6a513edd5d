//! Domain types shared across the control plane: identifiers, status
//! machines, source configurations and size units.

pub mod id;
pub mod size;
pub mod source;
pub mod status;

pub use id::{BranchId, PoolId, RepoId};
pub use size::{format_long, format_short, to_mb, MIN_HEADROOM_MB};
pub use source::{SourceConfig, SslMode};
pub use status::{BranchStatus, PgStatus, PoolKind, RepoStatus};

/// Name of the branch created with the primary import. It exists for the
/// whole lifetime of a READY repo and can never be closed.
pub const MAIN_BRANCH: &str = "main";
