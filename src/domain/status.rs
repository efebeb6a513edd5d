//! Lifecycle status enums for repos, branches and their Postgres processes.
//!
//! All statuses are stored as TEXT columns and rendered verbatim in API
//! responses, so every enum carries a single canonical string form.

use serde::{Deserialize, Serialize};
use sqlx::encode::IsNull;
use sqlx::error::BoxDynError;
use sqlx::{Decode, Encode, Sqlite, Type};
use std::fmt;
use std::str::FromStr;
use utoipa::ToSchema;

/// Macro wiring a status enum to its canonical text form: Display, FromStr
/// and the sqlx traits for TEXT columns.
macro_rules! status_text {
    ($name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            /// Canonical string form (as stored and serialized)
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text,)+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = crate::errors::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok(Self::$variant),)+
                    other => Err(crate::errors::Error::validation(format!(
                        "Unknown {} value: '{}'",
                        stringify!($name),
                        other
                    ))),
                }
            }
        }

        impl Type<Sqlite> for $name {
            fn type_info() -> sqlx::sqlite::SqliteTypeInfo {
                <String as Type<Sqlite>>::type_info()
            }
        }

        impl<'q> Encode<'q, Sqlite> for $name {
            fn encode_by_ref(
                &self,
                buf: &mut Vec<sqlx::sqlite::SqliteArgumentValue<'q>>,
            ) -> Result<IsNull, BoxDynError> {
                <&str as Encode<'q, Sqlite>>::encode_by_ref(&self.as_str(), buf)
            }
        }

        impl<'r> Decode<'r, Sqlite> for $name {
            fn decode(value: sqlx::sqlite::SqliteValueRef<'r>) -> Result<Self, BoxDynError> {
                let s = <String as Decode<'r, Sqlite>>::decode(value)?;
                s.parse::<$name>().map_err(|e| Box::new(e) as BoxDynError)
            }
        }
    };
}

/// Repository lifecycle status.
///
/// `STARTED` means an import is in flight; `READY` is terminal on the happy
/// path; `FAILED` can be re-entered into `STARTED` only by a reimport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub enum RepoStatus {
    #[serde(rename = "STARTED")]
    Started,
    #[serde(rename = "READY")]
    Ready,
    #[serde(rename = "FAILED")]
    Failed,
}

status_text!(RepoStatus {
    Started => "STARTED",
    Ready => "READY",
    Failed => "FAILED",
});

/// Branch lifecycle status. `MERGED` is reserved for a future merge
/// operation; nothing produces it today.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub enum BranchStatus {
    #[serde(rename = "OPEN")]
    Open,
    #[serde(rename = "MERGED")]
    Merged,
    #[serde(rename = "CLOSED")]
    Closed,
}

status_text!(BranchStatus {
    Open => "OPEN",
    Merged => "MERGED",
    Closed => "CLOSED",
});

/// Status of the Postgres process backing a branch. `STOPPED` and `FAILED`
/// are terminal; there is no automatic restart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub enum PgStatus {
    #[serde(rename = "STARTING")]
    Starting,
    #[serde(rename = "RUNNING")]
    Running,
    #[serde(rename = "STOPPED")]
    Stopped,
    #[serde(rename = "FAILED")]
    Failed,
}

status_text!(PgStatus {
    Starting => "STARTING",
    Running => "RUNNING",
    Stopped => "STOPPED",
    Failed => "FAILED",
});

/// Kind of storage backing a repository's pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub enum PoolKind {
    /// Pre-existing raw block device
    #[serde(rename = "block")]
    Block,
    /// Sparse disk image created and attached by the control plane
    #[serde(rename = "virtual")]
    Virtual,
}

status_text!(PoolKind {
    Block => "block",
    Virtual => "virtual",
});

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repo_status_round_trip() {
        for status in [RepoStatus::Started, RepoStatus::Ready, RepoStatus::Failed] {
            assert_eq!(status.as_str().parse::<RepoStatus>().unwrap(), status);
        }
    }

    #[test]
    fn branch_status_text_forms() {
        assert_eq!(BranchStatus::Open.as_str(), "OPEN");
        assert_eq!(BranchStatus::Merged.as_str(), "MERGED");
        assert_eq!(BranchStatus::Closed.as_str(), "CLOSED");
    }

    #[test]
    fn pg_status_unknown_value_fails() {
        assert!("CRASHED".parse::<PgStatus>().is_err());
    }

    #[test]
    fn pool_kind_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&PoolKind::Virtual).unwrap(), "\"virtual\"");
        assert_eq!(serde_json::to_string(&PoolKind::Block).unwrap(), "\"block\"");
    }

    #[test]
    fn repo_status_serializes_uppercase() {
        assert_eq!(serde_json::to_string(&RepoStatus::Ready).unwrap(), "\"READY\"");
    }
}
