//! # Error Types
//!
//! Crate-wide error type for the postbranch control plane using `thiserror`.
//! Lifecycle guard failures (invalid state, conflicts, missing resources) are
//! first-class variants so callers and the API layer can map them precisely.

pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the postbranch control plane
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Source cluster could not be reached or authenticated against
    #[error("Connection error: {0}")]
    Connection(String),

    /// Source user lacks a required privilege (e.g. superuser)
    #[error("Privilege error: {0}")]
    Privilege(String),

    /// A filesystem path is missing or unusable (e.g. Postgres binaries)
    #[error("Path error: {0}")]
    Path(String),

    /// A storage path or device is already claimed by another pool
    #[error("Path conflict: {0}")]
    PathConflict(String),

    /// A sizing guard failed: the requested pool cannot hold the measured
    /// cluster plus headroom, or a pool has no free capacity left for a clone
    #[error("Insufficient space: {0}")]
    InsufficientSpace(String),

    /// Pool ran out of space mid-write; detected lazily, after the operation
    /// already had side effects
    #[error("Storage full: {0}")]
    StorageFull(String),

    /// Operation is not legal in the entity's current state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// A repo or branch name is already taken
    #[error("Name conflict: {0}")]
    NameConflict(String),

    /// Request validation failed
    #[error("Validation error: {message}")]
    Validation { message: String, field: Option<String> },

    /// Database and storage errors
    #[error("Database error: {context}")]
    Database {
        #[source]
        source: sqlx::Error,
        context: String,
    },

    /// I/O errors with additional context
    #[error("I/O error: {context}")]
    Io {
        #[source]
        source: std::io::Error,
        context: String,
    },

    /// Serialization/deserialization errors
    #[error("Serialization error: {context}")]
    Serialization {
        #[source]
        source: serde_json::Error,
        context: String,
    },

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal errors (command execution, task failures)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn connection<S: Into<String>>(message: S) -> Self {
        Self::Connection(message.into())
    }

    pub fn privilege<S: Into<String>>(message: S) -> Self {
        Self::Privilege(message.into())
    }

    pub fn path<S: Into<String>>(message: S) -> Self {
        Self::Path(message.into())
    }

    pub fn path_conflict<S: Into<String>>(message: S) -> Self {
        Self::PathConflict(message.into())
    }

    pub fn insufficient_space<S: Into<String>>(message: S) -> Self {
        Self::InsufficientSpace(message.into())
    }

    pub fn storage_full<S: Into<String>>(message: S) -> Self {
        Self::StorageFull(message.into())
    }

    pub fn invalid_state<S: Into<String>>(message: S) -> Self {
        Self::InvalidState(message.into())
    }

    pub fn not_found<S: Into<String>>(message: S) -> Self {
        Self::NotFound(message.into())
    }

    pub fn name_conflict<S: Into<String>>(message: S) -> Self {
        Self::NameConflict(message.into())
    }

    /// Create a validation error
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation { message: message.into(), field: None }
    }

    /// Create a validation error with field information
    pub fn validation_field<S: Into<String>, F: Into<String>>(message: S, field: F) -> Self {
        Self::Validation { message: message.into(), field: Some(field.into()) }
    }

    pub fn database<S: Into<String>>(source: sqlx::Error, context: S) -> Self {
        Self::Database { source, context: context.into() }
    }

    pub fn io<S: Into<String>>(source: std::io::Error, context: S) -> Self {
        Self::Io { source, context: context.into() }
    }

    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config(message.into())
    }

    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal(message.into())
    }

    /// Get the HTTP status code that should be returned for this error
    pub fn status_code(&self) -> u16 {
        match self {
            Error::Connection(_) => 400,
            Error::Privilege(_) => 400,
            Error::Path(_) => 400,
            Error::PathConflict(_) => 409,
            Error::InsufficientSpace(_) => 400,
            Error::StorageFull(_) => 507,
            Error::InvalidState(_) => 409,
            Error::NotFound(_) => 404,
            Error::NameConflict(_) => 409,
            Error::Validation { .. } => 400,
            Error::Serialization { .. } => 400,
            Error::Database { .. } => 500,
            Error::Io { .. } => 500,
            Error::Config(_) => 500,
            Error::Internal(_) => 500,
        }
    }
}

// Error conversions for common external error types
impl From<sqlx::Error> for Error {
    fn from(error: sqlx::Error) -> Self {
        Self::Database { source: error, context: "Database operation failed".to_string() }
    }
}

impl From<std::io::Error> for Error {
    fn from(error: std::io::Error) -> Self {
        Self::Io { source: error, context: "I/O operation failed".to_string() }
    }
}

impl From<serde_json::Error> for Error {
    fn from(error: serde_json::Error) -> Self {
        Self::Serialization { source: error, context: "JSON serialization failed".to_string() }
    }
}

impl From<validator::ValidationErrors> for Error {
    fn from(errors: validator::ValidationErrors) -> Self {
        let message = errors
            .field_errors()
            .iter()
            .map(|(field, field_errors)| {
                let error_messages: Vec<String> = field_errors
                    .iter()
                    .map(|e| {
                        e.message.as_ref().map_or("Invalid value".to_string(), |m| m.to_string())
                    })
                    .collect();
                format!("{}: {}", field, error_messages.join(", "))
            })
            .collect::<Vec<_>>()
            .join("; ");

        Self::validation(format!("Validation failed: {}", message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let error = Error::invalid_state("repo import is still running");
        assert!(matches!(error, Error::InvalidState(_)));
        assert_eq!(error.to_string(), "Invalid state: repo import is still running");
    }

    #[test]
    fn test_validation_error_field() {
        let error = Error::validation_field("must be a slug", "name");
        if let Error::Validation { field, .. } = error {
            assert_eq!(field, Some("name".to_string()));
        } else {
            panic!("expected validation error");
        }
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(Error::validation("test").status_code(), 400);
        assert_eq!(Error::connection("test").status_code(), 400);
        assert_eq!(Error::privilege("test").status_code(), 400);
        assert_eq!(Error::not_found("repo 'x'").status_code(), 404);
        assert_eq!(Error::name_conflict("test").status_code(), 409);
        assert_eq!(Error::path_conflict("test").status_code(), 409);
        assert_eq!(Error::invalid_state("test").status_code(), 409);
        assert_eq!(Error::storage_full("test").status_code(), 507);
        assert_eq!(Error::internal("test").status_code(), 500);
    }

    #[test]
    fn test_error_conversions() {
        let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let error: Error = io_error.into();
        assert!(matches!(error, Error::Io { .. }));

        let json_error = serde_json::from_str::<serde_json::Value>("invalid json").unwrap_err();
        let error: Error = json_error.into();
        assert!(matches!(error, Error::Serialization { .. }));
    }
}
