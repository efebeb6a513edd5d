use axum::{http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;

use crate::errors::Error;

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Conflict(String),
    NotFound(String),
    InsufficientStorage(String),
    Internal(String),
}

impl ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::InsufficientStorage(_) => StatusCode::INSUFFICIENT_STORAGE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status_code();
        let error_kind = match self {
            ApiError::BadRequest(_) => "bad_request",
            ApiError::Conflict(_) => "conflict",
            ApiError::NotFound(_) => "not_found",
            ApiError::InsufficientStorage(_) => "insufficient_storage",
            ApiError::Internal(_) => "internal_error",
        };

        let message = match self {
            ApiError::BadRequest(msg)
            | ApiError::Conflict(msg)
            | ApiError::NotFound(msg)
            | ApiError::InsufficientStorage(msg)
            | ApiError::Internal(msg) => msg,
        };

        (status, Json(ErrorBody { error: error_kind, message })).into_response()
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        if let Error::Database { source, context } = &err {
            // SQLite unique/constraint violations surface as conflicts
            if let Some(db_err) = source.as_database_error() {
                if let Some(code) = db_err.code() {
                    if code.as_ref() == "2067" || code.as_ref().starts_with("SQLITE_CONSTRAINT") {
                        return ApiError::Conflict(context.clone());
                    }
                }
            }
            return ApiError::Internal(context.clone());
        }

        match err.status_code() {
            400 => ApiError::BadRequest(err.to_string()),
            404 => ApiError::NotFound(err.to_string()),
            409 => ApiError::Conflict(err.to_string()),
            507 => ApiError::InsufficientStorage(err.to_string()),
            _ => ApiError::Internal(err.to_string()),
        }
    }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(errors: validator::ValidationErrors) -> Self {
        ApiError::from(Error::from(errors))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle_errors_map_to_their_status() {
        assert!(matches!(ApiError::from(Error::connection("x")), ApiError::BadRequest(_)));
        assert!(matches!(ApiError::from(Error::privilege("x")), ApiError::BadRequest(_)));
        assert!(matches!(ApiError::from(Error::not_found("x")), ApiError::NotFound(_)));
        assert!(matches!(ApiError::from(Error::name_conflict("x")), ApiError::Conflict(_)));
        assert!(matches!(ApiError::from(Error::invalid_state("x")), ApiError::Conflict(_)));
        assert!(matches!(ApiError::from(Error::path_conflict("x")), ApiError::Conflict(_)));
        assert!(matches!(
            ApiError::from(Error::storage_full("x")),
            ApiError::InsufficientStorage(_)
        ));
        assert!(matches!(ApiError::from(Error::insufficient_space("x")), ApiError::BadRequest(_)));
        assert!(matches!(ApiError::from(Error::internal("x")), ApiError::Internal(_)));
    }

    #[test]
    fn storage_full_renders_507() {
        assert_eq!(
            ApiError::InsufficientStorage("pool full".to_string()).status_code(),
            StatusCode::INSUFFICIENT_STORAGE
        );
    }
}
