//! Typed errors and HTTP mapping.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Message fragment PostgreSQL uses for unique-constraint failures. Only
/// constraint violations carrying it are answered with 409.
pub const DUPLICATE_KEY_MESSAGE: &str = "duplicate key value violates unique constraint";

/// Binding-time failures. Raised while describing a table or synthesizing
/// shapes; a router is never built when one occurs.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SchemaError {
    #[error("unsupported type '{ty}' for column '{column}'")]
    UnsupportedType { column: String, ty: String },
    #[error("alias '{alias}' of column '{column}' collides with another column name or alias")]
    AliasCollision { column: String, alias: String },
    #[error("table {0} has no primary key")]
    MissingPrimaryKey(String),
    #[error("unknown column '{column}' referenced by {context}")]
    UnknownColumn { column: String, context: String },
    #[error("invalid identifier: {0}")]
    InvalidIdentifier(String),
    #[error("duplicate route: {method} {path}")]
    DuplicateRoute { method: String, path: String },
    #[error("validation: {0}")]
    Validation(String),
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Schema(#[from] SchemaError),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("validation: {0}")]
    Validation(String),
    #[error("database: {0}")]
    Db(sqlx::Error),
    #[error("constraint violation: {message}")]
    ConstraintViolation {
        constraint: Option<String>,
        message: String,
    },
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error("payload too large: {0}")]
    PayloadTooLarge(String),
}

impl AppError {
    /// True for the duplicate-key class of constraint violations.
    pub fn is_duplicate_key(&self) -> bool {
        matches!(self, AppError::ConstraintViolation { message, .. } if message.contains(DUPLICATE_KEY_MESSAGE))
    }
}

impl From<sqlx::Error> for AppError {
    fn from(e: sqlx::Error) -> Self {
        use sqlx::error::ErrorKind;
        if let sqlx::Error::Database(db) = &e {
            match db.kind() {
                ErrorKind::UniqueViolation
                | ErrorKind::ForeignKeyViolation
                | ErrorKind::NotNullViolation
                | ErrorKind::CheckViolation => {
                    return AppError::ConstraintViolation {
                        constraint: db.constraint().map(str::to_string),
                        message: db.message().to_string(),
                    };
                }
                _ => {}
            }
        }
        AppError::Db(e)
    }
}

#[derive(Serialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            AppError::Schema(_) => (StatusCode::INTERNAL_SERVER_ERROR, "schema_error"),
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            AppError::Validation(_) => (StatusCode::UNPROCESSABLE_ENTITY, "validation_error"),
            AppError::Db(e) => {
                if let sqlx::Error::RowNotFound = e {
                    (StatusCode::NOT_FOUND, "not_found")
                } else {
                    (StatusCode::INTERNAL_SERVER_ERROR, "database_error")
                }
            }
            AppError::ConstraintViolation { .. } => {
                (StatusCode::INTERNAL_SERVER_ERROR, "constraint_violation")
            }
            AppError::Conflict(_) => (StatusCode::CONFLICT, "conflict"),
            AppError::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            AppError::Forbidden(_) => (StatusCode::FORBIDDEN, "forbidden"),
            AppError::PayloadTooLarge(_) => (StatusCode::PAYLOAD_TOO_LARGE, "payload_too_large"),
        };
        let body = ErrorBody {
            error: ErrorDetail {
                code: code.to_string(),
                message: self.to_string(),
                details: None,
            },
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_key_is_detected_by_message() {
        let dup = AppError::ConstraintViolation {
            constraint: Some("users_email_key".into()),
            message: "duplicate key value violates unique constraint \"users_email_key\"".into(),
        };
        assert!(dup.is_duplicate_key());

        let fk = AppError::ConstraintViolation {
            constraint: Some("orders_user_id_fkey".into()),
            message: "insert or update on table \"orders\" violates foreign key constraint \"orders_user_id_fkey\"".into(),
        };
        assert!(!fk.is_duplicate_key());
        assert!(!AppError::Conflict("x".into()).is_duplicate_key());
    }

    #[test]
    fn status_mapping() {
        assert_eq!(
            AppError::Validation("bad".into()).into_response().status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(AppError::NotFound("1".into()).into_response().status(), StatusCode::NOT_FOUND);
        assert_eq!(
            AppError::ConstraintViolation { constraint: None, message: "check".into() }
                .into_response()
                .status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            AppError::PayloadTooLarge("over 16 bytes".into()).into_response().status(),
            StatusCode::PAYLOAD_TOO_LARGE
        );
    }
}
