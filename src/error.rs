//! Error types for Libris server

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Application error codes returned in error bodies
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ErrorCode {
    Success = 0,
    Failure = 1,
    NotAuthorized = 2,
    DbFailure = 3,
    NoSuchUser = 4,
    NoSuchItem = 5,
    Duplicate = 8,
    BadValue = 18,
    ImportFailure = 30,
}

/// Main application error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Authorization failed: {0}")]
    Authorization(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("Import error: {0}")]
    Import(#[from] ImportError),
}

/// Error response body
#[derive(Serialize, utoipa::ToSchema)]
pub struct ErrorResponse {
    pub code: u32,
    pub error: String,
    pub message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::Authentication(msg) => {
                (StatusCode::UNAUTHORIZED, ErrorCode::NotAuthorized, msg.clone())
            }
            AppError::Authorization(msg) => {
                (StatusCode::FORBIDDEN, ErrorCode::NotAuthorized, msg.clone())
            }
            AppError::NotFound(msg) => {
                (StatusCode::NOT_FOUND, ErrorCode::NoSuchItem, msg.clone())
            }
            AppError::Validation(msg) => {
                (StatusCode::BAD_REQUEST, ErrorCode::BadValue, msg.clone())
            }
            AppError::Database(e) => {
                tracing::error!("Database error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorCode::DbFailure,
                    "Database error".to_string(),
                )
            }
            AppError::Conflict(msg) => {
                (StatusCode::CONFLICT, ErrorCode::Duplicate, msg.clone())
            }
            AppError::BadRequest(msg) => {
                (StatusCode::BAD_REQUEST, ErrorCode::BadValue, msg.clone())
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorCode::Failure,
                    "Internal server error".to_string(),
                )
            }
            AppError::Import(e) => {
                tracing::error!("Import error: {}", e);
                let status = match e {
                    ImportError::InvalidBatchSize | ImportError::UnknownTable(_) => {
                        StatusCode::BAD_REQUEST
                    }
                    _ => StatusCode::UNPROCESSABLE_ENTITY,
                };
                (status, ErrorCode::ImportFailure, e.to_string())
            }
        };

        let body = Json(ErrorResponse {
            code: code as u32,
            error: format!("{:?}", code),
            message,
        });

        (status, body).into_response()
    }
}

/// Result type alias for application operations
pub type AppResult<T> = Result<T, AppError>;

/// Errors raised by the CSV import pipeline.
///
/// Field-level variants (`UnresolvedReference`, `InvalidLiteral`) are usually
/// absorbed by the importers; table-level variants end up in the import report.
#[derive(Error, Debug)]
pub enum ImportError {
    #[error("Unknown table: {0}")]
    UnknownTable(String),

    #[error("No entity definition registered for table {0}")]
    UnknownModel(String),

    #[error("Unresolved reference to {table}[{legacy_id}]")]
    UnresolvedReference { table: String, legacy_id: i64 },

    #[error("Legacy id {legacy_id} already assigned in {table}")]
    DuplicateLegacyId { table: String, legacy_id: i64 },

    #[error("Invalid {expected} literal for column {column}: {value:?}")]
    InvalidLiteral {
        column: String,
        value: String,
        expected: &'static str,
    },

    #[error("Missing value for required column {table}.{column}")]
    MissingColumn { table: String, column: String },

    #[error("Invalid import order: {0}")]
    InvalidImportOrder(String),

    #[error("Batch size must be greater than zero")]
    InvalidBatchSize,

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Secret hashing failed: {0}")]
    Hash(String),

    #[error("Constraint violation: {0}")]
    Constraint(String),

    #[error("Store error: {0}")]
    Store(#[from] sqlx::Error),
}

pub type ImportResult<T> = Result<T, ImportError>;
