//! # Error Handling
//!
//! Unified error handling for the Ingestors service: a problem+json
//! [`ApiError`] for the HTTP surface and an [`IngestError`] taxonomy for the
//! ingestion engine.

use axum::{
    extract::rejection::JsonRejection,
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;
use utoipa::ToSchema;

use crate::telemetry;

/// Unified API error response structure
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ApiError {
    /// HTTP status code for the response
    #[serde(skip_serializing, skip_deserializing)]
    pub status: StatusCode,
    /// Error code for programmatic handling
    pub code: Box<str>,
    /// Human-readable error message
    pub message: Box<str>,
    /// Additional error details (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Box<serde_json::Value>>,
    /// Suggested retry delay in seconds (optional)
    pub retry_after: Option<u64>,
    /// Correlation trace ID for debugging (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<Box<str>>,
}

impl ApiError {
    /// Create a new API error with the given status code and message
    pub fn new<S: Into<String>>(status: StatusCode, code: S, message: S) -> Self {
        Self {
            status,
            code: code.into().into_boxed_str(),
            message: message.into().into_boxed_str(),
            details: None,
            retry_after: None,
            trace_id: Self::current_trace_id(),
        }
    }

    /// Add details to the error
    pub fn with_details<V: Into<serde_json::Value>>(mut self, details: V) -> Self {
        self.details = Some(Box::new(details.into()));
        self
    }

    /// Shorthand for a 404 with the standard code
    pub fn not_found<S: Into<String>>(message: S) -> Self {
        Self::new(StatusCode::NOT_FOUND, "NOT_FOUND".to_string(), message.into())
    }

    /// Shorthand for a 400 validation failure
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::new(
            StatusCode::BAD_REQUEST,
            "VALIDATION_FAILED".to_string(),
            message.into(),
        )
    }

    /// Extract current trace ID from the active task context (falls back to a
    /// generated correlation ID)
    fn current_trace_id() -> Option<Box<str>> {
        telemetry::current_trace_id()
            .map(|trace_id| trace_id.into_boxed_str())
            .or_else(|| {
                Some(format!("corr-{}", &uuid::Uuid::new_v4().to_string()[..8]).into_boxed_str())
            })
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut headers = HeaderMap::new();
        headers.insert(
            "content-type",
            HeaderValue::from_static("application/problem+json"),
        );

        if let Some(retry_after) = self.retry_after
            && let Ok(header_value) = HeaderValue::from_str(&retry_after.to_string())
        {
            headers.insert("retry-after", header_value);
        }

        (self.status, headers, axum::Json(self)).into_response()
    }
}

fn is_unique_violation(error: &sea_orm::DbErr) -> bool {
    use sea_orm::RuntimeErr;

    const PG_UNIQUE: &str = "23505";
    const SQLITE_DUPLICATE_CODES: &[&str] = &["1555", "2067"];

    let runtime_err = match error {
        sea_orm::DbErr::Query(RuntimeErr::SqlxError(sqlx_err))
        | sea_orm::DbErr::Exec(RuntimeErr::SqlxError(sqlx_err)) => sqlx_err,
        _ => return false,
    };

    let Some(db_error) = runtime_err.as_database_error() else {
        return false;
    };

    if db_error.is_unique_violation() {
        return true;
    }

    if let Some(code) = db_error.code() {
        let code_str = code.as_ref();
        return code_str == PG_UNIQUE || SQLITE_DUPLICATE_CODES.contains(&code_str);
    }

    false
}

impl From<sea_orm::DbErr> for ApiError {
    fn from(error: sea_orm::DbErr) -> Self {
        if is_unique_violation(&error) {
            tracing::debug!(?error, "Unique constraint violation detected");
            return Self::new(StatusCode::CONFLICT, "CONFLICT", "Resource already exists");
        }

        tracing::error!(?error, "Database error");
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "INTERNAL_SERVER_ERROR",
            "A database error occurred",
        )
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(error: anyhow::Error) -> Self {
        tracing::error!("Internal error: {:?}", error);

        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "INTERNAL_SERVER_ERROR",
            "An internal error occurred",
        )
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        let message = match rejection {
            JsonRejection::JsonDataError(err) => format!("Invalid JSON: {}", err),
            JsonRejection::JsonSyntaxError(err) => format!("JSON syntax error: {}", err),
            JsonRejection::MissingJsonContentType(_) => {
                "Missing 'Content-Type: application/json' header".to_string()
            }
            _ => "Invalid request body".to_string(),
        };

        Self::new(StatusCode::BAD_REQUEST, "VALIDATION_FAILED", &message)
    }
}

/// Errors produced by the ingestion engine for one source or one item.
///
/// The taxonomy matters to the poller: configuration, transport, and parse
/// errors are recorded on the source and retried on the next cycle, while
/// an authentication rejection after the single allowed refresh carries the
/// upstream status and body verbatim so callers (the preview endpoint in
/// particular) can mirror them unchanged.
#[derive(Debug, Error)]
pub enum IngestError {
    /// Missing or malformed source/endpoint/mapping configuration
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Timeout, connection failure, or other request-level transport failure
    #[error("transport error: {0}")]
    Transport(String),

    /// Upstream rejected authentication and the single refresh did not recover.
    /// Status, content type, and body are the upstream's, preserved exactly.
    #[error("authentication rejected by upstream with status {status}")]
    AuthRejected {
        status: u16,
        content_type: Option<String>,
        body: Vec<u8>,
    },

    /// Response body was not valid JSON
    #[error("failed to parse payload: {0}")]
    Parse(String),

    /// Persistence collaborator failure
    #[error("database error: {0}")]
    Db(#[from] sea_orm::DbErr),
}

impl From<reqwest::Error> for IngestError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            IngestError::Transport(format!("request timed out: {}", error))
        } else {
            IngestError::Transport(error.to_string())
        }
    }
}

/// Failure of one item within a payload; logged and skipped, never fatal to
/// sibling items.
#[derive(Debug, Error)]
pub enum ItemError {
    #[error("no identity mapping produced a value")]
    MissingIdentity,

    #[error("required field missing: {0}")]
    MissingRequiredField(&'static str),

    #[error("asset references no resolvable equipment type")]
    UnresolvableEquipmentType,

    #[error("unknown target entity kind: {0}")]
    UnknownTargetKind(String),

    #[error("database error: {0}")]
    Db(#[from] sea_orm::DbErr),
}
