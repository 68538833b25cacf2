use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Map, Value};
use std::fmt;

use crate::executor::BackendError;

/// Normalized error categories a scrape can end in.
///
/// Every [`ScrapeError`] maps to exactly one kind, and every kind maps to
/// exactly one HTTP status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Caller input or config/result shape mismatch the user can fix
    BadRequest,
    /// Unknown package or auth key
    NotFound,
    /// The target database rejected the credentials
    AuthenticationFailed,
    /// The target database could not be reached in time
    Unavailable,
    /// The backend rejected the SQL text
    QueryError,
    /// The result set does not fit the query definition
    QueryResultError,
    /// Any other backend-reported failure
    DatabaseError,
    /// Catch-all
    Unknown,
}

impl ErrorKind {
    pub fn status(self) -> StatusCode {
        match self {
            Self::BadRequest => StatusCode::BAD_REQUEST,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::AuthenticationFailed => StatusCode::UNAUTHORIZED,
            Self::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
            Self::QueryError
            | Self::QueryResultError
            | Self::DatabaseError
            | Self::Unknown => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::BadRequest => "bad_request",
            Self::NotFound => "not_found",
            Self::AuthenticationFailed => "authentication_failed",
            Self::Unavailable => "unavailable",
            Self::QueryError => "query_error",
            Self::QueryResultError => "query_result_error",
            Self::DatabaseError => "database_error",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Every way a scrape request can fail.
///
/// The `Display` text is the user-facing `error` message of the JSON body;
/// [`ScrapeError::details`] supplies the optional `details` field.
#[derive(Debug, thiserror::Error)]
pub enum ScrapeError {
    #[error("host, database, package, and auth parameters are required")]
    MissingParameters,

    #[error("invalid query string")]
    InvalidQueryString(String),

    #[error("invalid port '{0}'")]
    InvalidPort(String),

    #[error("unknown or unsupported backend: {0}")]
    UnknownBackend(String),

    #[error("package '{0}' not found")]
    PackageNotFound(String),

    #[error("auth '{0}' not found")]
    AuthNotFound(String),

    #[error("There is multiple columns with the name: {column}")]
    DuplicateValueColumn { query: String, column: String },

    #[error("Unsupported metric type: {0}")]
    UnsupportedMetricType(String),

    #[error("metric '{name}' is defined more than once")]
    DuplicateMetricName { name: String },

    #[error("metric '{name}' cannot be registered")]
    InvalidMetric { name: String, reason: String },

    #[error("Value column '{column}' not found in query result")]
    ColumnNotFound { query: String, column: String },

    #[error("Label column '{column}' not found in query result")]
    LabelColumnNotFound { query: String, column: String },

    #[error("Number of columns in query result does not match labels and values")]
    ColumnCountMismatch {
        query: String,
        expected: usize,
        actual: usize,
    },

    #[error("Number of columns in query result does not match labels and values")]
    RowArityMismatch {
        query: String,
        row: usize,
        expected: usize,
        actual: usize,
    },

    #[error("Value column '{column}' holds a non-numeric value")]
    NonNumericValue {
        query: String,
        column: String,
        value: String,
    },

    #[error("Counter '{metric}' cannot decrease")]
    NegativeCounterIncrement { metric: String, value: f64 },

    #[error("Query '{query}' timed out")]
    Timeout { query: String, seconds: u64 },

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error("Failed to encode metrics")]
    Encoding(String),

    #[error("Unknown error")]
    Internal(String),
}

impl ScrapeError {
    /// Normalized category of this failure
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MissingParameters
            | Self::InvalidQueryString(_)
            | Self::InvalidPort(_)
            | Self::UnknownBackend(_)
            | Self::DuplicateValueColumn { .. }
            | Self::UnsupportedMetricType(_)
            | Self::DuplicateMetricName { .. }
            | Self::InvalidMetric { .. } => ErrorKind::BadRequest,
            Self::PackageNotFound(_) | Self::AuthNotFound(_) => ErrorKind::NotFound,
            Self::ColumnNotFound { .. }
            | Self::LabelColumnNotFound { .. }
            | Self::ColumnCountMismatch { .. }
            | Self::RowArityMismatch { .. }
            | Self::NonNumericValue { .. }
            | Self::NegativeCounterIncrement { .. } => ErrorKind::QueryResultError,
            Self::Timeout { .. } => ErrorKind::Unavailable,
            Self::Backend(err) => match err {
                BackendError::AuthenticationFailed(_) => ErrorKind::AuthenticationFailed,
                BackendError::Unreachable(_) => ErrorKind::Unavailable,
                BackendError::Syntax(_) => ErrorKind::QueryError,
                BackendError::Other(_) => ErrorKind::DatabaseError,
            },
            Self::Encoding(_) | Self::Internal(_) => ErrorKind::Unknown,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.kind().status()
    }

    /// Underlying detail text safe to return to the caller
    pub fn details(&self) -> Option<String> {
        match self {
            Self::DuplicateValueColumn { query, .. }
            | Self::ColumnNotFound { query, .. }
            | Self::LabelColumnNotFound { query, .. } => Some(format!("query '{}'", query)),
            Self::InvalidMetric { reason, .. } => Some(reason.clone()),
            Self::InvalidQueryString(reason) => Some(reason.clone()),
            Self::ColumnCountMismatch {
                query,
                expected,
                actual,
            } => Some(format!(
                "query '{}': expected {} columns, got {}",
                query, expected, actual
            )),
            Self::RowArityMismatch {
                query,
                row,
                expected,
                actual,
            } => Some(format!(
                "query '{}': row {} has {} cells, expected {}",
                query, row, actual, expected
            )),
            Self::NonNumericValue { query, value, .. } => {
                Some(format!("query '{}': cannot convert '{}' to a number", query, value))
            }
            Self::NegativeCounterIncrement { value, .. } => {
                Some(format!("increment by {} is negative", value))
            }
            Self::Timeout { seconds, .. } => Some(format!("no result after {}s", seconds)),
            // Credential failures never echo driver text
            Self::Backend(BackendError::AuthenticationFailed(_)) => None,
            Self::Backend(err) => Some(err.detail().to_string()),
            Self::Encoding(msg) | Self::Internal(msg) => Some(msg.clone()),
            _ => None,
        }
    }

    /// JSON body of the error response: `{"error": ..., "details"?: ...}`
    pub fn to_body(&self) -> Value {
        let mut body = Map::new();
        body.insert("error".to_string(), Value::String(self.to_string()));
        if let Some(details) = self.details() {
            body.insert("details".to_string(), Value::String(details));
        }
        Value::Object(body)
    }
}

impl IntoResponse for ScrapeError {
    fn into_response(self) -> Response {
        (self.status(), Json(self.to_body())).into_response()
    }
}

impl From<prometheus::Error> for ScrapeError {
    fn from(err: prometheus::Error) -> Self {
        Self::Encoding(err.to_string())
    }
}

/// Render a bare JSON error outside the scrape pipeline
pub fn json_error(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}
