use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use std::path::PathBuf;

/// Bad client input. Always surfaced as a 4xx.
#[derive(Debug, thiserror::Error)]
pub enum InvalidQueryError {
    #[error("component_path_ids is required")]
    MissingComponentIds,
    #[error("invalid component path id {0:?} (expected an integer)")]
    InvalidComponentId(String),
    #[error("invalid {field} {value:?} (expected ISO-8601)")]
    InvalidTimestamp { field: &'static str, value: String },
    #[error("start_time {start} is after end_time {end}")]
    InvertedWindow {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
}

/// Failure talking to the BDX API.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("BDX request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("BDX returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("BDX login did not return a token")]
    MissingToken,
    #[error("unexpected BDX response: {0}")]
    Decode(String),
}

/// The source table does not have the shape the reshaper needs.
#[derive(Debug, thiserror::Error)]
pub enum ReshapeError {
    #[error("column {column:?} row {row}: malformed timestamp {value:?}")]
    MalformedTimestamp {
        column: String,
        row: usize,
        value: String,
    },
    #[error("column {column:?} has {actual} values but the time index has {expected}")]
    ShapeMismatch {
        column: String,
        expected: usize,
        actual: usize,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("trend table is empty; nothing to chart")]
    EmptyTrend,
    #[error("failed to build PDF: {0}")]
    Pdf(String),
    #[error("failed to write report to {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("invalid mail address: {0}")]
    Address(#[from] lettre::address::AddressError),
    #[error("failed to build message: {0}")]
    Message(#[from] lettre::error::Error),
    #[error("invalid attachment content type {0:?}")]
    ContentType(String),
    #[error("SMTP failure: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),
    #[error("failed to read attachment {path}: {source}")]
    Attachment {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub const INTERNAL_SERVER_ERROR_DETAIL: &str = "Internal Server Error";

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, utoipa::ToSchema)]
pub struct ErrorBody {
    pub detail: String,
}

/// Error returned by HTTP handlers. 5xx variants never carry internal details.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub detail: String,
}

impl ApiError {
    pub fn new(status: StatusCode, detail: impl Into<String>) -> Self {
        Self {
            status,
            detail: detail.into(),
        }
    }

    pub fn bad_request(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, detail)
    }

    pub fn internal() -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            INTERNAL_SERVER_ERROR_DETAIL,
        )
    }
}

impl From<InvalidQueryError> for ApiError {
    fn from(err: InvalidQueryError) -> Self {
        tracing::debug!(error = %err, "rejecting invalid query");
        Self::bad_request(err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorBody {
                detail: self.detail,
            }),
        )
            .into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
