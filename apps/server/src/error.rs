use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use coinpulse_core::errors::Error as CoreError;
use coinpulse_upstream::{ErrorKind, FetchError};
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    Core(#[from] CoreError),
    #[error("Not Found")]
    NotFound,
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    Internal(String),
    #[error("{0}")]
    Anyhow(#[from] anyhow::Error),
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorBody {
    code: u16,
    kind: String,
    message: String,
    detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    retry_after_seconds: Option<u64>,
}

impl ErrorBody {
    fn new(status: StatusCode, kind: &str, message: String) -> Self {
        Self {
            code: status.as_u16(),
            kind: kind.to_string(),
            message,
            detail: None,
            retry_after_seconds: None,
        }
    }
}

fn upstream_status(error: &CoreError, kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::BackoffInEffect | ErrorKind::RetriesExhausted => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::UpstreamHttpError => match error {
            CoreError::Upstream(FetchError::UpstreamHttpError { status: 404, .. }) => {
                StatusCode::NOT_FOUND
            }
            _ => StatusCode::BAD_GATEWAY,
        },
        ErrorKind::NetworkOrDnsFailure | ErrorKind::InvalidUpstreamPayload => {
            StatusCode::BAD_GATEWAY
        }
    }
}

fn core_error_body(error: &CoreError) -> (StatusCode, ErrorBody) {
    if let Some(envelope) = error.upstream_envelope() {
        let status = upstream_status(error, envelope.kind);
        let body = ErrorBody {
            code: status.as_u16(),
            kind: envelope.kind.to_string(),
            message: envelope.message,
            detail: envelope.detail,
            retry_after_seconds: envelope.retry_after_seconds,
        };
        return (status, body);
    }

    match error {
        CoreError::Validation(_) => (
            StatusCode::BAD_REQUEST,
            ErrorBody::new(StatusCode::BAD_REQUEST, "InvalidRequest", error.to_string()),
        ),
        CoreError::Storage(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            ErrorBody::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "StorageFailure",
                error.to_string(),
            ),
        ),
        _ => (
            StatusCode::INTERNAL_SERVER_ERROR,
            ErrorBody::new(StatusCode::INTERNAL_SERVER_ERROR, "Internal", error.to_string()),
        ),
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            ApiError::Core(e) => core_error_body(e),
            ApiError::NotFound => (
                StatusCode::NOT_FOUND,
                ErrorBody::new(StatusCode::NOT_FOUND, "NotFound", self.to_string()),
            ),
            ApiError::BadRequest(reason) => (
                StatusCode::BAD_REQUEST,
                ErrorBody::new(StatusCode::BAD_REQUEST, "InvalidRequest", reason.clone()),
            ),
            ApiError::Unauthorized(reason) => (
                StatusCode::UNAUTHORIZED,
                ErrorBody::new(StatusCode::UNAUTHORIZED, "Unauthorized", reason.clone()),
            ),
            ApiError::Internal(reason) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorBody::new(StatusCode::INTERNAL_SERVER_ERROR, "Internal", reason.clone()),
            ),
            ApiError::Anyhow(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorBody::new(StatusCode::INTERNAL_SERVER_ERROR, "Internal", self.to_string()),
            ),
        };

        if status.is_server_error() {
            tracing::warn!(status = status.as_u16(), kind = %body.kind, "{}", body.message);
        }

        let retry_after = body.retry_after_seconds;
        let mut response = (status, Json(body)).into_response();
        if let Some(seconds) = retry_after {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(seconds));
        }
        response
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
