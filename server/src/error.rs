//! HTTP error mapping.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use exrate_common::{ErrorKind, RateError};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

/// Error returned by request handlers.
#[derive(Debug, Error)]
#[error(transparent)]
pub struct ApiError(#[from] RateError);

impl ApiError {
    /// HTTP status for this error.
    pub fn status(&self) -> StatusCode {
        match self.0.kind() {
            ErrorKind::Validation => StatusCode::BAD_REQUEST,
            ErrorKind::Auth => StatusCode::UNAUTHORIZED,
            ErrorKind::Storage => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorKind::Provider => StatusCode::BAD_GATEWAY,
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    code: u16,
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(
                operation = self.0.operation(),
                code = self.0.error_code(),
                error = %self.0,
                "Request failed"
            );
        }

        let body = Json(ErrorBody {
            code: status.as_u16(),
            error: self.0.to_string(),
        });
        (status, body).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
