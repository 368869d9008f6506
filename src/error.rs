//! HTTP error type and its mapping to status codes and JSON bodies.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;
use tracing::{error, warn};

use crate::translate::TranslateError;

#[derive(Debug, Error)]
pub enum AppError {
    /// Body is not JSON, or not a JSON object.
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    /// A required query parameter is absent.
    #[error("Missing parameter: {0}")]
    MissingParameter(&'static str),

    /// Model not loaded yet, failed to load, timed out, or failed mid-inference.
    #[error("Translation unavailable: {0}")]
    TranslationUnavailable(String),
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    status: u16,
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::InvalidPayload(_) | AppError::MissingParameter(_) => StatusCode::BAD_REQUEST,
            AppError::TranslationUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("{}", self);
        } else {
            warn!("{}", self);
        }

        let body = ErrorBody {
            error: self.to_string(),
            status: status.as_u16(),
        };

        (status, axum::Json(body)).into_response()
    }
}

impl From<TranslateError> for AppError {
    fn from(err: TranslateError) -> Self {
        AppError::TranslationUnavailable(err.to_string())
    }
}
