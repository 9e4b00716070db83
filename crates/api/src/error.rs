use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use course_core::model::IdError;
use serde::Serialize;
use services::{ErrorKind, ProgressError};
use thiserror::Error;
use tracing::{debug, error};

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    #[error(transparent)]
    InvalidId(#[from] IdError),

    #[error(transparent)]
    Progress(#[from] ProgressError),
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::MalformedPayload(rejection.body_text())
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

impl ApiError {
    fn status(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::MalformedPayload(_) | ApiError::InvalidId(_) => {
                (StatusCode::BAD_REQUEST, "validation")
            }
            ApiError::Progress(err) => match err.kind() {
                ErrorKind::NotFound => (StatusCode::NOT_FOUND, "not_found"),
                ErrorKind::Conflict => (StatusCode::CONFLICT, "conflict"),
                ErrorKind::Validation => (StatusCode::BAD_REQUEST, "validation"),
                ErrorKind::PersistenceUnavailable => {
                    (StatusCode::SERVICE_UNAVAILABLE, "persistence_unavailable")
                }
                ErrorKind::Corrupt => (StatusCode::INTERNAL_SERVER_ERROR, "corrupt"),
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status();
        if status.is_server_error() {
            error!(error = %self, "request failed");
        } else {
            debug!(error = %self, "request rejected");
        }

        let body = ErrorBody {
            error: code,
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}
