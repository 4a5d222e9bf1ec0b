use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tracing::error;

use crate::error::VidError;

/// Error returned from HTTP handlers as a plain-text response
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Internal(String),
}

impl ApiError {
    pub fn bad_request<S: Into<String>>(message: S) -> Self {
        ApiError::BadRequest(message.into())
    }

    pub fn internal<S: Into<String>>(message: S) -> Self {
        ApiError::Internal(message.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<VidError> for ApiError {
    fn from(err: VidError) -> Self {
        match err {
            VidError::InvalidFileName(_) => ApiError::BadRequest(err.to_string()),
            VidError::FileExists(_) => ApiError::BadRequest("file exists".to_string()),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match self {
            ApiError::BadRequest(message) => message,
            ApiError::Internal(message) => {
                error!("Request failed: {}", message);
                message
            }
        };

        (status, message).into_response()
    }
}
