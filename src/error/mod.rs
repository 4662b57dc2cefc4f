use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::record::RecordError;

/// Errors returned by the HTTP API.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ServiceError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal error")]
    Internal,

    #[error("Unimplemented: {0}")]
    Unimplemented(String),
}

impl ServiceError {
    pub fn status(&self) -> StatusCode {
        match self {
            ServiceError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
            ServiceError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
            ServiceError::Unimplemented(_) => StatusCode::NOT_IMPLEMENTED,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ServiceError::InvalidArgument(_) => "INVALID_ARGUMENT",
            ServiceError::NotFound(_) => "NOT_FOUND",
            ServiceError::Internal => "INTERNAL",
            ServiceError::Unimplemented(_) => "UNIMPLEMENTED",
        }
    }

    /// Message shown to the client. Internal details never leave the process.
    fn client_message(&self) -> String {
        match self {
            ServiceError::InvalidArgument(msg)
            | ServiceError::NotFound(msg)
            | ServiceError::Unimplemented(msg) => msg.clone(),
            ServiceError::Internal => "internal server error".to_string(),
        }
    }
}

impl From<RecordError> for ServiceError {
    fn from(error: RecordError) -> Self {
        match error {
            RecordError::InvalidArgument(msg) => ServiceError::InvalidArgument(msg),
            RecordError::NotFound(msg) => ServiceError::NotFound(msg),
            RecordError::Internal => ServiceError::Internal,
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Serialize)]
struct ErrorBody {
    code: String,
    message: String,
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status();
        let code = self.code();

        // Storage details were already logged by the record store
        if status.is_server_error() {
            tracing::warn!(code = %code, status = %status.as_u16(), "API error");
        } else {
            tracing::debug!(code = %code, status = %status.as_u16(), message = %self, "API error");
        }

        let body = ErrorResponse {
            error: ErrorBody {
                code: code.to_string(),
                message: self.client_message(),
            },
        };

        (status, Json(body)).into_response()
    }
}

pub type Result<T> = std::result::Result<T, ServiceError>;
