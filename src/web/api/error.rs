use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use utoipa::ToSchema;

use crate::telescope::SessionError;
use crate::web::auth::PermissionError;

pub enum ApiError {
    Permission(PermissionError),
    Validation(String),
    Session(SessionError),
}

impl From<PermissionError> for ApiError {
    fn from(e: PermissionError) -> Self {
        ApiError::Permission(e)
    }
}

impl From<SessionError> for ApiError {
    fn from(e: SessionError) -> Self {
        match e {
            SessionError::InvalidArgument(msg) => ApiError::Validation(msg),
            other => ApiError::Session(other),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Permission(e) => e.into_response(),
            ApiError::Validation(msg) => (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse::with_message("validation_failed", &msg)),
            )
                .into_response(),
            ApiError::Session(e) => {
                let (status, error) = match &e {
                    SessionError::NotConnected => (StatusCode::CONFLICT, "not_connected"),
                    SessionError::CommandSubmissionFailed(_) => {
                        (StatusCode::BAD_GATEWAY, "submission_failed")
                    }
                    SessionError::ConnectionFailed(_) => (StatusCode::BAD_GATEWAY, "connection_failed"),
                    SessionError::CommandFailed { .. } => (StatusCode::BAD_GATEWAY, "command_failed"),
                    SessionError::InvalidArgument(_) => (StatusCode::BAD_REQUEST, "validation_failed"),
                };
                (
                    status,
                    Json(ErrorResponse::with_message(error, &e.to_string())),
                )
                    .into_response()
            }
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ErrorResponse {
    pub fn with_message(error: &str, message: &str) -> Self {
        ErrorResponse {
            error: error.to_string(),
            message: Some(message.to_string()),
        }
    }
}
