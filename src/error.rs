use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use engine::DeskError;
use thiserror::Error;
use tracing::{error, warn};

use crate::schemas::ErrorResponse;

/// Error returned by every API handler
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Desk(#[from] DeskError),

    #[error("Invalid username or password")]
    InvalidCredentials,
}

impl From<sea_orm::DbErr> for ApiError {
    fn from(err: sea_orm::DbErr) -> Self {
        ApiError::Desk(DeskError::Persistence(err))
    }
}

impl ApiError {
    pub fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::Desk(DeskError::NotFound(_)) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            ApiError::Desk(DeskError::Forbidden(_)) => (StatusCode::FORBIDDEN, "FORBIDDEN"),
            ApiError::Desk(DeskError::Validation(_)) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
            ApiError::Desk(DeskError::Unauthenticated) => (StatusCode::UNAUTHORIZED, "LOGIN_REQUIRED"),
            ApiError::Desk(DeskError::Persistence(_)) | ApiError::Desk(DeskError::Credential(_)) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "PERSISTENCE_FAILURE")
            }
            ApiError::InvalidCredentials => (StatusCode::UNAUTHORIZED, "INVALID_CREDENTIALS"),
        }
    }

    fn public_message(&self) -> String {
        match self {
            ApiError::Desk(DeskError::NotFound(what)) => format!("{what} not found"),
            ApiError::Desk(DeskError::Forbidden(_)) => {
                "You do not have permission to access this resource".to_string()
            }
            ApiError::Desk(DeskError::Validation(reason)) => reason.clone(),
            ApiError::Desk(DeskError::Unauthenticated) => "Login required".to_string(),
            ApiError::Desk(DeskError::Persistence(_)) | ApiError::Desk(DeskError::Credential(_)) => {
                "Internal server error".to_string()
            }
            ApiError::InvalidCredentials => self.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        if status.is_server_error() {
            error!("Request failed: {}", self);
        } else {
            warn!(code, "Request rejected: {}", self);
        }

        let body = ErrorResponse {
            error: self.public_message(),
            code: code.to_string(),
            success: false,
        };
        (status, Json(body)).into_response()
    }
}
