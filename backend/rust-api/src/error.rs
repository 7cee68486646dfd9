use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::services::{FieldErrors, ServiceError};
use crate::store::StoreError;

/// Error returned by handlers, rendered as `{ "message", "status", "errors"? }`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
    errors: Option<FieldErrors>,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            errors: None,
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn too_many_requests(message: impl Into<String>) -> Self {
        Self::new(StatusCode::TOO_MANY_REQUESTS, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::NotFound(msg) => Self::not_found(msg),
            ServiceError::Unauthorized(msg) => Self::unauthorized(msg),
            ServiceError::Forbidden(msg) => Self::forbidden(msg),
            ServiceError::Conflict(msg) => Self::new(StatusCode::CONFLICT, msg),
            ServiceError::BadRequest(msg) => Self::bad_request(msg),
            ServiceError::Validation(errors) => Self {
                status: StatusCode::BAD_REQUEST,
                message: "Validation failed".to_string(),
                errors: Some(errors),
            },
            ServiceError::Store(StoreError::Duplicate(field)) => {
                Self::new(StatusCode::CONFLICT, format!("Duplicate value for {}", field))
            }
            ServiceError::Store(e) => {
                tracing::error!("Store error: {}", e);
                Self::internal("Internal server error")
            }
            ServiceError::Internal(e) => {
                tracing::error!("Internal error: {:#}", e);
                Self::internal("Internal server error")
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut body = json!({
            "message": self.message,
            "status": self.status.as_u16(),
        });
        if let Some(errors) = self.errors {
            body["errors"] = json!(errors);
        }

        (self.status, Json(body)).into_response()
    }
}
