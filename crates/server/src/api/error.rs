use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{error, warn};

use procura_core::{ApplicationError, InterfaceError};

/// Wire form of every error: `{ "error", "message", "correlationId" }`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
    pub correlation_id: String,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: ErrorBody,
}

impl ApiError {
    pub fn new(
        status: StatusCode,
        kind: &str,
        message: impl Into<String>,
        correlation_id: impl Into<String>,
    ) -> Self {
        Self {
            status,
            body: ErrorBody {
                error: kind.to_owned(),
                message: message.into(),
                correlation_id: correlation_id.into(),
            },
        }
    }

    pub fn unauthorized(message: impl Into<String>, correlation_id: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "unauthorized", message, correlation_id)
    }

    pub fn bad_request(message: impl Into<String>, correlation_id: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "invalid_input", message, correlation_id)
    }

    pub fn from_application(error: ApplicationError, correlation_id: &str) -> Self {
        Self::from(error.into_interface(correlation_id))
    }

    pub fn from_json_rejection(rejection: JsonRejection, correlation_id: &str) -> Self {
        Self::bad_request(rejection.body_text(), correlation_id)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn body(&self) -> &ErrorBody {
        &self.body
    }
}

impl From<InterfaceError> for ApiError {
    fn from(value: InterfaceError) -> Self {
        let status = match value {
            InterfaceError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            InterfaceError::Forbidden { .. } => StatusCode::FORBIDDEN,
            InterfaceError::NotFound { .. } => StatusCode::NOT_FOUND,
            InterfaceError::Conflict { .. } => StatusCode::CONFLICT,
            InterfaceError::Unprocessable { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            InterfaceError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            InterfaceError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(status, value.kind(), value.message(), value.correlation_id())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            error!(
                event_name = "ingress.request.failed",
                correlation_id = %self.body.correlation_id,
                error_kind = %self.body.error,
                error = %self.body.message,
                "request failed"
            );
        } else {
            warn!(
                event_name = "ingress.request.refused",
                correlation_id = %self.body.correlation_id,
                error_kind = %self.body.error,
                error = %self.body.message,
                "request refused"
            );
        }
        (self.status, Json(self.body)).into_response()
    }
}
