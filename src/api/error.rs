use crate::error::BridgeError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;
use tracing::error;

/// Error response
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

/// Application error types for HTTP endpoints
#[derive(Debug)]
pub enum AppError {
    BadRequest(String),
    Unauthorized(String),
    NotFound(String),
    ServerError(String),
    BadGateway(String),
    GatewayTimeout(String),
}

impl AppError {
    /// Map a core error onto an HTTP error.
    ///
    /// Upstream text and internal failure detail are replaced by generic
    /// messages unless `expose_details` is set.
    pub fn from_bridge(e: BridgeError, expose_details: bool) -> Self {
        let detail = |generic: &str, e: &BridgeError| {
            if expose_details {
                format!("{}: {}", generic, e)
            } else {
                generic.to_string()
            }
        };

        match e {
            BridgeError::Validation(msg) | BridgeError::Input(msg) => AppError::BadRequest(msg),
            BridgeError::AuthorizationDenied { ref error, .. } => {
                AppError::BadRequest(detail(&format!("Authorization denied ({})", error), &e))
            }
            BridgeError::Upstream { .. } => AppError::BadGateway(detail("Upstream service error", &e)),
            BridgeError::Timeout(_) => AppError::GatewayTimeout(detail("Upstream service timed out", &e)),
            BridgeError::Configuration(_) => {
                error!(error = %e, "Configuration error");
                AppError::ServerError(detail("Service not configured", &e))
            }
            BridgeError::Integrity(_) | BridgeError::Persistence(_) => {
                error!(error = %e, "Internal error");
                AppError::ServerError(detail("An unexpected error occurred", &e))
            }
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::ServerError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::BadGateway(_) => StatusCode::BAD_GATEWAY,
            AppError::GatewayTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            AppError::BadRequest(msg)
            | AppError::Unauthorized(msg)
            | AppError::NotFound(msg)
            | AppError::ServerError(msg)
            | AppError::BadGateway(msg)
            | AppError::GatewayTimeout(msg) => msg,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = Json(ErrorResponse {
            error: self.message().to_string(),
        });

        (status, body).into_response()
    }
}
