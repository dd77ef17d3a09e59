//! Device authorization endpoints.
//!
//! 1. A device (or its companion app) asks for `/auth/link/:device_id` and
//!    renders the returned URL as a QR code, or sends the user to
//!    `/auth/start/:device_id`
//! 2. The user authorizes on the provider's site
//! 3. The provider redirects to `/auth/callback` with `code` and `state`
//! 4. Tokens are exchanged and stored for the device

use super::{AppError, AppState};
use crate::auth::CallbackParams;
use crate::error::BridgeError;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Json, Redirect, Response},
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Response for GET /auth/link/:device_id
#[derive(Serialize, Debug)]
pub struct AuthLinkResponse {
    pub device_id: String,
    pub auth_url: String,
    /// Seconds the embedded state stays redeemable
    pub expires_in: i64,
}

/// GET /auth/link/:device_id
///
/// Returns the authorization URL as JSON, for rendering as a QR code.
pub(super) async fn auth_link(
    State(state): State<Arc<AppState>>,
    Path(device_id): Path<String>,
) -> Result<Json<AuthLinkResponse>, AppError> {
    debug!(device_id = %device_id, "Authorization link requested");

    let auth_url = state
        .flow
        .initiate(&device_id)
        .map_err(|e| state.app_error(e))?;

    Ok(Json(AuthLinkResponse {
        device_id,
        auth_url,
        expires_in: state.flow.state_ttl().num_seconds(),
    }))
}

/// GET /auth/start/:device_id
///
/// Redirects the browser straight to the provider's authorization page.
pub(super) async fn auth_start(
    State(state): State<Arc<AppState>>,
    Path(device_id): Path<String>,
) -> Result<Redirect, AppError> {
    debug!(device_id = %device_id, "Authorization start requested");

    let auth_url = state
        .flow
        .initiate(&device_id)
        .map_err(|e| state.app_error(e))?;

    Ok(Redirect::to(&auth_url))
}

/// GET /auth/callback
///
/// Completes authorization. Renders an HTML page since the user lands here
/// in a browser.
pub(super) async fn auth_callback(
    State(state): State<Arc<AppState>>,
    Query(params): Query<CallbackParams>,
) -> Response {
    match state.flow.handle_callback(params).await {
        Ok(outcome) => {
            info!(device_id = %outcome.device_id, "Authorization callback completed");
            (StatusCode::OK, Html(SUCCESS_PAGE)).into_response()
        }
        Err(e) => {
            let (status, message) = callback_failure(&e, state.expose_error_details);
            match status {
                StatusCode::INTERNAL_SERVER_ERROR => {
                    error!(error = %e, "Unexpected callback error")
                }
                _ => warn!(error = %e, "Authorization callback failed"),
            }
            (status, Html(error_page(&message))).into_response()
        }
    }
}

fn callback_failure(e: &BridgeError, expose_details: bool) -> (StatusCode, String) {
    match e {
        BridgeError::AuthorizationDenied { error, description } => (
            StatusCode::BAD_REQUEST,
            format!("{}: {}", error, description),
        ),
        BridgeError::Validation(msg) | BridgeError::Input(msg) => {
            (StatusCode::BAD_REQUEST, capitalize(msg))
        }
        BridgeError::Upstream { .. } | BridgeError::Timeout(_) => {
            let message = if expose_details {
                format!("Token exchange failed: {}", e)
            } else {
                "Token exchange failed".to_string()
            };
            (StatusCode::BAD_REQUEST, message)
        }
        _ => {
            let message = if expose_details {
                e.to_string()
            } else {
                "An unexpected error occurred".to_string()
            };
            (StatusCode::INTERNAL_SERVER_ERROR, message)
        }
    }
}

fn capitalize(msg: &str) -> String {
    let mut chars = msg.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

const SUCCESS_PAGE: &str = r#"<!DOCTYPE html>
<html>
<head>
    <title>Voice Bridge - Success</title>
    <meta name="viewport" content="width=device-width, initial-scale=1">
</head>
<body style="font-family: sans-serif; text-align: center; padding: 2rem;">
    <h1>Success!</h1>
    <p>Your device has been connected to Spotify.</p>
    <p>You can now close this window.</p>
</body>
</html>
"#;

fn error_page(message: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head>
    <title>Voice Bridge - Error</title>
    <meta name="viewport" content="width=device-width, initial-scale=1">
</head>
<body style="font-family: sans-serif; text-align: center; padding: 2rem;">
    <h1>Authentication Failed</h1>
    <p>There was an error connecting your device to Spotify.</p>
    <pre>{}</pre>
</body>
</html>
"#,
        escape_html(message)
    )
}

/// Escape text interpolated into an HTML page.
fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
