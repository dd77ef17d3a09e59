//! Command, refresh and device status endpoints.

use super::{AppError, AppState};
use crate::auth::{validate_device_id, DeviceStatus};
use crate::commands::{CommandErrorKind, CommandKind};
use crate::error::BridgeError;
use crate::transcription::{AudioUpload, SUPPORTED_EXTENSIONS};
use axum::{
    extract::{FromRequest, Multipart, Path, Request, State},
    http::{header::CONTENT_TYPE, StatusCode},
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};

/// JSON body for POST /command (text already transcribed by the device)
#[derive(Deserialize, Debug)]
pub struct CommandRequest {
    pub device_id: String,
    pub text: String,
}

/// Response for POST /command
#[derive(Serialize, Debug)]
pub struct CommandResponse {
    pub success: bool,
    /// Submitted or transcribed text
    pub text: String,
    pub command: Option<CommandKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub argument: Option<String>,
    pub message: String,
    pub action_taken: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<CommandErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Request body for POST /refresh
#[derive(Deserialize, Debug)]
pub struct RefreshRequest {
    pub device_id: String,
}

/// Response for POST /refresh
#[derive(Serialize, Debug)]
pub struct RefreshResponse {
    pub success: bool,
    pub device_id: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// POST /command
///
/// Accepts either JSON `{device_id, text}` or a multipart upload with a
/// `device_id` field and an `audio` file, which is transcribed first. Text
/// without a command is a successful no-op (`action_taken: false`).
pub(super) async fn process_command(
    State(state): State<Arc<AppState>>,
    request: Request,
) -> Result<Response, AppError> {
    let is_multipart = request
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("multipart/form-data"));

    let (device_id, text) = if is_multipart {
        let multipart = Multipart::from_request(request, &state)
            .await
            .map_err(|e| AppError::BadRequest(e.body_text()))?;
        transcribe_upload(&state, multipart).await?
    } else {
        let Json(body) = Json::<CommandRequest>::from_request(request, &state)
            .await
            .map_err(|e| AppError::BadRequest(e.body_text()))?;
        validate_device_id(&body.device_id).map_err(|e| state.app_error(e))?;
        (body.device_id, body.text)
    };

    run_command(&state, device_id, text).await
}

/// Reads the multipart fields, checks the device can act, then transcribes.
async fn transcribe_upload(
    state: &AppState,
    mut multipart: Multipart,
) -> Result<(String, String), AppError> {
    let mut device_id = None;
    let mut audio = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(e.body_text()))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "device_id" => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| AppError::BadRequest(e.body_text()))?;
                device_id = Some(value);
            }
            "audio" => {
                let filename = field.file_name().unwrap_or_default().to_string();
                let content_type = field.content_type().map(str::to_string);
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::BadRequest(e.body_text()))?;
                audio = Some(AudioUpload {
                    filename,
                    content_type,
                    data: data.to_vec(),
                });
            }
            _ => {}
        }
    }

    let device_id = device_id
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| AppError::BadRequest("device_id is required".to_string()))?;
    validate_device_id(&device_id).map_err(|e| state.app_error(e))?;

    let audio = audio.ok_or_else(|| AppError::BadRequest("audio file is required".to_string()))?;
    if audio.filename.is_empty() {
        return Err(AppError::BadRequest("No audio file selected".to_string()));
    }
    if !audio.is_supported_format() {
        warn!(
            device_id = %device_id,
            filename = %audio.filename,
            content_type = ?audio.content_type,
            "Unsupported audio format"
        );
        return Err(AppError::BadRequest(format!(
            "Unsupported audio format. Supported: {}",
            SUPPORTED_EXTENSIONS.join(", ")
        )));
    }

    // Devices without a usable token are rejected before transcription
    match state.gate.get_valid_access_token(&device_id).await {
        Ok(Some(_)) => {}
        Ok(None) | Err(BridgeError::Integrity(_)) => {
            return Err(AppError::Unauthorized(
                "Device not authenticated or token refresh failed".to_string(),
            ));
        }
        Err(e) => return Err(state.app_error(e)),
    }

    let text = state.transcriber.transcribe(audio).await.map_err(|e| {
        error!(device_id = %device_id, error = %e, "Transcription failed");
        state.app_error(e)
    })?;

    info!(device_id = %device_id, "Audio command transcribed");
    Ok((device_id, text))
}

async fn run_command(
    state: &AppState,
    device_id: String,
    text: String,
) -> Result<Response, AppError> {
    let Some(command) = state.interpreter.parse(&text) else {
        info!(device_id = %device_id, "No command detected");
        return Ok(Json(CommandResponse {
            success: true,
            text,
            command: None,
            argument: None,
            message: "No command detected".to_string(),
            action_taken: false,
            error: None,
            details: None,
        })
        .into_response());
    };

    let outcome = state.executor.execute_command(&command, &device_id).await;

    if outcome.is_not_authenticated() {
        return Err(AppError::Unauthorized(outcome.message));
    }

    info!(
        device_id = %device_id,
        command = %outcome.command,
        success = outcome.success,
        "Command processed"
    );

    let status = if outcome.success {
        StatusCode::OK
    } else {
        StatusCode::BAD_REQUEST
    };

    let response = CommandResponse {
        success: outcome.success,
        text,
        command: Some(outcome.command),
        argument: command.argument,
        message: outcome.message,
        action_taken: outcome.success,
        error: outcome.error,
        details: outcome.details.filter(|_| state.expose_error_details),
    };

    Ok((status, Json(response)).into_response())
}

/// POST /refresh
///
/// Forces a token refresh for the device regardless of expiry.
pub(super) async fn refresh_token(
    State(state): State<Arc<AppState>>,
    Json(body): Json<RefreshRequest>,
) -> Result<Response, AppError> {
    validate_device_id(&body.device_id).map_err(|e| state.app_error(e))?;

    let refreshed = state
        .gate
        .refresh(&body.device_id)
        .await
        .map_err(|e| state.app_error(e))?;

    if refreshed {
        info!(device_id = %body.device_id, "Manual token refresh succeeded");
        let response = RefreshResponse {
            success: true,
            message: format!("Token refreshed successfully for device {}", body.device_id),
            device_id: body.device_id,
            error: None,
        };
        return Ok(Json(response).into_response());
    }

    warn!(device_id = %body.device_id, "Manual token refresh failed");
    let response = RefreshResponse {
        success: false,
        message: format!("Failed to refresh token for device {}", body.device_id),
        device_id: body.device_id,
        error: Some("refresh_failed".to_string()),
    };
    Ok((StatusCode::BAD_REQUEST, Json(response)).into_response())
}

/// GET /device/:device_id/status
pub(super) async fn device_status(
    State(state): State<Arc<AppState>>,
    Path(device_id): Path<String>,
) -> Result<Json<DeviceStatus>, AppError> {
    validate_device_id(&device_id).map_err(|e| state.app_error(e))?;

    state
        .gate
        .device_status(&device_id)
        .map_err(|e| state.app_error(e))?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("Device {} not found", device_id)))
}
