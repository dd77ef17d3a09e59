use super::{AudioUpload, Transcriber};
use crate::config::TranscriptionConfig;
use crate::error::{BridgeError, Result};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    #[serde(default)]
    message: Option<String>,
}

/// HTTP client for the OpenAI audio transcription endpoint.
#[derive(Clone)]
pub struct WhisperClient {
    http_client: Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
}

impl WhisperClient {
    pub fn from_config(config: &TranscriptionConfig) -> Result<Self> {
        let http_client = Client::builder()
            .user_agent("voice-bridge/1.0")
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| BridgeError::Configuration(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            http_client,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
        })
    }
}

#[async_trait]
impl Transcriber for WhisperClient {
    /// # Errors
    /// * `Configuration` - no API key configured
    /// * `Validation` - empty audio or an unparseable content type
    /// * `Upstream` / `Timeout` - the transcription request failed
    async fn transcribe(&self, audio: AudioUpload) -> Result<String> {
        let api_key = self
            .api_key
            .as_deref()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| BridgeError::Configuration("OPENAI_API_KEY not configured".to_string()))?;

        if audio.data.is_empty() {
            return Err(BridgeError::Validation("no audio file provided".to_string()));
        }

        info!(
            filename = %audio.filename,
            bytes = audio.data.len(),
            "Transcribing audio"
        );

        let mut part = Part::bytes(audio.data).file_name(audio.filename);
        if let Some(content_type) = audio.content_type.as_deref() {
            part = part.mime_str(content_type).map_err(|e| {
                BridgeError::Validation(format!("invalid audio content type: {}", e))
            })?;
        }
        let form = Form::new()
            .text("model", self.model.clone())
            .text("response_format", "text")
            .text("temperature", "0")
            .part("file", part);

        let response = self
            .http_client
            .post(format!("{}/audio/transcriptions", self.base_url))
            .bearer_auth(api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| BridgeError::from_reqwest("transcription request failed", e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ApiErrorBody>(&body)
                .ok()
                .and_then(|b| b.error.message)
                .unwrap_or_else(|| status.to_string());
            warn!(status = status.as_u16(), message = %message, "Transcription rejected");
            return Err(BridgeError::Upstream {
                status: status.as_u16(),
                description: format!("transcription failed: {}", message),
            });
        }

        let text = response
            .text()
            .await
            .map_err(|e| BridgeError::from_reqwest("failed to read transcription", e))?;
        let text = text.trim().to_string();

        if text.is_empty() {
            warn!("Transcription returned empty text");
        } else {
            debug!(preview = %text.chars().take(50).collect::<String>(), "Transcription complete");
        }
        Ok(text)
    }
}
