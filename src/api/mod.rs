//! HTTP surface.
//!
//! Thin layer over the core components: it validates request shape, calls one
//! core operation and maps the result to a status code.

mod device;
mod error;
mod oauth;

pub use device::{CommandRequest, CommandResponse, RefreshRequest, RefreshResponse};
pub use error::AppError;
pub use oauth::AuthLinkResponse;

use crate::auth::{AccessGate, AuthFlow, AuthStateCache, TokenClient};
use crate::commands::{CommandExecutor, CommandInterpreter};
use crate::config::{BridgeConfig, ServerConfig};
use crate::credentials::{CredentialStore, TokenCipher};
use crate::error::{BridgeError, Result};
use crate::spotify::{PlaybackApi, SpotifyClient};
use crate::transcription::{Transcriber, WhisperClient};
use axum::{
    extract::DefaultBodyLimit,
    http::{header::CONTENT_TYPE, HeaderValue, Method},
    response::Json,
    routing::{get, post},
    Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};

/// Largest accepted `/command` body; matches the transcription upload limit
const MAX_COMMAND_BODY_BYTES: usize = 25 * 1024 * 1024;

/// Shared application state for all endpoints
#[derive(Clone)]
pub struct AppState {
    pub flow: Arc<AuthFlow>,
    pub gate: Arc<AccessGate>,
    pub interpreter: Arc<CommandInterpreter>,
    pub executor: Arc<CommandExecutor>,
    pub transcriber: Arc<dyn Transcriber>,
    pub expose_error_details: bool,
}

impl AppState {
    /// Wire every component from startup configuration.
    ///
    /// # Errors
    /// * `Configuration` - encryption key missing or invalid
    /// * `Persistence` - credential database cannot be opened
    pub fn from_config(config: &BridgeConfig) -> Result<Self> {
        let cipher = TokenCipher::from_config(config.auth.encryption_key.as_deref())?;
        let store = CredentialStore::new(&config.storage.database_path, Arc::new(cipher))?;
        let playback = SpotifyClient::with_base_url(
            config.spotify.api_base_url.clone(),
            Duration::from_secs(config.spotify.api_timeout_secs),
        )?;
        let transcriber = WhisperClient::from_config(&config.transcription)?;
        Self::with_components(
            config,
            Arc::new(store),
            Arc::new(playback),
            Arc::new(transcriber),
        )
    }

    /// Wire the components around an existing store and remote APIs.
    pub fn with_components(
        config: &BridgeConfig,
        store: Arc<CredentialStore>,
        playback: Arc<dyn PlaybackApi>,
        transcriber: Arc<dyn Transcriber>,
    ) -> Result<Self> {
        let tokens = TokenClient::new(Duration::from_secs(config.spotify.token_timeout_secs))?;
        let states = AuthStateCache::new(config.auth.state_ttl_seconds)?;

        let flow = AuthFlow::new(
            config.spotify.clone(),
            states,
            Arc::clone(&store),
            tokens.clone(),
        );
        let gate = Arc::new(AccessGate::new(config.spotify.clone(), store, tokens));
        let executor = CommandExecutor::new(Arc::clone(&gate), playback);

        Ok(Self {
            flow: Arc::new(flow),
            gate,
            interpreter: Arc::new(CommandInterpreter::new()?),
            executor: Arc::new(executor),
            transcriber,
            expose_error_details: config.server.expose_error_details,
        })
    }

    pub(crate) fn app_error(&self, e: BridgeError) -> AppError {
        AppError::from_bridge(e, self.expose_error_details)
    }
}

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(api_info))
        .route("/health", get(health))
        .route("/auth/link/:device_id", get(oauth::auth_link))
        .route("/auth/start/:device_id", get(oauth::auth_start))
        .route("/auth/callback", get(oauth::auth_callback))
        .route(
            "/command",
            post(device::process_command).layer(DefaultBodyLimit::max(MAX_COMMAND_BODY_BYTES)),
        )
        .route("/refresh", post(device::refresh_token))
        .route("/device/:device_id/status", get(device::device_status))
        .with_state(Arc::new(state))
}

/// Build the CORS layer from server configuration.
///
/// `*` allows any origin; an empty list allows none.
pub fn build_cors_layer(config: &ServerConfig) -> Result<CorsLayer> {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([CONTENT_TYPE])
        .max_age(Duration::from_secs(3600));

    if config.cors_origins.iter().any(|o| o == "*") {
        return Ok(layer.allow_origin(Any));
    }

    let origins = config
        .cors_origins
        .iter()
        .map(|o| {
            o.parse::<HeaderValue>().map_err(|e| {
                BridgeError::Configuration(format!("invalid CORS origin '{}': {}", o, e))
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(layer.allow_origin(origins))
}

/// GET /health
async fn health() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": "Voice Bridge API",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// GET / - API information and available endpoints
async fn api_info() -> Json<Value> {
    Json(json!({
        "service": "Voice Bridge API",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "auth_link": { "method": "GET", "path": "/auth/link/:device_id" },
            "auth_start": { "method": "GET", "path": "/auth/start/:device_id" },
            "auth_callback": { "method": "GET", "path": "/auth/callback" },
            "command": {
                "method": "POST",
                "path": "/command",
                "accepts": ["application/json", "multipart/form-data"],
            },
            "refresh": { "method": "POST", "path": "/refresh" },
            "device_status": { "method": "GET", "path": "/device/:device_id/status" },
            "health": { "method": "GET", "path": "/health" },
        },
    }))
}
