//! Authorization flow controller.
//!
//! Two transitions per device:
//! 1. [`AuthFlow::initiate`] issues a state token and builds the authorization URL
//! 2. [`AuthFlow::process_callback`] consumes the state, exchanges the code and
//!    stores the resulting tokens

use super::exchange::TokenClient;
use super::provider::OAuthClientConfig;
use super::state::AuthStateCache;
use crate::config::SpotifyConfig;
use crate::credentials::CredentialStore;
use crate::error::{BridgeError, Result};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Longest accepted device identifier
pub const MAX_DEVICE_ID_LEN: usize = 255;

/// OAuth callback query parameters
#[derive(Debug, Default, Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

/// Result of a completed authorization
#[derive(Debug, Clone, PartialEq)]
pub struct CallbackOutcome {
    pub success: bool,
    pub device_id: String,
    pub message: String,
}

pub struct AuthFlow {
    spotify: SpotifyConfig,
    states: AuthStateCache,
    store: Arc<CredentialStore>,
    tokens: TokenClient,
}

impl AuthFlow {
    pub fn new(
        spotify: SpotifyConfig,
        states: AuthStateCache,
        store: Arc<CredentialStore>,
        tokens: TokenClient,
    ) -> Self {
        Self {
            spotify,
            states,
            store,
            tokens,
        }
    }

    /// How long an issued authorization link stays redeemable.
    pub fn state_ttl(&self) -> chrono::Duration {
        self.states.ttl()
    }

    /// Starts authorization for a device and returns the URL to send the user to.
    ///
    /// No network call is made.
    pub fn initiate(&self, device_id: &str) -> Result<String> {
        validate_device_id(device_id)?;
        let client = OAuthClientConfig::from_config(&self.spotify)?;

        let state = self.states.issue(device_id);
        let url = client.build_auth_url(&state);

        info!(device_id = %device_id, "Generated authorization URL");
        Ok(url)
    }

    /// Dispatches a raw callback: provider-reported errors become
    /// `AuthorizationDenied`, otherwise `code` and `state` must both be present.
    pub async fn handle_callback(&self, params: CallbackParams) -> Result<CallbackOutcome> {
        if let Some(error) = params.error {
            // The attempt is over either way; do not leave the state redeemable
            if let Some(state) = params.state.as_deref() {
                self.states.consume(state);
            }
            let description = params
                .error_description
                .unwrap_or_else(|| "Unknown error".to_string());
            warn!(error = %error, description = %description, "Authorization denied by provider");
            return Err(BridgeError::AuthorizationDenied { error, description });
        }

        match (params.state, params.code) {
            (Some(state), Some(code)) if !state.is_empty() && !code.is_empty() => {
                self.process_callback(&state, &code).await
            }
            _ => Err(BridgeError::Validation(
                "missing required parameters".to_string(),
            )),
        }
    }

    /// Completes authorization for the device bound to `state`.
    ///
    /// # Errors
    /// * `Validation` - state unknown, expired or already used
    /// * `Configuration` - client identity missing
    /// * `Upstream` / `Timeout` - the code exchange failed
    /// * `Validation` / `Persistence` - storing the tokens failed
    pub async fn process_callback(&self, state: &str, code: &str) -> Result<CallbackOutcome> {
        let device_id = self
            .states
            .consume(state)
            .ok_or_else(|| BridgeError::Validation("invalid or expired state".to_string()))?;

        let client = OAuthClientConfig::from_config(&self.spotify)?;

        let tokens = self
            .tokens
            .exchange_code(&client, code)
            .await
            .map_err(|e| {
                error!(device_id = %device_id, error = %e, "Token exchange failed");
                e
            })?;

        let refresh_token = tokens.refresh_token.as_deref().ok_or_else(|| {
            BridgeError::Upstream {
                status: 200,
                description: "token response did not include a refresh token".to_string(),
            }
        })?;
        // Providers may omit scope when it equals the requested one
        let scope = tokens.scope.as_deref().unwrap_or(&client.scope);

        self.store.set_tokens(
            &device_id,
            &tokens.access_token,
            refresh_token,
            tokens.expires_in,
            scope,
        )?;

        info!(device_id = %device_id, "Device authenticated");
        Ok(CallbackOutcome {
            success: true,
            device_id,
            message: "authenticated".to_string(),
        })
    }
}

pub fn validate_device_id(device_id: &str) -> Result<()> {
    if device_id.trim().is_empty() || device_id.len() > MAX_DEVICE_ID_LEN {
        return Err(BridgeError::Validation(format!(
            "device id must be between 1 and {} characters",
            MAX_DEVICE_ID_LEN
        )));
    }
    Ok(())
}
