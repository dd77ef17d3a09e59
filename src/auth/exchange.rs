//! OAuth token endpoint calls.
//!
//! Handles exchanging authorization codes for tokens and refreshing access
//! tokens. Every request carries a bounded timeout.

use super::provider::OAuthClientConfig;
use crate::error::{BridgeError, Result};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

/// Longest token lifetime accepted from the token endpoint (one year)
pub const MAX_EXPIRES_IN_SECS: i64 = 365 * 24 * 60 * 60;

/// Token endpoint response (standard OAuth 2.0)
#[derive(Deserialize, Debug)]
pub struct TokenResponse {
    pub access_token: String,
    /// Optional on refresh; the previous refresh token stays valid when absent
    #[serde(default)]
    pub refresh_token: Option<String>,
    pub expires_in: i64,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub token_type: Option<String>,
}

/// Error body returned by the token endpoint on failure
#[derive(Deserialize, Debug, Default)]
struct TokenErrorResponse {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
}

/// HTTP client for the remote token endpoint
#[derive(Clone)]
pub struct TokenClient {
    http_client: reqwest::Client,
}

impl TokenClient {
    pub fn new(timeout: Duration) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| BridgeError::Configuration(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self { http_client })
    }

    /// Exchange authorization code for tokens
    pub async fn exchange_code(
        &self,
        client: &OAuthClientConfig,
        code: &str,
    ) -> Result<TokenResponse> {
        let form = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", client.redirect_uri.as_str()),
            ("client_id", client.client_id.as_str()),
            ("client_secret", client.client_secret.as_str()),
        ];

        debug!(token_url = %client.token_url, "Exchanging authorization code for token");
        self.post_form(&client.token_url, &form).await
    }

    /// Mint a new access token from a refresh token
    pub async fn refresh(
        &self,
        client: &OAuthClientConfig,
        refresh_token: &str,
    ) -> Result<TokenResponse> {
        let form = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("redirect_uri", client.redirect_uri.as_str()),
            ("client_id", client.client_id.as_str()),
            ("client_secret", client.client_secret.as_str()),
        ];

        debug!(token_url = %client.token_url, "Refreshing access token");
        self.post_form(&client.token_url, &form).await
    }

    async fn post_form(&self, token_url: &str, form: &[(&str, &str)]) -> Result<TokenResponse> {
        let response = self
            .http_client
            .post(token_url)
            .header("Accept", "application/json")
            .form(form)
            .send()
            .await
            .map_err(|e| BridgeError::from_reqwest("token endpoint request failed", e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let parsed: TokenErrorResponse = serde_json::from_str(&body).unwrap_or_default();
            let description = parsed
                .error_description
                .or(parsed.error)
                .unwrap_or_else(|| "Unknown error".to_string());
            return Err(BridgeError::Upstream {
                status: status.as_u16(),
                description,
            });
        }

        let token_response: TokenResponse = response
            .json()
            .await
            .map_err(|e| BridgeError::from_reqwest("failed to parse token response", e))?;

        if !(1..=MAX_EXPIRES_IN_SECS).contains(&token_response.expires_in) {
            warn!(
                expires_in = token_response.expires_in,
                "Token endpoint returned an out-of-range expiry"
            );
            return Err(BridgeError::Upstream {
                status: status.as_u16(),
                description: format!(
                    "token response expires_in out of range: {}",
                    token_response.expires_in
                ),
            });
        }

        debug!(
            has_refresh_token = token_response.refresh_token.is_some(),
            expires_in = token_response.expires_in,
            "Token endpoint call successful"
        );

        Ok(token_response)
    }
}
