//! OAuth client identity and authorization URL construction.

use crate::config::SpotifyConfig;
use crate::error::{BridgeError, Result};

/// OAuth client configuration resolved from startup config
#[derive(Clone, Debug)]
pub struct OAuthClientConfig {
    /// OAuth authorization endpoint URL
    pub auth_url: String,

    /// OAuth token exchange endpoint URL
    pub token_url: String,

    /// Space-separated scopes requested during authorization
    pub scope: String,

    pub client_id: String,

    pub client_secret: String,

    pub redirect_uri: String,
}

impl OAuthClientConfig {
    /// Resolve client identity, failing with `Configuration` when any part is missing.
    pub fn from_config(config: &SpotifyConfig) -> Result<Self> {
        let required = |value: &Option<String>, name: &str| {
            value
                .as_deref()
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(String::from)
                .ok_or_else(|| BridgeError::Configuration(format!("{} not configured", name)))
        };

        Ok(Self {
            auth_url: config.auth_url.clone(),
            token_url: config.token_url.clone(),
            scope: required(&config.scope, "SPOTIFY_SCOPE")?,
            client_id: required(&config.client_id, "SPOTIFY_CLIENT_ID")?,
            client_secret: required(&config.client_secret, "SPOTIFY_CLIENT_SECRET")?,
            redirect_uri: config.redirect_uri.clone(),
        })
    }

    /// Build authorization URL with state and redirect_uri
    pub fn build_auth_url(&self, state: &str) -> String {
        format!(
            "{}?client_id={}&response_type=code&redirect_uri={}&scope={}&state={}",
            self.auth_url,
            urlencoding::encode(&self.client_id),
            urlencoding::encode(&self.redirect_uri),
            urlencoding::encode(&self.scope),
            urlencoding::encode(state)
        )
    }
}
