//! Startup configuration.
//!
//! Values come from an optional TOML file and are then overridden by
//! environment variables (see [`env`]). Everything is read once at process
//! start; absence of required values is detected by [`BridgeConfig::validate`]
//! before any authorization flow is attempted.

pub mod env;

use crate::auth::MAX_STATE_TTL_SECS;
use crate::error::{BridgeError, Result};
use serde::Deserialize;

/// Complete voice bridge configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BridgeConfig {
    #[serde(default)]
    pub spotify: SpotifyConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub transcription: TranscriptionConfig,
}

/// OAuth client identity and remote endpoints
#[derive(Debug, Clone, Deserialize)]
pub struct SpotifyConfig {
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub client_secret: Option<String>,
    #[serde(default = "default_redirect_uri")]
    pub redirect_uri: String,
    /// Space-separated scopes requested during authorization
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default = "default_auth_url")]
    pub auth_url: String,
    #[serde(default = "default_token_url")]
    pub token_url: String,
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    /// Timeout for token endpoint calls (seconds)
    #[serde(default = "default_timeout_secs")]
    pub token_timeout_secs: u64,
    /// Timeout for search/playback calls (seconds)
    #[serde(default = "default_timeout_secs")]
    pub api_timeout_secs: u64,
}

fn default_redirect_uri() -> String {
    "http://localhost:5000/auth/callback".to_string()
}

fn default_auth_url() -> String {
    "https://accounts.spotify.com/authorize".to_string()
}

fn default_token_url() -> String {
    "https://accounts.spotify.com/api/token".to_string()
}

fn default_api_base_url() -> String {
    "https://api.spotify.com/v1".to_string()
}

fn default_timeout_secs() -> u64 {
    10
}

impl Default for SpotifyConfig {
    fn default() -> Self {
        Self {
            client_id: None,
            client_secret: None,
            redirect_uri: default_redirect_uri(),
            scope: None,
            auth_url: default_auth_url(),
            token_url: default_token_url(),
            api_base_url: default_api_base_url(),
            token_timeout_secs: default_timeout_secs(),
            api_timeout_secs: default_timeout_secs(),
        }
    }
}

/// Secrets and authorization state settings
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// Base64-encoded 32-byte key for token encryption at rest
    #[serde(default)]
    pub encryption_key: Option<String>,
    /// How long an authorization state token stays valid (seconds)
    #[serde(default = "default_state_ttl")]
    pub state_ttl_seconds: i64,
}

fn default_state_ttl() -> i64 {
    300
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            encryption_key: None,
            state_ttl_seconds: default_state_ttl(),
        }
    }
}

/// Credential database settings
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_database_path")]
    pub database_path: String,
    /// Inactivity window used by the retention sweep
    #[serde(default = "default_retention_days")]
    pub retention_days: i64,
}

fn default_database_path() -> String {
    "voice_bridge.db".to_string()
}

fn default_retention_days() -> i64 {
    30
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            retention_days: default_retention_days(),
        }
    }
}

/// Speech-to-text service used for audio commands
#[derive(Debug, Clone, Deserialize)]
pub struct TranscriptionConfig {
    /// Only needed when devices upload audio; text commands work without it
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_transcription_model")]
    pub model: String,
    #[serde(default = "default_transcription_base_url")]
    pub api_base_url: String,
    #[serde(default = "default_transcription_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_transcription_model() -> String {
    "whisper-1".to_string()
}

fn default_transcription_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_transcription_timeout_secs() -> u64 {
    30
}

impl Default for TranscriptionConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: default_transcription_model(),
            api_base_url: default_transcription_base_url(),
            timeout_secs: default_transcription_timeout_secs(),
        }
    }
}

/// HTTP server settings
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default)]
    pub cors_origins: Vec<String>,
    /// Include upstream error text in HTTP responses (debug only)
    #[serde(default)]
    pub expose_error_details: bool,
}

fn default_bind_address() -> String {
    "0.0.0.0:8000".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            cors_origins: Vec::new(),
            expose_error_details: false,
        }
    }
}

impl BridgeConfig {
    /// Loads the optional TOML file, then applies environment overrides.
    pub fn load(path: Option<&str>) -> Result<Self> {
        let mut config = match path {
            Some(path) => load_config(path)?,
            None => Self::default(),
        };
        config.apply_env();
        Ok(config)
    }

    /// Names of required values that are absent or empty.
    pub fn missing_required(&self) -> Vec<&'static str> {
        let checks = [
            ("SPOTIFY_CLIENT_ID", &self.spotify.client_id),
            ("SPOTIFY_CLIENT_SECRET", &self.spotify.client_secret),
            ("SPOTIFY_SCOPE", &self.spotify.scope),
            ("FIELD_ENCRYPTION_KEY", &self.auth.encryption_key),
        ];
        checks
            .into_iter()
            .filter(|(_, value)| value.as_deref().map_or(true, |v| v.trim().is_empty()))
            .map(|(name, _)| name)
            .collect()
    }

    pub fn validate(&self) -> Result<()> {
        let missing = self.missing_required();
        if !missing.is_empty() {
            return Err(BridgeError::Configuration(format!(
                "missing required configuration: {}",
                missing.join(", ")
            )));
        }
        if !(1..=MAX_STATE_TTL_SECS).contains(&self.auth.state_ttl_seconds) {
            return Err(BridgeError::Configuration(format!(
                "AUTH_STATE_TTL must be between 1 and {} seconds",
                MAX_STATE_TTL_SECS
            )));
        }
        Ok(())
    }
}

/// Load configuration from TOML file
pub fn load_config(path: &str) -> Result<BridgeConfig> {
    let contents = std::fs::read_to_string(path).map_err(|e| {
        BridgeError::Configuration(format!("failed to read config file {}: {}", path, e))
    })?;
    toml::from_str(&contents)
        .map_err(|e| BridgeError::Configuration(format!("invalid config file {}: {}", path, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn complete_config() -> BridgeConfig {
        let mut config = BridgeConfig::default();
        config.spotify.client_id = Some("client".to_string());
        config.spotify.client_secret = Some("secret".to_string());
        config.spotify.scope = Some("user-read-playback-state".to_string());
        config.auth.encryption_key = Some("a2V5".to_string());
        config
    }

    #[test]
    fn test_default_config() {
        let config = BridgeConfig::default();
        assert_eq!(config.auth.state_ttl_seconds, 300);
        assert_eq!(config.storage.retention_days, 30);
        assert_eq!(config.spotify.token_timeout_secs, 10);
        assert_eq!(config.server.bind_address, "0.0.0.0:8000");
        assert_eq!(
            config.spotify.redirect_uri,
            "http://localhost:5000/auth/callback"
        );
        assert!(!config.server.expose_error_details);
        assert_eq!(config.transcription.model, "whisper-1");
        assert_eq!(config.transcription.timeout_secs, 30);
        assert!(config.transcription.api_key.is_none());
    }

    #[test]
    fn test_config_deserialization() {
        let toml = r#"
            [spotify]
            client_id = "abc"
            client_secret = "def"
            scope = "user-read-playback-state user-modify-playback-state"
            token_timeout_secs = 5

            [auth]
            encryption_key = "AAAA"
            state_ttl_seconds = 120

            [storage]
            database_path = "/tmp/devices.db"
            retention_days = 7

            [server]
            bind_address = "127.0.0.1:9000"
            cors_origins = ["http://localhost:3000"]

            [transcription]
            api_key = "sk-test"
            timeout_secs = 15
        "#;

        let config: BridgeConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.spotify.client_id.as_deref(), Some("abc"));
        assert_eq!(config.spotify.token_timeout_secs, 5);
        assert_eq!(config.auth.state_ttl_seconds, 120);
        assert_eq!(config.storage.retention_days, 7);
        assert_eq!(config.server.cors_origins, vec!["http://localhost:3000"]);
        assert_eq!(config.transcription.api_key.as_deref(), Some("sk-test"));
        assert_eq!(config.transcription.timeout_secs, 15);
        assert_eq!(config.transcription.model, "whisper-1");
    }

    #[test]
    fn test_partial_config() {
        let toml = r#"
            [auth]
            state_ttl_seconds = 60
        "#;

        let config: BridgeConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.auth.state_ttl_seconds, 60);
        assert_eq!(config.storage.database_path, "voice_bridge.db"); // Default
        assert_eq!(config.spotify.auth_url, "https://accounts.spotify.com/authorize");
    }

    #[test]
    fn test_missing_required_values_detected() {
        let config = BridgeConfig::default();
        let missing = config.missing_required();
        assert_eq!(
            missing,
            vec![
                "SPOTIFY_CLIENT_ID",
                "SPOTIFY_CLIENT_SECRET",
                "SPOTIFY_SCOPE",
                "FIELD_ENCRYPTION_KEY"
            ]
        );

        let err = config.validate().unwrap_err();
        assert!(matches!(err, BridgeError::Configuration(_)));
        assert!(err.to_string().contains("SPOTIFY_CLIENT_ID"));
    }

    #[test]
    fn test_blank_values_count_as_missing() {
        let mut config = complete_config();
        config.spotify.client_secret = Some("   ".to_string());
        assert_eq!(config.missing_required(), vec!["SPOTIFY_CLIENT_SECRET"]);
    }

    #[test]
    fn test_complete_config_validates() {
        assert!(complete_config().validate().is_ok());

        for ttl in [0, -5, MAX_STATE_TTL_SECS + 1] {
            let mut config = complete_config();
            config.auth.state_ttl_seconds = ttl;
            assert!(
                matches!(config.validate(), Err(BridgeError::Configuration(_))),
                "ttl {} should fail validation",
                ttl
            );
        }
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bridge.toml");
        std::fs::write(&path, "[storage]\nretention_days = 3\n").unwrap();

        let config = load_config(path.to_str().unwrap()).unwrap();
        assert_eq!(config.storage.retention_days, 3);

        assert!(load_config("/nonexistent/bridge.toml").is_err());
    }
}
