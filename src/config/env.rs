use super::BridgeConfig;

impl BridgeConfig {
    /// Override fields from process environment variables.
    pub fn apply_env(&mut self) {
        self.apply_env_from(|key| std::env::var(key).ok());
    }

    /// Override fields from an arbitrary variable lookup. Unparseable values
    /// are ignored and the existing value is kept.
    pub fn apply_env_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = var("SPOTIFY_CLIENT_ID") {
            self.spotify.client_id = Some(v);
        }
        if let Some(v) = var("SPOTIFY_CLIENT_SECRET") {
            self.spotify.client_secret = Some(v);
        }
        if let Some(v) = var("SPOTIFY_REDIRECT_URI") {
            self.spotify.redirect_uri = v;
        }
        if let Some(v) = var("SPOTIFY_SCOPE") {
            self.spotify.scope = Some(v);
        }
        if let Some(v) = var("SPOTIFY_AUTH_URL") {
            self.spotify.auth_url = v;
        }
        if let Some(v) = var("SPOTIFY_TOKEN_URL") {
            self.spotify.token_url = v;
        }
        if let Some(v) = var("SPOTIFY_API_BASE_URL") {
            self.spotify.api_base_url = v;
        }
        if let Some(n) = var("TOKEN_TIMEOUT_SECS").and_then(|v| v.parse::<u64>().ok()) {
            self.spotify.token_timeout_secs = n;
        }
        if let Some(n) = var("API_TIMEOUT_SECS").and_then(|v| v.parse::<u64>().ok()) {
            self.spotify.api_timeout_secs = n;
        }
        if let Some(v) = var("FIELD_ENCRYPTION_KEY") {
            self.auth.encryption_key = Some(v);
        }
        if let Some(n) = var("AUTH_STATE_TTL").and_then(|v| v.parse::<i64>().ok()) {
            self.auth.state_ttl_seconds = n;
        }
        if let Some(v) = var("DATABASE_PATH") {
            self.storage.database_path = v;
        }
        if let Some(n) = var("RETENTION_DAYS").and_then(|v| v.parse::<i64>().ok()) {
            self.storage.retention_days = n;
        }
        if let Some(v) = var("BIND_ADDRESS") {
            self.server.bind_address = v;
        }
        if let Some(v) = var("CORS_ORIGINS") {
            self.server.cors_origins = v
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect();
        }
        if let Some(b) = var("EXPOSE_ERROR_DETAILS").and_then(|v| v.parse::<bool>().ok()) {
            self.server.expose_error_details = b;
        }
        if let Some(v) = var("OPENAI_API_KEY") {
            self.transcription.api_key = Some(v);
        }
        if let Some(v) = var("OPENAI_MODEL") {
            self.transcription.model = v;
        }
        if let Some(v) = var("OPENAI_API_BASE_URL") {
            self.transcription.api_base_url = v;
        }
        if let Some(n) = var("OPENAI_API_TIMEOUT").and_then(|v| v.parse::<u64>().ok()) {
            self.transcription.timeout_secs = n;
        }
    }
}
