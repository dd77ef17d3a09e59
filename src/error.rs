//! Error taxonomy shared by the credential and command subsystems.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, BridgeError>;

/// Errors raised by the core components.
///
/// The HTTP layer maps these onto status codes; the access gate converts the
/// ones it can handle into an absent token or a failed refresh.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// Missing or invalid startup configuration.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Empty or malformed input to a primitive (e.g. encrypting an empty string).
    #[error("invalid input: {0}")]
    Input(String),

    /// Bad, expired or replayed state, or malformed request data.
    #[error("validation error: {0}")]
    Validation(String),

    /// The remote service rejected a request.
    #[error("upstream error ({status}): {description}")]
    Upstream { status: u16, description: String },

    /// An outbound call exceeded its timeout. Safe for the caller to retry.
    #[error("upstream request timed out: {0}")]
    Timeout(String),

    /// A stored secret failed authenticated decryption.
    #[error("integrity error: {0}")]
    Integrity(String),

    /// The local store failed to commit; the transaction was rolled back.
    #[error("persistence error: {0}")]
    Persistence(String),

    /// The remote service reported an error on the authorization callback
    /// (user denied consent, etc.).
    #[error("authorization denied: {error} - {description}")]
    AuthorizationDenied { error: String, description: String },
}

impl BridgeError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, BridgeError::Timeout(_))
    }

    pub(crate) fn from_reqwest(context: &str, e: reqwest::Error) -> Self {
        if e.is_timeout() {
            BridgeError::Timeout(context.to_string())
        } else {
            BridgeError::Upstream {
                status: e.status().map(|s| s.as_u16()).unwrap_or(0),
                description: format!("{}: {}", context, e),
            }
        }
    }
}

impl From<rusqlite::Error> for BridgeError {
    fn from(e: rusqlite::Error) -> Self {
        BridgeError::Persistence(e.to_string())
    }
}
