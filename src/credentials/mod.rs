//! Encrypted per-device credential storage for OAuth tokens.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │       CredentialStore                    │
//! │  - get / set_tokens / purge_stale        │
//! │  - Explicit decrypt accessors            │
//! └─────────────────────────────────────────┘
//!          ↓                    ↑
//!    (encrypt)            (decrypt)
//!          ↓                    ↑
//! ┌─────────────────────────────────────────┐
//! │       TokenCipher                        │
//! │  - AES-256-GCM, unique nonce per token   │
//! └─────────────────────────────────────────┘
//!          ↓                    ↑
//! ┌─────────────────────────────────────────┐
//! │       SQLite Database                    │
//! │  - One row per device                    │
//! │  - Transactional writes                  │
//! └─────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use voice_bridge::credentials::{CredentialStore, TokenCipher};
//!
//! # fn main() -> voice_bridge::error::Result<()> {
//! let cipher = TokenCipher::from_config(std::env::var("FIELD_ENCRYPTION_KEY").ok().as_deref())?;
//! let store = CredentialStore::new("voice_bridge.db", Arc::new(cipher))?;
//!
//! store.set_tokens("kitchen-speaker", "access", "refresh", 3600, "user-read-playback-state")?;
//!
//! if let Some(record) = store.get("kitchen-speaker")? {
//!     let _token = store.access_token(&record)?;
//!     println!("expired: {}", record.is_expired());
//! }
//! # Ok(())
//! # }
//! ```

use chrono::{DateTime, Duration, Utc};

mod encryption;
mod storage;

pub use encryption::{generate_key, validate_key, TokenCipher};
pub use storage::CredentialStore;

/// Tokens are treated as expired this many seconds before `expires_at`.
pub const EXPIRY_BUFFER_SECS: i64 = 60;

/// Minimum scopes a device needs for playback control.
pub const REQUIRED_SCOPES: &[&str] = &["user-read-playback-state", "user-modify-playback-state"];

/// Stored credential for one device.
///
/// Token fields hold ciphertext only; use [`CredentialStore::access_token`] and
/// [`CredentialStore::refresh_token`] to decrypt them.
#[derive(Clone, PartialEq)]
pub struct DeviceCredential {
    pub device_id: String,
    pub encrypted_access_token: Vec<u8>,
    pub encrypted_refresh_token: Vec<u8>,
    pub expires_at: DateTime<Utc>,
    /// Space-separated granted scopes
    pub scope: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl std::fmt::Debug for DeviceCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceCredential")
            .field("device_id", &self.device_id)
            .field("expires_at", &self.expires_at)
            .field("scope", &self.scope)
            .field("created_at", &self.created_at)
            .field("updated_at", &self.updated_at)
            .finish_non_exhaustive()
    }
}

impl DeviceCredential {
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// True once `now` is within the safety buffer before `expires_at`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at - Duration::seconds(EXPIRY_BUFFER_SECS)
    }

    /// Remaining lifetime, or `None` if already past `expires_at`.
    pub fn time_until_expiry(&self) -> Option<Duration> {
        let remaining = self.expires_at - Utc::now();
        (remaining > Duration::zero()).then_some(remaining)
    }

    pub fn granted_scopes(&self) -> impl Iterator<Item = &str> {
        self.scope.split_whitespace()
    }

    pub fn has_required_scopes(&self) -> bool {
        REQUIRED_SCOPES
            .iter()
            .all(|required| self.granted_scopes().any(|granted| granted == *required))
    }
}
