//! Authorization state tokens for CSRF and replay protection.
//!
//! Each authorization attempt gets a random, single-use state token that maps
//! back to the device that started it. Entries live in memory only; a restart
//! forces devices to begin the flow again.

use crate::error::{BridgeError, Result};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{DateTime, Duration, Utc};
use rand::{rngs::OsRng, RngCore};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};

/// Random bytes per state token (256 bits)
const STATE_TOKEN_BYTES: usize = 32;

/// Longest accepted state lifetime (one day)
pub const MAX_STATE_TTL_SECS: i64 = 24 * 60 * 60;

/// In-flight authorization attempt
#[derive(Clone, Debug)]
pub struct AuthStateEntry {
    pub device_id: String,
    pub created_at: DateTime<Utc>,
}

/// State token cache with TTL expiry.
///
/// Cloning shares the underlying map, so one cache constructed at startup can
/// be handed to every component that needs it.
#[derive(Clone)]
pub struct AuthStateCache {
    states: Arc<Mutex<HashMap<String, AuthStateEntry>>>,
    ttl: Duration,
}

impl AuthStateCache {
    /// Create a new state cache
    ///
    /// # Arguments
    /// * `ttl_seconds` - How long states remain valid (default: 300 = 5 minutes)
    ///
    /// # Errors
    /// * `Configuration` - `ttl_seconds` is outside `1..=MAX_STATE_TTL_SECS`
    pub fn new(ttl_seconds: i64) -> Result<Self> {
        if !(1..=MAX_STATE_TTL_SECS).contains(&ttl_seconds) {
            return Err(BridgeError::Configuration(format!(
                "AUTH_STATE_TTL must be between 1 and {} seconds, got {}",
                MAX_STATE_TTL_SECS, ttl_seconds
            )));
        }
        Ok(Self {
            states: Arc::new(Mutex::new(HashMap::new())),
            ttl: Duration::seconds(ttl_seconds),
        })
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    // A poisoned map is still structurally valid; keep serving it.
    fn lock(&self) -> MutexGuard<'_, HashMap<String, AuthStateEntry>> {
        self.states.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Evicts expired entries, then generates and stores a new state token.
    pub fn issue(&self, device_id: &str) -> String {
        self.issue_at(device_id, Utc::now())
    }

    pub(crate) fn issue_at(&self, device_id: &str, now: DateTime<Utc>) -> String {
        let mut bytes = [0u8; STATE_TOKEN_BYTES];
        OsRng.fill_bytes(&mut bytes);
        let state = URL_SAFE_NO_PAD.encode(bytes);

        let mut states = self.lock();
        let before = states.len();
        states.retain(|_, entry| !self.is_expired(entry, now));
        let evicted = before - states.len();
        if evicted > 0 {
            debug!(evicted, "Evicted expired authorization states");
        }

        states.insert(
            state.clone(),
            AuthStateEntry {
                device_id: device_id.to_string(),
                created_at: now,
            },
        );

        info!(device_id = %device_id, "Issued authorization state");
        state
    }

    /// Removes a state token and returns its device id.
    ///
    /// Returns `None` if the token is unknown or older than the TTL. The entry
    /// is removed in either case, so a token is usable at most once.
    pub fn consume(&self, state: &str) -> Option<String> {
        self.consume_at(state, Utc::now())
    }

    pub(crate) fn consume_at(&self, state: &str, now: DateTime<Utc>) -> Option<String> {
        let entry = self.lock().remove(state);

        let Some(entry) = entry else {
            warn!(state = %prefix(state), "Unknown or already used authorization state");
            return None;
        };

        if self.is_expired(&entry, now) {
            warn!(state = %prefix(state), device_id = %entry.device_id, "Expired authorization state");
            return None;
        }

        debug!(device_id = %entry.device_id, "Authorization state consumed");
        Some(entry.device_id)
    }

    fn is_expired(&self, entry: &AuthStateEntry, now: DateTime<Utc>) -> bool {
        now - entry.created_at > self.ttl
    }

    /// Get count of pending states (for monitoring)
    pub fn count(&self) -> usize {
        self.lock().len()
    }
}

/// Loggable prefix of a state token.
fn prefix(state: &str) -> String {
    state.chars().take(8).collect()
}
