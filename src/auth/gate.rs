//! Access gate: the single entry point for obtaining a usable access token.
//!
//! Expired tokens (within the 60-second buffer) are refreshed transparently,
//! at most once per call. Refreshes triggered through the gate are serialized
//! per device so concurrent callers share one upstream refresh; the explicit
//! [`AccessGate::refresh`] operation is not deduplicated and the last commit wins.

use super::exchange::TokenClient;
use super::provider::OAuthClientConfig;
use crate::config::SpotifyConfig;
use crate::credentials::{CredentialStore, DeviceCredential};
use crate::error::{BridgeError, Result};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// Authentication status of a device (for diagnostics)
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DeviceStatus {
    pub device_id: String,
    pub is_expired: bool,
    pub expires_at: DateTime<Utc>,
    /// Seconds until `expires_at`, absent once it has passed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seconds_until_expiry: Option<i64>,
    pub has_required_scopes: bool,
    pub updated_at: DateTime<Utc>,
}

pub struct AccessGate {
    spotify: SpotifyConfig,
    store: Arc<CredentialStore>,
    tokens: TokenClient,
    refresh_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl AccessGate {
    pub fn new(spotify: SpotifyConfig, store: Arc<CredentialStore>, tokens: TokenClient) -> Self {
        Self {
            spotify,
            store,
            tokens,
            refresh_locks: DashMap::new(),
        }
    }

    fn refresh_lock(&self, device_id: &str) -> Arc<Mutex<()>> {
        self.refresh_locks
            .entry(device_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Returns a currently valid access token for the device.
    ///
    /// # Returns
    /// * `Ok(Some(token))` - token outside the expiry buffer
    /// * `Ok(None)` - no record, or the refresh failed
    /// * `Err(Integrity)` - the stored access token could not be decrypted
    /// * `Err(Configuration | Persistence)` - propagated unchanged
    pub async fn get_valid_access_token(&self, device_id: &str) -> Result<Option<String>> {
        let Some(record) = self.store.get(device_id)? else {
            warn!(device_id = %device_id, "Device not found");
            return Ok(None);
        };

        let record = if record.is_expired() {
            let refreshed = self.refresh_serialized(device_id).await;
            self.release_refresh_lock(device_id);
            match refreshed? {
                Some(record) => record,
                None => return Ok(None),
            }
        } else {
            record
        };

        if record.is_expired() {
            warn!(device_id = %device_id, "Refreshed token is already inside the expiry buffer");
            return Ok(None);
        }

        self.store.access_token(&record).map(Some).map_err(|e| {
            error!(device_id = %device_id, "Failed to decrypt access token");
            e
        })
    }

    /// Refreshes under the device's lock unless a concurrent caller already did.
    async fn refresh_serialized(&self, device_id: &str) -> Result<Option<DeviceCredential>> {
        let lock = self.refresh_lock(device_id);
        let _guard = lock.lock().await;

        // Another caller may have refreshed while this one waited
        match self.store.get(device_id)? {
            None => Ok(None),
            Some(current) if !current.is_expired() => {
                debug!(device_id = %device_id, "Token refreshed by concurrent caller");
                Ok(Some(current))
            }
            Some(_) => {
                info!(device_id = %device_id, "Token expired, attempting refresh");
                if !self.refresh(device_id).await? {
                    error!(device_id = %device_id, "Failed to refresh token");
                    return Ok(None);
                }
                // Re-read: the record from before the refresh is stale
                self.store.get(device_id)
            }
        }
    }

    /// Drops the device's lock entry once no other caller holds or awaits it.
    fn release_refresh_lock(&self, device_id: &str) {
        self.refresh_locks
            .remove_if(device_id, |_, lock| Arc::strong_count(lock) == 1);
    }

    /// Refreshes the device's access token with its stored refresh token.
    ///
    /// Fails closed: missing record, undecryptable refresh token, upstream
    /// rejection, timeout and store failures all yield `Ok(false)` and leave
    /// the stored record unchanged. No retry is attempted.
    ///
    /// # Errors
    /// * `Configuration` - client identity is not configured
    pub async fn refresh(&self, device_id: &str) -> Result<bool> {
        match self.try_refresh(device_id).await {
            Ok(()) => {
                info!(device_id = %device_id, "Successfully refreshed token");
                Ok(true)
            }
            Err(e @ BridgeError::Configuration(_)) => Err(e),
            Err(e) => {
                warn!(
                    device_id = %device_id,
                    error = %e,
                    retryable = e.is_retryable(),
                    "Token refresh failed"
                );
                Ok(false)
            }
        }
    }

    async fn try_refresh(&self, device_id: &str) -> Result<()> {
        let client = OAuthClientConfig::from_config(&self.spotify)?;

        let record = self
            .store
            .get(device_id)?
            .ok_or_else(|| BridgeError::Validation(format!("device not found: {}", device_id)))?;
        let refresh_token = self.store.refresh_token(&record)?;

        let response = self.tokens.refresh(&client, &refresh_token).await?;

        // Keep the existing refresh token and scope if the provider did not reissue them
        let new_refresh_token = response.refresh_token.as_deref().unwrap_or(&refresh_token);
        let scope = response.scope.as_deref().unwrap_or(&record.scope);

        self.store.set_tokens(
            device_id,
            &response.access_token,
            new_refresh_token,
            response.expires_in,
            scope,
        )?;
        Ok(())
    }

    /// Reports the stored authentication status of a device.
    pub fn device_status(&self, device_id: &str) -> Result<Option<DeviceStatus>> {
        Ok(self.store.get(device_id)?.map(|record| DeviceStatus {
            is_expired: record.is_expired(),
            expires_at: record.expires_at,
            seconds_until_expiry: record.time_until_expiry().map(|d| d.num_seconds()),
            has_required_scopes: record.has_required_scopes(),
            updated_at: record.updated_at,
            device_id: record.device_id,
        }))
    }
}
