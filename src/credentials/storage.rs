//! Encrypted credential storage using SQLite.
//!
//! Stores one credential record per device. Both tokens are encrypted at rest
//! and every mutation runs inside a transaction.

use super::{DeviceCredential, TokenCipher};
use crate::error::{BridgeError, Result};
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info};

const SELECT_COLUMNS: &str = "device_id, encrypted_access_token, encrypted_refresh_token, \
                              expires_at, scope, created_at, updated_at";

/// Encrypted credential storage backed by SQLite.
///
/// # Schema
/// ```sql
/// CREATE TABLE device_credentials (
///     device_id TEXT PRIMARY KEY,
///     encrypted_access_token BLOB NOT NULL,   -- nonce || ciphertext
///     encrypted_refresh_token BLOB NOT NULL,  -- nonce || ciphertext
///     expires_at TEXT NOT NULL,               -- RFC 3339, UTC, microseconds
///     scope TEXT NOT NULL,                    -- space separated
///     created_at TEXT NOT NULL,
///     updated_at TEXT NOT NULL
/// );
/// ```
///
/// Timestamps use a fixed-width format so `updated_at` compares correctly as
/// text in the retention sweep.
///
/// # Thread Safety
/// The connection is wrapped in a Mutex. Concurrent writers for the same
/// device are serialized by it; the later commit wins.
pub struct CredentialStore {
    conn: Mutex<Connection>,
    cipher: Arc<TokenCipher>,
}

impl CredentialStore {
    /// Creates or opens a credential store.
    pub fn new<P: AsRef<Path>>(db_path: P, cipher: Arc<TokenCipher>) -> Result<Self> {
        let in_memory = db_path.as_ref().as_os_str() == ":memory:";
        let conn = Connection::open(db_path)
            .map_err(|e| BridgeError::Persistence(format!("failed to open database: {}", e)))?;

        if !in_memory {
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| {
                row.get::<_, String>(0)
            })?;
        }

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS device_credentials (
                device_id TEXT PRIMARY KEY,
                encrypted_access_token BLOB NOT NULL,
                encrypted_refresh_token BLOB NOT NULL,
                expires_at TEXT NOT NULL,
                scope TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_device_credentials_updated_at
                ON device_credentials(updated_at);
            "#,
        )
        .map_err(|e| BridgeError::Persistence(format!("failed to create schema: {}", e)))?;

        Ok(Self {
            conn: Mutex::new(conn),
            cipher,
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| BridgeError::Persistence("credential store lock poisoned".to_string()))
    }

    /// Retrieves the credential record for a device.
    pub fn get(&self, device_id: &str) -> Result<Option<DeviceCredential>> {
        let conn = self.lock()?;
        let raw = conn
            .query_row(
                &format!(
                    "SELECT {} FROM device_credentials WHERE device_id = ?1",
                    SELECT_COLUMNS
                ),
                params![device_id],
                RawRecord::from_row,
            )
            .optional()?;

        raw.map(RawRecord::into_credential).transpose()
    }

    /// Creates or updates the record for a device with freshly issued tokens.
    ///
    /// Both tokens are encrypted before persisting and `expires_at` is
    /// recomputed as now + `expires_in_seconds`.
    ///
    /// # Errors
    /// * `Validation` - any argument is empty, or `expires_in_seconds` is not
    ///   positive or does not fit in a timestamp
    /// * `Persistence` - the transaction failed and was rolled back
    pub fn set_tokens(
        &self,
        device_id: &str,
        access_token: &str,
        refresh_token: &str,
        expires_in_seconds: i64,
        scope: &str,
    ) -> Result<DeviceCredential> {
        self.set_tokens_at(
            device_id,
            access_token,
            refresh_token,
            expires_in_seconds,
            scope,
            Utc::now(),
        )
    }

    pub(crate) fn set_tokens_at(
        &self,
        device_id: &str,
        access_token: &str,
        refresh_token: &str,
        expires_in_seconds: i64,
        scope: &str,
        now: DateTime<Utc>,
    ) -> Result<DeviceCredential> {
        if device_id.is_empty()
            || access_token.is_empty()
            || refresh_token.is_empty()
            || scope.trim().is_empty()
            || expires_in_seconds <= 0
        {
            return Err(BridgeError::Validation(
                "all token parameters are required".to_string(),
            ));
        }

        let encrypted_access = self.cipher.encrypt(access_token)?;
        let encrypted_refresh = self.cipher.encrypt(refresh_token)?;
        let expires_at = Duration::try_seconds(expires_in_seconds)
            .and_then(|lifetime| now.checked_add_signed(lifetime))
            .ok_or_else(|| {
                BridgeError::Validation(format!(
                    "token lifetime out of range: {} seconds",
                    expires_in_seconds
                ))
            })?;
        let now_text = format_timestamp(now);

        let mut conn = self.lock()?;
        // Dropping the transaction without commit rolls it back
        let tx = conn.transaction()?;
        tx.execute(
            r#"
            INSERT INTO device_credentials (
                device_id, encrypted_access_token, encrypted_refresh_token,
                expires_at, scope, created_at, updated_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
            ON CONFLICT(device_id) DO UPDATE SET
                encrypted_access_token = excluded.encrypted_access_token,
                encrypted_refresh_token = excluded.encrypted_refresh_token,
                expires_at = excluded.expires_at,
                scope = excluded.scope,
                updated_at = excluded.updated_at
            "#,
            params![
                device_id,
                encrypted_access,
                encrypted_refresh,
                format_timestamp(expires_at),
                scope,
                now_text,
            ],
        )?;
        let raw = tx.query_row(
            &format!(
                "SELECT {} FROM device_credentials WHERE device_id = ?1",
                SELECT_COLUMNS
            ),
            params![device_id],
            RawRecord::from_row,
        )?;
        tx.commit()?;

        info!(
            device_id = %device_id,
            expires_at = %expires_at,
            "Tokens stored for device"
        );

        raw.into_credential()
    }

    /// Decrypts the access token of a record.
    pub fn access_token(&self, record: &DeviceCredential) -> Result<String> {
        self.cipher.decrypt(&record.encrypted_access_token)
    }

    /// Decrypts the refresh token of a record.
    pub fn refresh_token(&self, record: &DeviceCredential) -> Result<String> {
        self.cipher.decrypt(&record.encrypted_refresh_token)
    }

    /// Deletes records whose `updated_at` is older than the cutoff.
    ///
    /// Returns the number of deleted records.
    pub fn purge_stale(&self, older_than_days: i64) -> Result<usize> {
        if older_than_days < 0 {
            return Err(BridgeError::Validation(
                "retention days must not be negative".to_string(),
            ));
        }
        let cutoff = Duration::try_days(older_than_days)
            .and_then(|window| Utc::now().checked_sub_signed(window))
            .ok_or_else(|| {
                BridgeError::Validation(format!(
                    "retention window out of range: {} days",
                    older_than_days
                ))
            })?;

        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let deleted = tx.execute(
            "DELETE FROM device_credentials WHERE updated_at < ?1",
            params![format_timestamp(cutoff)],
        )?;
        tx.commit()?;

        if deleted > 0 {
            info!(count = deleted, older_than_days, "Purged stale device credentials");
        } else {
            debug!(older_than_days, "No stale device credentials to purge");
        }

        Ok(deleted)
    }

    /// Deletes the record for a device.
    ///
    /// Returns `true` if a record was removed.
    pub fn delete(&self, device_id: &str) -> Result<bool> {
        let rows_affected = self.lock()?.execute(
            "DELETE FROM device_credentials WHERE device_id = ?1",
            params![device_id],
        )?;
        Ok(rows_affected > 0)
    }

    /// Lists all records ordered by device id.
    pub fn list_all(&self) -> Result<Vec<DeviceCredential>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM device_credentials ORDER BY device_id",
            SELECT_COLUMNS
        ))?;

        let raws = stmt
            .query_map([], RawRecord::from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        raws.into_iter().map(RawRecord::into_credential).collect()
    }
}

/// Row as read from SQLite, before timestamp parsing.
struct RawRecord {
    device_id: String,
    encrypted_access_token: Vec<u8>,
    encrypted_refresh_token: Vec<u8>,
    expires_at: String,
    scope: String,
    created_at: String,
    updated_at: String,
}

impl RawRecord {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            device_id: row.get(0)?,
            encrypted_access_token: row.get(1)?,
            encrypted_refresh_token: row.get(2)?,
            expires_at: row.get(3)?,
            scope: row.get(4)?,
            created_at: row.get(5)?,
            updated_at: row.get(6)?,
        })
    }

    fn into_credential(self) -> Result<DeviceCredential> {
        Ok(DeviceCredential {
            expires_at: parse_timestamp(&self.expires_at)?,
            created_at: parse_timestamp(&self.created_at)?,
            updated_at: parse_timestamp(&self.updated_at)?,
            device_id: self.device_id,
            encrypted_access_token: self.encrypted_access_token,
            encrypted_refresh_token: self.encrypted_refresh_token,
            scope: self.scope,
        })
    }
}

fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| BridgeError::Persistence(format!("invalid stored timestamp '{}': {}", s, e)))
}
