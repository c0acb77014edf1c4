//! API key issuance and verification.
//!
//! Keys are opaque bearer tokens: `vg_` plus 40 random alphanumeric
//! characters. Only the SHA-256 digest and the first 8 characters are
//! stored; the plaintext appears exactly once, in the creation response.

use std::sync::Arc;

use chrono::Duration;
use rand::{distr::Alphanumeric, Rng};
use sha2::{Digest, Sha256};
use vendgros_core::{
    ApiKey, ApiKeyId, ApiKeyPatch, ApiKeyStore, Caller, Clock, CoreError, Result,
};

/// Length of the stored display prefix.
pub const KEY_PREFIX_LEN: usize = 8;

/// Minimum hourly rate limit a key may carry.
pub const MIN_RATE_LIMIT: u32 = 100;

/// Maximum hourly rate limit a key may carry.
pub const MAX_RATE_LIMIT: u32 = 10_000;

/// Maximum key lifetime in days.
pub const MAX_EXPIRY_DAYS: u32 = 365;

const KEY_RANDOM_LEN: usize = 40;

/// A freshly issued key: the stored record plus the one-time plaintext.
#[derive(Debug, Clone)]
pub struct CreatedKey {
    /// The persisted record.
    pub record: ApiKey,
    /// Full plaintext key. Shown once, never stored.
    pub plaintext: String,
}

/// Issues, lists, mutates, and verifies API keys.
#[derive(Clone)]
pub struct KeyStore {
    store: Arc<dyn ApiKeyStore>,
    clock: Arc<dyn Clock>,
}

impl KeyStore {
    /// Creates a key store over the given backend.
    pub fn new(store: Arc<dyn ApiKeyStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Issues a new key for the caller's account.
    ///
    /// `expires_in_days` of `None` means the key never expires.
    pub async fn create_key(
        &self,
        caller: &Caller,
        name: &str,
        scopes: Vec<String>,
        rate_limit_per_hour: u32,
        expires_in_days: Option<u32>,
    ) -> Result<CreatedKey> {
        if name.trim().is_empty() {
            return Err(CoreError::validation("key name must not be empty"));
        }
        if scopes.is_empty() || scopes.iter().any(|scope| scope.trim().is_empty()) {
            return Err(CoreError::validation("at least one non-empty scope is required"));
        }
        validate_rate_limit(rate_limit_per_hour)?;
        if let Some(days) = expires_in_days {
            if days == 0 || days > MAX_EXPIRY_DAYS {
                return Err(CoreError::validation(format!(
                    "expiry must be between 1 and {MAX_EXPIRY_DAYS} days"
                )));
            }
        }

        let now = self.clock.now_utc();
        let plaintext = generate_key();
        let record = ApiKey {
            id: ApiKeyId::new(),
            owner_id: caller.owner_id,
            name: name.trim().to_string(),
            key_hash: hash_key(&plaintext),
            key_prefix: plaintext[..KEY_PREFIX_LEN].to_string(),
            scopes,
            rate_limit_per_hour,
            is_active: true,
            expires_at: expires_in_days.map(|days| now + Duration::days(i64::from(days))),
            created_at: now,
        };

        self.store.insert_key(record.clone()).await?;
        tracing::info!(
            key_id = %record.id,
            owner_id = %record.owner_id,
            prefix = %record.key_prefix,
            "api key issued"
        );
        Ok(CreatedKey { record, plaintext })
    }

    /// Lists the caller's keys, newest first. Metadata only.
    pub async fn list_keys(&self, caller: &Caller) -> Result<Vec<ApiKey>> {
        self.store.list_keys(caller.owner_id).await
    }

    /// Applies a partial update to one of the caller's keys.
    pub async fn update_key(
        &self,
        caller: &Caller,
        key_id: ApiKeyId,
        patch: ApiKeyPatch,
    ) -> Result<ApiKey> {
        let mut key = self.owned_key(caller, key_id).await?;

        if let Some(rate_limit) = patch.rate_limit_per_hour {
            validate_rate_limit(rate_limit)?;
            key.rate_limit_per_hour = rate_limit;
        }
        if let Some(is_active) = patch.is_active {
            key.is_active = is_active;
        }

        self.store.update_key(key.clone()).await?;
        tracing::info!(key_id = %key_id, "api key updated");
        Ok(key)
    }

    /// Permanently revokes one of the caller's keys.
    pub async fn revoke_key(&self, caller: &Caller, key_id: ApiKeyId) -> Result<()> {
        let key = self.owned_key(caller, key_id).await?;

        self.store.delete_key(key.id).await?;
        tracing::info!(key_id = %key_id, owner_id = %caller.owner_id, "api key revoked");
        Ok(())
    }

    /// Verifies a presented plaintext key.
    ///
    /// Looks up candidates by display prefix and compares digests in
    /// constant time. Inactive and expired keys fail verification. The
    /// error never reveals which check failed.
    pub async fn verify_key(&self, presented: &str) -> Result<ApiKey> {
        let Some(prefix) = presented.get(..KEY_PREFIX_LEN) else {
            return Err(invalid_key());
        };

        let digest = hash_key(presented);
        let now = self.clock.now_utc();
        let candidates = self.store.find_keys_by_prefix(prefix.to_string()).await?;

        for key in candidates {
            if timing_safe_eq(digest.as_bytes(), key.key_hash.as_bytes()) {
                if !key.is_active || key.is_expired(now) {
                    return Err(invalid_key());
                }
                return Ok(key);
            }
        }
        Err(invalid_key())
    }

    async fn owned_key(&self, caller: &Caller, key_id: ApiKeyId) -> Result<ApiKey> {
        let key = self
            .store
            .find_key(key_id)
            .await?
            .ok_or_else(|| CoreError::not_found(format!("api key {key_id}")))?;
        if key.owner_id != caller.owner_id {
            return Err(CoreError::not_authorized(format!(
                "api key {key_id} belongs to another account"
            )));
        }
        Ok(key)
    }
}

fn invalid_key() -> CoreError {
    CoreError::not_authorized("invalid API key")
}

fn validate_rate_limit(rate_limit_per_hour: u32) -> Result<()> {
    if !(MIN_RATE_LIMIT..=MAX_RATE_LIMIT).contains(&rate_limit_per_hour) {
        return Err(CoreError::validation(format!(
            "rate limit must be between {MIN_RATE_LIMIT} and {MAX_RATE_LIMIT} requests per hour"
        )));
    }
    Ok(())
}

/// Generates a fresh plaintext key.
fn generate_key() -> String {
    let random: String = rand::rng()
        .sample_iter(&Alphanumeric)
        .take(KEY_RANDOM_LEN)
        .map(char::from)
        .collect();
    format!("vg_{random}")
}

/// Hex SHA-256 digest of a plaintext key.
pub fn hash_key(plaintext: &str) -> String {
    hex::encode(Sha256::digest(plaintext.as_bytes()))
}

/// Constant-time byte comparison.
fn timing_safe_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}
