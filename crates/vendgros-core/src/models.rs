//! Domain models for keys, webhooks, and the delivery ledger.

use std::fmt;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for an account that owns keys and webhooks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OwnerId(pub Uuid);

/// Unique identifier for an API key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ApiKeyId(pub Uuid);

/// Unique identifier for a webhook registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WebhookId(pub Uuid);

/// Unique identifier for a delivery ledger row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeliveryId(pub Uuid);

macro_rules! impl_id {
    ($name:ident) => {
        impl $name {
            /// Creates a new random identifier.
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }
    };
}

impl_id!(OwnerId);
impl_id!(ApiKeyId);
impl_id!(WebhookId);
impl_id!(DeliveryId);

/// Identity of the caller invoking a gateway operation.
///
/// Supplied by the surrounding identity layer. Ownership checks compare
/// `owner_id`; the batch sweep additionally requires `is_admin`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Caller {
    /// Account on whose behalf the operation runs.
    pub owner_id: OwnerId,
    /// Whether the caller holds elevated privileges.
    pub is_admin: bool,
}

impl Caller {
    /// Creates a regular caller.
    pub fn user(owner_id: OwnerId) -> Self {
        Self { owner_id, is_admin: false }
    }

    /// Creates a caller with elevated privileges.
    pub fn admin(owner_id: OwnerId) -> Self {
        Self { owner_id, is_admin: true }
    }
}

/// An issued API key.
///
/// The plaintext key exists only in the creation response; only its SHA-256
/// digest and a short display prefix are stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiKey {
    pub id: ApiKeyId,
    pub owner_id: OwnerId,
    /// Human-readable label chosen by the owner.
    pub name: String,
    /// Hex SHA-256 digest of the plaintext key. Never serialized outward.
    #[serde(skip_serializing)]
    #[serde(default)]
    pub key_hash: String,
    /// First 8 characters of the plaintext, for display and lookup.
    pub key_prefix: String,
    /// Permission scopes granted to the key.
    pub scopes: Vec<String>,
    /// Requests per hour this key may spend.
    pub rate_limit_per_hour: u32,
    pub is_active: bool,
    /// Expiry timestamp, if the key was issued with one.
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl ApiKey {
    /// Returns whether the key is expired at `now`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires_at| expires_at <= now)
    }
}

/// Partial update for an API key's mutable fields.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApiKeyPatch {
    pub is_active: Option<bool>,
    pub rate_limit_per_hour: Option<u32>,
}

/// A registered webhook endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Webhook {
    pub id: WebhookId,
    pub owner_id: OwnerId,
    /// Receiver URL, http or https.
    pub url: String,
    /// Subscribed catalog event names.
    pub events: Vec<String>,
    /// HMAC signing secret. Returned in full once at creation; listings
    /// expose a masked prefix only. Never serialized outward.
    #[serde(skip_serializing)]
    #[serde(default)]
    pub secret: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl Webhook {
    /// Returns whether this webhook subscribes to `event`.
    pub fn subscribes_to(&self, event: &str) -> bool {
        self.events.iter().any(|name| name == event)
    }
}

/// Partial update for a webhook's mutable fields.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WebhookPatch {
    pub url: Option<String>,
    pub events: Option<Vec<String>>,
    pub is_active: Option<bool>,
}

/// Lifecycle state of a delivery ledger row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    /// Awaiting its first attempt or a scheduled retry.
    Pending,
    /// The receiver acknowledged with a 2xx. Terminal.
    Delivered,
    /// The retry budget is exhausted. Terminal.
    Failed,
}

impl DeliveryStatus {
    /// Returns the canonical string form.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Delivered => "delivered",
            Self::Failed => "failed",
        }
    }

    /// Returns whether the status permits no further transitions.
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Delivered | Self::Failed)
    }
}

impl fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row of the delivery ledger: a single event bound for a single
/// webhook, with its full attempt history.
///
/// Rows are append-only. Once `status` is terminal no field changes again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookDelivery {
    pub id: DeliveryId,
    pub webhook_id: WebhookId,
    /// Catalog event name this delivery carries.
    pub event: String,
    /// Raw payload bytes, passed through untouched.
    pub payload: Bytes,
    pub status: DeliveryStatus,
    /// Number of failed attempts so far. A first-try success leaves this 0.
    pub attempts: u32,
    /// HTTP status of the most recent attempt that got a response.
    pub response_code: Option<u16>,
    /// Diagnostic message from the most recent failed attempt.
    pub error_message: Option<String>,
    /// When the next sweep may pick this row up. Set only while Pending and
    /// after at least one failure.
    pub next_retry_at: Option<DateTime<Utc>>,
    /// Claim lease held by an in-flight attempt. Cleared on every outcome
    /// write.
    pub lease_expires_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl WebhookDelivery {
    /// Creates a fresh pending row for `event` bound to `webhook_id`.
    pub fn pending(
        webhook_id: WebhookId,
        event: impl Into<String>,
        payload: Bytes,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: DeliveryId::new(),
            webhook_id,
            event: event.into(),
            payload,
            status: DeliveryStatus::Pending,
            attempts: 0,
            response_code: None,
            error_message: None,
            next_retry_at: None,
            lease_expires_at: None,
            delivered_at: None,
            created_at,
        }
    }

    /// Returns whether the row is due for a sweep attempt at `now`.
    ///
    /// A never-attempted row is immediately due; a retried row is due once
    /// its scheduled retry time has passed.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status == DeliveryStatus::Pending
            && self.next_retry_at.is_none_or(|at| at <= now)
    }

    /// Returns whether an unexpired claim lease is held at `now`.
    pub fn is_leased(&self, now: DateTime<Utc>) -> bool {
        self.lease_expires_at.is_some_and(|at| at > now)
    }
}
