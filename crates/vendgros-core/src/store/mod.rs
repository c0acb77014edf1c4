//! Storage abstraction for keys, webhooks, and the delivery ledger.
//!
//! Persistence is an injected collaborator: the gateway and delivery engine
//! talk to these object-safe traits, and deployments supply the backing
//! implementation. The bundled [`memory::MemoryStore`] keeps everything in
//! process and is the default for tests and single-node use.
//!
//! Trait methods return boxed futures so implementations stay object safe
//! without a proc-macro layer.

pub mod memory;

use std::{future::Future, pin::Pin};

use chrono::{DateTime, Duration, Utc};

use crate::{
    error::Result,
    models::{ApiKey, ApiKeyId, DeliveryId, OwnerId, Webhook, WebhookDelivery, WebhookId},
};

/// Boxed future type returned by storage trait methods.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// Persistence operations for API keys.
pub trait ApiKeyStore: Send + Sync + 'static {
    /// Persists a newly issued key.
    fn insert_key(&self, key: ApiKey) -> StoreFuture<'_, ()>;

    /// Finds a key by ID.
    fn find_key(&self, id: ApiKeyId) -> StoreFuture<'_, Option<ApiKey>>;

    /// Returns all keys sharing a display prefix.
    ///
    /// The candidate set for verification; the caller disambiguates by
    /// digest comparison.
    fn find_keys_by_prefix(&self, prefix: String) -> StoreFuture<'_, Vec<ApiKey>>;

    /// Lists an owner's keys, newest first.
    fn list_keys(&self, owner_id: OwnerId) -> StoreFuture<'_, Vec<ApiKey>>;

    /// Overwrites an existing key record.
    fn update_key(&self, key: ApiKey) -> StoreFuture<'_, ()>;

    /// Removes a key record.
    fn delete_key(&self, id: ApiKeyId) -> StoreFuture<'_, ()>;
}

/// Persistence operations for webhook registrations.
pub trait WebhookStore: Send + Sync + 'static {
    /// Persists a new registration.
    fn insert_webhook(&self, webhook: Webhook) -> StoreFuture<'_, ()>;

    /// Finds a webhook by ID.
    fn find_webhook(&self, id: WebhookId) -> StoreFuture<'_, Option<Webhook>>;

    /// Lists an owner's webhooks, newest first.
    fn list_webhooks(&self, owner_id: OwnerId) -> StoreFuture<'_, Vec<Webhook>>;

    /// Overwrites an existing registration.
    fn update_webhook(&self, webhook: Webhook) -> StoreFuture<'_, ()>;

    /// Removes a registration. Ledger rows referencing it are kept.
    fn delete_webhook(&self, id: WebhookId) -> StoreFuture<'_, ()>;
}

/// Persistence operations for the delivery ledger.
///
/// The ledger is append-only: rows are inserted, claimed, and written back,
/// never deleted. A write-back against a row already in a terminal state
/// must be refused.
pub trait DeliveryStore: Send + Sync + 'static {
    /// Appends a fresh pending row.
    fn insert_delivery(&self, delivery: WebhookDelivery) -> StoreFuture<'_, ()>;

    /// Finds a ledger row by ID.
    fn find_delivery(&self, id: DeliveryId) -> StoreFuture<'_, Option<WebhookDelivery>>;

    /// Lists a webhook's rows, newest first, up to `limit`.
    fn list_deliveries(
        &self,
        webhook_id: WebhookId,
        limit: usize,
    ) -> StoreFuture<'_, Vec<WebhookDelivery>>;

    /// Atomically claims up to `limit` due pending rows.
    ///
    /// A row qualifies when it is pending, due at `now`, and not under an
    /// unexpired lease. Claiming sets `lease_expires_at = now + lease` so no
    /// concurrent sweep can claim the same row. Oldest rows are claimed
    /// first.
    fn claim_due(
        &self,
        now: DateTime<Utc>,
        limit: usize,
        lease: Duration,
    ) -> StoreFuture<'_, Vec<WebhookDelivery>>;

    /// Atomically claims one specific pending row regardless of its retry
    /// schedule.
    ///
    /// Returns `None` when the row is missing. Fails with a conflict when
    /// the row is under an unexpired lease, and with a validation error when
    /// it is terminal.
    fn claim_delivery(
        &self,
        id: DeliveryId,
        now: DateTime<Utc>,
        lease: Duration,
    ) -> StoreFuture<'_, Option<WebhookDelivery>>;

    /// Writes back a claimed row.
    ///
    /// The caller clears or extends the lease as part of the written state.
    fn update_delivery(&self, delivery: WebhookDelivery) -> StoreFuture<'_, ()>;
}
