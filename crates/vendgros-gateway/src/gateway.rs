//! Composition root: the single operation surface the marketplace calls.
//!
//! Wires the key store, webhook registry, and delivery engine over one
//! storage backend and one clock. Ownership checks happen in the services;
//! this layer adds only the admin gate on the sweep.

use std::sync::Arc;

use bytes::Bytes;
use vendgros_core::{
    events::EventDescriptor, ApiKey, ApiKeyId, ApiKeyPatch, Caller, Clock, CoreError, DeliveryId,
    MemoryStore, Result, SystemClock, WebhookDelivery, WebhookId, WebhookPatch,
};
use vendgros_delivery::{DeliveryClient, DeliveryEngine, SweepReport};

use crate::{
    config::Config,
    keys::{CreatedKey, KeyStore},
    webhooks::{CreatedWebhook, WebhookRegistry, WebhookSummary},
};

/// The integration gateway facade.
#[derive(Clone)]
pub struct Gateway {
    keys: KeyStore,
    webhooks: WebhookRegistry,
    engine: DeliveryEngine,
}

impl Gateway {
    /// Assembles a gateway from pre-built services.
    pub fn new(keys: KeyStore, webhooks: WebhookRegistry, engine: DeliveryEngine) -> Self {
        Self { keys, webhooks, engine }
    }

    /// Builds a gateway over the bundled in-memory store.
    ///
    /// # Errors
    ///
    /// Fails when the HTTP client cannot be built from `config`.
    pub fn in_memory(config: &Config) -> anyhow::Result<Self> {
        Self::with_store_and_clock(config, Arc::new(MemoryStore::new()), Arc::new(SystemClock::new()))
    }

    /// Builds a gateway over a specific store and clock.
    pub fn with_store_and_clock(
        config: &Config,
        store: Arc<MemoryStore>,
        clock: Arc<dyn Clock>,
    ) -> anyhow::Result<Self> {
        let client = DeliveryClient::new(config.to_client_config())?;
        let keys = KeyStore::new(store.clone(), clock.clone());
        let webhooks = WebhookRegistry::new(store.clone(), clock.clone());
        let engine = DeliveryEngine::new(
            store.clone(),
            store,
            client,
            clock,
            config.to_engine_config(),
        );
        Ok(Self { keys, webhooks, engine })
    }

    // --- API keys ---

    /// Issues a new API key. The plaintext appears only in the response.
    pub async fn create_api_key(
        &self,
        caller: &Caller,
        name: &str,
        scopes: Vec<String>,
        rate_limit_per_hour: u32,
        expires_in_days: Option<u32>,
    ) -> Result<CreatedKey> {
        self.keys.create_key(caller, name, scopes, rate_limit_per_hour, expires_in_days).await
    }

    /// Lists the caller's keys, metadata only.
    pub async fn list_api_keys(&self, caller: &Caller) -> Result<Vec<ApiKey>> {
        self.keys.list_keys(caller).await
    }

    /// Applies a partial update to one of the caller's keys.
    pub async fn update_api_key(
        &self,
        caller: &Caller,
        key_id: ApiKeyId,
        patch: ApiKeyPatch,
    ) -> Result<ApiKey> {
        self.keys.update_key(caller, key_id, patch).await
    }

    /// Permanently revokes one of the caller's keys.
    pub async fn revoke_api_key(&self, caller: &Caller, key_id: ApiKeyId) -> Result<()> {
        self.keys.revoke_key(caller, key_id).await
    }

    /// Verifies a presented plaintext key.
    pub async fn verify_api_key(&self, presented: &str) -> Result<ApiKey> {
        self.keys.verify_key(presented).await
    }

    // --- Webhooks ---

    /// Registers a webhook. The signing secret appears only in the response.
    pub async fn create_webhook(
        &self,
        caller: &Caller,
        url: &str,
        events: Vec<String>,
    ) -> Result<CreatedWebhook> {
        self.webhooks.create_webhook(caller, url, events).await
    }

    /// Lists the caller's webhooks with masked secrets.
    pub async fn list_webhooks(&self, caller: &Caller) -> Result<Vec<WebhookSummary>> {
        self.webhooks.list_webhooks(caller).await
    }

    /// Applies a partial update to one of the caller's webhooks.
    pub async fn update_webhook(
        &self,
        caller: &Caller,
        webhook_id: WebhookId,
        patch: WebhookPatch,
    ) -> Result<WebhookSummary> {
        self.webhooks.update_webhook(caller, webhook_id, patch).await
    }

    /// Deletes one of the caller's webhooks. Ledger history is kept.
    pub async fn delete_webhook(&self, caller: &Caller, webhook_id: WebhookId) -> Result<()> {
        self.webhooks.delete_webhook(caller, webhook_id).await
    }

    /// Returns the catalog of subscribable events.
    pub fn get_available_events(&self) -> &'static [EventDescriptor] {
        self.webhooks.available_events()
    }

    // --- Deliveries ---

    /// Enqueues a payload for delivery to a webhook.
    ///
    /// Called by marketplace producers when a subscribed event fires; the
    /// payload is passed through byte for byte.
    pub async fn enqueue_delivery(
        &self,
        webhook_id: WebhookId,
        event: &str,
        payload: Bytes,
    ) -> Result<WebhookDelivery> {
        self.engine.enqueue(webhook_id, event, payload).await
    }

    /// Lists a webhook's delivery history, newest first.
    pub async fn get_webhook_deliveries(
        &self,
        caller: &Caller,
        webhook_id: WebhookId,
        limit: usize,
    ) -> Result<Vec<WebhookDelivery>> {
        self.engine.get_deliveries(caller, webhook_id, limit).await
    }

    /// Immediately re-attempts one pending delivery the caller owns.
    pub async fn retry_webhook_delivery(
        &self,
        caller: &Caller,
        delivery_id: DeliveryId,
    ) -> Result<WebhookDelivery> {
        self.engine.retry_delivery(caller, delivery_id).await
    }

    /// Runs one delivery sweep. Requires elevated privileges.
    ///
    /// Invoked by the external scheduler, not by tenant callers.
    pub async fn process_pending_retries(&self, caller: &Caller) -> Result<SweepReport> {
        if !caller.is_admin {
            return Err(CoreError::not_authorized(
                "processing pending retries requires elevated privileges",
            ));
        }
        self.engine.process_pending().await
    }
}
