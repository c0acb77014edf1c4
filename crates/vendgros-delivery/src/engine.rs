//! Delivery engine: the ledger state machine and the batch sweep.
//!
//! The engine owns every transition of a ledger row. Rows are born
//! `Pending` via [`DeliveryEngine::enqueue`], attempted by the sweep or a
//! manual retry, and end up `Delivered` or `Failed`. An external scheduler
//! invokes [`DeliveryEngine::process_pending`]; the engine never schedules
//! itself.

use std::sync::Arc;

use bytes::Bytes;
use chrono::Duration;
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use vendgros_core::{
    events, Caller, Clock, CoreError, DeliveryId, DeliveryStatus, DeliveryStore, Result, Webhook,
    WebhookDelivery, WebhookId, WebhookStore,
};

use crate::{
    client::{DeliveryClient, DeliveryRequest},
    retry::{self, RetryDecision, MAX_RETRIES_MESSAGE},
};

/// Tuning knobs for the batch sweep.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Maximum rows claimed per sweep.
    pub sweep_batch_size: usize,
    /// Maximum attempts in flight at once during a sweep.
    pub sweep_concurrency: usize,
    /// How long a claim lease protects a row. Must exceed the attempt
    /// timeout so a live attempt never loses its claim.
    pub claim_lease: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sweep_batch_size: 50,
            sweep_concurrency: 8,
            claim_lease: Duration::seconds(60),
        }
    }
}

/// Counters returned by one sweep run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepReport {
    /// Rows claimed and handled this sweep.
    pub processed: usize,
    /// Rows that reached `Delivered`.
    pub delivered: usize,
    /// Rows that reached `Failed`.
    pub failed: usize,
    /// Rows rescheduled for a later sweep.
    pub retry_scheduled: usize,
}

/// Outcome of attempting one claimed row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AttemptOutcome {
    Delivered,
    RetryScheduled,
    Failed,
    /// Row released untouched (webhook currently inactive).
    Skipped,
}

/// Executes delivery attempts against the ledger.
#[derive(Clone)]
pub struct DeliveryEngine {
    deliveries: Arc<dyn DeliveryStore>,
    webhooks: Arc<dyn WebhookStore>,
    client: DeliveryClient,
    clock: Arc<dyn Clock>,
    config: EngineConfig,
}

impl DeliveryEngine {
    /// Creates an engine over the given stores and client.
    pub fn new(
        deliveries: Arc<dyn DeliveryStore>,
        webhooks: Arc<dyn WebhookStore>,
        client: DeliveryClient,
        clock: Arc<dyn Clock>,
        config: EngineConfig,
    ) -> Self {
        Self { deliveries, webhooks, client, clock, config }
    }

    /// Appends a fresh pending row for `event` bound to `webhook_id`.
    ///
    /// The payload is opaque: stored and transmitted byte for byte. The
    /// webhook must exist, be active, and subscribe to the (catalog-known)
    /// event.
    pub async fn enqueue(
        &self,
        webhook_id: WebhookId,
        event: &str,
        payload: Bytes,
    ) -> Result<WebhookDelivery> {
        if !events::is_known_event(event) {
            return Err(CoreError::validation(format!("unknown event '{event}'")));
        }

        let webhook = self
            .webhooks
            .find_webhook(webhook_id)
            .await?
            .ok_or_else(|| CoreError::not_found(format!("webhook {webhook_id}")))?;

        if !webhook.subscribes_to(event) {
            return Err(CoreError::validation(format!(
                "webhook {webhook_id} does not subscribe to '{event}'"
            )));
        }
        if !webhook.is_active {
            return Err(CoreError::validation(format!("webhook {webhook_id} is not active")));
        }

        let delivery =
            WebhookDelivery::pending(webhook_id, event, payload, self.clock.now_utc());
        self.deliveries.insert_delivery(delivery.clone()).await?;

        tracing::info!(
            delivery_id = %delivery.id,
            webhook_id = %webhook_id,
            event = %event,
            "delivery enqueued"
        );
        Ok(delivery)
    }

    /// Runs one sweep: claims due rows and attempts them concurrently.
    ///
    /// Attempts run under a semaphore so at most
    /// [`EngineConfig::sweep_concurrency`] are in flight. One row's failure
    /// never aborts the batch; bookkeeping errors are logged and the row
    /// counts only toward `processed`.
    pub async fn process_pending(&self) -> Result<SweepReport> {
        let now = self.clock.now_utc();
        let claimed = self
            .deliveries
            .claim_due(now, self.config.sweep_batch_size, self.config.claim_lease)
            .await?;

        let mut report = SweepReport { processed: claimed.len(), ..SweepReport::default() };
        if claimed.is_empty() {
            return Ok(report);
        }
        tracing::debug!(claimed = claimed.len(), "sweep claimed due deliveries");

        let semaphore = Arc::new(Semaphore::new(self.config.sweep_concurrency));
        let mut handles = Vec::with_capacity(claimed.len());

        for delivery in claimed {
            let engine = self.clone();
            let semaphore = Arc::clone(&semaphore);
            handles.push(tokio::spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return None;
                };
                let delivery_id = delivery.id;
                match engine.attempt(delivery).await {
                    Ok((_, outcome)) => Some(outcome),
                    Err(e) => {
                        tracing::error!(
                            delivery_id = %delivery_id,
                            error = %e,
                            "delivery attempt bookkeeping failed"
                        );
                        None
                    },
                }
            }));
        }

        for handle in handles {
            match handle.await {
                Ok(Some(AttemptOutcome::Delivered)) => report.delivered += 1,
                Ok(Some(AttemptOutcome::Failed)) => report.failed += 1,
                Ok(Some(AttemptOutcome::RetryScheduled)) => report.retry_scheduled += 1,
                Ok(Some(AttemptOutcome::Skipped)) | Ok(None) => {},
                Err(e) => tracing::error!(error = %e, "sweep task panicked"),
            }
        }

        tracing::info!(
            processed = report.processed,
            delivered = report.delivered,
            failed = report.failed,
            retry_scheduled = report.retry_scheduled,
            "sweep complete"
        );
        Ok(report)
    }

    /// Immediately re-attempts one pending delivery, ignoring its retry
    /// schedule.
    ///
    /// The caller must own the webhook the row belongs to. The attempt
    /// spends the same retry budget sweeps do. Fails with a conflict when a
    /// sweep currently holds the row's claim.
    pub async fn retry_delivery(
        &self,
        caller: &Caller,
        delivery_id: DeliveryId,
    ) -> Result<WebhookDelivery> {
        let delivery = self
            .deliveries
            .find_delivery(delivery_id)
            .await?
            .ok_or_else(|| CoreError::not_found(format!("delivery {delivery_id}")))?;

        let webhook = self
            .webhooks
            .find_webhook(delivery.webhook_id)
            .await?
            .ok_or_else(|| CoreError::not_found(format!("webhook {}", delivery.webhook_id)))?;
        if webhook.owner_id != caller.owner_id {
            return Err(CoreError::not_authorized(format!(
                "delivery {delivery_id} belongs to another account"
            )));
        }
        if delivery.status.is_terminal() {
            return Err(CoreError::validation(format!(
                "delivery {delivery_id} is already {}",
                delivery.status
            )));
        }

        let claimed = self
            .deliveries
            .claim_delivery(delivery_id, self.clock.now_utc(), self.config.claim_lease)
            .await?
            .ok_or_else(|| CoreError::not_found(format!("delivery {delivery_id}")))?;

        tracing::info!(delivery_id = %delivery_id, "manual retry triggered");
        let (updated, _) = self.attempt(claimed).await?;
        Ok(updated)
    }

    /// Lists a webhook's ledger rows, newest first, up to `limit`.
    ///
    /// The caller must own the webhook.
    pub async fn get_deliveries(
        &self,
        caller: &Caller,
        webhook_id: WebhookId,
        limit: usize,
    ) -> Result<Vec<WebhookDelivery>> {
        let webhook = self
            .webhooks
            .find_webhook(webhook_id)
            .await?
            .ok_or_else(|| CoreError::not_found(format!("webhook {webhook_id}")))?;
        if webhook.owner_id != caller.owner_id {
            return Err(CoreError::not_authorized(format!(
                "webhook {webhook_id} belongs to another account"
            )));
        }

        self.deliveries.list_deliveries(webhook_id, limit).await
    }

    /// Attempts one claimed row and writes the outcome back.
    async fn attempt(
        &self,
        mut delivery: WebhookDelivery,
    ) -> Result<(WebhookDelivery, AttemptOutcome)> {
        let Some(webhook) = self.webhooks.find_webhook(delivery.webhook_id).await? else {
            // The registration is gone and cannot come back under the same
            // ID; retrying would spin until the budget runs out.
            delivery.status = DeliveryStatus::Failed;
            delivery.error_message = Some("webhook no longer exists".to_string());
            delivery.next_retry_at = None;
            delivery.lease_expires_at = None;
            self.deliveries.update_delivery(delivery.clone()).await?;
            tracing::warn!(
                delivery_id = %delivery.id,
                webhook_id = %delivery.webhook_id,
                "delivery failed: webhook no longer exists"
            );
            return Ok((delivery, AttemptOutcome::Failed));
        };

        if !webhook.is_active {
            // Release the claim untouched; re-activation makes the row
            // sweepable again.
            delivery.lease_expires_at = None;
            self.deliveries.update_delivery(delivery.clone()).await?;
            tracing::debug!(
                delivery_id = %delivery.id,
                webhook_id = %webhook.id,
                "skipping delivery for inactive webhook"
            );
            return Ok((delivery, AttemptOutcome::Skipped));
        }

        let request = self.build_request(&delivery, &webhook);
        match self.client.deliver(request).await {
            Ok(response) if response.is_success => {
                delivery.status = DeliveryStatus::Delivered;
                delivery.response_code = Some(response.status_code);
                delivery.delivered_at = Some(self.clock.now_utc());
                delivery.next_retry_at = None;
                delivery.lease_expires_at = None;
                self.deliveries.update_delivery(delivery.clone()).await?;
                Ok((delivery, AttemptOutcome::Delivered))
            },
            Ok(response) => {
                self.record_failure(
                    delivery,
                    Some(response.status_code),
                    format!("endpoint responded with HTTP {}", response.status_code),
                )
                .await
            },
            Err(e) => self.record_failure(delivery, None, e.to_string()).await,
        }
    }

    /// Records a failed attempt: reschedules or gives up.
    async fn record_failure(
        &self,
        mut delivery: WebhookDelivery,
        response_code: Option<u16>,
        error_message: String,
    ) -> Result<(WebhookDelivery, AttemptOutcome)> {
        let now = self.clock.now_utc();
        delivery.attempts += 1;
        delivery.response_code = response_code;
        delivery.lease_expires_at = None;

        let outcome = match retry::decide_retry(delivery.attempts, now) {
            RetryDecision::Retry { next_attempt_at } => {
                delivery.error_message = Some(error_message);
                delivery.next_retry_at = Some(next_attempt_at);
                tracing::warn!(
                    delivery_id = %delivery.id,
                    attempts = delivery.attempts,
                    next_retry_at = %next_attempt_at,
                    "delivery attempt failed, retry scheduled"
                );
                AttemptOutcome::RetryScheduled
            },
            RetryDecision::GiveUp => {
                delivery.status = DeliveryStatus::Failed;
                delivery.error_message = Some(MAX_RETRIES_MESSAGE.to_string());
                delivery.next_retry_at = None;
                tracing::warn!(
                    delivery_id = %delivery.id,
                    attempts = delivery.attempts,
                    "delivery failed permanently"
                );
                AttemptOutcome::Failed
            },
        };

        self.deliveries.update_delivery(delivery.clone()).await?;
        Ok((delivery, outcome))
    }

    fn build_request(&self, delivery: &WebhookDelivery, webhook: &Webhook) -> DeliveryRequest {
        DeliveryRequest {
            delivery_id: delivery.id,
            webhook_id: webhook.id,
            url: webhook.url.clone(),
            event: delivery.event.clone(),
            payload: delivery.payload.clone(),
            secret: webhook.secret.clone(),
            attempt_number: delivery.attempts + 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use vendgros_core::{MemoryStore, OwnerId, TestClock};

    use super::*;

    async fn engine_with_store() -> (DeliveryEngine, Arc<MemoryStore>, WebhookId) {
        let store = Arc::new(MemoryStore::new());
        let webhook = Webhook {
            id: WebhookId::new(),
            owner_id: OwnerId::new(),
            url: "https://example.com/hooks".to_string(),
            events: vec!["listing.created".to_string()],
            secret: "whsec_test".to_string(),
            is_active: true,
            created_at: Utc::now(),
        };
        let webhook_id = webhook.id;
        store.insert_webhook(webhook).await.unwrap();

        let engine = DeliveryEngine::new(
            store.clone(),
            store.clone(),
            DeliveryClient::with_defaults().unwrap(),
            Arc::new(TestClock::new()),
            EngineConfig::default(),
        );
        (engine, store, webhook_id)
    }

    #[tokio::test]
    async fn enqueue_rejects_unknown_event() {
        let (engine, _store, webhook_id) = engine_with_store().await;

        let result = engine.enqueue(webhook_id, "listing.exploded", Bytes::new()).await;
        assert!(matches!(result, Err(CoreError::Validation(_))));
    }

    #[tokio::test]
    async fn enqueue_rejects_unsubscribed_event() {
        let (engine, _store, webhook_id) = engine_with_store().await;

        let result = engine.enqueue(webhook_id, "rating.created", Bytes::new()).await;
        assert!(matches!(result, Err(CoreError::Validation(_))));
    }

    #[tokio::test]
    async fn enqueue_rejects_missing_webhook() {
        let (engine, _store, _webhook_id) = engine_with_store().await;

        let result = engine.enqueue(WebhookId::new(), "listing.created", Bytes::new()).await;
        assert!(matches!(result, Err(CoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn enqueue_creates_unattempted_pending_row() {
        let (engine, store, webhook_id) = engine_with_store().await;

        let delivery = engine
            .enqueue(webhook_id, "listing.created", Bytes::from_static(b"{\"id\":1}"))
            .await
            .unwrap();

        assert_eq!(delivery.status, DeliveryStatus::Pending);
        assert_eq!(delivery.attempts, 0);
        assert!(delivery.next_retry_at.is_none());

        let stored = store.find_delivery(delivery.id).await.unwrap().unwrap();
        assert_eq!(stored, delivery);
    }
}
