//! In-memory store backing all three storage traits.
//!
//! Tables are `RwLock`-guarded maps; claim operations run under a single
//! write lock, which is what makes the lease claim atomic. Suitable for
//! tests and single-node deployments.

use std::{collections::HashMap, sync::Arc};

use chrono::{DateTime, Duration, Utc};
use tokio::sync::RwLock;

use crate::{
    error::CoreError,
    models::{ApiKey, ApiKeyId, DeliveryId, OwnerId, Webhook, WebhookDelivery, WebhookId},
    store::{ApiKeyStore, DeliveryStore, StoreFuture, WebhookStore},
};

/// In-process implementation of the gateway's storage traits.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    keys: Arc<RwLock<HashMap<ApiKeyId, ApiKey>>>,
    webhooks: Arc<RwLock<HashMap<WebhookId, Webhook>>>,
    deliveries: Arc<RwLock<HashMap<DeliveryId, WebhookDelivery>>>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the total number of ledger rows, regardless of status.
    pub async fn delivery_count(&self) -> usize {
        self.deliveries.read().await.len()
    }
}

impl ApiKeyStore for MemoryStore {
    fn insert_key(&self, key: ApiKey) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            self.keys.write().await.insert(key.id, key);
            Ok(())
        })
    }

    fn find_key(&self, id: ApiKeyId) -> StoreFuture<'_, Option<ApiKey>> {
        Box::pin(async move { Ok(self.keys.read().await.get(&id).cloned()) })
    }

    fn find_keys_by_prefix(&self, prefix: String) -> StoreFuture<'_, Vec<ApiKey>> {
        Box::pin(async move {
            let keys = self.keys.read().await;
            Ok(keys
                .values()
                .filter(|key| key.key_prefix == prefix)
                .cloned()
                .collect())
        })
    }

    fn list_keys(&self, owner_id: OwnerId) -> StoreFuture<'_, Vec<ApiKey>> {
        Box::pin(async move {
            let keys = self.keys.read().await;
            let mut owned: Vec<ApiKey> =
                keys.values().filter(|key| key.owner_id == owner_id).cloned().collect();
            owned.sort_by(|a, b| {
                b.created_at.cmp(&a.created_at).then_with(|| b.id.0.cmp(&a.id.0))
            });
            Ok(owned)
        })
    }

    fn update_key(&self, key: ApiKey) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            let mut keys = self.keys.write().await;
            if !keys.contains_key(&key.id) {
                return Err(CoreError::not_found(format!("api key {}", key.id)));
            }
            keys.insert(key.id, key);
            Ok(())
        })
    }

    fn delete_key(&self, id: ApiKeyId) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            let mut keys = self.keys.write().await;
            if keys.remove(&id).is_none() {
                return Err(CoreError::not_found(format!("api key {id}")));
            }
            Ok(())
        })
    }
}

impl WebhookStore for MemoryStore {
    fn insert_webhook(&self, webhook: Webhook) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            self.webhooks.write().await.insert(webhook.id, webhook);
            Ok(())
        })
    }

    fn find_webhook(&self, id: WebhookId) -> StoreFuture<'_, Option<Webhook>> {
        Box::pin(async move { Ok(self.webhooks.read().await.get(&id).cloned()) })
    }

    fn list_webhooks(&self, owner_id: OwnerId) -> StoreFuture<'_, Vec<Webhook>> {
        Box::pin(async move {
            let webhooks = self.webhooks.read().await;
            let mut owned: Vec<Webhook> = webhooks
                .values()
                .filter(|webhook| webhook.owner_id == owner_id)
                .cloned()
                .collect();
            owned.sort_by(|a, b| {
                b.created_at.cmp(&a.created_at).then_with(|| b.id.0.cmp(&a.id.0))
            });
            Ok(owned)
        })
    }

    fn update_webhook(&self, webhook: Webhook) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            let mut webhooks = self.webhooks.write().await;
            if !webhooks.contains_key(&webhook.id) {
                return Err(CoreError::not_found(format!("webhook {}", webhook.id)));
            }
            webhooks.insert(webhook.id, webhook);
            Ok(())
        })
    }

    fn delete_webhook(&self, id: WebhookId) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            let mut webhooks = self.webhooks.write().await;
            if webhooks.remove(&id).is_none() {
                return Err(CoreError::not_found(format!("webhook {id}")));
            }
            Ok(())
        })
    }
}

impl DeliveryStore for MemoryStore {
    fn insert_delivery(&self, delivery: WebhookDelivery) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            self.deliveries.write().await.insert(delivery.id, delivery);
            Ok(())
        })
    }

    fn find_delivery(&self, id: DeliveryId) -> StoreFuture<'_, Option<WebhookDelivery>> {
        Box::pin(async move { Ok(self.deliveries.read().await.get(&id).cloned()) })
    }

    fn list_deliveries(
        &self,
        webhook_id: WebhookId,
        limit: usize,
    ) -> StoreFuture<'_, Vec<WebhookDelivery>> {
        Box::pin(async move {
            let deliveries = self.deliveries.read().await;
            let mut rows: Vec<WebhookDelivery> = deliveries
                .values()
                .filter(|row| row.webhook_id == webhook_id)
                .cloned()
                .collect();
            rows.sort_by(|a, b| {
                b.created_at.cmp(&a.created_at).then_with(|| b.id.0.cmp(&a.id.0))
            });
            rows.truncate(limit);
            Ok(rows)
        })
    }

    fn claim_due(
        &self,
        now: DateTime<Utc>,
        limit: usize,
        lease: Duration,
    ) -> StoreFuture<'_, Vec<WebhookDelivery>> {
        Box::pin(async move {
            // Single write lock for the whole scan-and-mark, so concurrent
            // sweeps can never claim the same row.
            let mut deliveries = self.deliveries.write().await;

            let mut due_ids: Vec<(DateTime<Utc>, DeliveryId)> = deliveries
                .values()
                .filter(|row| row.is_due(now) && !row.is_leased(now))
                .map(|row| (row.created_at, row.id))
                .collect();
            due_ids.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1 .0.cmp(&b.1 .0)));
            due_ids.truncate(limit);

            let mut claimed = Vec::with_capacity(due_ids.len());
            for (_, id) in due_ids {
                if let Some(row) = deliveries.get_mut(&id) {
                    row.lease_expires_at = Some(now + lease);
                    claimed.push(row.clone());
                }
            }
            Ok(claimed)
        })
    }

    fn claim_delivery(
        &self,
        id: DeliveryId,
        now: DateTime<Utc>,
        lease: Duration,
    ) -> StoreFuture<'_, Option<WebhookDelivery>> {
        Box::pin(async move {
            let mut deliveries = self.deliveries.write().await;

            let Some(row) = deliveries.get_mut(&id) else {
                return Ok(None);
            };
            if row.status.is_terminal() {
                return Err(CoreError::validation(format!(
                    "delivery {id} is already {}",
                    row.status
                )));
            }
            if row.is_leased(now) {
                return Err(CoreError::conflict(format!(
                    "delivery {id} is claimed by another attempt"
                )));
            }

            row.lease_expires_at = Some(now + lease);
            Ok(Some(row.clone()))
        })
    }

    fn update_delivery(&self, delivery: WebhookDelivery) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            let mut deliveries = self.deliveries.write().await;

            let Some(existing) = deliveries.get(&delivery.id) else {
                return Err(CoreError::not_found(format!("delivery {}", delivery.id)));
            };
            if existing.status.is_terminal() {
                return Err(CoreError::conflict(format!(
                    "delivery {} is already {}",
                    delivery.id, existing.status
                )));
            }

            deliveries.insert(delivery.id, delivery);
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;
    use crate::models::DeliveryStatus;

    fn pending_row(webhook_id: WebhookId, created_at: DateTime<Utc>) -> WebhookDelivery {
        WebhookDelivery::pending(webhook_id, "listing.created", Bytes::from_static(b"{}"), created_at)
    }

    #[tokio::test]
    async fn claim_due_marks_lease_and_respects_limit() {
        let store = MemoryStore::new();
        let webhook_id = WebhookId::new();
        let now = Utc::now();

        for i in 0..5 {
            store
                .insert_delivery(pending_row(webhook_id, now - Duration::seconds(10 - i)))
                .await
                .unwrap();
        }

        let claimed = store.claim_due(now, 3, Duration::seconds(60)).await.unwrap();
        assert_eq!(claimed.len(), 3);
        for row in &claimed {
            assert_eq!(row.lease_expires_at, Some(now + Duration::seconds(60)));
        }

        // The remaining two are still claimable, the first three are not.
        let rest = store.claim_due(now, 10, Duration::seconds(60)).await.unwrap();
        assert_eq!(rest.len(), 2);
        assert!(rest.iter().all(|row| !claimed.iter().any(|c| c.id == row.id)));
    }

    #[tokio::test]
    async fn claim_due_prefers_oldest_rows() {
        let store = MemoryStore::new();
        let webhook_id = WebhookId::new();
        let now = Utc::now();

        let old = pending_row(webhook_id, now - Duration::seconds(300));
        let new = pending_row(webhook_id, now - Duration::seconds(10));
        store.insert_delivery(new.clone()).await.unwrap();
        store.insert_delivery(old.clone()).await.unwrap();

        let claimed = store.claim_due(now, 1, Duration::seconds(60)).await.unwrap();
        assert_eq!(claimed[0].id, old.id);
    }

    #[tokio::test]
    async fn claim_due_skips_unready_rows() {
        let store = MemoryStore::new();
        let webhook_id = WebhookId::new();
        let now = Utc::now();

        let mut scheduled = pending_row(webhook_id, now);
        scheduled.next_retry_at = Some(now + Duration::seconds(60));
        let mut delivered = pending_row(webhook_id, now);
        delivered.status = DeliveryStatus::Delivered;
        let mut leased = pending_row(webhook_id, now);
        leased.lease_expires_at = Some(now + Duration::seconds(30));

        store.insert_delivery(scheduled.clone()).await.unwrap();
        store.insert_delivery(delivered).await.unwrap();
        store.insert_delivery(leased).await.unwrap();

        assert!(store.claim_due(now, 10, Duration::seconds(60)).await.unwrap().is_empty());

        // The scheduled row becomes due once its retry time passes, and the
        // lease frees the third row once it expires.
        let later = now + Duration::seconds(61);
        let claimed = store.claim_due(later, 10, Duration::seconds(60)).await.unwrap();
        assert_eq!(claimed.len(), 2);
    }

    #[tokio::test]
    async fn concurrent_claims_never_overlap() {
        let store = Arc::new(MemoryStore::new());
        let webhook_id = WebhookId::new();
        let now = Utc::now();

        for _ in 0..20 {
            store.insert_delivery(pending_row(webhook_id, now)).await.unwrap();
        }

        let a = {
            let store = store.clone();
            tokio::spawn(async move { store.claim_due(now, 20, Duration::seconds(60)).await })
        };
        let b = {
            let store = store.clone();
            tokio::spawn(async move { store.claim_due(now, 20, Duration::seconds(60)).await })
        };

        let claimed_a = a.await.unwrap().unwrap();
        let claimed_b = b.await.unwrap().unwrap();

        assert_eq!(claimed_a.len() + claimed_b.len(), 20);
        for row in &claimed_a {
            assert!(!claimed_b.iter().any(|other| other.id == row.id));
        }
    }

    #[tokio::test]
    async fn claim_delivery_conflicts_on_held_lease() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let row = pending_row(WebhookId::new(), now);
        let id = row.id;
        store.insert_delivery(row).await.unwrap();

        let first = store.claim_delivery(id, now, Duration::seconds(60)).await.unwrap();
        assert!(first.is_some());

        let second = store.claim_delivery(id, now, Duration::seconds(60)).await;
        assert!(matches!(second, Err(CoreError::Conflict(_))));
    }

    #[tokio::test]
    async fn claim_delivery_rejects_terminal_rows() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let mut row = pending_row(WebhookId::new(), now);
        row.status = DeliveryStatus::Failed;
        let id = row.id;
        store.insert_delivery(row).await.unwrap();

        let result = store.claim_delivery(id, now, Duration::seconds(60)).await;
        assert!(matches!(result, Err(CoreError::Validation(_))));
    }

    #[tokio::test]
    async fn terminal_rows_are_immutable() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let mut row = pending_row(WebhookId::new(), now);
        store.insert_delivery(row.clone()).await.unwrap();

        row.status = DeliveryStatus::Delivered;
        row.delivered_at = Some(now);
        store.update_delivery(row.clone()).await.unwrap();

        row.status = DeliveryStatus::Pending;
        let result = store.update_delivery(row).await;
        assert!(matches!(result, Err(CoreError::Conflict(_))));
    }

    #[tokio::test]
    async fn list_deliveries_newest_first_with_limit() {
        let store = MemoryStore::new();
        let webhook_id = WebhookId::new();
        let now = Utc::now();

        let oldest = pending_row(webhook_id, now - Duration::seconds(30));
        let middle = pending_row(webhook_id, now - Duration::seconds(20));
        let newest = pending_row(webhook_id, now - Duration::seconds(10));
        for row in [&oldest, &middle, &newest] {
            store.insert_delivery(row.clone()).await.unwrap();
        }
        // A row for another webhook never shows up.
        store.insert_delivery(pending_row(WebhookId::new(), now)).await.unwrap();

        let rows = store.list_deliveries(webhook_id, 2).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].id, newest.id);
        assert_eq!(rows[1].id, middle.id);
    }

    #[tokio::test]
    async fn key_listing_scoped_to_owner() {
        let store = MemoryStore::new();
        let owner = OwnerId::new();
        let other = OwnerId::new();
        let now = Utc::now();

        for (owner_id, name) in [(owner, "first"), (owner, "second"), (other, "foreign")] {
            store
                .insert_key(ApiKey {
                    id: ApiKeyId::new(),
                    owner_id,
                    name: name.into(),
                    key_hash: String::new(),
                    key_prefix: "vg_abc12".into(),
                    scopes: vec!["listings:read".into()],
                    rate_limit_per_hour: 1000,
                    is_active: true,
                    expires_at: None,
                    created_at: now,
                })
                .await
                .unwrap();
        }

        let keys = store.list_keys(owner).await.unwrap();
        assert_eq!(keys.len(), 2);
        assert!(keys.iter().all(|key| key.owner_id == owner));
    }
}
