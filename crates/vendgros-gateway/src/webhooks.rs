//! Webhook registration and subscription management.
//!
//! Each registration binds a receiver URL to a set of catalog events and a
//! signing secret. The secret is returned in full exactly once, at
//! creation; listings expose a masked preview only.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rand::{distr::Alphanumeric, Rng};
use serde::{Deserialize, Serialize};
use url::Url;
use vendgros_core::{
    events::{self, EventDescriptor},
    Caller, Clock, CoreError, Result, Webhook, WebhookId, WebhookPatch, WebhookStore,
};

const SECRET_RANDOM_LEN: usize = 32;
const SECRET_PREVIEW_LEN: usize = 8;

/// A freshly registered webhook: the stored record plus the one-time secret.
#[derive(Debug, Clone)]
pub struct CreatedWebhook {
    /// The persisted registration.
    pub record: Webhook,
    /// Full signing secret. Shown once; later reads are masked.
    pub secret: String,
}

/// Caller-facing view of a registration with the secret masked.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookSummary {
    pub id: WebhookId,
    pub url: String,
    pub events: Vec<String>,
    /// First characters of the secret plus an ellipsis.
    pub secret_preview: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// Registers, lists, mutates, and deletes webhook subscriptions.
#[derive(Clone)]
pub struct WebhookRegistry {
    store: Arc<dyn WebhookStore>,
    clock: Arc<dyn Clock>,
}

impl WebhookRegistry {
    /// Creates a registry over the given backend.
    pub fn new(store: Arc<dyn WebhookStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Registers a new webhook for the caller's account.
    pub async fn create_webhook(
        &self,
        caller: &Caller,
        url: &str,
        events: Vec<String>,
    ) -> Result<CreatedWebhook> {
        validate_url(url)?;
        validate_events(&events)?;

        let secret = generate_secret();
        let record = Webhook {
            id: WebhookId::new(),
            owner_id: caller.owner_id,
            url: url.to_string(),
            events,
            secret: secret.clone(),
            is_active: true,
            created_at: self.clock.now_utc(),
        };

        self.store.insert_webhook(record.clone()).await?;
        tracing::info!(
            webhook_id = %record.id,
            owner_id = %record.owner_id,
            url = %record.url,
            "webhook registered"
        );
        Ok(CreatedWebhook { record, secret })
    }

    /// Lists the caller's webhooks, newest first, secrets masked.
    pub async fn list_webhooks(&self, caller: &Caller) -> Result<Vec<WebhookSummary>> {
        let webhooks = self.store.list_webhooks(caller.owner_id).await?;
        Ok(webhooks.into_iter().map(summarize).collect())
    }

    /// Applies a partial update to one of the caller's webhooks.
    pub async fn update_webhook(
        &self,
        caller: &Caller,
        webhook_id: WebhookId,
        patch: WebhookPatch,
    ) -> Result<WebhookSummary> {
        let mut webhook = self.owned_webhook(caller, webhook_id).await?;

        if let Some(url) = patch.url {
            validate_url(&url)?;
            webhook.url = url;
        }
        if let Some(events) = patch.events {
            validate_events(&events)?;
            webhook.events = events;
        }
        if let Some(is_active) = patch.is_active {
            webhook.is_active = is_active;
        }

        self.store.update_webhook(webhook.clone()).await?;
        tracing::info!(webhook_id = %webhook_id, "webhook updated");
        Ok(summarize(webhook))
    }

    /// Deletes one of the caller's webhooks.
    ///
    /// Ledger rows referencing the webhook stay behind as audit history.
    pub async fn delete_webhook(&self, caller: &Caller, webhook_id: WebhookId) -> Result<()> {
        let webhook = self.owned_webhook(caller, webhook_id).await?;

        self.store.delete_webhook(webhook.id).await?;
        tracing::info!(webhook_id = %webhook_id, owner_id = %caller.owner_id, "webhook deleted");
        Ok(())
    }

    /// Returns the catalog of subscribable events.
    pub fn available_events(&self) -> &'static [EventDescriptor] {
        events::available_events()
    }

    async fn owned_webhook(&self, caller: &Caller, webhook_id: WebhookId) -> Result<Webhook> {
        let webhook = self
            .store
            .find_webhook(webhook_id)
            .await?
            .ok_or_else(|| CoreError::not_found(format!("webhook {webhook_id}")))?;
        if webhook.owner_id != caller.owner_id {
            return Err(CoreError::not_authorized(format!(
                "webhook {webhook_id} belongs to another account"
            )));
        }
        Ok(webhook)
    }
}

fn summarize(webhook: Webhook) -> WebhookSummary {
    WebhookSummary {
        id: webhook.id,
        url: webhook.url,
        events: webhook.events,
        secret_preview: mask_secret(&webhook.secret),
        is_active: webhook.is_active,
        created_at: webhook.created_at,
    }
}

/// Masks a secret down to a short preview.
fn mask_secret(secret: &str) -> String {
    let preview: String = secret.chars().take(SECRET_PREVIEW_LEN).collect();
    format!("{preview}...")
}

fn generate_secret() -> String {
    let random: String = rand::rng()
        .sample_iter(&Alphanumeric)
        .take(SECRET_RANDOM_LEN)
        .map(char::from)
        .collect();
    format!("whsec_{random}")
}

fn validate_url(url: &str) -> Result<()> {
    let parsed = Url::parse(url)
        .map_err(|e| CoreError::validation(format!("invalid webhook URL: {e}")))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(CoreError::validation(format!(
            "webhook URL must be http or https, got '{}'",
            parsed.scheme()
        )));
    }
    Ok(())
}

fn validate_events(events: &[String]) -> Result<()> {
    if events.is_empty() {
        return Err(CoreError::validation("at least one event subscription is required"));
    }
    for event in events {
        if !events::is_known_event(event) {
            return Err(CoreError::validation(format!("unknown event '{event}'")));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use vendgros_core::{MemoryStore, OwnerId, TestClock};

    use super::*;

    fn registry() -> WebhookRegistry {
        WebhookRegistry::new(Arc::new(MemoryStore::new()), Arc::new(TestClock::new()))
    }

    fn caller() -> Caller {
        Caller::user(OwnerId::new())
    }

    #[tokio::test]
    async fn create_returns_full_secret_once() {
        let registry = registry();
        let caller = caller();

        let created = registry
            .create_webhook(&caller, "https://example.com/hooks", vec!["listing.created".into()])
            .await
            .unwrap();

        assert!(created.secret.starts_with("whsec_"));
        assert_eq!(created.secret.len(), 6 + SECRET_RANDOM_LEN);

        let listed = registry.list_webhooks(&caller).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].secret_preview, format!("{}...", &created.secret[..8]));
        assert_ne!(listed[0].secret_preview, created.secret);
    }

    #[tokio::test]
    async fn create_validates_url_and_events() {
        let registry = registry();
        let caller = caller();

        let bad_url = registry
            .create_webhook(&caller, "not a url", vec!["listing.created".into()])
            .await;
        assert!(matches!(bad_url, Err(CoreError::Validation(_))));

        let bad_scheme = registry
            .create_webhook(&caller, "ftp://example.com/hooks", vec!["listing.created".into()])
            .await;
        assert!(matches!(bad_scheme, Err(CoreError::Validation(_))));

        let no_events =
            registry.create_webhook(&caller, "https://example.com/hooks", vec![]).await;
        assert!(matches!(no_events, Err(CoreError::Validation(_))));

        let unknown_event = registry
            .create_webhook(&caller, "https://example.com/hooks", vec!["listing.vanished".into()])
            .await;
        assert!(matches!(unknown_event, Err(CoreError::Validation(_))));
    }

    #[tokio::test]
    async fn update_revalidates_patched_fields() {
        let registry = registry();
        let caller = caller();

        let created = registry
            .create_webhook(&caller, "https://example.com/hooks", vec!["listing.created".into()])
            .await
            .unwrap();

        let updated = registry
            .update_webhook(
                &caller,
                created.record.id,
                WebhookPatch {
                    url: Some("https://example.org/v2/hooks".into()),
                    events: Some(vec!["rating.created".into(), "message.received".into()]),
                    is_active: Some(false),
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.url, "https://example.org/v2/hooks");
        assert_eq!(updated.events.len(), 2);
        assert!(!updated.is_active);

        let bad_patch = registry
            .update_webhook(
                &caller,
                created.record.id,
                WebhookPatch { events: Some(vec![]), ..WebhookPatch::default() },
            )
            .await;
        assert!(matches!(bad_patch, Err(CoreError::Validation(_))));
    }

    #[tokio::test]
    async fn ownership_enforced() {
        let registry = registry();
        let owner = caller();
        let stranger = caller();

        let created = registry
            .create_webhook(&owner, "https://example.com/hooks", vec!["listing.created".into()])
            .await
            .unwrap();

        let delete = registry.delete_webhook(&stranger, created.record.id).await;
        assert!(matches!(delete, Err(CoreError::NotAuthorized(_))));

        let update = registry
            .update_webhook(
                &stranger,
                created.record.id,
                WebhookPatch { is_active: Some(false), ..WebhookPatch::default() },
            )
            .await;
        assert!(matches!(update, Err(CoreError::NotAuthorized(_))));

        assert_eq!(registry.list_webhooks(&owner).await.unwrap().len(), 1);
        assert!(registry.list_webhooks(&stranger).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn delete_removes_registration() {
        let registry = registry();
        let owner = caller();

        let created = registry
            .create_webhook(&owner, "https://example.com/hooks", vec!["listing.created".into()])
            .await
            .unwrap();

        registry.delete_webhook(&owner, created.record.id).await.unwrap();
        assert!(registry.list_webhooks(&owner).await.unwrap().is_empty());

        let again = registry.delete_webhook(&owner, created.record.id).await;
        assert!(matches!(again, Err(CoreError::NotFound(_))));
    }

    #[test]
    fn catalog_exposed() {
        let registry = registry();
        let catalog = registry.available_events();
        assert!(catalog.iter().any(|event| event.name == "reservation.completed"));
    }

    #[test]
    fn masking_short_secrets_is_safe() {
        assert_eq!(mask_secret("whsec_ab"), "whsec_ab...");
        assert_eq!(mask_secret("abc"), "abc...");
    }
}
