//! Core domain types for the Vendgros integration gateway.
//!
//! Defines the marketplace-facing integration model: API keys, webhook
//! registrations, the delivery ledger, the subscribable event catalog, and
//! the storage and clock abstractions the delivery pipeline is built on.

pub mod error;
pub mod events;
pub mod models;
pub mod store;
pub mod time;

pub use error::{CoreError, Result};
pub use models::{
    ApiKey, ApiKeyId, ApiKeyPatch, Caller, DeliveryId, DeliveryStatus, OwnerId, Webhook,
    WebhookDelivery, WebhookId, WebhookPatch,
};
pub use store::{memory::MemoryStore, ApiKeyStore, DeliveryStore, WebhookStore};
pub use time::{Clock, SystemClock, TestClock};
