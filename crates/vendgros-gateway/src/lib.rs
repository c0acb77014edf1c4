//! Operation surface of the Vendgros integration gateway.
//!
//! Third parties integrate with the marketplace through two primitives:
//! API keys for inbound calls and signed webhooks for outbound events.
//! This crate provides the services behind both, plus the [`Gateway`]
//! facade that wires them to the delivery engine.

pub mod config;
pub mod gateway;
pub mod keys;
pub mod webhooks;

pub use config::Config;
pub use gateway::Gateway;
pub use keys::{CreatedKey, KeyStore};
pub use webhooks::{CreatedWebhook, WebhookRegistry, WebhookSummary};
