//! Signed webhook delivery for the Vendgros integration gateway.
//!
//! Payloads are HMAC-signed, POSTed with a per-attempt timeout, and tracked
//! through the delivery ledger by [`engine::DeliveryEngine`]: fixed backoff
//! on failure, a five-attempt budget, and lease-claimed rows so concurrent
//! sweeps never double-send.

pub mod client;
pub mod engine;
pub mod error;
pub mod retry;
pub mod signing;

pub use client::{ClientConfig, DeliveryClient, DeliveryRequest, DeliveryResponse, EVENT_HEADER, SIGNATURE_HEADER};
pub use engine::{DeliveryEngine, EngineConfig, SweepReport};
pub use error::DeliveryError;
pub use retry::{backoff_delay, decide_retry, RetryDecision, MAX_ATTEMPTS, MAX_RETRIES_MESSAGE};
pub use signing::{sign_payload, verify_signature};
