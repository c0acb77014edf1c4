//! HTTP client for signed webhook delivery.
//!
//! Handles request construction, response processing, and error
//! categorization for the retry logic. Every request carries the payload
//! signature and event name headers receivers authenticate against.

use std::time::Duration;

use bytes::Bytes;
use reqwest::Response;
use serde::{Deserialize, Serialize};
use tracing::{info_span, Instrument};
use vendgros_core::{DeliveryId, WebhookId};

use crate::{
    error::{DeliveryError, Result},
    signing,
};

/// Header carrying the hex HMAC-SHA256 signature of the request body.
pub const SIGNATURE_HEADER: &str = "X-Vendgros-Signature";

/// Header carrying the catalog event name.
pub const EVENT_HEADER: &str = "X-Vendgros-Event";

/// Configuration for the delivery client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Per-attempt timeout.
    pub timeout: Duration,
    /// User agent string for requests.
    pub user_agent: String,
    /// Maximum number of redirects to follow.
    pub max_redirects: u32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            user_agent: "Vendgros-Webhooks/1.0".to_string(),
            max_redirects: 3,
        }
    }
}

/// HTTP client for webhook delivery.
///
/// Uses connection pooling and a per-attempt timeout. Transport failures
/// are categorized so the engine can record a useful diagnostic on the
/// ledger row.
#[derive(Debug, Clone)]
pub struct DeliveryClient {
    client: reqwest::Client,
    config: ClientConfig,
}

/// One outbound delivery attempt.
#[derive(Debug, Clone)]
pub struct DeliveryRequest {
    /// Ledger row being attempted.
    pub delivery_id: DeliveryId,
    /// Webhook the payload is bound for.
    pub webhook_id: WebhookId,
    /// Receiver URL.
    pub url: String,
    /// Catalog event name.
    pub event: String,
    /// Raw payload bytes, sent untouched.
    pub payload: Bytes,
    /// Signing secret of the webhook.
    pub secret: String,
    /// Attempt number for logging (1-based).
    pub attempt_number: u32,
}

/// Response from a delivery attempt that reached the receiver.
#[derive(Debug, Clone)]
pub struct DeliveryResponse {
    /// HTTP status code.
    pub status_code: u16,
    /// Response body, truncated for diagnostics.
    pub body: String,
    /// Total duration of the request.
    pub duration: Duration,
    /// Whether the receiver acknowledged with a 2xx.
    pub is_success: bool,
}

impl DeliveryClient {
    /// Creates a delivery client with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns `DeliveryError::Configuration` if the HTTP client cannot be
    /// built with the provided settings.
    pub fn new(config: ClientConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(&config.user_agent)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects as usize))
            .build()
            .map_err(|e| {
                DeliveryError::configuration(format!("failed to build HTTP client: {e}"))
            })?;

        Ok(Self { client, config })
    }

    /// Creates a delivery client with default configuration.
    pub fn with_defaults() -> Result<Self> {
        Self::new(ClientConfig::default())
    }

    /// Delivers a signed payload to the receiver.
    ///
    /// Any HTTP response, success or not, comes back as `Ok`; the caller
    /// inspects `is_success`. Transport failures come back as
    /// `DeliveryError::{Timeout, Network}`.
    pub async fn deliver(&self, request: DeliveryRequest) -> Result<DeliveryResponse> {
        let start_time = std::time::Instant::now();

        let span = info_span!(
            "webhook_delivery",
            delivery_id = %request.delivery_id,
            webhook_id = %request.webhook_id,
            event = %request.event,
            attempt = request.attempt_number
        );

        async move {
            tracing::debug!(url = %request.url, "starting delivery attempt");

            let signature = signing::sign_payload(&request.secret, &request.payload);

            let response = match self
                .client
                .post(&request.url)
                .header("content-type", "application/json")
                .header(SIGNATURE_HEADER, signature)
                .header(EVENT_HEADER, &request.event)
                .body(request.payload.clone())
                .send()
                .await
            {
                Ok(response) => response,
                Err(e) => {
                    let duration = start_time.elapsed();
                    tracing::warn!(duration_ms = duration.as_millis(), "request failed: {}", e);

                    if e.is_timeout() {
                        return Err(DeliveryError::timeout(self.config.timeout.as_secs()));
                    }
                    if e.is_connect() {
                        return Err(DeliveryError::network(format!("connection failed: {e}")));
                    }
                    return Err(DeliveryError::network(e.to_string()));
                },
            };

            let duration = start_time.elapsed();
            let delivery_response = parse_response(response, duration).await;

            match delivery_response.status_code {
                200..=299 => {
                    tracing::info!(
                        status = delivery_response.status_code,
                        duration_ms = duration.as_millis(),
                        "webhook delivered"
                    );
                },
                status => {
                    tracing::warn!(status, duration_ms = duration.as_millis(), "receiver rejected delivery");
                },
            }

            Ok(delivery_response)
        }
        .instrument(span)
        .await
    }
}

/// Parses an HTTP response into a delivery response, truncating the body.
async fn parse_response(response: Response, duration: Duration) -> DeliveryResponse {
    const MAX_BODY_SIZE: usize = 1024;

    let status_code = response.status().as_u16();
    let is_success = response.status().is_success();

    let body = match response.bytes().await {
        Ok(bytes) if bytes.len() > MAX_BODY_SIZE => {
            let suffix = "... (truncated)";
            let truncated = String::from_utf8_lossy(&bytes[..MAX_BODY_SIZE - suffix.len()]);
            format!("{truncated}{suffix}")
        },
        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Err(e) => {
            tracing::warn!("failed to read response body: {}", e);
            format!("[failed to read response body: {e}]")
        },
    };

    DeliveryResponse { status_code, body, duration, is_success }
}
