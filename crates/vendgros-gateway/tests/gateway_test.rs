//! Full-surface test: register a webhook, enqueue an event, sweep, and
//! verify the signed request that reached the receiver.

use bytes::Bytes;
use vendgros_core::{Caller, DeliveryStatus, OwnerId};
use vendgros_delivery::{sign_payload, EVENT_HEADER, SIGNATURE_HEADER};
use vendgros_gateway::{Config, Gateway};
use wiremock::{matchers, Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn event_flows_from_enqueue_to_signed_delivery() {
    let server = MockServer::start().await;
    let gateway = Gateway::in_memory(&Config::default()).unwrap();
    let caller = Caller::user(OwnerId::new());

    let webhook = gateway
        .create_webhook(
            &caller,
            &format!("{}/hooks/listings", server.uri()),
            vec!["listing.published".into()],
        )
        .await
        .unwrap();

    let payload = Bytes::from_static(b"{\"listing_id\":\"7f3a\",\"title\":\"Bulk rebar\"}");
    let expected_signature = sign_payload(&webhook.secret, &payload);

    Mock::given(matchers::method("POST"))
        .and(matchers::path("/hooks/listings"))
        .and(matchers::header(SIGNATURE_HEADER, expected_signature.as_str()))
        .and(matchers::header(EVENT_HEADER, "listing.published"))
        .and(matchers::body_bytes(payload.to_vec()))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let delivery = gateway
        .enqueue_delivery(webhook.record.id, "listing.published", payload)
        .await
        .unwrap();
    assert_eq!(delivery.status, DeliveryStatus::Pending);

    let admin = Caller::admin(OwnerId::new());
    let report = gateway.process_pending_retries(&admin).await.unwrap();
    assert_eq!(report.delivered, 1);

    let history = gateway
        .get_webhook_deliveries(&caller, webhook.record.id, 10)
        .await
        .unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].status, DeliveryStatus::Delivered);
    assert_eq!(history[0].response_code, Some(200));
}
