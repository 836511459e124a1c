mod common;

use axum::body::Body;
use zenith_commerce::store::OrderStore;
use axum::http::{header, Request, StatusCode};
use common::{
    body_json, charge_refunded_payload, session_completed_payload, TestApp, TestAppOptions,
};
use serde_json::json;
use uuid::Uuid;

#[tokio::test]
async fn webhook_with_bad_signature_is_rejected_and_order_untouched() {
    let app = TestApp::spawn();
    let order_id = app.create_order("buyer@example.com").await;

    let payload = session_completed_payload(order_id, "pi_1").to_string();
    let response = app
        .request(
            Request::builder()
                .method("POST")
                .uri("/api/v1/payments/webhook")
                .header(header::CONTENT_TYPE, "application/json")
                .header("stripe-signature", "t=0,v1=deadbeef")
                .body(Body::from(payload))
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let order = app.store.get_order(order_id).await.unwrap().unwrap();
    assert_eq!(order.status, "pending");
    assert!(app.store.get_order_events(order_id).await.unwrap().is_empty());
}

#[tokio::test]
async fn webhook_without_secrets_configured_is_a_server_error() {
    let app = TestApp::with_options(TestAppOptions {
        stripe_webhook_secret: None,
        ..TestAppOptions::default()
    });
    let order_id = app.create_order("buyer@example.com").await;

    let payload = session_completed_payload(order_id, "pi_1").to_string();
    let response = app
        .request(
            Request::builder()
                .method("POST")
                .uri("/api/v1/payments/webhook")
                .header(header::CONTENT_TYPE, "application/json")
                .header("stripe-signature", "t=0,v1=deadbeef")
                .body(Body::from(payload))
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    // Misconfiguration must not leak which secret is missing.
    let body = body_json(response).await;
    assert_eq!(body["message"], "Service misconfigured");
}

#[tokio::test]
async fn duplicate_session_completed_delivery_transitions_once() {
    let app = TestApp::spawn();
    let order_id = app.create_order("buyer@example.com").await;
    let payload = session_completed_payload(order_id, "pi_1");

    let first = app.post_webhook(&payload).await;
    assert_eq!(first.status(), StatusCode::OK);
    assert_eq!(body_json(first).await["received"], true);

    let second = app.post_webhook(&payload).await;
    assert_eq!(second.status(), StatusCode::OK);

    let order = app.store.get_order(order_id).await.unwrap().unwrap();
    assert_eq!(order.status, "paid");
    assert_eq!(order.stripe_payment_intent_id.as_deref(), Some("pi_1"));

    let events = app.store.get_order_events(order_id).await.unwrap();
    let webhook_events: Vec<_> = events
        .iter()
        .filter(|e| e.event_type == "webhook")
        .collect();
    assert_eq!(webhook_events.len(), 1);

    // Exactly one receipt went out despite the redelivery.
    assert_eq!(app.mailer.sent_count(), 1);
}

#[tokio::test]
async fn charge_refunded_moves_paid_order_to_refunded() {
    let app = TestApp::spawn();
    let order_id = app.create_order("buyer@example.com").await;

    app.post_webhook(&session_completed_payload(order_id, "pi_1"))
        .await;
    let response = app.post_webhook(&charge_refunded_payload("pi_1")).await;
    assert_eq!(response.status(), StatusCode::OK);

    let order = app.store.get_order(order_id).await.unwrap().unwrap();
    assert_eq!(order.status, "refunded");

    let events = app.store.get_order_events(order_id).await.unwrap();
    assert!(events
        .iter()
        .any(|e| e.event_type == "webhook" && e.message.contains("refunded")));
}

#[tokio::test]
async fn email_failure_is_logged_as_event_and_still_acknowledged() {
    let app = TestApp::with_options(TestAppOptions {
        mailer_fails: true,
        ..TestAppOptions::default()
    });
    let order_id = app.create_order("buyer@example.com").await;

    let response = app
        .post_webhook(&session_completed_payload(order_id, "pi_1"))
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let order = app.store.get_order(order_id).await.unwrap().unwrap();
    assert_eq!(order.status, "paid");

    let events = app.store.get_order_events(order_id).await.unwrap();
    assert!(events
        .iter()
        .any(|e| e.event_type == "email" && e.message.contains("failed")));
}

#[tokio::test]
async fn unknown_event_kind_is_acknowledged_without_side_effects() {
    let app = TestApp::spawn();
    let order_id = app.create_order("buyer@example.com").await;

    let response = app
        .post_webhook(&json!({
            "id": "evt_other",
            "type": "invoice.finalized",
            "data": { "object": {} }
        }))
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let order = app.store.get_order(order_id).await.unwrap().unwrap();
    assert_eq!(order.status, "pending");
}

#[tokio::test]
async fn session_completed_for_unknown_order_is_acknowledged() {
    let app = TestApp::spawn();

    let response = app
        .post_webhook(&session_completed_payload(Uuid::new_v4(), "pi_1"))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["received"], true);
}
