#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::{Body, Bytes};
use axum::http::{header, Request, StatusCode};
use axum::response::Response;
use axum::Router;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tower::ServiceExt;
use uuid::Uuid;

use zenith_commerce::config::AppConfig;
use zenith_commerce::entities::{order, order_item};
use zenith_commerce::errors::ServiceError;
use zenith_commerce::events::{process_events, EventSender};
use zenith_commerce::handlers::AppServices;
use zenith_commerce::services::orders::{CheckoutSettings, OrderService};
use zenith_commerce::services::receipts::{MailOutcome, Mailer};
use zenith_commerce::services::reconciliation::ReconciliationService;
use zenith_commerce::services::wallet::WalletVerifier;
use zenith_commerce::store::{InMemoryOrderStore, OrderStore, ProductCatalog};
use zenith_commerce::{app, AppState};

pub const TEST_WEBHOOK_SECRET: &str = "whsec_test_secret";
pub const TEST_ADMIN_TOKEN: &str = "test-admin-token";

/// Mailer that records which orders got a receipt, optionally failing
/// every send.
pub struct RecordingMailer {
    pub fail: bool,
    pub sent: Mutex<Vec<Uuid>>,
}

impl RecordingMailer {
    pub fn new(fail: bool) -> Self {
        Self {
            fail,
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send_receipt(
        &self,
        order: &order::Model,
        _items: &[order_item::Model],
    ) -> Result<MailOutcome, ServiceError> {
        if self.fail {
            return Err(ServiceError::ExternalServiceError("smtp timeout".into()));
        }
        self.sent.lock().unwrap().push(order.id);
        Ok(MailOutcome::Sent)
    }
}

/// Wallet verifier with a scripted answer and a call counter.
pub struct ScriptedWalletVerifier {
    pub result: bool,
    pub calls: AtomicUsize,
}

impl ScriptedWalletVerifier {
    pub fn new(result: bool) -> Self {
        Self {
            result,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WalletVerifier for ScriptedWalletVerifier {
    async fn verify(
        &self,
        _amount: &str,
        _order_ref: &str,
        _payment_reference: &str,
    ) -> Result<bool, ServiceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.result)
    }
}

pub struct TestAppOptions {
    pub stripe_secret_key: Option<String>,
    pub stripe_webhook_secret: Option<String>,
    pub wallet_result: Option<bool>,
    pub mailer_fails: bool,
}

impl Default for TestAppOptions {
    fn default() -> Self {
        Self {
            stripe_secret_key: Some("sk_test_dummy".into()),
            stripe_webhook_secret: Some(TEST_WEBHOOK_SECRET.into()),
            wallet_result: Some(true),
            mailer_fails: false,
        }
    }
}

pub struct TestApp {
    pub router: Router,
    pub store: Arc<InMemoryOrderStore>,
    pub mailer: Arc<RecordingMailer>,
    pub wallet: Option<Arc<ScriptedWalletVerifier>>,
    pub config: AppConfig,
}

impl TestApp {
    pub fn spawn() -> Self {
        Self::with_options(TestAppOptions::default())
    }

    pub fn with_options(options: TestAppOptions) -> Self {
        let config = test_config(&options);
        let store = Arc::new(InMemoryOrderStore::new());
        let store_dyn: Arc<dyn OrderStore> = store.clone();
        let catalog: Arc<dyn ProductCatalog> = store.clone();
        let mailer = Arc::new(RecordingMailer::new(options.mailer_fails));

        let (tx, rx) = mpsc::channel(64);
        let event_sender = EventSender::new(tx);
        tokio::spawn(process_events(rx));

        let orders = Arc::new(OrderService::new(
            store_dyn.clone(),
            None,
            Some(Arc::new(event_sender.clone())),
            CheckoutSettings {
                currency: config.default_currency.clone(),
                success_url: config.checkout_success_url.clone(),
                cancel_url: config.checkout_cancel_url.clone(),
            },
        ));
        let reconciliation = Arc::new(ReconciliationService::new(
            store_dyn.clone(),
            mailer.clone(),
            Some(Arc::new(event_sender.clone())),
        ));
        let wallet = options.wallet_result.map(|r| Arc::new(ScriptedWalletVerifier::new(r)));

        let state = AppState {
            store: store_dyn,
            config: config.clone(),
            services: AppServices {
                orders,
                reconciliation,
                wallet: wallet
                    .clone()
                    .map(|v| v as Arc<dyn WalletVerifier>),
                catalog,
            },
            event_sender,
        };

        Self {
            router: app(state),
            store,
            mailer,
            wallet,
            config,
        }
    }

    pub async fn request(&self, request: Request<Body>) -> Response {
        self.router.clone().oneshot(request).await.unwrap()
    }

    /// Creates an order through the API and returns its ID.
    pub async fn create_order(&self, email: &str) -> Uuid {
        let response = self
            .request(json_request(
                "POST",
                "/api/v1/orders",
                json!({
                    "email": email,
                    "items": [
                        { "product_id": Uuid::new_v4(), "name": "Widget", "price": 12.5, "qty": 2 }
                    ]
                }),
            ))
            .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        let body = body_json(response).await;
        Uuid::parse_str(body["order_id"].as_str().unwrap()).unwrap()
    }

    /// Posts a signed webhook payload.
    pub async fn post_webhook(&self, payload: &Value) -> Response {
        let body = payload.to_string();
        let signature = sign_webhook_payload(
            body.as_bytes(),
            TEST_WEBHOOK_SECRET,
            chrono::Utc::now().timestamp(),
        );
        self.request(
            Request::builder()
                .method("POST")
                .uri("/api/v1/payments/webhook")
                .header(header::CONTENT_TYPE, "application/json")
                .header("stripe-signature", signature)
                .body(Body::from(body))
                .unwrap(),
        )
        .await
    }
}

/// Computes a `stripe-signature` header the webhook verifier accepts:
/// `t=<ts>,v1=<hex hmac>` over `{t}.{payload}` with the webhook secret.
pub fn sign_webhook_payload(payload: &[u8], secret: &str, timestamp: i64) -> String {
    use hmac::{Hmac, Mac};
    let mut mac =
        Hmac::<sha2::Sha256>::new_from_slice(secret.as_bytes()).expect("hmac key");
    mac.update(format!("{}.{}", timestamp, String::from_utf8_lossy(payload)).as_bytes());
    format!(
        "t={},v1={}",
        timestamp,
        hex::encode(mac.finalize().into_bytes())
    )
}

fn test_config(options: &TestAppOptions) -> AppConfig {
    AppConfig {
        database_url: "sqlite::memory:".into(),
        host: "127.0.0.1".into(),
        port: 0,
        environment: "development".into(),
        log_level: "info".into(),
        log_json: false,
        cors_allowed_origins: None,
        cors_allow_any_origin: false,
        cors_allow_credentials: false,
        db_max_connections: 4,
        db_min_connections: 1,
        db_connect_timeout_secs: 5,
        db_idle_timeout_secs: 60,
        db_acquire_timeout_secs: 5,
        request_timeout_secs: 5,
        default_currency: "USD".into(),
        stripe_secret_key: options.stripe_secret_key.clone(),
        stripe_webhook_secret: options.stripe_webhook_secret.clone(),
        stripe_webhook_tolerance_secs: 300,
        admin_api_token: Some(TEST_ADMIN_TOKEN.into()),
        checkout_success_url: "http://localhost:3000/success".into(),
        checkout_cancel_url: "http://localhost:3000/cancel".into(),
        wallet_verify_url: Some("http://wallet.test/verify".into()),
        wallet_merchant_code: Some("MERCHANT_TEST".into()),
        wallet_success_url: "http://localhost:3000/wallet/success".into(),
        wallet_cancel_url: "http://localhost:3000/wallet/cancel".into(),
        resend_api_key: None,
        email_from: "receipts@test.example".into(),
        event_channel_capacity: 64,
    }
}

pub fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub fn get_request(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

pub async fn body_bytes(response: Response) -> Bytes {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
}

pub async fn body_json(response: Response) -> Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

/// A `checkout.session.completed` payload pointing at `order_id`.
pub fn session_completed_payload(order_id: Uuid, payment_intent: &str) -> Value {
    json!({
        "id": "evt_test_1",
        "type": "checkout.session.completed",
        "data": {
            "object": {
                "id": "cs_test_1",
                "payment_intent": payment_intent,
                "metadata": { "order_id": order_id.to_string() }
            }
        }
    })
}

pub fn charge_refunded_payload(payment_intent: &str) -> Value {
    json!({
        "id": "evt_test_2",
        "type": "charge.refunded",
        "data": {
            "object": {
                "id": "ch_test_1",
                "payment_intent": payment_intent
            }
        }
    })
}
