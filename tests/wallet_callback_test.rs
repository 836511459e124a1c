mod common;

use axum::http::{header, StatusCode};
use common::{get_request, TestApp, TestAppOptions};

fn location(response: &axum::response::Response) -> &str {
    response
        .headers()
        .get(header::LOCATION)
        .unwrap()
        .to_str()
        .unwrap()
}

#[tokio::test]
async fn successful_verification_redirects_to_success() {
    let app = TestApp::spawn();

    let response = app
        .request(get_request(
            "/api/v1/payments/wallet/callback?oid=order-1&amt=25.00&refId=ref-99",
        ))
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "http://localhost:3000/wallet/success");
    assert_eq!(app.wallet.as_ref().unwrap().call_count(), 1);
}

#[tokio::test]
async fn missing_reference_redirects_to_cancel_without_verification() {
    let app = TestApp::spawn();

    let response = app
        .request(get_request(
            "/api/v1/payments/wallet/callback?oid=order-1&amt=25.00",
        ))
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "http://localhost:3000/wallet/cancel");
    // Fails closed before ever calling the gateway.
    assert_eq!(app.wallet.as_ref().unwrap().call_count(), 0);
}

#[tokio::test]
async fn undecodable_query_redirects_to_cancel_without_verification() {
    let app = TestApp::spawn();

    // `%FF` is valid percent-encoding but not UTF-8, so the query
    // extractor rejects it. The shopper must still land on cancel
    // rather than see a bare 400.
    let response = app
        .request(get_request(
            "/api/v1/payments/wallet/callback?oid=%FF&amt=25.00&refId=ref-99",
        ))
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "http://localhost:3000/wallet/cancel");
    assert_eq!(app.wallet.as_ref().unwrap().call_count(), 0);
}

#[tokio::test]
async fn failed_verification_redirects_to_cancel() {
    let app = TestApp::with_options(TestAppOptions {
        wallet_result: Some(false),
        ..TestAppOptions::default()
    });

    let response = app
        .request(get_request(
            "/api/v1/payments/wallet/callback?oid=order-1&amt=25.00&refId=ref-99",
        ))
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "http://localhost:3000/wallet/cancel");
    assert_eq!(app.wallet.as_ref().unwrap().call_count(), 1);
}

#[tokio::test]
async fn unconfigured_wallet_redirects_to_cancel() {
    let app = TestApp::with_options(TestAppOptions {
        wallet_result: None,
        ..TestAppOptions::default()
    });

    let response = app
        .request(get_request(
            "/api/v1/payments/wallet/callback?oid=order-1&amt=25.00&refId=ref-99",
        ))
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "http://localhost:3000/wallet/cancel");
}
