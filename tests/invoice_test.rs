mod common;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use common::{body_bytes, get_request, TestApp, TEST_ADMIN_TOKEN};
use uuid::Uuid;

#[tokio::test]
async fn invoice_renders_as_pdf_with_download_headers() {
    let app = TestApp::spawn();
    let order_id = app.create_order("buyer@example.com").await;

    let response = app
        .request(get_request(&format!("/api/v1/orders/{order_id}/invoice.pdf")))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        "application/pdf"
    );
    let disposition = response
        .headers()
        .get(header::CONTENT_DISPOSITION)
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(disposition.contains(&format!("invoice-{order_id}.pdf")));

    let bytes = body_bytes(response).await;
    assert!(bytes.starts_with(b"%PDF"));
}

#[tokio::test]
async fn invoice_for_unknown_order_is_not_found_with_no_pdf_bytes() {
    let app = TestApp::spawn();

    let response = app
        .request(get_request(&format!(
            "/api/v1/orders/{}/invoice.pdf",
            Uuid::new_v4()
        )))
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let bytes = body_bytes(response).await;
    assert!(!bytes.starts_with(b"%PDF"));
}

#[tokio::test]
async fn invoice_accepts_admin_token_without_requiring_it() {
    let app = TestApp::spawn();
    let order_id = app.create_order("buyer@example.com").await;

    let response = app
        .request(
            Request::builder()
                .method("GET")
                .uri(format!("/api/v1/orders/{order_id}/invoice.pdf"))
                .header("x-admin-token", TEST_ADMIN_TOKEN)
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
}
