//! Router-level behavior: health checks, route guards and request limits
mod common;

use axum::{body::Body, http::{Request, StatusCode}};
use common::{authed_get, doctor_row, json_request, read_json, send, user_row, TestApp};
use mockito::Matcher;
use serde_json::json;

async fn mock_ping(app: &mut TestApp, status: usize) {
    app.server
        .mock("GET", "/rest/v1/users")
        .match_query(Matcher::UrlEncoded("select".into(), "id".into()))
        .with_status(status)
        .with_header("content-type", "application/json")
        .with_body("[]")
        .create_async()
        .await;
}

#[tokio::test]
async fn health_reports_healthy_when_database_answers() {
    let mut app = TestApp::new().await;
    mock_ping(&mut app, 200).await;

    let response = send(app.router(), Request::get("/health").body(Body::empty()).unwrap()).await;

    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["websocket_connections"]["notifications"], 0);
}

#[tokio::test]
async fn health_reports_degraded_when_database_fails() {
    let mut app = TestApp::new().await;
    mock_ping(&mut app, 500).await;

    let response = send(app.router(), Request::get("/health").body(Body::empty()).unwrap()).await;

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(read_json(response).await["status"], "degraded");
}

#[tokio::test]
async fn root_banner_carries_version() {
    let mut app = TestApp::new().await;
    mock_ping(&mut app, 200).await;

    let response = send(app.router(), Request::get("/").body(Body::empty()).unwrap()).await;

    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    assert_eq!(body["database"], "connected");
}

#[tokio::test]
async fn protected_route_without_token_is_unauthorized() {
    let app = TestApp::new().await;

    let response = send(
        app.router(),
        Request::get("/caregiver/tasks").body(Body::empty()).unwrap(),
    )
    .await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn caregiver_routes_require_caregiver_flag() {
    let mut app = TestApp::new().await;
    app.mock_select("users", "id", "7", json!([user_row(7, "mona@example.com")])).await;
    let token = app.user_token(7);

    let response = send(app.router(), authed_get("/caregivers/dashboard", &token)).await;

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn doctors_have_no_notification_inbox() {
    let mut app = TestApp::new().await;
    app.mock_select("doctors", "doctor_id", "DOC12345", json!([doctor_row("DOC12345")])).await;
    let token = app.doctor_token("DOC12345");

    let response = send(app.router(), authed_get("/notifications", &token)).await;

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn messaging_yourself_is_rejected() {
    let mut app = TestApp::new().await;
    app.mock_select("users", "id", "7", json!([user_row(7, "mona@example.com")])).await;
    let token = app.user_token(7);

    let mut request = json_request("POST", "/messages/send", json!({ "receiver_id": 7, "content": "hi" }));
    request
        .headers_mut()
        .insert("authorization", format!("Bearer {}", token).parse().unwrap());
    let response = send(app.router(), request).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn webhook_rejects_wrong_secret() {
    let app = TestApp::with_config(|config| {
        config.services.iot_webhook_secret = Some("s3cret".to_string());
    })
    .await;

    let mut request = json_request(
        "POST",
        "/iot/webhook",
        json!({
            "device_id": "wrist-1",
            "heart_rate": 80,
            "timestamp": "2025-06-02T10:00:00Z",
            "data_type": "heart_rate"
        }),
    );
    request
        .headers_mut()
        .insert("x-webhook-secret", "guess".parse().unwrap());
    let response = send(app.router(), request).await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn webhook_for_unknown_device_is_not_found() {
    let mut app = TestApp::new().await;
    app.mock_select("iot_devices", "device_id", "ghost", json!([])).await;

    let response = send(
        app.router(),
        json_request(
            "POST",
            "/iot/webhook",
            json!({
                "device_id": "ghost",
                "heart_rate": 80,
                "timestamp": "2025-06-02T10:00:00Z",
                "data_type": "heart_rate"
            }),
        ),
    )
    .await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn iot_status_reports_unconfigured_hub() {
    let app = TestApp::new().await;

    let response = send(app.router(), Request::get("/iot/status").body(Body::empty()).unwrap()).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(read_json(response).await["iot_hub_configured"], false);
}

#[tokio::test]
async fn oversized_request_is_rejected() {
    let app = TestApp::with_config(|config| config.upload.max_file_size = 16).await;

    let response = send(
        app.router(),
        Request::post("/auth/login")
            .header("content-type", "application/json")
            .header("content-length", "64")
            .body(Body::from("x".repeat(64)))
            .unwrap(),
    )
    .await;

    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
}
