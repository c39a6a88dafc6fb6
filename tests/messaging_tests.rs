//! Relationship-gated messaging and paged history reads
mod common;

use axum::http::StatusCode;
use common::{authed_get, authed_json, read_json, send, user_row, TestApp};
use mockito::Matcher;
use serde_json::json;

fn approved_filter() -> Matcher {
    Matcher::UrlEncoded("status".into(), "eq.approved".into())
}

#[tokio::test]
async fn messaging_without_an_approved_relationship_is_forbidden() {
    let mut app = TestApp::new().await;
    app.mock_select("users", "id", "7", json!([user_row(7, "mona@example.com")])).await;
    app.mock_select("users", "id", "8", json!([user_row(8, "omar@example.com")])).await;
    app.mock_rows("caregiver_relationships", approved_filter(), json!([])).await;
    let stored = app.forbid_write("POST", "messages").await;
    let token = app.user_token(7);

    let response = send(
        app.router(),
        authed_json("POST", "/messages/send", &token, json!({ "receiver_id": 8, "content": "hello" })),
    )
    .await;

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    stored.assert_async().await;
}

#[tokio::test]
async fn conversation_with_unrelated_user_is_forbidden() {
    let mut app = TestApp::new().await;
    app.mock_select("users", "id", "7", json!([user_row(7, "mona@example.com")])).await;
    app.mock_select("users", "id", "8", json!([user_row(8, "omar@example.com")])).await;
    app.mock_rows("caregiver_relationships", approved_filter(), json!([])).await;
    let token = app.user_token(7);

    let response = send(app.router(), authed_get("/messages/conversation/8", &token)).await;

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn conversation_offset_at_the_top_of_the_range_saturates() {
    let mut app = TestApp::new().await;
    app.mock_select("users", "id", "7", json!([user_row(7, "mona@example.com")])).await;
    app.mock_select("users", "id", "2", json!([user_row(2, "sami@example.com")])).await;
    app.mock_rows("caregiver_relationships", approved_filter(), json!([{ "id": 1 }])).await;
    let page = app
        .server
        .mock("GET", "/rest/v1/messages")
        .match_query(Matcher::Any)
        .match_header("range", format!("{}-{}", usize::MAX, usize::MAX).as_str())
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body("[]")
        .create_async()
        .await;
    let token = app.user_token(7);

    let response = send(
        app.router(),
        authed_get(&format!("/messages/conversation/2?offset={}", usize::MAX), &token),
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(read_json(response).await, json!([]));
    page.assert_async().await;
}

#[tokio::test]
async fn conversation_pages_are_clamped() {
    let mut app = TestApp::new().await;
    app.mock_select("users", "id", "7", json!([user_row(7, "mona@example.com")])).await;
    app.mock_select("users", "id", "2", json!([user_row(2, "sami@example.com")])).await;
    app.mock_rows("caregiver_relationships", approved_filter(), json!([{ "id": 1 }])).await;
    let page = app
        .server
        .mock("GET", "/rest/v1/messages")
        .match_query(Matcher::Any)
        .match_header("range", "10-209")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body("[]")
        .create_async()
        .await;
    let token = app.user_token(7);

    let response = send(
        app.router(),
        authed_get("/messages/conversation/2?offset=10&limit=100000", &token),
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    page.assert_async().await;
}

#[tokio::test]
async fn food_log_skip_at_the_top_of_the_range_saturates() {
    let mut app = TestApp::new().await;
    app.mock_select("users", "id", "7", json!([user_row(7, "mona@example.com")])).await;
    let page = app
        .server
        .mock("GET", "/rest/v1/food_logs")
        .match_query(Matcher::UrlEncoded("user_id".into(), "eq.7".into()))
        .match_header("range", format!("{}-{}", usize::MAX, usize::MAX).as_str())
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body("[]")
        .create_async()
        .await;
    let token = app.user_token(7);

    let response = send(
        app.router(),
        authed_get(&format!("/health/food-logs?skip={}", usize::MAX), &token),
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    page.assert_async().await;
}
