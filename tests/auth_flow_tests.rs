//! Signup, login and bearer-token resolution against a mocked PostgREST
mod common;

use axum::http::StatusCode;
use common::{authed_get, doctor_row, json_request, read_json, send, user_row, TestApp, TEST_SECRET};
use hewal_api::auth::Claims;
use jsonwebtoken::{encode, EncodingKey, Header};
use mockito::Matcher;
use serde_json::{json, Value};

#[tokio::test]
async fn signup_rejects_registered_email() {
    let mut app = TestApp::new().await;
    let lookup = app
        .mock_select("users", "email", "dup@example.com", json!([user_row(1, "dup@example.com")]))
        .await;

    let response = send(
        app.router(),
        json_request(
            "POST",
            "/auth/signup",
            json!({ "email": "Dup@Example.com", "password": "Str0ng!pass" }),
        ),
    )
    .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = read_json(response).await;
    assert_eq!(body["message"], "Email already registered");
    lookup.assert_async().await;
}

#[tokio::test]
async fn signup_rejects_weak_password_before_touching_the_database() {
    let app = TestApp::new().await;

    let response = send(
        app.router(),
        json_request(
            "POST",
            "/auth/signup",
            json!({ "email": "new@example.com", "password": "password" }),
        ),
    )
    .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn login_issues_access_and_refresh_tokens() {
    let mut app = TestApp::new().await;
    let hash = app.state.auth_service.hash_password("Str0ng!pass").unwrap();
    let mut row = user_row(7, "mona@example.com");
    row["hashed_password"] = json!(hash);

    app.mock_select("users", "email", "mona@example.com", json!([row])).await;
    app.mock_write("PATCH", "users", json!([])).await;
    app.mock_write(
        "POST",
        "refresh_tokens",
        json!([{
            "id": 1,
            "token_hash": "x",
            "subject": "7",
            "user_type": "user",
            "expires_at": "2099-01-01T00:00:00Z",
            "revoked": false
        }]),
    )
    .await;

    let response = send(
        app.router(),
        json_request(
            "POST",
            "/auth/login",
            json!({ "email": "mona@example.com", "password": "Str0ng!pass" }),
        ),
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    assert_eq!(body["token_type"], "bearer");
    assert_eq!(body["user_type"], "user");
    assert!(body["refresh_token"].as_str().is_some_and(|t| !t.is_empty()));

    let claims = app
        .state
        .auth_service
        .decode_token(body["access_token"].as_str().unwrap())
        .unwrap();
    assert_eq!(claims.sub, "7");
}

#[tokio::test]
async fn login_with_wrong_password_is_unauthorized() {
    let mut app = TestApp::new().await;
    let hash = app.state.auth_service.hash_password("Str0ng!pass").unwrap();
    let mut row = user_row(7, "mona@example.com");
    row["hashed_password"] = json!(hash);
    app.mock_select("users", "email", "mona@example.com", json!([row])).await;

    let response = send(
        app.router(),
        json_request(
            "POST",
            "/auth/login",
            json!({ "email": "mona@example.com", "password": "Wr0ng!pass" }),
        ),
    )
    .await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn user_token_resolves_to_the_account() {
    let mut app = TestApp::new().await;
    app.mock_select("users", "id", "7", json!([user_row(7, "mona@example.com")])).await;
    let token = app.user_token(7);

    let response = send(app.router(), authed_get("/auth/me", &token)).await;

    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    assert_eq!(body["user_type"], "user");
    assert_eq!(body["account"]["email"], "mona@example.com");
    assert!(body["account"].get("hashed_password").is_none());
}

#[tokio::test]
async fn doctor_token_reaches_doctor_routes() {
    let mut app = TestApp::new().await;
    app.mock_select("doctors", "doctor_id", "DOC12345", json!([doctor_row("DOC12345")])).await;
    let token = app.doctor_token("DOC12345");

    let response = send(app.router(), authed_get("/doctors/me", &token)).await;

    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    assert_eq!(body["doctor_id"], "DOC12345");
}

#[tokio::test]
async fn doctor_token_is_refused_on_patient_routes() {
    let mut app = TestApp::new().await;
    app.mock_select("doctors", "doctor_id", "DOC12345", json!([doctor_row("DOC12345")])).await;
    let token = app.doctor_token("DOC12345");

    let response = send(app.router(), authed_get("/users/me", &token)).await;

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn inactive_account_is_forbidden() {
    let mut app = TestApp::new().await;
    let mut row = user_row(9, "gone@example.com");
    row["is_active"] = json!(false);
    app.mock_select("users", "id", "9", json!([row])).await;
    let token = app.user_token(9);

    let response = send(app.router(), authed_get("/users/me", &token)).await;

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn unknown_user_type_is_unauthorized() {
    let app = TestApp::new().await;
    let now = chrono::Utc::now().timestamp() as usize;
    let claims = Claims {
        sub: "7".to_string(),
        user_type: "robot".to_string(),
        exp: now + 600,
        iat: now,
        iss: "hewal-api".to_string(),
    };
    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(TEST_SECRET.as_bytes()),
    )
    .unwrap();

    let response = send(app.router(), authed_get("/users/me", &token)).await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn token_signed_with_another_key_is_unauthorized() {
    let app = TestApp::new().await;
    let now = chrono::Utc::now().timestamp() as usize;
    let claims = Claims {
        sub: "7".to_string(),
        user_type: "user".to_string(),
        exp: now + 600,
        iat: now,
        iss: "hewal-api".to_string(),
    };
    let token = encode(&Header::default(), &claims, &EncodingKey::from_secret(b"other")).unwrap();

    let response = send(app.router(), authed_get("/users/me", &token)).await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

fn refresh_row(revoked: bool, expires_at: &str) -> Value {
    json!({
        "id": 11,
        "token_hash": "stored",
        "subject": "7",
        "user_type": "user",
        "expires_at": expires_at,
        "revoked": revoked
    })
}

async fn mock_stored_refresh(app: &mut TestApp, row: Value) {
    app.server
        .mock("GET", "/rest/v1/refresh_tokens")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(json!([row]).to_string())
        .create_async()
        .await;
}

/// PATCH that only matches the conditional revoke of token 11
async fn mock_conditional_revoke(app: &mut TestApp, rows: Value) -> mockito::Mock {
    app.server
        .mock("PATCH", "/rest/v1/refresh_tokens")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("id".into(), "eq.11".into()),
            Matcher::UrlEncoded("revoked".into(), "eq.false".into()),
        ]))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(rows.to_string())
        .create_async()
        .await
}

fn refresh_request(token: &str) -> axum::http::Request<axum::body::Body> {
    json_request("POST", "/auth/refresh", json!({ "refresh_token": token }))
}

#[tokio::test]
async fn refresh_rotates_the_token_pair() {
    let mut app = TestApp::new().await;
    mock_stored_refresh(&mut app, refresh_row(false, "2099-01-01T00:00:00Z")).await;
    app.mock_select("users", "id", "7", json!([user_row(7, "mona@example.com")])).await;
    let revoke = mock_conditional_revoke(&mut app, json!([refresh_row(true, "2099-01-01T00:00:00Z")])).await;
    let issued = app
        .mock_write("POST", "refresh_tokens", json!([refresh_row(false, "2099-02-01T00:00:00Z")]))
        .await;

    let response = send(app.router(), refresh_request("old-refresh-token")).await;

    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    let rotated = body["refresh_token"].as_str().unwrap_or_default();
    assert!(!rotated.is_empty());
    assert_ne!(rotated, "old-refresh-token");
    revoke.assert_async().await;
    issued.assert_async().await;
}

#[tokio::test]
async fn refresh_with_revoked_token_is_unauthorized() {
    let mut app = TestApp::new().await;
    mock_stored_refresh(&mut app, refresh_row(true, "2099-01-01T00:00:00Z")).await;
    let issued = app.forbid_write("POST", "refresh_tokens").await;

    let response = send(app.router(), refresh_request("old-refresh-token")).await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(read_json(response).await["message"], "Refresh token expired or revoked");
    issued.assert_async().await;
}

#[tokio::test]
async fn refresh_with_expired_token_is_unauthorized() {
    let mut app = TestApp::new().await;
    mock_stored_refresh(&mut app, refresh_row(false, "2020-01-01T00:00:00Z")).await;

    let response = send(app.router(), refresh_request("old-refresh-token")).await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn refresh_with_unknown_token_is_unauthorized() {
    let mut app = TestApp::new().await;
    app.server
        .mock("GET", "/rest/v1/refresh_tokens")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body("[]")
        .create_async()
        .await;

    let response = send(app.router(), refresh_request("never-issued")).await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(read_json(response).await["message"], "Invalid refresh token");
}

#[tokio::test]
async fn refresh_token_already_rotated_by_a_concurrent_request_mints_nothing() {
    let mut app = TestApp::new().await;
    // The read still sees the token live, but the conditional revoke matches no row
    mock_stored_refresh(&mut app, refresh_row(false, "2099-01-01T00:00:00Z")).await;
    app.mock_select("users", "id", "7", json!([user_row(7, "mona@example.com")])).await;
    let revoke = mock_conditional_revoke(&mut app, json!([])).await;
    let issued = app.forbid_write("POST", "refresh_tokens").await;

    let response = send(app.router(), refresh_request("old-refresh-token")).await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    revoke.assert_async().await;
    issued.assert_async().await;
}
