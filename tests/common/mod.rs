#![allow(dead_code)]

use axum::{body::Body, http::Request, Router};
use hewal_api::{create_app, AppState, Config};
use mockito::{Matcher, Mock, ServerGuard};
use serde_json::{json, Value};
use tower::ServiceExt;

pub const TEST_SECRET: &str = "integration-test-secret";

/// Application wired against a mock PostgREST server
pub struct TestApp {
    pub server: ServerGuard,
    pub state: AppState,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    pub async fn with_config(adjust: impl FnOnce(&mut Config)) -> Self {
        let server = mockito::Server::new_async().await;
        let upload_dir = std::env::temp_dir().join("hewal-api-tests");

        let mut config = Config::default();
        config.database.url = server.url();
        config.jwt.secret = TEST_SECRET.to_string();
        config.upload.local_dir = upload_dir.to_string_lossy().into_owned();
        adjust(&mut config);

        let state = AppState::new(config).expect("state builds from default config");
        Self { server, state }
    }

    pub fn router(&self) -> Router {
        create_app(self.state.clone())
    }

    /// Mock `GET /rest/v1/<table>` filtered by `column=eq.<value>`
    pub async fn mock_select(&mut self, table: &str, column: &str, value: &str, rows: Value) -> Mock {
        self.server
            .mock("GET", format!("/rest/v1/{}", table).as_str())
            .match_query(Matcher::UrlEncoded(column.into(), format!("eq.{}", value)))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(rows.to_string())
            .create_async()
            .await
    }

    /// Mock any write (`POST`/`PATCH`) to a table
    pub async fn mock_write(&mut self, method: &str, table: &str, rows: Value) -> Mock {
        self.server
            .mock(method, format!("/rest/v1/{}", table).as_str())
            .match_query(Matcher::Any)
            .with_status(if method == "POST" { 201 } else { 200 })
            .with_header("content-type", "application/json")
            .with_body(rows.to_string())
            .create_async()
            .await
    }

    /// Mock `GET /rest/v1/<table>` with an arbitrary query matcher
    pub async fn mock_rows(&mut self, table: &str, query: Matcher, rows: Value) -> Mock {
        self.server
            .mock("GET", format!("/rest/v1/{}", table).as_str())
            .match_query(query)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(rows.to_string())
            .create_async()
            .await
    }

    /// A write that must never happen; assert it to check
    pub async fn forbid_write(&mut self, method: &str, table: &str) -> Mock {
        self.server
            .mock(method, format!("/rest/v1/{}", table).as_str())
            .match_query(Matcher::Any)
            .with_status(500)
            .expect(0)
            .create_async()
            .await
    }

    pub fn user_token(&self, user_id: i64) -> String {
        self.state
            .auth_service
            .issue_access_token(&user_id.to_string(), hewal_api::auth::UserType::User)
            .expect("token")
            .0
    }

    pub fn doctor_token(&self, doctor_id: &str) -> String {
        self.state
            .auth_service
            .issue_access_token(doctor_id, hewal_api::auth::UserType::Doctor)
            .expect("token")
            .0
    }
}

pub fn user_row(id: i64, email: &str) -> Value {
    json!({
        "id": id,
        "email": email,
        "username": null,
        "patient_id": format!("patient{}", id),
        "caregiver_id": null,
        "is_active": true,
        "is_caregiver": false,
        "first_name": "Test",
        "last_name": "Patient",
        "caregiver_type": null,
        "experience_years": null,
        "phone_number": null,
        "max_patients": null,
        "last_login": null,
        "created_at": "2025-01-01T00:00:00Z"
    })
}

pub fn caregiver_row(id: i64, email: &str) -> Value {
    let mut row = user_row(id, email);
    row["is_caregiver"] = json!(true);
    row["caregiver_id"] = json!(format!("CG{:06}", id));
    row["first_name"] = json!("Sara");
    row["last_name"] = json!("Carer");
    row
}

pub fn relationship_row(id: i64, caregiver_id: i64, patient_id: i64, status: &str) -> Value {
    json!({
        "id": id,
        "caregiver_id": caregiver_id,
        "patient_id": patient_id,
        "relationship_type": "family",
        "status": status,
        "created_at": "2025-01-01T00:00:00Z"
    })
}

pub fn notification_row(id: i64, user_id: i64, notification_type: &str) -> Value {
    json!({
        "id": id,
        "user_id": user_id,
        "notification_type": notification_type,
        "title": "Heads up",
        "message": "Something happened",
        "is_read": false,
        "sender_id": null,
        "sender_type": null,
        "created_at": "2025-06-01T08:00:00Z"
    })
}

pub fn doctor_row(doctor_id: &str) -> Value {
    json!({
        "id": 3,
        "doctor_id": doctor_id,
        "full_name": "Dr. Amal Saleh",
        "specialization": "Cardiology",
        "hospital": null,
        "email": null,
        "is_active": true,
        "created_by": "root@hewal.test",
        "created_at": "2025-01-01T00:00:00Z"
    })
}

pub fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .expect("request")
}

pub fn authed_get(uri: &str, token: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header("authorization", format!("Bearer {}", token))
        .body(Body::empty())
        .expect("request")
}

pub fn authed_json(method: &str, uri: &str, token: &str, body: Value) -> Request<Body> {
    let mut request = json_request(method, uri, body);
    request.headers_mut().insert(
        "authorization",
        format!("Bearer {}", token).parse().expect("header value"),
    );
    request
}

pub fn authed_post(uri: &str, token: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("authorization", format!("Bearer {}", token))
        .body(Body::empty())
        .expect("request")
}

pub async fn read_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    serde_json::from_slice(&bytes).unwrap_or(Value::Null)
}

pub async fn send(app: Router, request: Request<Body>) -> axum::response::Response {
    app.oneshot(request).await.expect("infallible")
}
