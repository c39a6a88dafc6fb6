//! Caregiver requests, dashboard aggregation, tasks and schedule
mod common;

use axum::http::StatusCode;
use chrono::{Duration, SecondsFormat, Utc};
use common::{
    authed_get, authed_json, authed_post, caregiver_row, notification_row, read_json,
    relationship_row, send, user_row, TestApp,
};
use mockito::Matcher;
use serde_json::{json, Value};

const CAREGIVER: i64 = 5;
const PATIENT: i64 = 7;

fn stamp(offset: Duration) -> String {
    (Utc::now() + offset).to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn task_row(id: i64, status: &str, due_date: Option<String>) -> Value {
    json!({
        "id": id,
        "caregiver_id": CAREGIVER,
        "patient_id": PATIENT,
        "assigned_by": CAREGIVER,
        "title": format!("Task {}", id),
        "description": null,
        "task_type": "medication",
        "priority": "medium",
        "status": status,
        "due_date": due_date,
        "completed_at": null,
        "created_at": "2025-01-01T00:00:00Z"
    })
}

fn appointment_row(id: i64, status: &str) -> Value {
    json!({
        "id": id,
        "caregiver_id": CAREGIVER,
        "patient_id": PATIENT,
        "title": "Cardiology follow-up",
        "appointment_type": "checkup",
        "status": status,
        "start_time": "2025-06-02T09:00:00Z",
        "end_time": "2025-06-02T09:30:00Z",
        "notes": null
    })
}

async fn caregiver_app() -> (TestApp, String) {
    let mut app = TestApp::new().await;
    app.mock_select("users", "id", &CAREGIVER.to_string(), json!([caregiver_row(CAREGIVER, "sara@example.com")]))
        .await;
    let token = app.user_token(CAREGIVER);
    (app, token)
}

async fn mock_patient_names(app: &mut TestApp) {
    app.mock_rows("users", Matcher::Regex("id=in".into()), json!([user_row(PATIENT, "mona@example.com")]))
        .await;
    app.mock_rows("user_profiles", Matcher::Any, json!([])).await;
}

#[tokio::test]
async fn caregiver_request_notifies_the_patient() {
    let (mut app, token) = caregiver_app().await;
    app.mock_select("users", "id", "7", json!([user_row(PATIENT, "mona@example.com")])).await;
    app.mock_select("caregiver_relationships", "caregiver_id", "5", json!([])).await;
    let created = app
        .mock_write("POST", "caregiver_relationships", json!([relationship_row(3, CAREGIVER, PATIENT, "pending")]))
        .await;
    let notified = app
        .mock_write("POST", "notifications", json!([notification_row(1, PATIENT, "caregiver")]))
        .await;

    let response = send(
        app.router(),
        authed_json("POST", "/caregivers/request", &token, json!({ "patient_id": PATIENT })),
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    assert_eq!(body["status"], "pending");
    assert_eq!(body["patient_id"], PATIENT);
    created.assert_async().await;
    notified.assert_async().await;
}

#[tokio::test]
async fn duplicate_caregiver_request_is_rejected() {
    let (mut app, token) = caregiver_app().await;
    app.mock_select("users", "id", "7", json!([user_row(PATIENT, "mona@example.com")])).await;
    app.mock_select("caregiver_relationships", "caregiver_id", "5", json!([{ "id": 3 }])).await;
    let created = app.forbid_write("POST", "caregiver_relationships").await;

    let response = send(
        app.router(),
        authed_json("POST", "/caregivers/request", &token, json!({ "patient_id": PATIENT })),
    )
    .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(read_json(response).await["message"], "A request for this patient already exists");
    created.assert_async().await;
}

#[tokio::test]
async fn patient_approves_pending_request() {
    let mut app = TestApp::new().await;
    app.mock_select("users", "id", "7", json!([user_row(PATIENT, "mona@example.com")])).await;
    app.mock_select("caregiver_relationships", "id", "3", json!([relationship_row(3, CAREGIVER, PATIENT, "pending")]))
        .await;
    let patched = app
        .mock_write("PATCH", "caregiver_relationships", json!([relationship_row(3, CAREGIVER, PATIENT, "approved")]))
        .await;
    let notified = app
        .mock_write("POST", "notifications", json!([notification_row(2, CAREGIVER, "caregiver")]))
        .await;
    let token = app.user_token(PATIENT);

    let response = send(app.router(), authed_post("/caregivers/requests/3/approve", &token)).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(read_json(response).await["status"], "approved");
    patched.assert_async().await;
    notified.assert_async().await;
}

#[tokio::test]
async fn answered_request_cannot_be_rejected_again() {
    let mut app = TestApp::new().await;
    app.mock_select("users", "id", "7", json!([user_row(PATIENT, "mona@example.com")])).await;
    app.mock_select("caregiver_relationships", "id", "3", json!([relationship_row(3, CAREGIVER, PATIENT, "approved")]))
        .await;
    let patched = app.forbid_write("PATCH", "caregiver_relationships").await;
    let token = app.user_token(PATIENT);

    let response = send(app.router(), authed_post("/caregivers/requests/3/reject", &token)).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(read_json(response).await["message"], "Request already approved");
    patched.assert_async().await;
}

#[tokio::test]
async fn dashboard_aggregates_patients_tasks_and_alerts() {
    let (mut app, token) = caregiver_app().await;
    app.mock_select(
        "caregiver_relationships",
        "caregiver_id",
        "5",
        json!([relationship_row(1, CAREGIVER, PATIENT, "approved")]),
    )
    .await;
    mock_patient_names(&mut app).await;
    app.mock_rows(
        "health_data",
        Matcher::Any,
        json!([{
            "id": 1,
            "user_id": PATIENT,
            "date": stamp(-Duration::hours(1)),
            "steps": 6000,
            "water_intake": 1500,
            "heart_rate": 130,
            "blood_pressure": "135/85"
        }]),
    )
    .await;
    app.mock_select(
        "caregiver_tasks",
        "caregiver_id",
        "5",
        json!([
            task_row(10, "in_progress", None),
            task_row(11, "pending", Some("2020-01-01T09:00:00Z".into())),
            task_row(12, "completed", Some(stamp(-Duration::days(1)))),
        ]),
    )
    .await;
    let appointments = app
        .mock_rows(
            "caregiver_appointments",
            Matcher::AllOf(vec![
                Matcher::UrlEncoded("caregiver_id".into(), "eq.5".into()),
                Matcher::UrlEncoded("status".into(), "in.(scheduled,confirmed)".into()),
            ]),
            json!([]),
        )
        .await;
    let alerts = app
        .mock_rows(
            "notifications",
            Matcher::AllOf(vec![
                Matcher::UrlEncoded("user_id".into(), "in.(7)".into()),
                Matcher::UrlEncoded("notification_type".into(), "in.(critical,warning)".into()),
            ]),
            json!([notification_row(4, PATIENT, "critical")]),
        )
        .await;

    let response = send(app.router(), authed_get("/caregivers/dashboard", &token)).await;

    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    assert_eq!(body["stats"]["total_patients"], 1);
    assert_eq!(body["stats"]["critical_patients"], 1);
    assert_eq!(body["stats"]["pending_tasks"], 2);
    assert_eq!(body["stats"]["overdue_tasks"], 1);
    assert_eq!(body["recent_patients"][0]["name"], "Test Patient");

    // Overdue work first, undated work last, completed work never
    let upcoming = body["upcoming_tasks"].as_array().cloned().unwrap_or_default();
    let ids: Vec<i64> = upcoming.iter().filter_map(|t| t["id"].as_i64()).collect();
    assert_eq!(ids, vec![11, 10]);
    assert_eq!(upcoming[0]["is_overdue"], true);
    assert_eq!(upcoming[1]["is_overdue"], false);

    assert_eq!(body["recent_alerts"][0]["patient_id"], PATIENT);
    assert_eq!(body["recent_alerts"][0]["patient_name"], "Test Patient");
    appointments.assert_async().await;
    alerts.assert_async().await;
}

#[tokio::test]
async fn overdue_tasks_exclude_closed_work() {
    let (mut app, token) = caregiver_app().await;
    mock_patient_names(&mut app).await;
    let tasks = app
        .mock_rows(
            "caregiver_tasks",
            Matcher::AllOf(vec![
                Matcher::UrlEncoded("caregiver_id".into(), "eq.5".into()),
                Matcher::UrlEncoded("status".into(), "not.in.(completed,cancelled)".into()),
                Matcher::Regex("due_date=lt".into()),
            ]),
            json!([task_row(11, "pending", Some("2020-01-01T09:00:00Z".into()))]),
        )
        .await;

    let response = send(app.router(), authed_get("/caregiver/tasks/overdue", &token)).await;

    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    assert_eq!(body[0]["id"], 11);
    assert_eq!(body[0]["is_overdue"], true);
    assert_eq!(body[0]["patient_name"], "Test Patient");
    tasks.assert_async().await;
}

#[tokio::test]
async fn today_tasks_are_bounded_to_the_current_day() {
    let (mut app, token) = caregiver_app().await;
    mock_patient_names(&mut app).await;
    let tasks = app
        .mock_rows(
            "caregiver_tasks",
            Matcher::AllOf(vec![
                Matcher::UrlEncoded("caregiver_id".into(), "eq.5".into()),
                Matcher::Regex("due_date=gte".into()),
                Matcher::Regex("due_date=lt".into()),
            ]),
            json!([task_row(20, "pending", Some(stamp(Duration::zero())))]),
        )
        .await;

    let response = send(app.router(), authed_get("/caregiver/tasks/today", &token)).await;

    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    assert_eq!(body.as_array().map(Vec::len), Some(1));
    assert_eq!(body[0]["patient_name"], "Test Patient");
    tasks.assert_async().await;
}

#[tokio::test]
async fn completed_appointment_cannot_be_cancelled() {
    let (mut app, token) = caregiver_app().await;
    app.mock_select("caregiver_appointments", "id", "4", json!([appointment_row(4, "completed")])).await;
    let patched = app.forbid_write("PATCH", "caregiver_appointments").await;

    let response = send(app.router(), authed_post("/caregiver/schedule/4/cancel", &token)).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(read_json(response).await["message"], "Completed appointments cannot be cancelled");
    patched.assert_async().await;
}

#[tokio::test]
async fn cancelled_appointment_cannot_be_completed() {
    let (mut app, token) = caregiver_app().await;
    app.mock_select("caregiver_appointments", "id", "4", json!([appointment_row(4, "cancelled")])).await;
    let patched = app.forbid_write("PATCH", "caregiver_appointments").await;

    let response = send(app.router(), authed_post("/caregiver/schedule/4/complete", &token)).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    patched.assert_async().await;
}
