use crate::AppState;
use axum::{extract::State, http::StatusCode, Json};
use serde_json::json;

/// `GET /`
pub async fn root(State(state): State<AppState>) -> Json<serde_json::Value> {
    let database = if state.db.ping().await { "connected" } else { "unreachable" };
    Json(json!({
        "service": "Hewal health API",
        "version": env!("CARGO_PKG_VERSION"),
        "environment": state.config.server.environment,
        "database": database,
        "timestamp": chrono::Utc::now(),
    }))
}

/// `GET /health`
///
/// 200 with `healthy` when the database answers, 503 with `degraded` otherwise.
pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<serde_json::Value>) {
    let database_ok = state.db.ping().await;
    let (status, label) = if database_ok {
        (StatusCode::OK, "healthy")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "degraded")
    };

    (
        status,
        Json(json!({
            "status": label,
            "database": if database_ok { "connected" } else { "unreachable" },
            "websocket_connections": {
                "notifications": state.realtime.notifications.online_count().await,
                "messages": state.realtime.chat.online_count().await,
            },
            "timestamp": chrono::Utc::now(),
            "version": env!("CARGO_PKG_VERSION"),
        })),
    )
}
