use crate::{
    auth::Principal,
    handlers::are_connected,
    models::{
        MessageResponse, NewNotification, Notification, NotificationCreate, NotificationGroups,
        UnreadCount,
    },
    realtime::WsOutgoing,
    utils::{ApiError, ApiResult},
    AppState,
};
use axum::{
    extract::{Path, State},
    Json,
};
use validator::Validate;

/// Persist a notification, then push it to the recipient if they are online
pub async fn deliver(state: &AppState, notification: NewNotification) -> ApiResult<Notification> {
    let stored: Notification = state.db.insert("notifications", &notification).await?;
    let pushed = state
        .realtime
        .notifications
        .send(
            stored.user_id,
            WsOutgoing::NewNotification {
                notification: stored.clone(),
            },
        )
        .await;
    tracing::debug!(user_id = stored.user_id, pushed, "Notification stored");
    Ok(stored)
}

/// Deliver to several recipients; one failure does not stop the rest
pub async fn deliver_all(state: &AppState, notifications: Vec<NewNotification>) -> usize {
    let mut delivered = 0;
    for notification in notifications {
        match deliver(state, notification).await {
            Ok(_) => delivered += 1,
            Err(e) => tracing::error!("Failed to deliver notification: {}", e),
        }
    }
    delivered
}

fn no_doctor_inbox() -> ApiError {
    ApiError::authorization_error("Notifications are available to users and admins")
}

/// `GET /notifications`
pub async fn list_notifications(
    State(state): State<AppState>,
    principal: Principal,
) -> ApiResult<Json<NotificationGroups>> {
    let user = match principal {
        Principal::User(user) => user,
        Principal::Admin(_) => return Ok(Json(NotificationGroups::default())),
        Principal::Doctor(_) => return Err(no_doctor_inbox()),
    };

    let notifications: Vec<Notification> = state
        .db
        .fetch_all(
            state
                .db
                .table("notifications")
                .select("*")
                .eq("user_id", user.id.to_string())
                .order("created_at.desc"),
        )
        .await?;

    Ok(Json(NotificationGroups::from_notifications(notifications)))
}

/// `POST /notifications/mark-read/{id}`
pub async fn mark_read(
    State(state): State<AppState>,
    principal: Principal,
    Path(notification_id): Path<i64>,
) -> ApiResult<Json<MessageResponse>> {
    let user = match principal {
        Principal::User(user) => user,
        Principal::Admin(_) => {
            return Err(ApiError::validation_error("Admin accounts have no notifications"))
        }
        Principal::Doctor(_) => return Err(no_doctor_inbox()),
    };

    let _: Notification = state
        .db
        .update_one(
            state
                .db
                .table("notifications")
                .eq("id", notification_id.to_string())
                .eq("user_id", user.id.to_string()),
            &serde_json::json!({ "is_read": true }),
            "Notification",
        )
        .await?;

    Ok(Json(MessageResponse::new("Notification marked as read")))
}

/// `GET /notifications/unread-count`
pub async fn unread_count(
    State(state): State<AppState>,
    principal: Principal,
) -> ApiResult<Json<UnreadCount>> {
    let user = match principal {
        Principal::User(user) => user,
        Principal::Admin(_) => return Ok(Json(UnreadCount { unread_count: 0 })),
        Principal::Doctor(_) => return Err(no_doctor_inbox()),
    };

    let unread_count = state
        .db
        .count(
            state
                .db
                .table("notifications")
                .select("id")
                .eq("user_id", user.id.to_string())
                .eq("is_read", "false"),
        )
        .await?;

    Ok(Json(UnreadCount { unread_count }))
}

/// `POST /notifications/create`
pub async fn create_notification(
    State(state): State<AppState>,
    principal: Principal,
    Json(request): Json<NotificationCreate>,
) -> ApiResult<Json<Notification>> {
    request.validate()?;

    let notification = match principal {
        Principal::Admin(admin) => {
            let target = request
                .user_id
                .ok_or_else(|| ApiError::validation_error("user_id is required"))?;
            NewNotification::new(target, request.notification_type, request.title, request.message)
                .from_sender(admin.id, "admin")
        }
        Principal::User(user) => {
            let target = request.user_id.unwrap_or(user.id);
            if target != user.id && !are_connected(&state.db, user.id, target).await? {
                return Err(ApiError::authorization_error(
                    "Notifications can only be sent to connected users",
                ));
            }
            NewNotification::new(target, request.notification_type, request.title, request.message)
                .from_sender(user.id, "user")
        }
        Principal::Doctor(_) => return Err(no_doctor_inbox()),
    };

    Ok(Json(deliver(&state, notification).await?))
}
