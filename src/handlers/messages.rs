use crate::{
    auth::CurrentUser,
    db::Database,
    handlers::{approved_partners, are_connected, find_user, page_bounds, users_by_id},
    models::{
        Conversation, ConversationQuery, MarkReadRequest, Message, MessageCreate, MessageView,
        NewMessage, UnreadCount, User,
    },
    realtime::{PushedMessage, WsOutgoing},
    utils::{ApiError, ApiResult},
    AppState,
};
use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde_json::json;
use std::collections::HashMap;
use validator::Validate;

const MAX_PAGE: usize = 200;

fn not_connected() -> ApiError {
    ApiError::authorization_error(
        "You can only message users you have an approved caregiver relationship with",
    )
}

/// PostgREST filter for messages between two users in either direction
fn between(a: i64, b: i64) -> String {
    format!("and(sender_id.eq.{a},receiver_id.eq.{b}),and(sender_id.eq.{b},receiver_id.eq.{a})")
}

fn view(message: Message, users: &HashMap<i64, User>) -> MessageView {
    let sender = users.get(&message.sender_id);
    let receiver = users.get(&message.receiver_id);
    MessageView {
        sender_name: sender.map(User::display_name),
        sender_email: sender.and_then(|u| u.email.clone()),
        receiver_name: receiver.map(User::display_name),
        receiver_email: receiver.and_then(|u| u.email.clone()),
        message,
    }
}

/// `POST /messages/send`
pub async fn send_message(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(request): Json<MessageCreate>,
) -> ApiResult<Json<MessageView>> {
    request.validate()?;
    if request.content.trim().is_empty() {
        return Err(ApiError::validation_error("Message content cannot be empty"));
    }
    if request.receiver_id == user.id {
        return Err(ApiError::validation_error("You cannot message yourself"));
    }

    let receiver = find_user(&state.db, request.receiver_id).await?;
    if !are_connected(&state.db, user.id, receiver.id).await? {
        return Err(not_connected());
    }

    let message: Message = state
        .db
        .insert(
            "messages",
            &NewMessage {
                sender_id: user.id,
                receiver_id: receiver.id,
                content: request.content,
                is_read: false,
            },
        )
        .await?;

    let pushed = state
        .realtime
        .chat
        .send(
            receiver.id,
            WsOutgoing::NewMessage {
                message: PushedMessage::new(&message, user.display_name(), user.email.clone()),
            },
        )
        .await;
    tracing::debug!(message_id = message.id, pushed, "Message stored");

    let users = HashMap::from([(user.id, user), (receiver.id, receiver)]);
    Ok(Json(view(message, &users)))
}

async fn last_message(db: &Database, a: i64, b: i64) -> ApiResult<Option<Message>> {
    db.fetch_optional(
        db.table("messages")
            .select("*")
            .or(between(a, b))
            .order("created_at.desc"),
    )
    .await
}

/// `GET /messages/conversations`
pub async fn conversations(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> ApiResult<Json<Vec<Conversation>>> {
    let db = &state.db;

    // Partner id paired with the role the partner plays
    let mut partners: Vec<(i64, &'static str)> = Vec::new();
    for relationship in approved_partners(db, user.id).await? {
        let partner = if relationship.caregiver_id == user.id {
            (relationship.patient_id, "patient")
        } else {
            (relationship.caregiver_id, "caregiver")
        };
        if !partners.iter().any(|(id, _)| *id == partner.0) {
            partners.push(partner);
        }
    }

    let ids: Vec<i64> = partners.iter().map(|(id, _)| *id).collect();
    let users = users_by_id(db, &ids).await?;

    let mut conversations = Vec::with_capacity(partners.len());
    for (partner_id, user_type) in partners {
        let Some(partner) = users.get(&partner_id) else {
            continue;
        };
        let last = last_message(db, user.id, partner_id).await?;
        let unread_count = db
            .count(
                db.table("messages")
                    .select("id")
                    .eq("sender_id", partner_id.to_string())
                    .eq("receiver_id", user.id.to_string())
                    .eq("is_read", "false"),
            )
            .await?;

        conversations.push(Conversation {
            user_id: partner_id,
            user_name: partner.display_name(),
            user_email: partner.email.clone(),
            user_type,
            patient_id: partner.patient_id.clone(),
            caregiver_id: partner.caregiver_id.clone(),
            last_message_time: last.as_ref().and_then(|m| m.created_at),
            last_message: last.map(|m| m.content),
            unread_count,
            is_online: state.realtime.chat.is_online(partner_id).await,
        });
    }

    conversations.sort_by(|a, b| b.last_message_time.cmp(&a.last_message_time));
    Ok(Json(conversations))
}

/// `GET /messages/conversation/{user_id}?limit&offset`
pub async fn conversation(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(other_id): Path<i64>,
    Query(query): Query<ConversationQuery>,
) -> ApiResult<Json<Vec<MessageView>>> {
    let db = &state.db;
    let other = find_user(db, other_id).await?;
    if !are_connected(db, user.id, other.id).await? {
        return Err(ApiError::authorization_error(
            "You can only view conversations with users you have an approved relationship with",
        ));
    }

    let (from, to) = page_bounds(query.offset, query.limit, MAX_PAGE);
    let mut messages: Vec<Message> = db
        .fetch_all(
            db.table("messages")
                .select("*")
                .or(between(user.id, other.id))
                .order("created_at.desc")
                .range(from, to),
        )
        .await?;
    messages.reverse();

    let users = HashMap::from([(user.id, user), (other.id, other)]);
    Ok(Json(messages.into_iter().map(|m| view(m, &users)).collect()))
}

/// `POST /messages/mark-read`
pub async fn mark_read(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(request): Json<MarkReadRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    if request.message_ids.is_empty() {
        return Ok(Json(json!({ "message": "Marked 0 messages as read" })));
    }

    let updated: Vec<Message> = state
        .db
        .update(
            state
                .db
                .table("messages")
                .in_("id", request.message_ids.iter().map(i64::to_string))
                .eq("receiver_id", user.id.to_string()),
            &json!({ "is_read": true }),
        )
        .await?;

    Ok(Json(json!({
        "message": format!("Marked {} messages as read", updated.len()),
    })))
}

/// `GET /messages/unread-count`
pub async fn unread_count(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> ApiResult<Json<UnreadCount>> {
    let unread_count = state
        .db
        .count(
            state
                .db
                .table("messages")
                .select("id")
                .eq("receiver_id", user.id.to_string())
                .eq("is_read", "false"),
        )
        .await?;
    Ok(Json(UnreadCount { unread_count }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pair_filter_covers_both_directions() {
        assert_eq!(
            between(3, 9),
            "and(sender_id.eq.3,receiver_id.eq.9),and(sender_id.eq.9,receiver_id.eq.3)"
        );
    }
}
