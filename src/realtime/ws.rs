use super::{ConnectionRegistry, WsIncoming, WsOutgoing, CHANNEL_CAPACITY};
use crate::{
    auth::Principal,
    handlers::approved_partners,
    utils::{ApiError, ApiResult},
    AppState,
};
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, Query, State,
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use std::collections::HashSet;
use tokio::sync::mpsc;

/// Browsers cannot set headers on an upgrade, so the token rides in the query
#[derive(Debug, Deserialize)]
pub struct WsAuthQuery {
    pub token: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Channel {
    Notifications,
    Chat,
}

/// `GET /notifications/ws/{user_id}`
pub async fn notifications_ws(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
    Query(query): Query<WsAuthQuery>,
) -> ApiResult<Response> {
    authorize_socket(&state, user_id, query.token.as_deref()).await?;
    let realtime = state.realtime.clone();
    Ok(ws.on_upgrade(move |socket| async move {
        handle_socket(socket, &realtime.notifications, user_id, Channel::Notifications, HashSet::new())
            .await
    }))
}

/// `GET /messages/ws/{user_id}`
pub async fn messages_ws(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
    Query(query): Query<WsAuthQuery>,
) -> ApiResult<Response> {
    authorize_socket(&state, user_id, query.token.as_deref()).await?;
    // Typing frames only go to users with an approved relationship, as of connect time
    let partners: HashSet<i64> = approved_partners(&state.db, user_id)
        .await?
        .into_iter()
        .map(|r| if r.caregiver_id == user_id { r.patient_id } else { r.caregiver_id })
        .collect();
    let realtime = state.realtime.clone();
    Ok(ws.on_upgrade(move |socket| async move {
        handle_socket(socket, &realtime.chat, user_id, Channel::Chat, partners).await
    }))
}

async fn authorize_socket(state: &AppState, user_id: i64, token: Option<&str>) -> ApiResult<()> {
    let token = token.ok_or_else(|| ApiError::authentication_error("Not authenticated"))?;
    match state.auth_service.resolve_principal(token).await? {
        Principal::User(user) if user.id == user_id => Ok(()),
        _ => Err(ApiError::authorization_error("Token does not match this socket")),
    }
}

/// Writer task drains the queue into the socket; the loop below reads frames
async fn handle_socket(
    socket: WebSocket,
    registry: &ConnectionRegistry,
    user_id: i64,
    channel: Channel,
    partners: HashSet<i64>,
) {
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::channel::<WsOutgoing>(CHANNEL_CAPACITY);
    let connection = registry.register(user_id, tx.clone()).await;

    let writer = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            let json = match serde_json::to_string(&frame) {
                Ok(json) => json,
                Err(_) => continue,
            };
            if sink.send(Message::Text(json)).await.is_err() {
                break;
            }
        }
        let _ = sink.close().await;
    });

    while let Some(frame) = stream.next().await {
        let text = match frame {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) | Err(_) => break,
            Ok(_) => continue,
        };

        match serde_json::from_str::<WsIncoming>(&text) {
            Ok(WsIncoming::Ping) => {
                let _ = tx.send(WsOutgoing::Pong).await;
            }
            Ok(WsIncoming::Typing { to_user_id, is_typing }) => {
                if relays_typing_to(channel, &partners, to_user_id) {
                    registry
                        .send(to_user_id, WsOutgoing::Typing { from_user_id: user_id, is_typing })
                        .await;
                } else {
                    tracing::debug!(user_id, to_user_id, "Dropping typing frame for unrelated user");
                }
            }
            Err(_) => tracing::debug!(user_id, ?channel, "Ignoring unrecognised frame"),
        }
    }

    registry.unregister(user_id, connection).await;
    drop(tx);
    let _ = writer.await;
}

fn relays_typing_to(channel: Channel, partners: &HashSet<i64>, to_user_id: i64) -> bool {
    channel == Channel::Chat && partners.contains(&to_user_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typing_reaches_only_approved_partners_on_chat() {
        let partners = HashSet::from([4, 9]);

        assert!(relays_typing_to(Channel::Chat, &partners, 4));
        assert!(!relays_typing_to(Channel::Chat, &partners, 5));
        assert!(!relays_typing_to(Channel::Notifications, &partners, 4));
        assert!(!relays_typing_to(Channel::Chat, &HashSet::new(), 4));
    }
}
