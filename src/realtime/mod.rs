//! Process-local WebSocket fan-out.
//!
//! One [`ConnectionRegistry`] per channel maps a user id to the sender half
//! of that user's socket writer task. Delivery is best effort: rows are
//! persisted before a push is attempted, so an offline user simply reads
//! them on the next REST call.

pub mod ws;

use crate::models::{Message, Notification};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    sync::atomic::{AtomicU64, Ordering},
};
use tokio::sync::{mpsc, RwLock};

/// Per-connection outgoing queue depth
pub const CHANNEL_CAPACITY: usize = 64;

/// Frames the server pushes to clients
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WsOutgoing {
    Pong,
    NewNotification { notification: Notification },
    NewMessage { message: PushedMessage },
    Typing { from_user_id: i64, is_typing: bool },
}

/// Frames clients may send; anything else is ignored
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WsIncoming {
    Ping,
    Typing {
        to_user_id: i64,
        #[serde(default)]
        is_typing: bool,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct PushedMessage {
    pub id: i64,
    pub sender_id: i64,
    pub sender_name: String,
    pub sender_email: Option<String>,
    pub content: String,
    pub created_at: Option<DateTime<Utc>>,
    pub is_read: bool,
}

impl PushedMessage {
    pub fn new(message: &Message, sender_name: String, sender_email: Option<String>) -> Self {
        Self {
            id: message.id,
            sender_id: message.sender_id,
            sender_name,
            sender_email,
            content: message.content.clone(),
            created_at: message.created_at,
            is_read: message.is_read,
        }
    }
}

struct Connection {
    id: u64,
    tx: mpsc::Sender<WsOutgoing>,
}

/// Open sockets keyed by user id; a newer connection replaces an older one
#[derive(Default)]
pub struct ConnectionRegistry {
    connections: RwLock<HashMap<i64, Connection>>,
    next_id: AtomicU64,
}

impl ConnectionRegistry {
    /// Registers `tx` for `user_id` and returns the connection handle id
    pub async fn register(&self, user_id: i64, tx: mpsc::Sender<WsOutgoing>) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.connections
            .write()
            .await
            .insert(user_id, Connection { id, tx });
        tracing::info!(user_id, connection = id, "WebSocket registered");
        id
    }

    /// Removes the entry only if it still belongs to `connection`
    pub async fn unregister(&self, user_id: i64, connection: u64) {
        let mut connections = self.connections.write().await;
        if connections.get(&user_id).is_some_and(|c| c.id == connection) {
            connections.remove(&user_id);
            tracing::info!(user_id, connection, "WebSocket unregistered");
        }
    }

    pub async fn is_online(&self, user_id: i64) -> bool {
        self.connections.read().await.contains_key(&user_id)
    }

    pub async fn online_count(&self) -> usize {
        self.connections.read().await.len()
    }

    /// Queue a frame for `user_id`; returns whether it was accepted
    pub async fn send(&self, user_id: i64, frame: WsOutgoing) -> bool {
        let target = {
            let connections = self.connections.read().await;
            connections.get(&user_id).map(|c| (c.id, c.tx.clone()))
        };
        let Some((connection, tx)) = target else {
            return false;
        };

        match tx.try_send(frame) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!(user_id, "WebSocket queue full, dropping frame");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.unregister(user_id, connection).await;
                false
            }
        }
    }
}

/// Both push channels
#[derive(Default)]
pub struct Realtime {
    pub notifications: ConnectionRegistry,
    pub chat: ConnectionRegistry,
}
