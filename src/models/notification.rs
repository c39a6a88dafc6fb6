use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    System,
    Caregiver,
    Doctor,
    Critical,
    Warning,
}

impl NotificationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::Caregiver => "caregiver",
            Self::Doctor => "doctor",
            Self::Critical => "critical",
            Self::Warning => "warning",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: i64,
    pub user_id: i64,
    pub notification_type: NotificationType,
    pub title: String,
    pub message: String,
    #[serde(default)]
    pub is_read: bool,
    pub sender_id: Option<i64>,
    pub sender_type: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NewNotification {
    pub user_id: i64,
    pub notification_type: NotificationType,
    pub title: String,
    pub message: String,
    pub is_read: bool,
    pub sender_id: Option<i64>,
    pub sender_type: Option<String>,
}

impl NewNotification {
    pub fn new(
        user_id: i64,
        notification_type: NotificationType,
        title: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            user_id,
            notification_type,
            title: title.into(),
            message: message.into(),
            is_read: false,
            sender_id: None,
            sender_type: None,
        }
    }

    pub fn from_sender(mut self, sender_id: i64, sender_type: &str) -> Self {
        self.sender_id = Some(sender_id);
        self.sender_type = Some(sender_type.to_string());
        self
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct NotificationCreate {
    pub user_id: Option<i64>,
    pub notification_type: NotificationType,
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    #[validate(length(min = 1, max = 5000))]
    pub message: String,
}

/// Inbox split by the three tabs the clients render
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct NotificationGroups {
    pub system: Vec<Notification>,
    pub caregiver: Vec<Notification>,
    pub doctor: Vec<Notification>,
}

impl NotificationGroups {
    /// Critical and warning alerts are shown under the caregiver tab
    pub fn from_notifications(notifications: Vec<Notification>) -> Self {
        let mut groups = Self::default();
        for notification in notifications {
            match notification.notification_type {
                NotificationType::System => groups.system.push(notification),
                NotificationType::Doctor => groups.doctor.push(notification),
                NotificationType::Caregiver
                | NotificationType::Critical
                | NotificationType::Warning => groups.caregiver.push(notification),
            }
        }
        groups
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UnreadCount {
    pub unread_count: usize,
}
