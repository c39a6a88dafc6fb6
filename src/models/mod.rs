pub mod admin;
pub mod auth;
pub mod caregiver;
pub mod dashboard;
pub mod doctor;
pub mod health;
pub mod iot;
pub mod message;
pub mod notification;
pub mod user;

pub use admin::*;
pub use auth::*;
pub use caregiver::*;
pub use dashboard::*;
pub use doctor::*;
pub use health::*;
pub use iot::*;
pub use message::*;
pub use notification::*;
pub use user::*;

use serde::Serialize;

/// Plain `{"message": ...}` acknowledgement
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
