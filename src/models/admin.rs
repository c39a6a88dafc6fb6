use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::user::default_true;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Admin {
    pub id: i64,
    pub email: String,
    #[serde(default, skip_serializing)]
    pub hashed_password: Option<String>,
    pub full_name: Option<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub is_superadmin: bool,
    pub last_login: Option<DateTime<Utc>>,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct NewAdmin {
    pub email: String,
    pub hashed_password: String,
    pub full_name: String,
    pub is_superadmin: bool,
}
