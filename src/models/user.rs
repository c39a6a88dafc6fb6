use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Patient or caregiver account row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub email: Option<String>,
    pub username: Option<String>,
    pub patient_id: Option<String>,
    pub caregiver_id: Option<String>,
    #[serde(default, skip_serializing)]
    pub hashed_password: Option<String>,
    #[serde(default, skip_serializing)]
    pub google_id: Option<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub is_caregiver: bool,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub caregiver_type: Option<String>,
    pub experience_years: Option<i32>,
    #[serde(default)]
    pub is_email_verified: bool,
    pub phone_number: Option<String>,
    #[serde(default = "default_true")]
    pub is_available: bool,
    pub max_patients: Option<i32>,
    pub last_login: Option<DateTime<Utc>>,
    pub created_at: Option<DateTime<Utc>>,
}

impl User {
    /// Name shown to other people: first/last name, then username, then email
    pub fn display_name(&self) -> String {
        match (&self.first_name, &self.last_name) {
            (Some(first), Some(last)) => format!("{} {}", first, last),
            (Some(first), None) => first.clone(),
            _ => self
                .username
                .clone()
                .or_else(|| self.email.clone())
                .unwrap_or_else(|| format!("User {}", self.id)),
        }
    }
}

pub(crate) fn default_true() -> bool {
    true
}

/// Insert payload for `users`
#[derive(Debug, Default, Serialize)]
pub struct NewUser {
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    pub patient_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub caregiver_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hashed_password: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub google_id: Option<String>,
    pub is_caregiver: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub caregiver_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub experience_years: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
    pub is_email_verified: bool,
}

/// Health profile row, one per user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: i64,
    pub user_id: i64,
    pub full_name: Option<String>,
    pub doctor_id: Option<String>,
    pub gender: Option<String>,
    pub age: Option<i32>,
    #[serde(default)]
    pub chronic_conditions: Vec<String>,
    #[serde(default)]
    pub family_history: Vec<String>,
    pub weight: Option<f64>,
    pub height: Option<f64>,
    pub bmi: Option<f64>,
    pub blood_pressure: Option<String>,
    pub heart_rate: Option<i32>,
    pub blood_glucose: Option<i32>,
    #[serde(default)]
    pub daily_habits: Vec<String>,
    #[serde(default)]
    pub profile_completed: bool,
    pub profile_image_url: Option<String>,
    pub emergency_contact_name: Option<String>,
    pub emergency_contact_phone: Option<String>,
    pub emergency_contact_relationship: Option<String>,
}

impl UserProfile {
    /// Every field the completeness rule looks at is filled in
    pub fn is_complete(&self) -> bool {
        self.full_name.as_deref().is_some_and(|n| !n.trim().is_empty())
            && self.gender.as_deref().is_some_and(|g| !g.trim().is_empty())
            && self.age.is_some()
            && self.weight.is_some()
            && self.height.is_some()
    }
}

/// Partial profile update; absent fields are left untouched
#[derive(Debug, Default, Clone, Serialize, Deserialize, Validate)]
pub struct ProfileUpdate {
    #[validate(length(min = 1, max = 100))]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gender: Option<String>,
    #[validate(range(min = 1, max = 120))]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub age: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chronic_conditions: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub family_history: Option<Vec<String>>,
    #[validate(range(min = 1.0, max = 500.0))]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weight: Option<f64>,
    #[validate(range(min = 1.0, max = 300.0))]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blood_pressure: Option<String>,
    #[validate(range(min = 1, max = 250))]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub heart_rate: Option<i32>,
    #[validate(range(min = 1, max = 600))]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blood_glucose: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub daily_habits: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub emergency_contact_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub emergency_contact_phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub emergency_contact_relationship: Option<String>,
}

/// Emergency contact row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmergencyContact {
    pub id: i64,
    pub user_id: i64,
    pub name: String,
    pub phone_number: String,
    pub relationship: Option<String>,
    #[serde(default)]
    pub is_primary: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct EmergencyContactCreate {
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    #[validate(length(min = 7, max = 20))]
    pub phone_number: String,
    pub relationship: Option<String>,
    #[serde(default)]
    pub is_primary: bool,
}

#[derive(Debug, Deserialize)]
pub struct UserSearchQuery {
    #[serde(default)]
    pub query: String,
}

/// Public view of a user returned by search
#[derive(Debug, Serialize)]
pub struct UserSearchResult {
    pub id: i64,
    pub email: Option<String>,
    pub username: Option<String>,
    pub patient_id: Option<String>,
    pub caregiver_id: Option<String>,
    pub is_caregiver: bool,
    pub display_name: String,
}

impl From<User> for UserSearchResult {
    fn from(user: User) -> Self {
        Self {
            display_name: user.display_name(),
            id: user.id,
            email: user.email,
            username: user.username,
            patient_id: user.patient_id,
            caregiver_id: user.caregiver_id,
            is_caregiver: user.is_caregiver,
        }
    }
}
