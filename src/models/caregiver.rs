use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use validator::Validate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipStatus {
    Pending,
    Approved,
    Rejected,
}

impl RelationshipStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaregiverType {
    Family,
    Friend,
    Professional,
}

impl CaregiverType {
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "family" => Some(Self::Family),
            "friend" => Some(Self::Friend),
            "professional" => Some(Self::Professional),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Family => "family",
            Self::Friend => "friend",
            Self::Professional => "professional",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaregiverRelationship {
    pub id: i64,
    pub caregiver_id: i64,
    pub patient_id: i64,
    pub relationship_type: Option<String>,
    pub status: RelationshipStatus,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct NewRelationship {
    pub caregiver_id: i64,
    pub patient_id: i64,
    pub relationship_type: String,
    pub status: RelationshipStatus,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CaregiverRequestCreate {
    pub patient_id: i64,
    #[validate(length(min = 1, max = 50))]
    pub relationship_type: Option<String>,
}

/// Pending request as the patient sees it
#[derive(Debug, Serialize)]
pub struct CaregiverRequestView {
    pub id: i64,
    pub caregiver_id: i64,
    pub caregiver_name: String,
    pub caregiver_code: Option<String>,
    pub relationship_type: Option<String>,
    pub status: RelationshipStatus,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct VolunteerRequest {
    pub caregiver_type: Option<String>,
    #[validate(range(min = 0, max = 50))]
    pub experience_years: Option<i32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    Low,
    Medium,
    High,
    Critical,
}

impl Default for TaskPriority {
    fn default() -> Self {
        Self::Medium
    }
}

impl TaskPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
    Cancelled,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaregiverTask {
    pub id: i64,
    pub caregiver_id: i64,
    pub patient_id: i64,
    pub assigned_by: Option<i64>,
    pub title: String,
    pub description: Option<String>,
    #[serde(default = "default_task_type")]
    pub task_type: String,
    #[serde(default)]
    pub priority: TaskPriority,
    pub status: TaskStatus,
    pub due_date: Option<DateTime<Utc>>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub is_recurring: bool,
    pub recurrence_rule: Option<String>,
    pub recurrence_days: Option<Vec<i32>>,
    pub notes: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

fn default_task_type() -> String {
    "general".to_string()
}

impl CaregiverTask {
    /// Not completed and past its due date
    pub fn is_overdue_at(&self, now: DateTime<Utc>) -> bool {
        self.status != TaskStatus::Completed && self.due_date.is_some_and(|due| due < now)
    }
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct TaskCreate {
    pub patient_id: i64,
    #[validate(length(min = 1, max = 255))]
    pub title: String,
    pub description: Option<String>,
    #[validate(length(min = 1, max = 50))]
    pub task_type: String,
    #[serde(default)]
    pub priority: TaskPriority,
    pub due_date: Option<DateTime<Utc>>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub is_recurring: bool,
    pub recurrence_rule: Option<String>,
    pub recurrence_days: Option<Vec<i32>>,
    pub notes: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct NewTask {
    pub caregiver_id: i64,
    pub patient_id: i64,
    pub assigned_by: i64,
    pub title: String,
    pub description: Option<String>,
    pub task_type: String,
    pub priority: TaskPriority,
    pub status: TaskStatus,
    pub due_date: Option<DateTime<Utc>>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub is_recurring: bool,
    pub recurrence_rule: Option<String>,
    pub recurrence_days: Option<Vec<i32>>,
    pub notes: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize, Validate)]
pub struct TaskUpdate {
    #[validate(length(min = 1, max = 255))]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<TaskStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<TaskPriority>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Default, Deserialize)]
pub struct TaskFilter {
    pub status: Option<TaskStatus>,
    pub priority: Option<TaskPriority>,
    pub patient_id: Option<i64>,
    pub due_date_from: Option<chrono::NaiveDate>,
    pub due_date_to: Option<chrono::NaiveDate>,
}

/// Task with the patient's name and overdue flag attached
#[derive(Debug, Serialize)]
pub struct TaskView {
    #[serde(flatten)]
    pub task: CaregiverTask,
    pub patient_name: String,
    pub is_overdue: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentType {
    Checkup,
    Medication,
    Therapy,
    Consultation,
    Emergency,
    Other,
}

impl Default for AppointmentType {
    fn default() -> Self {
        Self::Checkup
    }
}

impl AppointmentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Checkup => "checkup",
            Self::Medication => "medication",
            Self::Therapy => "therapy",
            Self::Consultation => "consultation",
            Self::Emergency => "emergency",
            Self::Other => "other",
        }
    }

    /// Calendar color
    pub fn color(&self) -> &'static str {
        match self {
            Self::Checkup => "#3B82F6",
            Self::Medication => "#F59E0B",
            Self::Therapy => "#10B981",
            Self::Consultation => "#8B5CF6",
            Self::Emergency => "#EF4444",
            Self::Other => "#6B7280",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Scheduled,
    Confirmed,
    Completed,
    Cancelled,
    NoShow,
}

impl AppointmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Scheduled => "scheduled",
            Self::Confirmed => "confirmed",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::NoShow => "no_show",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaregiverAppointment {
    pub id: i64,
    pub caregiver_id: i64,
    pub patient_id: i64,
    pub title: String,
    pub description: Option<String>,
    #[serde(default)]
    pub appointment_type: AppointmentType,
    pub status: AppointmentStatus,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration_minutes: Option<i64>,
    pub location: Option<String>,
    #[serde(default)]
    pub is_virtual: bool,
    pub meeting_link: Option<String>,
    pub doctor_id: Option<i64>,
    pub notes: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct AppointmentCreate {
    pub patient_id: i64,
    #[validate(length(min = 1, max = 255))]
    pub title: String,
    pub description: Option<String>,
    #[serde(default)]
    pub appointment_type: AppointmentType,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub location: Option<String>,
    #[serde(default)]
    pub is_virtual: bool,
    #[validate(url)]
    pub meeting_link: Option<String>,
    pub doctor_id: Option<i64>,
    pub notes: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct NewAppointment {
    pub caregiver_id: i64,
    pub patient_id: i64,
    pub title: String,
    pub description: Option<String>,
    pub appointment_type: AppointmentType,
    pub status: AppointmentStatus,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration_minutes: i64,
    pub location: Option<String>,
    pub is_virtual: bool,
    pub meeting_link: Option<String>,
    pub doctor_id: Option<i64>,
    pub notes: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize, Validate)]
pub struct AppointmentUpdate {
    #[validate(length(min = 1, max = 255))]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub appointment_type: Option<AppointmentType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<AppointmentStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_minutes: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_virtual: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meeting_link: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ScheduleFilter {
    pub start_date: Option<chrono::NaiveDate>,
    pub end_date: Option<chrono::NaiveDate>,
    pub patient_id: Option<i64>,
    pub status: Option<AppointmentStatus>,
}

#[derive(Debug, Deserialize)]
pub struct UpcomingQuery {
    pub days: Option<i64>,
}

/// Defaults to the current month when either part is missing
#[derive(Debug, Default, Deserialize)]
pub struct CalendarQuery {
    pub month: Option<u32>,
    pub year: Option<i32>,
}

/// Appointments of one month keyed by ISO day
#[derive(Debug, Serialize)]
pub struct CalendarView {
    pub month: u32,
    pub year: i32,
    pub calendar_data: std::collections::BTreeMap<String, Vec<AppointmentView>>,
    pub total_appointments: usize,
}

#[derive(Debug, Serialize)]
pub struct AppointmentView {
    #[serde(flatten)]
    pub appointment: CaregiverAppointment,
    pub patient_name: String,
    pub color: &'static str,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CancelRequest {
    #[validate(length(max = 500))]
    pub reason: Option<String>,
}
