use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::user::default_true;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Doctor {
    pub id: i64,
    pub doctor_id: String,
    #[serde(default, skip_serializing)]
    pub hashed_password: Option<String>,
    pub full_name: String,
    pub specialization: Option<String>,
    pub hospital: Option<String>,
    pub email: Option<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
    pub created_by: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct NewDoctor {
    pub doctor_id: String,
    pub hashed_password: String,
    pub full_name: String,
    pub specialization: Option<String>,
    pub hospital: Option<String>,
    pub email: Option<String>,
    pub created_by: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct DoctorCreateRequest {
    #[validate(length(equal = 8))]
    pub doctor_id: String,
    #[validate(length(min = 2, max = 100))]
    pub full_name: String,
    pub specialization: Option<String>,
    pub hospital: Option<String>,
    #[validate(email)]
    pub email: Option<String>,
}

/// Returned once on creation; the initial password is never stored in clear
#[derive(Debug, Serialize, Deserialize)]
pub struct DoctorCreatedResponse {
    pub doctor: Doctor,
    pub initial_password: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct PatientStatusQuery {
    pub status_filter: Option<String>,
}

/// One row in a doctor's patient list
#[derive(Debug, Clone, Serialize)]
pub struct DoctorPatientSummary {
    pub user_id: i64,
    pub patient_id: Option<String>,
    pub full_name: Option<String>,
    pub age: Option<i32>,
    pub gender: Option<String>,
    pub chronic_conditions: Vec<String>,
    pub latest_heart_rate: Option<i32>,
    pub latest_blood_pressure: Option<String>,
    pub latest_blood_glucose: Option<f64>,
    pub last_reading_at: Option<DateTime<Utc>>,
    pub status: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct DirectMessageRequest {
    #[validate(length(min = 1, max = 200))]
    pub title: Option<String>,
    #[validate(length(min = 1, max = 5000))]
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct AssignDoctorRequest {
    pub doctor_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct DoctorAlert {
    pub alert_type: &'static str,
    pub message: String,
    pub severity: &'static str,
    pub patient_id: i64,
    pub patient_name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct DoctorDashboard {
    pub doctor_id: String,
    pub doctor_name: String,
    pub total_patients: usize,
    pub critical_patients: usize,
    pub recent_alerts: Vec<DoctorAlert>,
    pub patients: Vec<DoctorPatientSummary>,
}

#[derive(Debug, Default, Serialize)]
pub struct WeeklyHealthMetrics {
    pub avg_heart_rate: Option<f64>,
    pub avg_blood_glucose: Option<f64>,
    pub weekly_steps_avg: Option<f64>,
}

#[derive(Debug, Serialize)]
pub struct MealAnalysisSummary {
    pub meal: Option<String>,
    pub detected_food: String,
    pub score: Option<i32>,
}

/// One patient's records as their assigned doctor sees them
#[derive(Debug, Serialize)]
pub struct DoctorPatientDashboard {
    pub patient: DoctorPatientSummary,
    pub doctor_assigned: String,
    pub latest_reading: Option<super::HealthData>,
    pub health_metrics: WeeklyHealthMetrics,
    pub weekly_progress: Option<super::WeeklyProgress>,
    pub recent_food_analysis: Vec<MealAnalysisSummary>,
    pub medical_insights: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct DoctorPatientList {
    pub doctor_id: String,
    pub total_patients: usize,
    pub patients: Vec<DoctorPatientSummary>,
}
