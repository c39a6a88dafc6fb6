use super::{AppointmentView, HealthData, Notification, TaskView};
use crate::analytics::{
    AppointmentAnalytics, HealthTrends, RiskAssessment, RiskLevel, TaskAnalytics, TriageStatus,
    VitalTrend,
};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Approved patient in a caregiver's list
#[derive(Debug, Serialize)]
pub struct CaregiverPatient {
    pub relationship_id: i64,
    pub user_id: i64,
    pub patient_id: Option<String>,
    pub name: String,
    pub email: Option<String>,
    pub relationship_type: Option<String>,
    pub age: Option<i32>,
    pub chronic_conditions: Vec<String>,
    pub since: Option<DateTime<Utc>>,
}

#[derive(Debug, Default, Serialize)]
pub struct DashboardStats {
    pub total_patients: usize,
    pub active_patients: usize,
    pub critical_patients: usize,
    pub pending_tasks: usize,
    pub completed_tasks_week: usize,
    pub overdue_tasks: usize,
    pub today_appointments: usize,
    pub upcoming_appointments: usize,
    pub avg_health_score: f64,
}

#[derive(Debug, Serialize)]
pub struct DashboardPatient {
    pub user_id: i64,
    pub patient_id: Option<String>,
    pub name: String,
    pub latest_heart_rate: Option<i32>,
    pub latest_blood_pressure: Option<String>,
    pub last_reading_at: Option<DateTime<Utc>>,
    pub status: TriageStatus,
}

#[derive(Debug, Serialize)]
pub struct CaregiverDashboard {
    pub stats: DashboardStats,
    pub recent_patients: Vec<DashboardPatient>,
    pub upcoming_tasks: Vec<TaskView>,
    pub today_appointments: Vec<AppointmentView>,
    pub recent_alerts: Vec<PatientAlert>,
    pub vital_trends: Vec<VitalTrend>,
}

/// Critical or warning notification raised for one of the caregiver's patients
#[derive(Debug, Serialize)]
pub struct PatientAlert {
    #[serde(flatten)]
    pub notification: Notification,
    pub patient_id: i64,
    pub patient_name: String,
}

#[derive(Debug, Serialize)]
pub struct PatientInsights {
    pub patient_id: i64,
    pub patient_name: String,
    pub period_days: i64,
    pub latest_reading: Option<HealthData>,
    pub trends: HealthTrends,
    pub risk_assessment: RiskAssessment,
    pub recommendations: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct PatientInfo {
    pub id: i64,
    pub name: String,
    pub patient_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AnalysisPeriod {
    pub days: i64,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
}

/// Full analytics report for one patient over a window
#[derive(Debug, Serialize)]
pub struct PatientAnalyticsReport {
    pub patient_info: PatientInfo,
    pub analysis_period: AnalysisPeriod,
    pub health_trends: HealthTrends,
    pub task_analytics: TaskAnalytics,
    pub appointment_analytics: AppointmentAnalytics,
    pub overall_score: f64,
    pub risk_assessment: RiskAssessment,
    pub recommendations: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PatientComparison {
    pub patient_id: i64,
    pub patient_name: String,
    pub overall_score: f64,
    pub risk_level: RiskLevel,
    pub completion_rate: f64,
    pub attendance_rate: f64,
}

#[derive(Debug, Default, Serialize)]
pub struct ComparativeAverages {
    pub overall_score: f64,
    pub completion_rate: f64,
    pub attendance_rate: f64,
}

#[derive(Debug, Default, Serialize)]
pub struct ComparativeRankings {
    pub by_score: Vec<PatientComparison>,
    pub by_risk: Vec<PatientComparison>,
}

#[derive(Debug, Serialize)]
pub struct ComparativeAnalytics {
    pub period_days: i64,
    pub patients: Vec<PatientComparison>,
    pub averages: ComparativeAverages,
    pub rankings: ComparativeRankings,
}
