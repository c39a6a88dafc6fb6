pub mod patient;
pub mod scoring;

pub use patient::{
    analyze_appointment_adherence, analyze_health_trends, analyze_metric_trend,
    analyze_task_performance, assess_health_risk, calculate_health_score,
    generate_recommendations, AppointmentAnalytics, HealthTrends, Metric, RiskAssessment,
    RiskLevel, TaskAnalytics,
};
pub use scoring::{
    achievements, bmi, daily_health_score, daily_tip, progress_color, vital_trend, week_start,
    Achievements, TriageStatus, VitalTrend,
};
