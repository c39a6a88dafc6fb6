//! Patient analytics computed over rows already fetched for a time window.

use crate::models::{
    AppointmentStatus, CaregiverAppointment, CaregiverTask, HealthData, TaskStatus,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    HeartRate,
    BloodPressure,
    BloodGlucose,
    SleepTime,
    Steps,
    WaterIntake,
}

impl Metric {
    pub const ALL: [Metric; 6] = [
        Metric::HeartRate,
        Metric::BloodPressure,
        Metric::BloodGlucose,
        Metric::SleepTime,
        Metric::Steps,
        Metric::WaterIntake,
    ];

    /// Human label, e.g. "blood pressure"
    pub fn label(&self) -> &'static str {
        match self {
            Self::HeartRate => "heart rate",
            Self::BloodPressure => "blood pressure",
            Self::BloodGlucose => "blood glucose",
            Self::SleepTime => "sleep time",
            Self::Steps => "steps",
            Self::WaterIntake => "water intake",
        }
    }

    /// Value of this metric in a reading; blood pressure uses the systolic part
    pub fn value_of(&self, reading: &HealthData) -> Option<f64> {
        match self {
            Self::HeartRate => reading.heart_rate.map(f64::from),
            Self::BloodPressure => reading.systolic(),
            Self::BloodGlucose => reading.blood_glucose,
            Self::SleepTime => reading.sleep_time.map(f64::from),
            Self::Steps => reading.steps.map(f64::from),
            Self::WaterIntake => reading.water_intake.map(f64::from),
        }
    }

    pub fn is_critical(&self, value: f64) -> bool {
        match self {
            Self::HeartRate => !(40.0..=120.0).contains(&value),
            Self::BloodPressure => value >= 180.0,
            Self::BloodGlucose => !(54.0..=250.0).contains(&value),
            Self::SleepTime | Self::Steps | Self::WaterIntake => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    Improving,
    Stable,
    Declining,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OverallTrend {
    Improving,
    Stable,
    Declining,
    Unknown,
}

#[derive(Debug, Clone, Copy)]
pub struct MetricPoint {
    pub value: f64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricStats {
    pub average: f64,
    pub min: f64,
    pub max: f64,
    pub recent_average: f64,
    pub trend: Trend,
    pub data_points: usize,
    pub critical_count: usize,
    pub latest_value: f64,
    pub latest_timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricSummary {
    pub has_data: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(flatten)]
    pub stats: Option<MetricStats>,
}

impl MetricSummary {
    fn empty(metric: Metric) -> Self {
        Self {
            has_data: false,
            message: Some(format!("No {} data available", metric.label())),
            stats: None,
        }
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Trend over chronologically ordered points
///
/// The mean of the first half is compared with the mean of the second half;
/// a rise of more than 10 % is improving, a fall of more than 10 % declining.
pub fn analyze_metric_trend(metric: Metric, points: &[MetricPoint]) -> MetricSummary {
    let Some(latest) = points.last() else {
        return MetricSummary::empty(metric);
    };

    let values: Vec<f64> = points.iter().map(|p| p.value).collect();
    let recent = &values[values.len().saturating_sub(5)..];

    let trend = if values.len() >= 2 {
        let (first, second) = values.split_at(values.len() / 2);
        let (first_avg, second_avg) = (mean(first), mean(second));
        if second_avg > first_avg * 1.1 {
            Trend::Improving
        } else if second_avg < first_avg * 0.9 {
            Trend::Declining
        } else {
            Trend::Stable
        }
    } else {
        Trend::Stable
    };

    MetricSummary {
        has_data: true,
        message: None,
        stats: Some(MetricStats {
            average: mean(&values),
            min: values.iter().copied().fold(f64::INFINITY, f64::min),
            max: values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            recent_average: mean(recent),
            trend,
            data_points: values.len(),
            critical_count: values.iter().filter(|v| metric.is_critical(**v)).count(),
            latest_value: latest.value,
            latest_timestamp: latest.timestamp,
        }),
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthTrends {
    pub heart_rate: MetricSummary,
    pub blood_pressure: MetricSummary,
    pub blood_glucose: MetricSummary,
    pub sleep_time: MetricSummary,
    pub steps: MetricSummary,
    pub water_intake: MetricSummary,
    pub overall_trend: OverallTrend,
}

impl HealthTrends {
    pub fn metrics(&self) -> [(Metric, &MetricSummary); 6] {
        [
            (Metric::HeartRate, &self.heart_rate),
            (Metric::BloodPressure, &self.blood_pressure),
            (Metric::BloodGlucose, &self.blood_glucose),
            (Metric::SleepTime, &self.sleep_time),
            (Metric::Steps, &self.steps),
            (Metric::WaterIntake, &self.water_intake),
        ]
    }

    fn with_data(&self) -> impl Iterator<Item = (Metric, &MetricStats)> {
        self.metrics()
            .into_iter()
            .filter_map(|(metric, summary)| summary.stats.as_ref().map(|s| (metric, s)))
    }
}

/// Per-metric trends over readings sorted oldest first
pub fn analyze_health_trends(readings: &[HealthData]) -> HealthTrends {
    let summarize = |metric: Metric| {
        let points: Vec<MetricPoint> = readings
            .iter()
            .filter_map(|r| {
                metric.value_of(r).map(|value| MetricPoint {
                    value,
                    timestamp: r.date,
                })
            })
            .collect();
        analyze_metric_trend(metric, &points)
    };

    let mut trends = HealthTrends {
        heart_rate: summarize(Metric::HeartRate),
        blood_pressure: summarize(Metric::BloodPressure),
        blood_glucose: summarize(Metric::BloodGlucose),
        sleep_time: summarize(Metric::SleepTime),
        steps: summarize(Metric::Steps),
        water_intake: summarize(Metric::WaterIntake),
        overall_trend: OverallTrend::Unknown,
    };

    let mut seen = false;
    let (mut improving, mut declining) = (0, 0);
    for (_, stats) in trends.with_data() {
        seen = true;
        match stats.trend {
            Trend::Improving => improving += 1,
            Trend::Declining => declining += 1,
            Trend::Stable => {}
        }
    }

    trends.overall_trend = if !seen {
        OverallTrend::Unknown
    } else if improving > declining {
        OverallTrend::Improving
    } else if declining > improving {
        OverallTrend::Declining
    } else {
        OverallTrend::Stable
    };
    trends
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TaskAnalytics {
    pub total_tasks: usize,
    pub completed_tasks: usize,
    pub completion_rate: f64,
    /// Mean hours between due date and completion; negative means early
    pub average_completion_time: f64,
    pub overdue_tasks: usize,
    pub overdue_rate: f64,
    pub task_type_distribution: BTreeMap<String, usize>,
}

pub fn analyze_task_performance(tasks: &[CaregiverTask], now: DateTime<Utc>) -> TaskAnalytics {
    if tasks.is_empty() {
        return TaskAnalytics::default();
    }

    let total = tasks.len();
    let completed: Vec<&CaregiverTask> = tasks
        .iter()
        .filter(|t| t.status == TaskStatus::Completed)
        .collect();
    let overdue = tasks.iter().filter(|t| t.is_overdue_at(now)).count();

    let completion_hours: Vec<f64> = completed
        .iter()
        .filter_map(|t| match (t.due_date, t.completed_at) {
            (Some(due), Some(done)) => Some((done - due).num_seconds() as f64 / 3600.0),
            _ => None,
        })
        .collect();

    let mut distribution = BTreeMap::new();
    for task in tasks {
        let key = if task.task_type.is_empty() { "other" } else { task.task_type.as_str() };
        *distribution.entry(key.to_string()).or_insert(0) += 1;
    }

    TaskAnalytics {
        total_tasks: total,
        completed_tasks: completed.len(),
        completion_rate: round1(completed.len() as f64 / total as f64 * 100.0),
        average_completion_time: round1(mean(&completion_hours)),
        overdue_tasks: overdue,
        overdue_rate: round1(overdue as f64 / total as f64 * 100.0),
        task_type_distribution: distribution,
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AppointmentAnalytics {
    pub total_appointments: usize,
    pub completed: usize,
    pub cancelled: usize,
    pub no_show: usize,
    pub attendance_rate: f64,
    pub cancellation_rate: f64,
    pub no_show_rate: f64,
    pub appointment_type_distribution: BTreeMap<String, usize>,
}

pub fn analyze_appointment_adherence(appointments: &[CaregiverAppointment]) -> AppointmentAnalytics {
    if appointments.is_empty() {
        return AppointmentAnalytics::default();
    }

    let total = appointments.len();
    let count = |status: AppointmentStatus| appointments.iter().filter(|a| a.status == status).count();
    let completed = count(AppointmentStatus::Completed);
    let cancelled = count(AppointmentStatus::Cancelled);
    let no_show = count(AppointmentStatus::NoShow);
    let rate = |n: usize| round1(n as f64 / total as f64 * 100.0);

    let mut distribution = BTreeMap::new();
    for appointment in appointments {
        *distribution
            .entry(appointment.appointment_type.as_str().to_string())
            .or_insert(0) += 1;
    }

    AppointmentAnalytics {
        total_appointments: total,
        completed,
        cancelled,
        no_show,
        attendance_rate: rate(completed),
        cancellation_rate: rate(cancelled),
        no_show_rate: rate(no_show),
        appointment_type_distribution: distribution,
    }
}

/// Weighted 0..=100 score: health trends 50 %, tasks 30 %, appointments 20 %
pub fn calculate_health_score(
    trends: &HealthTrends,
    tasks: &TaskAnalytics,
    appointments: &AppointmentAnalytics,
) -> f64 {
    let metric_scores: Vec<f64> = trends
        .with_data()
        .map(|(_, stats)| {
            let base = match stats.trend {
                Trend::Improving => 80.0,
                Trend::Stable => 60.0,
                Trend::Declining => 40.0,
            };
            base - (stats.critical_count as f64 * 5.0).min(20.0)
        })
        .collect();

    let health_score = if metric_scores.is_empty() { 50.0 } else { mean(&metric_scores) };
    let task_score = tasks.completion_rate - tasks.overdue_rate * 0.5;
    let appointment_score = appointments.attendance_rate - appointments.no_show_rate * 0.5;

    (health_score * 0.5 + task_score * 0.3 + appointment_score * 0.2).clamp(0.0, 100.0)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RiskAssessment {
    pub risk_level: RiskLevel,
    pub risk_factors: Vec<String>,
    pub warnings: Vec<String>,
    pub total_risk_factors: usize,
}

fn capitalize(label: &str) -> String {
    label
        .split(' ')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn assess_health_risk(trends: &HealthTrends) -> RiskAssessment {
    let mut risk_factors = Vec::new();
    let mut warnings = Vec::new();

    for (metric, stats) in trends.with_data() {
        if stats.critical_count > 0 {
            risk_factors.push(format!("Critical {} readings", metric.label()));
            warnings.push(format!("Multiple critical {} readings detected", metric.label()));
        }
        if stats.trend == Trend::Declining {
            risk_factors.push(format!("Declining {}", metric.label()));
            warnings.push(format!("{} is showing a declining trend", capitalize(metric.label())));
        }
    }

    let risk_level = match risk_factors.len() {
        0 => RiskLevel::Low,
        1 | 2 => RiskLevel::Medium,
        _ => RiskLevel::High,
    };

    RiskAssessment {
        risk_level,
        total_risk_factors: risk_factors.len(),
        risk_factors,
        warnings,
    }
}

/// At most five care suggestions, most general first
pub fn generate_recommendations(trends: &HealthTrends, risk: &RiskAssessment) -> Vec<String> {
    let mut recommendations: Vec<&str> = Vec::new();

    if trends.overall_trend == OverallTrend::Declining {
        recommendations.push("Schedule a consultation with healthcare provider");
        recommendations.push("Increase frequency of health monitoring");
    }

    for (metric, stats) in trends.with_data() {
        if stats.trend != Trend::Declining {
            continue;
        }
        match metric {
            Metric::BloodPressure => {
                recommendations.push("Monitor blood pressure twice daily");
                recommendations.push("Reduce sodium intake and increase physical activity");
            }
            Metric::BloodGlucose => {
                recommendations.push("Check blood glucose levels before and after meals");
                recommendations.push("Consult with dietitian for meal planning");
            }
            Metric::HeartRate => {
                recommendations.push("Practice stress reduction techniques");
                recommendations.push("Monitor heart rate during physical activity");
            }
            _ => {}
        }
    }

    if risk.risk_level != RiskLevel::Low {
        recommendations.push("Increase task frequency for critical health monitoring");
        recommendations.push("Set up automated alerts for abnormal readings");
    }

    if recommendations.len() > 3 {
        recommendations.push("Schedule weekly check-in with care team");
    }

    recommendations.into_iter().take(5).map(String::from).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AppointmentType, TaskPriority};
    use chrono::{Duration, TimeZone};

    fn at(day: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap() + Duration::days(day)
    }

    fn points(values: &[f64]) -> Vec<MetricPoint> {
        values
            .iter()
            .enumerate()
            .map(|(i, v)| MetricPoint { value: *v, timestamp: at(i as i64) })
            .collect()
    }

    fn reading(day: i64, heart_rate: i32) -> HealthData {
        HealthData {
            id: day,
            user_id: 7,
            date: at(day),
            steps: None,
            sleep_time: None,
            water_intake: None,
            blood_pressure: None,
            heart_rate: Some(heart_rate),
            blood_glucose: None,
            calories_burned: None,
        }
    }

    fn task(status: TaskStatus, due: Option<i64>, completed: Option<i64>) -> CaregiverTask {
        CaregiverTask {
            id: 1,
            caregiver_id: 2,
            patient_id: 7,
            assigned_by: Some(2),
            title: "Check meds".into(),
            description: None,
            task_type: "medication".into(),
            priority: TaskPriority::High,
            status,
            due_date: due.map(at),
            start_time: None,
            end_time: None,
            completed_at: completed.map(at),
            is_recurring: false,
            recurrence_rule: None,
            recurrence_days: None,
            notes: None,
            created_at: Some(at(0)),
            updated_at: None,
        }
    }

    fn appointment(status: AppointmentStatus) -> CaregiverAppointment {
        CaregiverAppointment {
            id: 1,
            caregiver_id: 2,
            patient_id: 7,
            title: "Checkup".into(),
            description: None,
            appointment_type: AppointmentType::Checkup,
            status,
            start_time: at(1),
            end_time: at(1) + Duration::minutes(30),
            duration_minutes: Some(30),
            location: None,
            is_virtual: false,
            meeting_link: None,
            doctor_id: None,
            notes: None,
            created_at: Some(at(0)),
            updated_at: None,
        }
    }

    #[test]
    fn empty_metric_has_no_data() {
        let summary = analyze_metric_trend(Metric::Steps, &[]);
        assert!(!summary.has_data);
        assert_eq!(summary.message.as_deref(), Some("No steps data available"));
        assert!(summary.stats.is_none());
    }

    #[test]
    fn single_point_is_stable() {
        let summary = analyze_metric_trend(Metric::HeartRate, &points(&[70.0]));
        let stats = summary.stats.unwrap();
        assert_eq!(stats.trend, Trend::Stable);
        assert_eq!(stats.latest_value, 70.0);
        assert_eq!(stats.data_points, 1);
    }

    #[test]
    fn halves_decide_the_trend() {
        let rising = analyze_metric_trend(Metric::Steps, &points(&[1000.0, 1000.0, 2000.0, 2000.0]));
        assert_eq!(rising.stats.unwrap().trend, Trend::Improving);

        let falling = analyze_metric_trend(Metric::Steps, &points(&[2000.0, 2000.0, 1000.0, 1000.0]));
        assert_eq!(falling.stats.unwrap().trend, Trend::Declining);

        // 5 % change stays inside the band
        let flat = analyze_metric_trend(Metric::Steps, &points(&[1000.0, 1050.0]));
        assert_eq!(flat.stats.unwrap().trend, Trend::Stable);
    }

    #[test]
    fn stats_and_critical_counts() {
        let values = [60.0, 130.0, 35.0, 80.0, 90.0, 100.0];
        let stats = analyze_metric_trend(Metric::HeartRate, &points(&values)).stats.unwrap();
        assert_eq!(stats.min, 35.0);
        assert_eq!(stats.max, 130.0);
        assert_eq!(stats.critical_count, 2);
        assert!((stats.recent_average - (130.0 + 35.0 + 80.0 + 90.0 + 100.0) / 5.0).abs() < 1e-9);
        assert_eq!(stats.latest_timestamp, at(5));
    }

    #[test]
    fn overall_trend_unknown_without_data() {
        let trends = analyze_health_trends(&[]);
        assert_eq!(trends.overall_trend, OverallTrend::Unknown);
        assert_eq!(calculate_health_score(&trends, &TaskAnalytics::default(), &AppointmentAnalytics::default()), 25.0);
    }

    #[test]
    fn blood_pressure_uses_systolic() {
        let mut first = reading(0, 70);
        first.blood_pressure = Some("185/95".into());
        let trends = analyze_health_trends(&[first]);
        let stats = trends.blood_pressure.stats.unwrap();
        assert_eq!(stats.latest_value, 185.0);
        assert_eq!(stats.critical_count, 1);
    }

    #[test]
    fn task_performance_rates() {
        let now = at(10);
        let tasks = vec![
            task(TaskStatus::Completed, Some(1), Some(2)),
            task(TaskStatus::Pending, Some(5), None),
            task(TaskStatus::Pending, Some(20), None),
            task(TaskStatus::InProgress, None, None),
        ];
        let analytics = analyze_task_performance(&tasks, now);
        assert_eq!(analytics.total_tasks, 4);
        assert_eq!(analytics.completed_tasks, 1);
        assert_eq!(analytics.completion_rate, 25.0);
        assert_eq!(analytics.overdue_tasks, 1);
        assert_eq!(analytics.overdue_rate, 25.0);
        assert_eq!(analytics.average_completion_time, 24.0);
        assert_eq!(analytics.task_type_distribution.get("medication"), Some(&4));
    }

    #[test]
    fn appointment_rates() {
        let appointments = vec![
            appointment(AppointmentStatus::Completed),
            appointment(AppointmentStatus::Completed),
            appointment(AppointmentStatus::NoShow),
            appointment(AppointmentStatus::Cancelled),
        ];
        let analytics = analyze_appointment_adherence(&appointments);
        assert_eq!(analytics.attendance_rate, 50.0);
        assert_eq!(analytics.no_show_rate, 25.0);
        assert_eq!(analytics.cancellation_rate, 25.0);
    }

    #[test]
    fn weighted_score_with_penalties() {
        // heart rate rising 60 -> 130: improving, one critical reading
        let trends = analyze_health_trends(&[reading(0, 60), reading(1, 130)]);
        let tasks = TaskAnalytics { completion_rate: 80.0, overdue_rate: 20.0, ..Default::default() };
        let appointments = AppointmentAnalytics { attendance_rate: 90.0, no_show_rate: 10.0, ..Default::default() };

        let score = calculate_health_score(&trends, &tasks, &appointments);
        let expected = (80.0 - 5.0) * 0.5 + (80.0 - 10.0) * 0.3 + (90.0 - 5.0) * 0.2;
        assert!((score - expected).abs() < 1e-9);
    }

    #[test]
    fn risk_levels_and_recommendations() {
        let calm = analyze_health_trends(&[reading(0, 70), reading(1, 72)]);
        let risk = assess_health_risk(&calm);
        assert_eq!(risk.risk_level, RiskLevel::Low);
        assert!(generate_recommendations(&calm, &risk).is_empty());

        // declining and critical heart rate: two factors
        let falling = analyze_health_trends(&[reading(0, 90), reading(1, 35)]);
        let risk = assess_health_risk(&falling);
        assert_eq!(risk.risk_level, RiskLevel::Medium);
        assert_eq!(risk.total_risk_factors, 2);
        assert!(risk.warnings.contains(&"Heart Rate is showing a declining trend".to_string()));

        let recommendations = generate_recommendations(&falling, &risk);
        assert_eq!(recommendations.len(), 5);
        assert_eq!(recommendations[0], "Schedule a consultation with healthcare provider");
    }

    #[test]
    fn three_factors_is_high_risk() {
        let mut a = reading(0, 90);
        a.blood_glucose = Some(300.0);
        let mut b = reading(1, 35);
        b.blood_glucose = Some(120.0);
        let risk = assess_health_risk(&analyze_health_trends(&[a, b]));
        assert_eq!(risk.risk_level, RiskLevel::High);
    }
}
