use crate::{
    analytics::{
        analyze_appointment_adherence, analyze_health_trends, analyze_task_performance,
        assess_health_risk, calculate_health_score, generate_recommendations, RiskLevel,
    },
    auth::CurrentCaregiver,
    handlers::{ensure_caregiver_of, find_user, patient_ids_of, patient_name, profiles_by_user},
    models::{
        AnalysisPeriod, CaregiverAppointment, CaregiverTask, ComparativeAnalytics,
        ComparativeAverages, ComparativeRankings, HealthData, PatientAnalyticsReport,
        PatientComparison, PatientInfo,
    },
    utils::{ApiError, ApiResult},
    AppState,
};
use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::{Duration, SecondsFormat, Utc};
use serde::Deserialize;

const RANKING_SIZE: usize = 5;

#[derive(Debug, Deserialize)]
pub struct AnalyticsQuery {
    #[serde(default = "default_days")]
    pub days: i64,
}

fn default_days() -> i64 {
    30
}

impl AnalyticsQuery {
    fn checked_days(&self) -> ApiResult<i64> {
        if (1..=365).contains(&self.days) {
            Ok(self.days)
        } else {
            Err(ApiError::validation_error("days must be between 1 and 365"))
        }
    }
}

/// Readings, tasks and appointments for one patient since `days` ago
async fn build_report(state: &AppState, patient_id: i64, days: i64) -> ApiResult<PatientAnalyticsReport> {
    let db = &state.db;
    let patient = find_user(db, patient_id).await?;
    let profiles = profiles_by_user(db, &[patient_id]).await?;

    let end_date = Utc::now();
    let start_date = end_date - Duration::days(days);
    let since = start_date.to_rfc3339_opts(SecondsFormat::Secs, true);

    let readings: Vec<HealthData> = db
        .fetch_all(
            db.table("health_data")
                .select("*")
                .eq("user_id", patient_id.to_string())
                .gte("date", &since)
                .order("date.asc"),
        )
        .await?;
    let tasks: Vec<CaregiverTask> = db
        .fetch_all(
            db.table("caregiver_tasks")
                .select("*")
                .eq("patient_id", patient_id.to_string())
                .gte("created_at", &since),
        )
        .await?;
    let appointments: Vec<CaregiverAppointment> = db
        .fetch_all(
            db.table("caregiver_appointments")
                .select("*")
                .eq("patient_id", patient_id.to_string())
                .gte("created_at", &since),
        )
        .await?;

    let health_trends = analyze_health_trends(&readings);
    let task_analytics = analyze_task_performance(&tasks, end_date);
    let appointment_analytics = analyze_appointment_adherence(&appointments);
    let overall_score = calculate_health_score(&health_trends, &task_analytics, &appointment_analytics);
    let risk_assessment = assess_health_risk(&health_trends);
    let recommendations = generate_recommendations(&health_trends, &risk_assessment);

    Ok(PatientAnalyticsReport {
        patient_info: PatientInfo {
            id: patient.id,
            name: patient_name(Some(&patient), profiles.get(&patient_id)),
            patient_id: patient.patient_id.clone(),
        },
        analysis_period: AnalysisPeriod {
            days,
            start_date,
            end_date,
        },
        health_trends,
        task_analytics,
        appointment_analytics,
        overall_score: (overall_score * 10.0).round() / 10.0,
        risk_assessment,
        recommendations,
    })
}

/// `GET /caregiver/analytics/patient/{id}?days=`
pub async fn patient_analytics(
    State(state): State<AppState>,
    CurrentCaregiver(caregiver): CurrentCaregiver,
    Path(patient_id): Path<i64>,
    Query(query): Query<AnalyticsQuery>,
) -> ApiResult<Json<PatientAnalyticsReport>> {
    let days = query.checked_days()?;
    ensure_caregiver_of(&state.db, caregiver.id, patient_id).await?;
    Ok(Json(build_report(&state, patient_id, days).await?))
}

/// `GET /caregiver/analytics/comparative?days=`
pub async fn comparative_analytics(
    State(state): State<AppState>,
    CurrentCaregiver(caregiver): CurrentCaregiver,
    Query(query): Query<AnalyticsQuery>,
) -> ApiResult<Json<ComparativeAnalytics>> {
    let days = query.checked_days()?;

    let mut patients = Vec::new();
    for patient_id in patient_ids_of(&state.db, caregiver.id).await? {
        match build_report(&state, patient_id, days).await {
            Ok(report) => patients.push(PatientComparison {
                patient_id,
                patient_name: report.patient_info.name,
                overall_score: report.overall_score,
                risk_level: report.risk_assessment.risk_level,
                completion_rate: report.task_analytics.completion_rate,
                attendance_rate: report.appointment_analytics.attendance_rate,
            }),
            Err(e) => tracing::error!(patient_id, "Skipping patient in comparison: {}", e),
        }
    }

    Ok(Json(ComparativeAnalytics {
        period_days: days,
        averages: averages(&patients),
        rankings: rankings(&patients),
        patients,
    }))
}

fn averages(patients: &[PatientComparison]) -> ComparativeAverages {
    if patients.is_empty() {
        return ComparativeAverages::default();
    }
    let n = patients.len() as f64;
    let mean = |f: fn(&PatientComparison) -> f64| {
        (patients.iter().map(f).sum::<f64>() / n * 10.0).round() / 10.0
    };
    ComparativeAverages {
        overall_score: mean(|p| p.overall_score),
        completion_rate: mean(|p| p.completion_rate),
        attendance_rate: mean(|p| p.attendance_rate),
    }
}

fn rankings(patients: &[PatientComparison]) -> ComparativeRankings {
    let mut by_score = patients.to_vec();
    by_score.sort_by(|a, b| b.overall_score.total_cmp(&a.overall_score));
    by_score.truncate(RANKING_SIZE);

    let by_risk = patients
        .iter()
        .filter(|p| p.risk_level != RiskLevel::Low)
        .take(RANKING_SIZE)
        .cloned()
        .collect();

    ComparativeRankings { by_score, by_risk }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn comparison(id: i64, score: f64, risk: RiskLevel) -> PatientComparison {
        PatientComparison {
            patient_id: id,
            patient_name: format!("Patient {}", id),
            overall_score: score,
            risk_level: risk,
            completion_rate: 50.0,
            attendance_rate: 100.0,
        }
    }

    #[test]
    fn rankings_keep_top_five_by_score() {
        let patients: Vec<_> = (1..=7)
            .map(|i| comparison(i, i as f64 * 10.0, RiskLevel::Low))
            .collect();
        let ranked = rankings(&patients);
        let ids: Vec<i64> = ranked.by_score.iter().map(|p| p.patient_id).collect();
        assert_eq!(ids, vec![7, 6, 5, 4, 3]);
        assert!(ranked.by_risk.is_empty());
    }

    #[test]
    fn risk_ranking_skips_low_risk_patients() {
        let patients = vec![
            comparison(1, 70.0, RiskLevel::Low),
            comparison(2, 40.0, RiskLevel::High),
            comparison(3, 55.0, RiskLevel::Medium),
        ];
        let ids: Vec<i64> = rankings(&patients).by_risk.iter().map(|p| p.patient_id).collect();
        assert_eq!(ids, vec![2, 3]);
    }

    #[test]
    fn averages_of_no_patients_are_zero() {
        let avg = averages(&[]);
        assert_eq!(avg.overall_score, 0.0);

        let avg = averages(&[comparison(1, 60.0, RiskLevel::Low), comparison(2, 81.0, RiskLevel::Low)]);
        assert_eq!(avg.overall_score, 70.5);
        assert_eq!(avg.attendance_rate, 100.0);
    }
}
