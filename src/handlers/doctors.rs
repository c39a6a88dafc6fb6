use crate::{
    analytics::TriageStatus,
    auth::CurrentDoctor,
    db::Database,
    handlers::{notifications::deliver, users_by_id},
    models::{
        DirectMessageRequest, Doctor, DoctorAlert, DoctorDashboard, DoctorPatientDashboard,
        DoctorPatientList, DoctorPatientSummary, FoodLog, HealthData, MealAnalysisSummary,
        NewNotification, NotificationType, PatientStatusQuery, User, UserProfile,
        WeeklyHealthMetrics, WeeklyProgress,
    },
    utils::{ApiError, ApiResult},
    AppState,
};
use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::{Duration, SecondsFormat, Utc};
use serde_json::json;
use std::collections::HashMap;
use validator::Validate;

const DASHBOARD_PATIENTS: usize = 10;
const ALERT_SCAN: usize = 5;

/// Completed profiles of patients assigned to `doctor`
async fn assigned_profiles(db: &Database, doctor: &Doctor) -> ApiResult<Vec<UserProfile>> {
    db.fetch_all(
        db.table("user_profiles")
            .select("*")
            .eq("doctor_id", &doctor.doctor_id)
            .eq("profile_completed", "true")
            .order("user_id.asc"),
    )
    .await
}

/// Most recent reading per user
async fn latest_readings(db: &Database, user_ids: &[i64]) -> ApiResult<HashMap<i64, HealthData>> {
    if user_ids.is_empty() {
        return Ok(HashMap::new());
    }
    let readings: Vec<HealthData> = db
        .fetch_all(
            db.table("health_data")
                .select("*")
                .in_("user_id", user_ids.iter().map(i64::to_string))
                .order("date.desc"),
        )
        .await?;

    let mut latest = HashMap::new();
    for reading in readings {
        latest.entry(reading.user_id).or_insert(reading);
    }
    Ok(latest)
}

fn summarize(profile: &UserProfile, user: Option<&User>, latest: Option<&HealthData>) -> DoctorPatientSummary {
    let status = TriageStatus::from_heart_rate(latest.and_then(|r| r.heart_rate));
    DoctorPatientSummary {
        user_id: profile.user_id,
        patient_id: user.and_then(|u| u.patient_id.clone()),
        full_name: profile.full_name.clone(),
        age: profile.age,
        gender: profile.gender.clone(),
        chronic_conditions: profile.chronic_conditions.clone(),
        latest_heart_rate: latest.and_then(|r| r.heart_rate),
        latest_blood_pressure: latest.and_then(|r| r.blood_pressure.clone()),
        latest_blood_glucose: latest.and_then(|r| r.blood_glucose),
        last_reading_at: latest.map(|r| r.date),
        status: status.as_str().to_string(),
    }
}

async fn assigned_profile(db: &Database, doctor: &Doctor, patient_id: i64) -> ApiResult<UserProfile> {
    db.fetch_optional(
        db.table("user_profiles")
            .select("*")
            .eq("user_id", patient_id.to_string())
            .eq("doctor_id", &doctor.doctor_id),
    )
    .await?
    .ok_or_else(|| ApiError::not_found_error("Patient not found or not assigned to you"))
}

/// `GET /doctors/me`
pub async fn me(CurrentDoctor(doctor): CurrentDoctor) -> Json<Doctor> {
    Json(doctor)
}

/// `GET /doctors/dashboard`
pub async fn dashboard(
    State(state): State<AppState>,
    CurrentDoctor(doctor): CurrentDoctor,
) -> ApiResult<Json<DoctorDashboard>> {
    let db = &state.db;
    let profiles = assigned_profiles(db, &doctor).await?;
    let ids: Vec<i64> = profiles.iter().map(|p| p.user_id).collect();
    let users = users_by_id(db, &ids).await?;
    let latest = latest_readings(db, &ids).await?;

    let critical_patients = profiles
        .iter()
        .filter(|p| {
            TriageStatus::from_heart_rate(latest.get(&p.user_id).and_then(|r| r.heart_rate))
                == TriageStatus::Critical
        })
        .count();

    let today = Utc::now().date_naive();
    let recent_alerts = profiles
        .iter()
        .take(ALERT_SCAN)
        .filter_map(|profile| {
            let reading = latest.get(&profile.user_id)?;
            let high = reading.heart_rate.is_some_and(|hr| hr > 120);
            (high && reading.date.date_naive() == today).then(|| DoctorAlert {
                alert_type: "high_heart_rate",
                message: format!(
                    "High heart rate detected for {}",
                    profile.full_name.as_deref().unwrap_or("patient")
                ),
                severity: "high",
                patient_id: profile.user_id,
                patient_name: profile.full_name.clone(),
            })
        })
        .collect();

    let patients = profiles
        .iter()
        .take(DASHBOARD_PATIENTS)
        .map(|p| summarize(p, users.get(&p.user_id), latest.get(&p.user_id)))
        .collect();

    Ok(Json(DoctorDashboard {
        doctor_id: doctor.doctor_id,
        doctor_name: doctor.full_name,
        total_patients: profiles.len(),
        critical_patients,
        recent_alerts,
        patients,
    }))
}

/// `GET /doctors/patients?status_filter=`
pub async fn patients(
    State(state): State<AppState>,
    CurrentDoctor(doctor): CurrentDoctor,
    Query(query): Query<PatientStatusQuery>,
) -> ApiResult<Json<DoctorPatientList>> {
    let db = &state.db;
    let profiles = assigned_profiles(db, &doctor).await?;
    let ids: Vec<i64> = profiles.iter().map(|p| p.user_id).collect();
    let users = users_by_id(db, &ids).await?;
    let latest = latest_readings(db, &ids).await?;

    let filter = query.status_filter.as_deref().map(str::trim).filter(|f| !f.is_empty());
    let patients: Vec<DoctorPatientSummary> = profiles
        .iter()
        .map(|p| summarize(p, users.get(&p.user_id), latest.get(&p.user_id)))
        .filter(|s| filter.map_or(true, |f| s.status.eq_ignore_ascii_case(f)))
        .collect();

    Ok(Json(DoctorPatientList {
        doctor_id: doctor.doctor_id,
        total_patients: patients.len(),
        patients,
    }))
}

/// `GET /doctors/patients/{id}/dashboard`
pub async fn patient_dashboard(
    State(state): State<AppState>,
    CurrentDoctor(doctor): CurrentDoctor,
    Path(patient_id): Path<i64>,
) -> ApiResult<Json<DoctorPatientDashboard>> {
    let db = &state.db;
    let profile = assigned_profile(db, &doctor, patient_id).await?;
    let users = users_by_id(db, &[patient_id]).await?;

    let week_ago = (Utc::now() - Duration::days(7)).to_rfc3339_opts(SecondsFormat::Secs, true);
    let weekly: Vec<HealthData> = db
        .fetch_all(
            db.table("health_data")
                .select("*")
                .eq("user_id", patient_id.to_string())
                .gte("date", week_ago)
                .order("date.desc"),
        )
        .await?;
    let latest_reading = match weekly.first() {
        Some(reading) => Some(reading.clone()),
        None => latest_readings(db, &[patient_id]).await?.remove(&patient_id),
    };

    let food_logs: Vec<FoodLog> = db
        .fetch_all(
            db.table("food_logs")
                .select("*")
                .eq("user_id", patient_id.to_string())
                .order("created_at.desc")
                .limit(5),
        )
        .await?;
    let weekly_progress: Option<WeeklyProgress> = db
        .fetch_optional(
            db.table("weekly_progress")
                .select("*")
                .eq("user_id", patient_id.to_string())
                .order("week_start_date.desc"),
        )
        .await?;

    let average = |values: Vec<f64>| {
        (!values.is_empty()).then(|| (values.iter().sum::<f64>() / values.len() as f64 * 10.0).round() / 10.0)
    };
    let health_metrics = WeeklyHealthMetrics {
        avg_heart_rate: average(weekly.iter().filter_map(|r| r.heart_rate.map(f64::from)).collect()),
        avg_blood_glucose: average(weekly.iter().filter_map(|r| r.blood_glucose).collect()),
        weekly_steps_avg: average(weekly.iter().filter_map(|r| r.steps.map(f64::from)).collect()),
    };

    let medical_insights = medical_insights(&health_metrics);
    let recent_food_analysis = food_logs
        .iter()
        .filter(|log| log.ai_analysis.is_some())
        .map(|log| MealAnalysisSummary {
            meal: log.meal_type.clone(),
            detected_food: log.detected_food(),
            score: log.diet_score,
        })
        .collect();

    Ok(Json(DoctorPatientDashboard {
        patient: summarize(&profile, users.get(&patient_id), latest_reading.as_ref()),
        doctor_assigned: doctor.full_name,
        latest_reading,
        health_metrics,
        weekly_progress,
        recent_food_analysis,
        medical_insights,
    }))
}

fn medical_insights(metrics: &WeeklyHealthMetrics) -> Vec<String> {
    let mut insights = Vec::new();
    match metrics.avg_heart_rate {
        Some(hr) if hr < 100.0 => insights.push("Patient shows stable heart rate patterns".to_string()),
        Some(_) => insights.push("Patient shows elevated heart rate patterns".to_string()),
        None => insights.push("No heart rate readings in the last 7 days".to_string()),
    }
    if let Some(glucose) = metrics.avg_blood_glucose {
        if (70.0..=140.0).contains(&glucose) {
            insights.push("Blood glucose levels within acceptable range".to_string());
        } else {
            insights.push(format!("Average blood glucose of {} mg/dL needs review", glucose));
        }
    }
    if metrics.weekly_steps_avg.is_some_and(|steps| steps >= 5000.0) {
        insights.push("Regular physical activity observed".to_string());
    }
    insights
}

/// `POST /doctors/patients/{id}/message`
pub async fn message_patient(
    State(state): State<AppState>,
    CurrentDoctor(doctor): CurrentDoctor,
    Path(patient_id): Path<i64>,
    Json(request): Json<DirectMessageRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    request.validate()?;
    assigned_profile(&state.db, &doctor, patient_id).await?;

    let title = request
        .title
        .unwrap_or_else(|| format!("Message from Dr. {}", doctor.full_name));
    let notification = deliver(
        &state,
        NewNotification::new(patient_id, NotificationType::Doctor, title, request.message)
            .from_sender(doctor.id, "doctor"),
    )
    .await?;

    Ok(Json(json!({
        "message": "Message sent successfully",
        "notification_id": notification.id,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insights_flag_elevated_heart_rate() {
        let metrics = WeeklyHealthMetrics {
            avg_heart_rate: Some(112.0),
            avg_blood_glucose: Some(95.0),
            weekly_steps_avg: Some(6500.0),
        };
        let insights = medical_insights(&metrics);
        assert_eq!(insights[0], "Patient shows elevated heart rate patterns");
        assert_eq!(insights.len(), 3);
    }

    #[test]
    fn insights_without_readings() {
        let insights = medical_insights(&WeeklyHealthMetrics::default());
        assert_eq!(insights, vec!["No heart rate readings in the last 7 days".to_string()]);
    }
}
