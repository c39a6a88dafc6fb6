use crate::{
    analytics::{
        analyze_health_trends, assess_health_risk, daily_health_score, generate_recommendations,
        vital_trend, TriageStatus,
    },
    auth::{generate_caregiver_id, CurrentCaregiver, CurrentUser},
    handlers::{
        ensure_caregiver_of, find_user, notifications::deliver, patient_ids_of, patient_name,
        profiles_by_user, users_by_id,
    },
    models::{
        AppointmentStatus, AppointmentView, CaregiverAppointment, CaregiverDashboard,
        CaregiverPatient, CaregiverRelationship, CaregiverRequestCreate, CaregiverRequestView,
        CaregiverTask, CaregiverType, DashboardPatient, DashboardStats, DirectMessageRequest,
        HealthData, MessageResponse, NewNotification, NewRelationship, Notification,
        NotificationType, PatientAlert, PatientInsights, RelationshipStatus, TaskStatus, TaskView,
        User, VolunteerRequest,
    },
    utils::{ApiError, ApiResult},
    AppState,
};
use axum::{
    extract::{Path, State},
    Json,
};
use chrono::{Duration, SecondsFormat, Utc};
use serde_json::json;
use std::collections::HashMap;
use validator::Validate;

const INSIGHT_DAYS: i64 = 30;

/// `POST /caregivers/volunteer`
pub async fn volunteer(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(request): Json<VolunteerRequest>,
) -> ApiResult<Json<User>> {
    request.validate()?;

    let mut changes = json!({ "is_caregiver": true });
    if user.caregiver_id.is_none() {
        changes["caregiver_id"] = json!(generate_caregiver_id());
    }
    if let Some(kind) = &request.caregiver_type {
        let kind = CaregiverType::parse(kind).ok_or_else(|| {
            ApiError::validation_error("caregiver_type must be family, friend or professional")
        })?;
        changes["caregiver_type"] = json!(kind.as_str());
    }
    if let Some(years) = request.experience_years {
        changes["experience_years"] = json!(years);
    }

    let updated = state
        .db
        .update_one(state.db.table("users").eq("id", user.id.to_string()), &changes, "User")
        .await?;
    tracing::info!(user_id = user.id, "User volunteered as caregiver");
    Ok(Json(updated))
}

/// `POST /caregivers/request`
pub async fn request_patient(
    State(state): State<AppState>,
    CurrentCaregiver(caregiver): CurrentCaregiver,
    Json(request): Json<CaregiverRequestCreate>,
) -> ApiResult<Json<CaregiverRelationship>> {
    request.validate()?;
    if request.patient_id == caregiver.id {
        return Err(ApiError::validation_error("You cannot be your own caregiver"));
    }
    let patient = find_user(&state.db, request.patient_id).await?;

    let existing = state
        .db
        .count(
            state
                .db
                .table("caregiver_relationships")
                .select("id")
                .eq("caregiver_id", caregiver.id.to_string())
                .eq("patient_id", patient.id.to_string()),
        )
        .await?;
    if existing > 0 {
        return Err(ApiError::validation_error("A request for this patient already exists"));
    }

    let relationship: CaregiverRelationship = state
        .db
        .insert(
            "caregiver_relationships",
            &NewRelationship {
                caregiver_id: caregiver.id,
                patient_id: patient.id,
                relationship_type: request
                    .relationship_type
                    .unwrap_or_else(|| caregiver.caregiver_type.clone().unwrap_or_else(|| "family".into())),
                status: RelationshipStatus::Pending,
            },
        )
        .await?;

    let caregiver_name = caregiver.display_name();
    deliver(
        &state,
        NewNotification::new(
            patient.id,
            NotificationType::Caregiver,
            "New caregiver request",
            format!("{} wants to be your caregiver", caregiver_name),
        )
        .from_sender(caregiver.id, "caregiver"),
    )
    .await?;

    if let Some(email) = patient.email.clone() {
        let services = state.services.clone();
        let patient_display = patient.display_name();
        tokio::spawn(async move {
            services
                .email
                .send_caregiver_request(&email, &patient_display, &caregiver_name)
                .await;
        });
    }

    Ok(Json(relationship))
}

/// `GET /caregivers/requests`
pub async fn pending_requests(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> ApiResult<Json<Vec<CaregiverRequestView>>> {
    let requests: Vec<CaregiverRelationship> = state
        .db
        .fetch_all(
            state
                .db
                .table("caregiver_relationships")
                .select("*")
                .eq("patient_id", user.id.to_string())
                .eq("status", RelationshipStatus::Pending.as_str())
                .order("created_at.desc"),
        )
        .await?;

    let ids: Vec<i64> = requests.iter().map(|r| r.caregiver_id).collect();
    let caregivers = users_by_id(&state.db, &ids).await?;

    Ok(Json(
        requests
            .into_iter()
            .map(|r| {
                let caregiver = caregivers.get(&r.caregiver_id);
                CaregiverRequestView {
                    id: r.id,
                    caregiver_id: r.caregiver_id,
                    caregiver_name: caregiver
                        .map(User::display_name)
                        .unwrap_or_else(|| "Unknown caregiver".into()),
                    caregiver_code: caregiver.and_then(|c| c.caregiver_id.clone()),
                    relationship_type: r.relationship_type,
                    status: r.status,
                    created_at: r.created_at,
                }
            })
            .collect(),
    ))
}

async fn respond_to_request(
    state: &AppState,
    patient: &User,
    request_id: i64,
    decision: RelationshipStatus,
) -> ApiResult<CaregiverRelationship> {
    let relationship: CaregiverRelationship = state
        .db
        .fetch_one(
            state
                .db
                .table("caregiver_relationships")
                .select("*")
                .eq("id", request_id.to_string())
                .eq("patient_id", patient.id.to_string()),
            "Caregiver request",
        )
        .await?;
    if relationship.status != RelationshipStatus::Pending {
        return Err(ApiError::validation_error(format!(
            "Request already {}",
            relationship.status.as_str()
        )));
    }

    let updated: CaregiverRelationship = state
        .db
        .update_one(
            state.db.table("caregiver_relationships").eq("id", request_id.to_string()),
            &json!({ "status": decision }),
            "Caregiver request",
        )
        .await?;

    let verb = match decision {
        RelationshipStatus::Approved => "approved",
        _ => "declined",
    };
    deliver(
        state,
        NewNotification::new(
            relationship.caregiver_id,
            NotificationType::Caregiver,
            format!("Caregiver request {}", verb),
            format!("{} {} your caregiver request", patient.display_name(), verb),
        )
        .from_sender(patient.id, "user"),
    )
    .await?;

    tracing::info!(request_id, status = decision.as_str(), "Caregiver request answered");
    Ok(updated)
}

/// `POST /caregivers/requests/{id}/approve`
pub async fn approve_request(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(request_id): Path<i64>,
) -> ApiResult<Json<CaregiverRelationship>> {
    Ok(Json(
        respond_to_request(&state, &user, request_id, RelationshipStatus::Approved).await?,
    ))
}

/// `POST /caregivers/requests/{id}/reject`
pub async fn reject_request(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(request_id): Path<i64>,
) -> ApiResult<Json<CaregiverRelationship>> {
    Ok(Json(
        respond_to_request(&state, &user, request_id, RelationshipStatus::Rejected).await?,
    ))
}

/// `GET /caregivers/patients`
pub async fn my_patients(
    State(state): State<AppState>,
    CurrentCaregiver(caregiver): CurrentCaregiver,
) -> ApiResult<Json<Vec<CaregiverPatient>>> {
    let relationships: Vec<CaregiverRelationship> = state
        .db
        .fetch_all(
            state
                .db
                .table("caregiver_relationships")
                .select("*")
                .eq("caregiver_id", caregiver.id.to_string())
                .eq("status", RelationshipStatus::Approved.as_str()),
        )
        .await?;

    let ids: Vec<i64> = relationships.iter().map(|r| r.patient_id).collect();
    let users = users_by_id(&state.db, &ids).await?;
    let profiles = profiles_by_user(&state.db, &ids).await?;

    Ok(Json(
        relationships
            .into_iter()
            .map(|r| {
                let user = users.get(&r.patient_id);
                let profile = profiles.get(&r.patient_id);
                CaregiverPatient {
                    relationship_id: r.id,
                    user_id: r.patient_id,
                    patient_id: user.and_then(|u| u.patient_id.clone()),
                    name: patient_name(user, profile),
                    email: user.and_then(|u| u.email.clone()),
                    relationship_type: r.relationship_type,
                    age: profile.and_then(|p| p.age),
                    chronic_conditions: profile.map(|p| p.chronic_conditions.clone()).unwrap_or_default(),
                    since: r.created_at,
                }
            })
            .collect(),
    ))
}

/// `GET /caregivers/dashboard`
pub async fn dashboard(
    State(state): State<AppState>,
    CurrentCaregiver(caregiver): CurrentCaregiver,
) -> ApiResult<Json<CaregiverDashboard>> {
    let db = &state.db;
    let now = Utc::now();
    let week_ago = now - Duration::days(7);
    let fortnight_ago = now - Duration::days(14);
    let ts = |t: chrono::DateTime<Utc>| t.to_rfc3339_opts(SecondsFormat::Secs, true);

    let patient_ids = patient_ids_of(db, caregiver.id).await?;
    let users = users_by_id(db, &patient_ids).await?;
    let profiles = profiles_by_user(db, &patient_ids).await?;

    let readings: Vec<HealthData> = if patient_ids.is_empty() {
        Vec::new()
    } else {
        db.fetch_all(
            db.table("health_data")
                .select("*")
                .in_("user_id", patient_ids.iter().map(i64::to_string))
                .gte("date", ts(fortnight_ago))
                .order("date.desc"),
        )
        .await?
    };

    // Readings are newest first, so the first seen per patient is the latest
    let mut latest: HashMap<i64, &HealthData> = HashMap::new();
    for reading in &readings {
        latest.entry(reading.user_id).or_insert(reading);
    }

    let tasks: Vec<CaregiverTask> = db
        .fetch_all(
            db.table("caregiver_tasks")
                .select("*")
                .eq("caregiver_id", caregiver.id.to_string()),
        )
        .await?;

    let today = now.date_naive();
    let day_start = today.and_hms_opt(0, 0, 0).unwrap_or_default().and_utc();
    let appointments: Vec<CaregiverAppointment> = db
        .fetch_all(
            db.table("caregiver_appointments")
                .select("*")
                .eq("caregiver_id", caregiver.id.to_string())
                .in_(
                    "status",
                    [AppointmentStatus::Scheduled.as_str(), AppointmentStatus::Confirmed.as_str()],
                )
                .gte("start_time", ts(day_start))
                .lt("start_time", ts(day_start + Duration::days(8)))
                .order("start_time.asc"),
        )
        .await?;

    let alerts: Vec<Notification> = if patient_ids.is_empty() {
        Vec::new()
    } else {
        db.fetch_all(
            db.table("notifications")
                .select("*")
                .in_("user_id", patient_ids.iter().map(i64::to_string))
                .in_("notification_type", ["critical", "warning"])
                .order("created_at.desc")
                .limit(5),
        )
        .await?
    };

    let name_of = |id: i64| patient_name(users.get(&id), profiles.get(&id));
    let is_open = |t: &CaregiverTask| !matches!(t.status, TaskStatus::Completed | TaskStatus::Cancelled);

    let scores: Vec<f64> = latest
        .values()
        .map(|r| daily_health_score(r.steps.unwrap_or(0), r.water_intake.unwrap_or(0), 0) as f64)
        .collect();
    let avg_health_score = if scores.is_empty() {
        0.0
    } else {
        (scores.iter().sum::<f64>() / scores.len() as f64 * 10.0).round() / 10.0
    };

    let stats = DashboardStats {
        total_patients: patient_ids.len(),
        active_patients: latest.values().filter(|r| r.date >= week_ago).count(),
        critical_patients: latest
            .values()
            .filter(|r| TriageStatus::from_heart_rate(r.heart_rate) == TriageStatus::Critical)
            .count(),
        pending_tasks: tasks.iter().filter(|t| is_open(t)).count(),
        completed_tasks_week: tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Completed && t.completed_at.is_some_and(|c| c >= week_ago))
            .count(),
        overdue_tasks: tasks
            .iter()
            .filter(|t| t.status != TaskStatus::Cancelled && t.is_overdue_at(now))
            .count(),
        today_appointments: appointments
            .iter()
            .filter(|a| a.start_time.date_naive() == today)
            .count(),
        upcoming_appointments: appointments.iter().filter(|a| a.start_time >= now).count(),
        avg_health_score,
    };

    let mut recent: Vec<&HealthData> = latest.values().copied().collect();
    recent.sort_by(|a, b| b.date.cmp(&a.date));
    let recent_patients = recent
        .into_iter()
        .take(5)
        .map(|r| DashboardPatient {
            user_id: r.user_id,
            patient_id: users.get(&r.user_id).and_then(|u| u.patient_id.clone()),
            name: name_of(r.user_id),
            latest_heart_rate: r.heart_rate,
            latest_blood_pressure: r.blood_pressure.clone(),
            last_reading_at: Some(r.date),
            status: TriageStatus::from_heart_rate(r.heart_rate),
        })
        .collect();

    let upcoming_tasks = upcoming_open_tasks(&tasks)
        .into_iter()
        .map(|t| TaskView {
            patient_name: name_of(t.patient_id),
            is_overdue: t.is_overdue_at(now),
            task: t.clone(),
        })
        .collect();

    let today_appointments = appointments
        .iter()
        .filter(|a| a.start_time.date_naive() == today)
        .map(|a| AppointmentView {
            patient_name: name_of(a.patient_id),
            color: a.appointment_type.color(),
            appointment: a.clone(),
        })
        .collect();

    let split = |metric: fn(&HealthData) -> Option<f64>| {
        let (current, previous): (Vec<&HealthData>, Vec<&HealthData>) =
            readings.iter().partition(|r| r.date >= week_ago);
        (
            current.into_iter().filter_map(metric).collect::<Vec<_>>(),
            previous.into_iter().filter_map(metric).collect::<Vec<_>>(),
        )
    };
    let (hr_now, hr_before) = split(|r| r.heart_rate.map(f64::from));
    let (glucose_now, glucose_before) = split(|r| r.blood_glucose);
    let (steps_now, steps_before) = split(|r| r.steps.map(f64::from));
    let vital_trends = [
        vital_trend("Heart Rate", "bpm", &hr_now, &hr_before),
        vital_trend("Blood Glucose", "mg/dL", &glucose_now, &glucose_before),
        vital_trend("Steps", "steps", &steps_now, &steps_before),
    ]
    .into_iter()
    .flatten()
    .collect();

    Ok(Json(CaregiverDashboard {
        stats,
        recent_patients,
        upcoming_tasks,
        today_appointments,
        recent_alerts: alerts
            .into_iter()
            .map(|n| PatientAlert {
                patient_id: n.user_id,
                patient_name: name_of(n.user_id),
                notification: n,
            })
            .collect(),
        vital_trends,
    }))
}

/// Pending and in-progress tasks by due date, undated ones last
fn upcoming_open_tasks(tasks: &[CaregiverTask]) -> Vec<&CaregiverTask> {
    let mut open: Vec<&CaregiverTask> = tasks
        .iter()
        .filter(|t| matches!(t.status, TaskStatus::Pending | TaskStatus::InProgress))
        .collect();
    open.sort_by_key(|t| (t.due_date.is_none(), t.due_date));
    open.truncate(10);
    open
}

/// `GET /caregivers/patients/{id}/insights`
pub async fn patient_insights(
    State(state): State<AppState>,
    CurrentCaregiver(caregiver): CurrentCaregiver,
    Path(patient_id): Path<i64>,
) -> ApiResult<Json<PatientInsights>> {
    let db = &state.db;
    ensure_caregiver_of(db, caregiver.id, patient_id).await?;

    let since = Utc::now() - Duration::days(INSIGHT_DAYS);
    let readings: Vec<HealthData> = db
        .fetch_all(
            db.table("health_data")
                .select("*")
                .eq("user_id", patient_id.to_string())
                .gte("date", since.to_rfc3339_opts(SecondsFormat::Secs, true))
                .order("date.asc"),
        )
        .await?;

    let users = users_by_id(db, &[patient_id]).await?;
    let profiles = profiles_by_user(db, &[patient_id]).await?;

    let trends = analyze_health_trends(&readings);
    let risk = assess_health_risk(&trends);
    let recommendations = generate_recommendations(&trends, &risk);

    Ok(Json(PatientInsights {
        patient_id,
        patient_name: patient_name(users.get(&patient_id), profiles.get(&patient_id)),
        period_days: INSIGHT_DAYS,
        latest_reading: readings.last().cloned(),
        trends,
        risk_assessment: risk,
        recommendations,
    }))
}

/// `POST /caregivers/patients/{id}/message`
pub async fn message_patient(
    State(state): State<AppState>,
    CurrentCaregiver(caregiver): CurrentCaregiver,
    Path(patient_id): Path<i64>,
    Json(request): Json<DirectMessageRequest>,
) -> ApiResult<Json<MessageResponse>> {
    request.validate()?;
    ensure_caregiver_of(&state.db, caregiver.id, patient_id).await?;

    let title = request
        .title
        .unwrap_or_else(|| format!("Message from {}", caregiver.display_name()));
    deliver(
        &state,
        NewNotification::new(patient_id, NotificationType::Caregiver, title, request.message)
            .from_sender(caregiver.id, "caregiver"),
    )
    .await?;

    Ok(Json(MessageResponse::new("Message sent to patient")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(id: i64, status: &str, due_date: Option<&str>) -> CaregiverTask {
        serde_json::from_value(json!({
            "id": id,
            "caregiver_id": 1,
            "patient_id": 2,
            "assigned_by": null,
            "title": format!("task {id}"),
            "status": status,
            "due_date": due_date,
        }))
        .unwrap()
    }

    #[test]
    fn upcoming_tasks_keep_overdue_and_undated_work() {
        let tasks = vec![
            task(1, "pending", None),
            task(2, "in_progress", Some("2099-01-01T09:00:00Z")),
            task(3, "pending", Some("2020-01-01T09:00:00Z")),
            task(4, "completed", Some("2021-01-01T09:00:00Z")),
            task(5, "cancelled", None),
        ];

        let ids: Vec<i64> = upcoming_open_tasks(&tasks).iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![3, 2, 1]);
        assert!(upcoming_open_tasks(&tasks)[0].is_overdue_at(Utc::now()));
    }

    #[test]
    fn upcoming_tasks_are_capped_at_ten() {
        let tasks: Vec<CaregiverTask> = (0..15).map(|i| task(i, "pending", None)).collect();
        assert_eq!(upcoming_open_tasks(&tasks).len(), 10);
    }
}
