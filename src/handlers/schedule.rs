use crate::{
    auth::CurrentCaregiver,
    handlers::{ensure_caregiver_of, find_user, patient_name, profiles_by_user, users_by_id},
    models::{
        AppointmentCreate, AppointmentStatus, AppointmentUpdate, AppointmentView,
        CalendarQuery, CalendarView, CancelRequest, CaregiverAppointment, NewAppointment,
        ScheduleFilter, UpcomingQuery,
    },
    utils::{ApiError, ApiResult},
    AppState,
};
use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::{DateTime, Datelike, Duration, NaiveDate, SecondsFormat, Utc};
use postgrest::Builder;
use std::collections::BTreeMap;
use validator::Validate;

const DEFAULT_UPCOMING_DAYS: i64 = 7;

fn ts(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn start_of(day: NaiveDate) -> DateTime<Utc> {
    day.and_hms_opt(0, 0, 0).unwrap_or_default().and_utc()
}

fn duration_minutes(start: DateTime<Utc>, end: DateTime<Utc>) -> ApiResult<i64> {
    if end <= start {
        return Err(ApiError::validation_error("end_time must be after start_time"));
    }
    Ok((end - start).num_minutes())
}

fn caregiver_appointments(state: &AppState, caregiver_id: i64) -> Builder {
    state
        .db
        .table("caregiver_appointments")
        .select("*")
        .eq("caregiver_id", caregiver_id.to_string())
}

async fn with_patient_names(
    state: &AppState,
    appointments: Vec<CaregiverAppointment>,
) -> ApiResult<Vec<AppointmentView>> {
    let mut ids: Vec<i64> = appointments.iter().map(|a| a.patient_id).collect();
    ids.sort_unstable();
    ids.dedup();
    let users = users_by_id(&state.db, &ids).await?;
    let profiles = profiles_by_user(&state.db, &ids).await?;

    Ok(appointments
        .into_iter()
        .map(|appointment| AppointmentView {
            patient_name: patient_name(
                users.get(&appointment.patient_id),
                profiles.get(&appointment.patient_id),
            ),
            color: appointment.appointment_type.color(),
            appointment,
        })
        .collect())
}

async fn owned_appointment(
    state: &AppState,
    caregiver_id: i64,
    appointment_id: i64,
) -> ApiResult<CaregiverAppointment> {
    state
        .db
        .fetch_one(
            caregiver_appointments(state, caregiver_id).eq("id", appointment_id.to_string()),
            "Appointment",
        )
        .await
}

async fn set_status(
    state: &AppState,
    appointment_id: i64,
    update: AppointmentUpdate,
) -> ApiResult<AppointmentView> {
    let updated: CaregiverAppointment = state
        .db
        .update_one(
            state
                .db
                .table("caregiver_appointments")
                .eq("id", appointment_id.to_string()),
            &update,
            "Appointment",
        )
        .await?;
    let mut views = with_patient_names(state, vec![updated]).await?;
    views
        .pop()
        .ok_or_else(|| ApiError::internal_error("Appointment vanished after update"))
}

/// `GET /caregiver/schedule`
pub async fn list_appointments(
    State(state): State<AppState>,
    CurrentCaregiver(caregiver): CurrentCaregiver,
    Query(filter): Query<ScheduleFilter>,
) -> ApiResult<Json<Vec<AppointmentView>>> {
    let mut query = caregiver_appointments(&state, caregiver.id);
    if let Some(start) = filter.start_date {
        query = query.gte("start_time", ts(start_of(start)));
    }
    if let Some(end) = filter.end_date {
        query = query.lt("start_time", ts(start_of(end) + Duration::days(1)));
    }
    if let Some(patient_id) = filter.patient_id {
        query = query.eq("patient_id", patient_id.to_string());
    }
    if let Some(status) = filter.status {
        query = query.eq("status", status.as_str());
    }

    let appointments = state.db.fetch_all(query.order("start_time.asc")).await?;
    Ok(Json(with_patient_names(&state, appointments).await?))
}

/// `POST /caregiver/schedule`
pub async fn create_appointment(
    State(state): State<AppState>,
    CurrentCaregiver(caregiver): CurrentCaregiver,
    Json(request): Json<AppointmentCreate>,
) -> ApiResult<Json<AppointmentView>> {
    request.validate()?;
    let duration = duration_minutes(request.start_time, request.end_time)?;
    ensure_caregiver_of(&state.db, caregiver.id, request.patient_id).await?;
    let patient = find_user(&state.db, request.patient_id).await?;

    let appointment: CaregiverAppointment = state
        .db
        .insert(
            "caregiver_appointments",
            &NewAppointment {
                caregiver_id: caregiver.id,
                patient_id: patient.id,
                title: request.title,
                description: request.description,
                appointment_type: request.appointment_type,
                status: AppointmentStatus::Scheduled,
                start_time: request.start_time,
                end_time: request.end_time,
                duration_minutes: duration,
                location: request.location,
                is_virtual: request.is_virtual,
                meeting_link: request.meeting_link,
                doctor_id: request.doctor_id,
                notes: request.notes,
            },
        )
        .await?;

    tracing::info!(appointment_id = appointment.id, caregiver_id = caregiver.id, "Appointment scheduled");
    let profiles = profiles_by_user(&state.db, &[patient.id]).await?;
    Ok(Json(AppointmentView {
        patient_name: patient_name(Some(&patient), profiles.get(&patient.id)),
        color: appointment.appointment_type.color(),
        appointment,
    }))
}

/// `GET /caregiver/schedule/today`
pub async fn today_appointments(
    State(state): State<AppState>,
    CurrentCaregiver(caregiver): CurrentCaregiver,
) -> ApiResult<Json<Vec<AppointmentView>>> {
    let start = start_of(Utc::now().date_naive());
    let appointments = state
        .db
        .fetch_all(
            caregiver_appointments(&state, caregiver.id)
                .gte("start_time", ts(start))
                .lt("start_time", ts(start + Duration::days(1)))
                .order("start_time.asc"),
        )
        .await?;
    Ok(Json(with_patient_names(&state, appointments).await?))
}

/// `GET /caregiver/schedule/upcoming?days=`
pub async fn upcoming_appointments(
    State(state): State<AppState>,
    CurrentCaregiver(caregiver): CurrentCaregiver,
    Query(query): Query<UpcomingQuery>,
) -> ApiResult<Json<Vec<AppointmentView>>> {
    let days = query.days.unwrap_or(DEFAULT_UPCOMING_DAYS);
    if !(1..=365).contains(&days) {
        return Err(ApiError::validation_error("days must be between 1 and 365"));
    }

    let start = start_of(Utc::now().date_naive());
    let appointments = state
        .db
        .fetch_all(
            caregiver_appointments(&state, caregiver.id)
                .gte("start_time", ts(start))
                .lte("start_time", ts(start + Duration::days(days)))
                .in_(
                    "status",
                    [AppointmentStatus::Scheduled.as_str(), AppointmentStatus::Confirmed.as_str()],
                )
                .order("start_time.asc"),
        )
        .await?;
    Ok(Json(with_patient_names(&state, appointments).await?))
}

/// `GET /caregiver/schedule/calendar?month&year`
pub async fn calendar(
    State(state): State<AppState>,
    CurrentCaregiver(caregiver): CurrentCaregiver,
    Query(query): Query<CalendarQuery>,
) -> ApiResult<Json<CalendarView>> {
    let today = Utc::now().date_naive();
    let (month, year) = match (query.month, query.year) {
        (Some(month), Some(year)) => (month, year),
        _ => (today.month(), today.year()),
    };
    let first = NaiveDate::from_ymd_opt(year, month, 1)
        .ok_or_else(|| ApiError::validation_error("Invalid month or year"))?;
    let next_month = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)
    }
    .ok_or_else(|| ApiError::validation_error("Invalid month or year"))?;

    let appointments = state
        .db
        .fetch_all(
            caregiver_appointments(&state, caregiver.id)
                .gte("start_time", ts(start_of(first)))
                .lt("start_time", ts(start_of(next_month)))
                .order("start_time.asc"),
        )
        .await?;
    let views = with_patient_names(&state, appointments).await?;

    let total_appointments = views.len();
    let mut calendar_data: BTreeMap<String, Vec<AppointmentView>> = BTreeMap::new();
    for view in views {
        let day = view.appointment.start_time.date_naive().to_string();
        calendar_data.entry(day).or_default().push(view);
    }

    Ok(Json(CalendarView {
        month,
        year,
        calendar_data,
        total_appointments,
    }))
}

/// `PUT /caregiver/schedule/{id}`
pub async fn update_appointment(
    State(state): State<AppState>,
    CurrentCaregiver(caregiver): CurrentCaregiver,
    Path(appointment_id): Path<i64>,
    Json(mut update): Json<AppointmentUpdate>,
) -> ApiResult<Json<AppointmentView>> {
    update.validate()?;
    let current = owned_appointment(&state, caregiver.id, appointment_id).await?;

    if update.start_time.is_some() || update.end_time.is_some() {
        let start = update.start_time.unwrap_or(current.start_time);
        let end = update.end_time.unwrap_or(current.end_time);
        update.duration_minutes = Some(duration_minutes(start, end)?);
    }
    update.updated_at = Some(Utc::now());

    Ok(Json(set_status(&state, appointment_id, update).await?))
}

/// `POST /caregiver/schedule/{id}/cancel`
pub async fn cancel_appointment(
    State(state): State<AppState>,
    CurrentCaregiver(caregiver): CurrentCaregiver,
    Path(appointment_id): Path<i64>,
    request: Option<Json<CancelRequest>>,
) -> ApiResult<Json<AppointmentView>> {
    let current = owned_appointment(&state, caregiver.id, appointment_id).await?;
    if current.status == AppointmentStatus::Completed {
        return Err(ApiError::validation_error("Completed appointments cannot be cancelled"));
    }

    let reason = match request {
        Some(Json(request)) => {
            request.validate()?;
            request.reason.filter(|r| !r.trim().is_empty())
        }
        None => None,
    };
    let notes = reason.map(|reason| match &current.notes {
        Some(notes) if !notes.is_empty() => format!("{}\nCancelled: {}", notes, reason),
        _ => format!("Cancelled: {}", reason),
    });

    let update = AppointmentUpdate {
        status: Some(AppointmentStatus::Cancelled),
        notes,
        updated_at: Some(Utc::now()),
        ..Default::default()
    };
    tracing::info!(appointment_id, "Appointment cancelled");
    Ok(Json(set_status(&state, appointment_id, update).await?))
}

/// `POST /caregiver/schedule/{id}/complete`
pub async fn complete_appointment(
    State(state): State<AppState>,
    CurrentCaregiver(caregiver): CurrentCaregiver,
    Path(appointment_id): Path<i64>,
) -> ApiResult<Json<AppointmentView>> {
    let current = owned_appointment(&state, caregiver.id, appointment_id).await?;
    if current.status == AppointmentStatus::Cancelled {
        return Err(ApiError::validation_error("Cancelled appointments cannot be completed"));
    }

    let update = AppointmentUpdate {
        status: Some(AppointmentStatus::Completed),
        updated_at: Some(Utc::now()),
        ..Default::default()
    };
    Ok(Json(set_status(&state, appointment_id, update).await?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn duration_is_derived_in_minutes() {
        let start = Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2025, 3, 1, 10, 30, 0).unwrap();
        assert_eq!(duration_minutes(start, end).unwrap(), 90);
    }

    #[test]
    fn end_before_start_is_rejected() {
        let start = Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap();
        let err = duration_minutes(start, start).unwrap_err();
        assert_eq!(err.status(), axum::http::StatusCode::BAD_REQUEST);
    }
}
