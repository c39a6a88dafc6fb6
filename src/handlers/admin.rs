use crate::{
    auth::{generate_initial_password, is_valid_doctor_id, CurrentAdmin},
    handlers::{find_user, users::get_or_create_profile},
    models::{
        AssignDoctorRequest, Doctor, DoctorCreateRequest, DoctorCreatedResponse, MessageResponse,
        NewDoctor, User, UserProfile,
    },
    utils::{ApiError, ApiResult},
    AppState,
};
use axum::{
    extract::{Path, State},
    Json,
};
use serde_json::json;
use validator::Validate;

/// `POST /admin/doctors`
pub async fn create_doctor(
    State(state): State<AppState>,
    CurrentAdmin(admin): CurrentAdmin,
    Json(request): Json<DoctorCreateRequest>,
) -> ApiResult<Json<DoctorCreatedResponse>> {
    if !admin.is_superadmin {
        return Err(ApiError::authorization_error("Superadmin privileges required"));
    }
    request.validate()?;

    let doctor_id = request.doctor_id.trim().to_uppercase();
    if !is_valid_doctor_id(&doctor_id) {
        return Err(ApiError::validation_error(
            "doctor_id must be 8 alphanumeric characters starting with DOC",
        ));
    }

    let db = &state.db;
    let taken = db
        .count(db.table("doctors").select("id").eq("doctor_id", &doctor_id))
        .await?;
    if taken > 0 {
        return Err(ApiError::validation_error("Doctor ID already exists"));
    }

    let initial_password = generate_initial_password();
    let doctor: Doctor = db
        .insert(
            "doctors",
            &NewDoctor {
                doctor_id,
                hashed_password: state.auth_service.hash_password(&initial_password)?,
                full_name: request.full_name.trim().to_string(),
                specialization: request.specialization,
                hospital: request.hospital,
                email: request.email.map(|e| e.trim().to_lowercase()),
                created_by: admin.email.clone(),
            },
        )
        .await?;

    tracing::info!(doctor_id = %doctor.doctor_id, admin = %admin.email, "Doctor account created");
    Ok(Json(DoctorCreatedResponse {
        doctor,
        initial_password,
    }))
}

/// `GET /admin/doctors`
pub async fn list_doctors(
    State(state): State<AppState>,
    CurrentAdmin(_admin): CurrentAdmin,
) -> ApiResult<Json<Vec<Doctor>>> {
    let doctors = state
        .db
        .fetch_all(state.db.table("doctors").select("*").order("created_at.desc"))
        .await?;
    Ok(Json(doctors))
}

/// `PUT /admin/patients/{id}/doctor`
///
/// A `null` doctor_id clears the assignment.
pub async fn assign_doctor(
    State(state): State<AppState>,
    CurrentAdmin(admin): CurrentAdmin,
    Path(patient_id): Path<i64>,
    Json(request): Json<AssignDoctorRequest>,
) -> ApiResult<Json<UserProfile>> {
    let db = &state.db;
    find_user(db, patient_id).await?;

    let doctor_id = match request.doctor_id.as_deref().map(str::trim) {
        Some(id) if !id.is_empty() => {
            let doctor: Doctor = db
                .fetch_one(db.table("doctors").select("*").eq("doctor_id", id), "Doctor")
                .await?;
            if !doctor.is_active {
                return Err(ApiError::validation_error("Doctor account is inactive"));
            }
            Some(doctor.doctor_id)
        }
        _ => None,
    };

    get_or_create_profile(db, patient_id).await?;
    let profile = db
        .update_one(
            db.table("user_profiles").eq("user_id", patient_id.to_string()),
            &json!({ "doctor_id": doctor_id }),
            "Profile",
        )
        .await?;

    tracing::info!(patient_id, doctor_id = ?doctor_id, admin = %admin.email, "Doctor assignment changed");
    Ok(Json(profile))
}

/// `POST /admin/users/{id}/deactivate`
pub async fn deactivate_user(
    State(state): State<AppState>,
    CurrentAdmin(admin): CurrentAdmin,
    Path(user_id): Path<i64>,
) -> ApiResult<Json<MessageResponse>> {
    let _: User = state
        .db
        .update_one(
            state.db.table("users").eq("id", user_id.to_string()),
            &json!({ "is_active": false }),
            "User",
        )
        .await?;

    tracing::info!(user_id, admin = %admin.email, "User deactivated");
    Ok(Json(MessageResponse::new("User deactivated")))
}
