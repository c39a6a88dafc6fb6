use crate::{
    analytics::bmi,
    auth::CurrentUser,
    db::Database,
    models::{
        EmergencyContact, EmergencyContactCreate, MessageResponse, ProfileUpdate, User,
        UserProfile, UserSearchQuery, UserSearchResult,
    },
    services::storage::{content_type_for, image_extension},
    utils::{ApiError, ApiResult},
    AppState,
};
use axum::{
    extract::{Multipart, Path, Query, State},
    Json,
};
use bytes::Bytes;
use serde_json::json;
use validator::Validate;

const SEARCH_LIMIT: usize = 20;

/// `GET /users/me`
pub async fn me(CurrentUser(user): CurrentUser) -> Json<User> {
    Json(user)
}

/// Profile row for `user_id`, created empty on first access
pub(crate) async fn get_or_create_profile(db: &Database, user_id: i64) -> ApiResult<UserProfile> {
    let existing = db
        .fetch_optional(db.table("user_profiles").select("*").eq("user_id", user_id.to_string()))
        .await?;
    match existing {
        Some(profile) => Ok(profile),
        None => db.insert("user_profiles", &json!({ "user_id": user_id })).await,
    }
}

/// `GET /users/profile`
pub async fn get_profile(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> ApiResult<Json<UserProfile>> {
    Ok(Json(get_or_create_profile(&state.db, user.id).await?))
}

/// `PUT /users/profile`
pub async fn update_profile(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(update): Json<ProfileUpdate>,
) -> ApiResult<Json<UserProfile>> {
    update.validate()?;
    let current = get_or_create_profile(&state.db, user.id).await?;

    let mut merged = current.clone();
    if update.full_name.is_some() {
        merged.full_name = update.full_name.clone();
    }
    if update.gender.is_some() {
        merged.gender = update.gender.clone();
    }
    merged.age = update.age.or(current.age);
    merged.weight = update.weight.or(current.weight);
    merged.height = update.height.or(current.height);

    let mut changes = serde_json::to_value(&update)?;
    if let (Some(weight), Some(height)) = (merged.weight, merged.height) {
        if let Some(bmi) = bmi(weight, height) {
            changes["bmi"] = json!(bmi);
        }
    }
    changes["profile_completed"] = json!(merged.is_complete());

    let profile = state
        .db
        .update_one(
            state.db.table("user_profiles").eq("user_id", user.id.to_string()),
            &changes,
            "Profile",
        )
        .await?;
    Ok(Json(profile))
}

/// `POST /users/upload-profile-image`
pub async fn upload_profile_image(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    mut multipart: Multipart,
) -> ApiResult<Json<serde_json::Value>> {
    let (ext, content) = read_image_field(&mut multipart, state.config.upload.max_image_size).await?;

    let name = format!("{}_{}.{}", user.id, uuid::Uuid::new_v4().simple(), ext);
    let stored = state
        .services
        .storage
        .store("profile_images", &name, content_type_for(&ext), content)
        .await?;

    get_or_create_profile(&state.db, user.id).await?;
    let _: UserProfile = state
        .db
        .update_one(
            state.db.table("user_profiles").eq("user_id", user.id.to_string()),
            &json!({ "profile_image_url": stored.url }),
            "Profile",
        )
        .await?;

    tracing::info!(user_id = user.id, backend = stored.backend, "Profile image uploaded");
    Ok(Json(json!({
        "message": "Profile image uploaded successfully",
        "profile_image_url": stored.url,
    })))
}

/// First file part of a multipart body, checked for type and size
pub(crate) async fn read_image_field(
    multipart: &mut Multipart,
    max_size: u64,
) -> ApiResult<(String, Bytes)> {
    while let Some(field) = multipart.next_field().await? {
        if field.file_name().is_none() {
            continue;
        }
        let filename = field.file_name().unwrap_or_default().to_string();
        let ext = image_extension(&filename).ok_or_else(|| {
            ApiError::unsupported_media_type()
                .with_details(json!({ "allowed": ["jpg", "jpeg", "png", "gif", "webp"] }))
        })?;

        let content = field.bytes().await?;
        if content.len() as u64 > max_size {
            return Err(ApiError::payload_too_large());
        }
        if content.is_empty() {
            return Err(ApiError::validation_error("Uploaded file is empty"));
        }
        return Ok((ext, content));
    }
    Err(ApiError::validation_error("No file uploaded"))
}

/// `GET /users/profile-image`
pub async fn get_profile_image(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> ApiResult<Json<serde_json::Value>> {
    let profile: Option<UserProfile> = state
        .db
        .fetch_optional(
            state
                .db
                .table("user_profiles")
                .select("*")
                .eq("user_id", user.id.to_string()),
        )
        .await?;

    let url = profile
        .and_then(|p| p.profile_image_url)
        .ok_or_else(|| ApiError::not_found_error("No profile image"))?;
    Ok(Json(json!({ "profile_image_url": url })))
}

/// `GET /users/search?query=`
pub async fn search_users(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(query): Query<UserSearchQuery>,
) -> ApiResult<Json<Vec<UserSearchResult>>> {
    // PostgREST filter syntax reserves these characters
    let term: String = query
        .query
        .trim()
        .chars()
        .filter(|c| !matches!(c, ',' | '(' | ')' | '*' | '"'))
        .collect();
    if term.chars().count() < 2 {
        return Err(ApiError::validation_error("Search query must be at least 2 characters"));
    }

    let pattern = format!("*{}*", term);
    let filter = ["email", "username", "patient_id", "caregiver_id"]
        .iter()
        .map(|column| format!("{}.ilike.{}", column, pattern))
        .collect::<Vec<_>>()
        .join(",");

    let users: Vec<User> = state
        .db
        .fetch_all(
            state
                .db
                .table("users")
                .select("*")
                .or(filter)
                .neq("id", user.id.to_string())
                .eq("is_active", "true")
                .limit(SEARCH_LIMIT),
        )
        .await?;

    Ok(Json(users.into_iter().map(UserSearchResult::from).collect()))
}

/// `GET /users/emergency-contacts`
pub async fn list_emergency_contacts(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> ApiResult<Json<Vec<EmergencyContact>>> {
    let contacts = state
        .db
        .fetch_all(
            state
                .db
                .table("emergency_contacts")
                .select("*")
                .eq("user_id", user.id.to_string())
                .order("is_primary.desc,id.asc"),
        )
        .await?;
    Ok(Json(contacts))
}

/// `POST /users/emergency-contacts`
pub async fn add_emergency_contact(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(request): Json<EmergencyContactCreate>,
) -> ApiResult<Json<EmergencyContact>> {
    request.validate()?;

    // A single primary contact per user
    if request.is_primary {
        let _: Vec<EmergencyContact> = state
            .db
            .update(
                state
                    .db
                    .table("emergency_contacts")
                    .eq("user_id", user.id.to_string())
                    .eq("is_primary", "true"),
                &json!({ "is_primary": false }),
            )
            .await?;
    }

    let contact = state
        .db
        .insert(
            "emergency_contacts",
            &json!({
                "user_id": user.id,
                "name": request.name,
                "phone_number": request.phone_number,
                "relationship": request.relationship,
                "is_primary": request.is_primary,
            }),
        )
        .await?;
    Ok(Json(contact))
}

/// `DELETE /users/emergency-contacts/{id}`
pub async fn delete_emergency_contact(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(contact_id): Path<i64>,
) -> ApiResult<Json<MessageResponse>> {
    let removed = state
        .db
        .delete(
            state
                .db
                .table("emergency_contacts")
                .eq("id", contact_id.to_string())
                .eq("user_id", user.id.to_string()),
        )
        .await?;
    if removed == 0 {
        return Err(ApiError::not_found_error("Emergency contact not found"));
    }
    Ok(Json(MessageResponse::new("Emergency contact deleted")))
}
