use crate::{
    auth::{
        generate_caregiver_id, generate_patient_id, validate_password_strength, Principal,
        UserType,
    },
    models::{
        Admin, AdminLoginRequest, CaregiverSignupRequest, CaregiverType, Doctor,
        DoctorLoginRequest, LoginRequest, MessageResponse, NewUser, OAuthCallbackQuery,
        RefreshRequest, SignupRequest, SignupResponse, TokenResponse, User,
    },
    utils::{ApiError, ApiResult},
    AppState,
};
use axum::{
    extract::{Query, State},
    response::Redirect,
    Json,
};
use chrono::Utc;
use serde_json::json;
use validator::Validate;

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

async fn ensure_email_free(state: &AppState, email: &str) -> ApiResult<()> {
    if state.auth_service.find_user_by_email(email).await?.is_some() {
        return Err(ApiError::validation_error("Email already registered"));
    }
    Ok(())
}

fn send_welcome_in_background(state: &AppState, email: String, name: String) {
    let services = state.services.clone();
    tokio::spawn(async move {
        services.email.send_welcome(&email, &name).await;
    });
}

/// `POST /auth/signup`
pub async fn signup(
    State(state): State<AppState>,
    Json(request): Json<SignupRequest>,
) -> ApiResult<Json<SignupResponse>> {
    request.validate()?;
    validate_password_strength(&request.password).map_err(ApiError::validation_error)?;

    let email = normalize_email(&request.email);
    ensure_email_free(&state, &email).await?;

    let username = request
        .username
        .as_deref()
        .map(str::trim)
        .filter(|u| !u.is_empty())
        .map(str::to_string);
    if let Some(username) = &username {
        let taken = state
            .db
            .count(state.db.table("users").select("id").eq("username", username))
            .await?;
        if taken > 0 {
            return Err(ApiError::validation_error("Username already taken"));
        }
    }

    let patient_id = generate_patient_id(username.as_deref(), &email);
    let new_user = NewUser {
        email: email.clone(),
        username: username.clone(),
        patient_id: patient_id.clone(),
        hashed_password: Some(state.auth_service.hash_password(&request.password)?),
        ..Default::default()
    };
    let user: User = state.db.insert("users", &new_user).await?;
    tracing::info!(user_id = user.id, "User signed up");

    send_welcome_in_background(&state, email.clone(), user.display_name());

    Ok(Json(SignupResponse {
        message: "User created successfully".to_string(),
        user_id: user.id,
        patient_id: user.patient_id.unwrap_or(patient_id),
        email,
    }))
}

/// `POST /auth/login`
pub async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> ApiResult<Json<TokenResponse>> {
    request.validate()?;
    let auth = &state.auth_service;

    let user = auth
        .find_user_by_email(&normalize_email(&request.email))
        .await?
        .ok_or_else(ApiError::invalid_credentials)?;

    let password_ok = user
        .hashed_password
        .as_deref()
        .is_some_and(|hash| auth.verify_password(&request.password, hash));
    if !password_ok {
        return Err(ApiError::invalid_credentials());
    }
    if !user.is_active {
        return Err(ApiError::authorization_error("Inactive account"));
    }

    let mut changes = json!({ "last_login": Utc::now() });
    if user.patient_id.is_none() {
        let email = user.email.as_deref().unwrap_or_default();
        changes["patient_id"] = json!(generate_patient_id(user.username.as_deref(), email));
    }
    let _: Vec<User> = state
        .db
        .update(state.db.table("users").eq("id", user.id.to_string()), &changes)
        .await?;

    let tokens = auth.issue_token_pair(&user.id.to_string(), UserType::User).await?;
    tracing::info!(user_id = user.id, "User logged in");
    Ok(Json(tokens))
}

/// `POST /auth/caregiver-signup`
pub async fn caregiver_signup(
    State(state): State<AppState>,
    Json(request): Json<CaregiverSignupRequest>,
) -> ApiResult<Json<TokenResponse>> {
    request.validate()?;
    if !request.agree_to_terms {
        return Err(ApiError::validation_error("You must agree to the terms"));
    }
    let caregiver_type = CaregiverType::parse(&request.caregiver_type).ok_or_else(|| {
        ApiError::validation_error("caregiver_type must be family, friend or professional")
    })?;
    if let Some(phone) = &request.phone_number {
        let digits = phone.strip_prefix('+').unwrap_or(phone);
        if !digits.chars().all(|c| c.is_ascii_digit()) {
            return Err(ApiError::validation_error("Invalid phone number"));
        }
    }
    validate_password_strength(&request.password).map_err(ApiError::validation_error)?;

    let email = normalize_email(&request.email);
    ensure_email_free(&state, &email).await?;

    let new_user = NewUser {
        email: email.clone(),
        patient_id: generate_patient_id(None, &email),
        caregiver_id: Some(generate_caregiver_id()),
        hashed_password: Some(state.auth_service.hash_password(&request.password)?),
        is_caregiver: true,
        first_name: Some(request.first_name.trim().to_string()),
        last_name: Some(request.last_name.trim().to_string()),
        caregiver_type: Some(caregiver_type.as_str().to_string()),
        experience_years: request.experience_years,
        phone_number: request.phone_number,
        ..Default::default()
    };
    let user: User = state.db.insert("users", &new_user).await?;
    tracing::info!(user_id = user.id, "Caregiver signed up");

    send_welcome_in_background(&state, email, user.display_name());

    Ok(Json(
        state
            .auth_service
            .issue_token_pair(&user.id.to_string(), UserType::User)
            .await?,
    ))
}

/// `POST /auth/refresh`
pub async fn refresh(
    State(state): State<AppState>,
    Json(request): Json<RefreshRequest>,
) -> ApiResult<Json<TokenResponse>> {
    Ok(Json(
        state
            .auth_service
            .rotate_refresh_token(&request.refresh_token)
            .await?,
    ))
}

/// `POST /auth/logout`
pub async fn logout(
    State(state): State<AppState>,
    Json(request): Json<RefreshRequest>,
) -> ApiResult<Json<MessageResponse>> {
    state
        .auth_service
        .revoke_refresh_token(&request.refresh_token)
        .await?;
    Ok(Json(MessageResponse::new("Logged out")))
}

/// `GET /auth/me`
pub async fn me(principal: Principal) -> Json<serde_json::Value> {
    let user_type = principal.user_type().as_str();
    let account = match principal {
        Principal::User(user) => json!(user),
        Principal::Doctor(doctor) => json!(doctor),
        Principal::Admin(admin) => json!(admin),
    };
    Json(json!({ "user_type": user_type, "account": account }))
}

/// `GET /auth/google/login`
pub async fn google_login(State(state): State<AppState>) -> ApiResult<Redirect> {
    let google = state
        .google
        .as_ref()
        .ok_or_else(|| ApiError::service_unavailable("Google sign-in is not configured"))?;
    Ok(Redirect::temporary(&google.authorize_url(&state.oauth_states).await))
}

/// `GET /auth/google/callback`
pub async fn google_callback(
    State(state): State<AppState>,
    Query(query): Query<OAuthCallbackQuery>,
) -> ApiResult<Redirect> {
    let google = state
        .google
        .as_ref()
        .ok_or_else(|| ApiError::service_unavailable("Google sign-in is not configured"))?;
    let frontend = state.config.server.frontend_url.trim_end_matches('/');

    if let Some(error) = query.error {
        tracing::warn!("Google sign-in returned error {}", error);
        return Ok(Redirect::temporary(&format!(
            "{}/login?error={}",
            frontend,
            urlencoding::encode(&error)
        )));
    }

    let (code, csrf_state) = match (query.code, query.state) {
        (Some(code), Some(csrf_state)) => (code, csrf_state),
        _ => return Err(ApiError::validation_error("Missing code or state")),
    };

    let info = google
        .exchange_code(&state.oauth_states, &code, &csrf_state)
        .await?;
    let user = link_google_account(&state, info).await?;
    if !user.is_active {
        return Err(ApiError::authorization_error("Inactive account"));
    }

    let tokens = state
        .auth_service
        .issue_token_pair(&user.id.to_string(), UserType::User)
        .await?;
    tracing::info!(user_id = user.id, "Google sign-in completed");

    let mut target = format!(
        "{}/oauth/callback?token={}",
        frontend,
        urlencoding::encode(&tokens.access_token)
    );
    if let Some(refresh) = &tokens.refresh_token {
        target.push_str("&refresh_token=");
        target.push_str(&urlencoding::encode(refresh));
    }
    Ok(Redirect::temporary(&target))
}

/// Find by google_id, then by email (linking it), else create the account
async fn link_google_account(state: &AppState, info: crate::models::GoogleUserInfo) -> ApiResult<User> {
    let db = &state.db;
    if let Some(user) = db
        .fetch_optional::<User>(db.table("users").select("*").eq("google_id", &info.sub))
        .await?
    {
        return Ok(user);
    }

    let email = normalize_email(&info.email);
    if let Some(existing) = state.auth_service.find_user_by_email(&email).await? {
        return db
            .update_one(
                db.table("users").eq("id", existing.id.to_string()),
                &json!({ "google_id": info.sub, "is_email_verified": existing.is_email_verified || info.email_verified }),
                "User",
            )
            .await;
    }

    let new_user = NewUser {
        patient_id: generate_patient_id(None, &email),
        email,
        google_id: Some(info.sub),
        first_name: info.given_name,
        last_name: info.family_name,
        is_email_verified: info.email_verified,
        ..Default::default()
    };
    db.insert("users", &new_user).await
}

/// `POST /doctors/login`
pub async fn doctor_login(
    State(state): State<AppState>,
    Json(request): Json<DoctorLoginRequest>,
) -> ApiResult<Json<TokenResponse>> {
    request.validate()?;
    let db = &state.db;

    let doctor: Doctor = db
        .fetch_optional(db.table("doctors").select("*").eq("doctor_id", &request.doctor_id))
        .await?
        .ok_or_else(ApiError::invalid_credentials)?;

    let password_ok = doctor
        .hashed_password
        .as_deref()
        .is_some_and(|hash| state.auth_service.verify_password(&request.password, hash));
    if !password_ok {
        return Err(ApiError::invalid_credentials());
    }
    if !doctor.is_active {
        return Err(ApiError::authorization_error("Inactive account"));
    }

    tracing::info!(doctor_id = %doctor.doctor_id, "Doctor logged in");
    Ok(Json(
        state
            .auth_service
            .issue_token_pair(&doctor.doctor_id, UserType::Doctor)
            .await?,
    ))
}

/// `POST /superadmin/login`
pub async fn superadmin_login(
    State(state): State<AppState>,
    Json(request): Json<AdminLoginRequest>,
) -> ApiResult<Json<TokenResponse>> {
    request.validate()?;
    let db = &state.db;
    let email = normalize_email(&request.email);

    let admin: Admin = db
        .fetch_optional(db.table("admins").select("*").eq("email", &email))
        .await?
        .ok_or_else(ApiError::invalid_credentials)?;

    let password_ok = admin
        .hashed_password
        .as_deref()
        .is_some_and(|hash| state.auth_service.verify_password(&request.password, hash));
    if !password_ok {
        return Err(ApiError::invalid_credentials());
    }
    if !admin.is_active {
        return Err(ApiError::authorization_error("Inactive account"));
    }

    let _: Vec<Admin> = db
        .update(
            db.table("admins").eq("id", admin.id.to_string()),
            &json!({ "last_login": Utc::now() }),
        )
        .await?;

    tracing::info!(admin_id = admin.id, "Admin logged in");
    Ok(Json(
        state
            .auth_service
            .issue_token_pair(&admin.email, UserType::Admin)
            .await?,
    ))
}
