pub mod google;

use crate::{
    db::Database,
    models::{Admin, Doctor, NewRefreshToken, RefreshTokenRow, TokenResponse, User},
    utils::{ApiError, ApiResult, Config},
    AppState,
};
use argon2::password_hash::{rand_core::OsRng, SaltString};
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use axum::{
    async_trait,
    extract::{FromRequestParts, Request, State},
    http::{request::Parts, HeaderMap},
    middleware::Next,
    response::Response,
};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand::{distributions::Alphanumeric, Rng};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;

/// Special characters accepted by the password policy
pub const PASSWORD_SPECIALS: &str = "!@#$%^&*(),.?\":{}|<>";

/// JWT claims structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Numeric user id, doctor_id or admin email depending on `user_type`
    pub sub: String,
    #[serde(default = "default_user_type")]
    pub user_type: String,
    pub exp: usize,
    pub iat: usize,
    pub iss: String,
}

fn default_user_type() -> String {
    UserType::User.as_str().to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserType {
    User,
    Doctor,
    Admin,
}

impl UserType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Doctor => "doctor",
            Self::Admin => "admin",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "user" => Some(Self::User),
            "doctor" => Some(Self::Doctor),
            "admin" => Some(Self::Admin),
            _ => None,
        }
    }
}

/// Identity a bearer token resolved to
#[derive(Debug, Clone)]
pub enum Principal {
    User(User),
    Doctor(Doctor),
    Admin(Admin),
}

impl Principal {
    pub fn user_type(&self) -> UserType {
        match self {
            Self::User(_) => UserType::User,
            Self::Doctor(_) => UserType::Doctor,
            Self::Admin(_) => UserType::Admin,
        }
    }

    fn is_active(&self) -> bool {
        match self {
            Self::User(user) => user.is_active,
            Self::Doctor(doctor) => doctor.is_active,
            Self::Admin(admin) => admin.is_active,
        }
    }
}

/// Token resolution failure recorded by `auth_middleware` for the extractors
#[derive(Debug, Clone)]
pub struct AuthRejection(pub ApiError);

/// Authentication service
pub struct AuthService {
    db: Database,
    config: Arc<Config>,
    argon2: Argon2<'static>,
}

impl AuthService {
    pub fn new(db: Database, config: Arc<Config>) -> Self {
        Self {
            db,
            config,
            argon2: Argon2::default(),
        }
    }

    /// Hash password for storage
    pub fn hash_password(&self, password: &str) -> ApiResult<String> {
        let salt = SaltString::generate(&mut OsRng);
        let password_hash = self
            .argon2
            .hash_password(password.as_bytes(), &salt)
            .map_err(|_| ApiError::internal_error("Failed to hash password"))?;
        Ok(password_hash.to_string())
    }

    /// Check a password against a stored PHC string; malformed hashes never match
    pub fn verify_password(&self, password: &str, stored_hash: &str) -> bool {
        match PasswordHash::new(stored_hash) {
            Ok(parsed) => self
                .argon2
                .verify_password(password.as_bytes(), &parsed)
                .is_ok(),
            Err(_) => false,
        }
    }

    /// Sign an access token; returns the token and its lifetime in seconds
    pub fn issue_access_token(&self, subject: &str, user_type: UserType) -> ApiResult<(String, i64)> {
        let now = Utc::now();
        let lifetime = Duration::minutes(self.config.jwt.access_token_minutes);
        let claims = Claims {
            sub: subject.to_string(),
            user_type: user_type.as_str().to_string(),
            exp: (now + lifetime).timestamp() as usize,
            iat: now.timestamp() as usize,
            iss: self.config.jwt.issuer.clone(),
        };

        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(self.config.jwt.secret.as_ref()),
        )
        .map_err(|_| ApiError::internal_error("Failed to generate token"))?;

        Ok((token, lifetime.num_seconds()))
    }

    /// Validate JWT token and return its claims
    pub fn decode_token(&self, token: &str) -> ApiResult<Claims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[self.config.jwt.issuer.as_str()]);
        let token_data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.config.jwt.secret.as_ref()),
            &validation,
        )?;

        if token_data.claims.sub.is_empty() {
            return Err(ApiError::invalid_credentials());
        }
        Ok(token_data.claims)
    }

    /// Access token plus a freshly stored refresh token
    pub async fn issue_token_pair(&self, subject: &str, user_type: UserType) -> ApiResult<TokenResponse> {
        let (access_token, expires_in) = self.issue_access_token(subject, user_type)?;
        let refresh_token = generate_refresh_token();

        let row = NewRefreshToken {
            token_hash: hash_token(&refresh_token),
            subject: subject.to_string(),
            user_type: user_type.as_str().to_string(),
            expires_at: Utc::now() + Duration::days(self.config.jwt.refresh_token_days),
        };
        let _: RefreshTokenRow = self.db.insert("refresh_tokens", &row).await?;

        Ok(TokenResponse {
            access_token,
            token_type: "bearer".to_string(),
            user_type: user_type.as_str().to_string(),
            expires_in,
            refresh_token: Some(refresh_token),
        })
    }

    /// Exchange a refresh token for a new pair, revoking the old one
    pub async fn rotate_refresh_token(&self, raw_token: &str) -> ApiResult<TokenResponse> {
        let stored: RefreshTokenRow = self
            .db
            .fetch_optional(
                self.db
                    .table("refresh_tokens")
                    .select("*")
                    .eq("token_hash", hash_token(raw_token)),
            )
            .await?
            .ok_or_else(|| ApiError::authentication_error("Invalid refresh token"))?;

        if stored.revoked || stored.expires_at <= Utc::now() {
            return Err(ApiError::authentication_error("Refresh token expired or revoked"));
        }

        let user_type = UserType::parse(&stored.user_type)
            .ok_or_else(|| ApiError::authentication_error("Invalid refresh token"))?;

        // The account must still resolve and be active
        self.lookup_principal(&stored.subject, user_type).await?;

        // Only the request that flips `revoked` may mint the next pair
        if !self.revoke_by_id(stored.id).await? {
            tracing::warn!(subject = %stored.subject, "Refresh token reused during rotation");
            return Err(ApiError::authentication_error("Refresh token expired or revoked"));
        }
        self.issue_token_pair(&stored.subject, user_type).await
    }

    pub async fn revoke_refresh_token(&self, raw_token: &str) -> ApiResult<()> {
        let _: Vec<RefreshTokenRow> = self
            .db
            .update(
                self.db
                    .table("refresh_tokens")
                    .eq("token_hash", hash_token(raw_token)),
                &serde_json::json!({ "revoked": true }),
            )
            .await?;
        Ok(())
    }

    /// Revoke a still-live token; `false` when another request got there first
    async fn revoke_by_id(&self, id: i64) -> ApiResult<bool> {
        let rows: Vec<RefreshTokenRow> = self
            .db
            .update(
                self.db
                    .table("refresh_tokens")
                    .eq("id", id.to_string())
                    .eq("revoked", "false"),
                &serde_json::json!({ "revoked": true }),
            )
            .await?;
        Ok(!rows.is_empty())
    }

    /// Decode a bearer token and load the account it names
    pub async fn resolve_principal(&self, token: &str) -> ApiResult<Principal> {
        let claims = self.decode_token(token)?;
        let user_type = UserType::parse(&claims.user_type).ok_or_else(|| {
            tracing::debug!("Token carries unknown user_type {}", claims.user_type);
            ApiError::invalid_credentials()
        })?;

        self.lookup_principal(&claims.sub, user_type).await
    }

    async fn lookup_principal(&self, subject: &str, user_type: UserType) -> ApiResult<Principal> {
        let principal = match user_type {
            UserType::User => {
                let user = match subject.parse::<i64>() {
                    Ok(id) => self.find_user_by_id(id).await?,
                    Err(_) => self.find_user_by_email(subject).await?,
                };
                user.map(Principal::User)
            }
            UserType::Doctor => self
                .db
                .fetch_optional::<Doctor>(
                    self.db.table("doctors").select("*").eq("doctor_id", subject),
                )
                .await?
                .map(Principal::Doctor),
            UserType::Admin => self
                .db
                .fetch_optional::<Admin>(self.db.table("admins").select("*").eq("email", subject))
                .await?
                .map(Principal::Admin),
        }
        .ok_or_else(ApiError::invalid_credentials)?;

        if !principal.is_active() {
            return Err(ApiError::authorization_error("Inactive account"));
        }
        Ok(principal)
    }

    pub async fn find_user_by_id(&self, id: i64) -> ApiResult<Option<User>> {
        self.db
            .fetch_optional(self.db.table("users").select("*").eq("id", id.to_string()))
            .await
    }

    pub async fn find_user_by_email(&self, email: &str) -> ApiResult<Option<User>> {
        self.db
            .fetch_optional(self.db.table("users").select("*").eq("email", email))
            .await
    }
}

/// Signup password rules; returns a readable reason on failure
pub fn validate_password_strength(password: &str) -> Result<(), String> {
    if password.chars().count() < 8 {
        return Err("Password must be at least 8 characters long".to_string());
    }
    if !password.chars().any(|c| c.is_ascii_uppercase()) {
        return Err("Password must contain at least one uppercase letter".to_string());
    }
    if !password.chars().any(|c| c.is_ascii_lowercase()) {
        return Err("Password must contain at least one lowercase letter".to_string());
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        return Err("Password must contain at least one digit".to_string());
    }
    if !password.chars().any(|c| PASSWORD_SPECIALS.contains(c)) {
        return Err("Password must contain at least one special character".to_string());
    }
    Ok(())
}

/// Username (or email local part) followed by five random digits
pub fn generate_patient_id(username: Option<&str>, email: &str) -> String {
    let base = username
        .filter(|u| !u.is_empty())
        .or_else(|| email.split('@').next().filter(|local| !local.is_empty()))
        .unwrap_or("user");
    let mut rng = rand::thread_rng();
    let digits: String = (0..5).map(|_| char::from(b'0' + rng.gen_range(0..10))).collect();
    format!("{}{}", base, digits)
}

/// `CG` followed by eight uppercase alphanumerics
pub fn generate_caregiver_id() -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .map(|b| (b as char).to_ascii_uppercase())
        .take(8)
        .collect();
    format!("CG{}", suffix)
}

pub fn is_valid_doctor_id(doctor_id: &str) -> bool {
    doctor_id.len() == 8 && doctor_id.starts_with("DOC") && doctor_id.chars().all(|c| c.is_ascii_alphanumeric())
}

/// Initial doctor password that satisfies the signup policy
pub fn generate_initial_password() -> String {
    let mut rng = rand::thread_rng();
    let body: String = (&mut rng).sample_iter(&Alphanumeric).take(9).map(char::from).collect();
    let upper = char::from(b'A' + rng.gen_range(0..26));
    let lower = char::from(b'a' + rng.gen_range(0..26));
    let digit = char::from(b'0' + rng.gen_range(0..10));
    let specials: Vec<char> = PASSWORD_SPECIALS.chars().collect();
    let special = specials[rng.gen_range(0..specials.len())];
    format!("{}{}{}{}{}", upper, body, lower, digit, special)
}

fn generate_refresh_token() -> String {
    let bytes: [u8; 32] = rand::thread_rng().gen();
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Refresh tokens are stored by digest only
pub fn hash_token(token: &str) -> String {
    format!("{:x}", Sha256::digest(token.as_bytes()))
}

/// Extract authentication from request headers
pub fn extract_auth_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get("Authorization")
        .and_then(|value| value.to_str().ok())
        .and_then(|auth_header| auth_header.strip_prefix("Bearer "))
        .map(|token| token.trim().to_string())
        .filter(|token| !token.is_empty())
}

/// Authentication middleware
///
/// Resolves a bearer token when one is present. Success stores the
/// [`Principal`]; failure stores an [`AuthRejection`] so the extractors can
/// report the exact status.
pub async fn auth_middleware(
    State(auth_service): State<Arc<AuthService>>,
    mut request: Request,
    next: Next,
) -> Response {
    if let Some(token) = extract_auth_token(request.headers()) {
        match auth_service.resolve_principal(&token).await {
            Ok(principal) => {
                request.extensions_mut().insert(principal);
            }
            Err(err) => {
                request.extensions_mut().insert(AuthRejection(err));
            }
        }
    }

    next.run(request).await
}

/// Required authentication middleware (returns 401 if no valid auth)
pub async fn require_auth(request: Request, next: Next) -> Result<Response, ApiError> {
    if request.extensions().get::<Principal>().is_some() {
        return Ok(next.run(request).await);
    }
    match request.extensions().get::<AuthRejection>() {
        Some(AuthRejection(err)) => Err(err.clone()),
        None => Err(ApiError::authentication_error("Not authenticated")),
    }
}

fn principal_from_parts(parts: &Parts) -> ApiResult<Principal> {
    if let Some(principal) = parts.extensions.get::<Principal>() {
        return Ok(principal.clone());
    }
    match parts.extensions.get::<AuthRejection>() {
        Some(AuthRejection(err)) => Err(err.clone()),
        None => Err(ApiError::authentication_error("Not authenticated")),
    }
}

#[async_trait]
impl FromRequestParts<AppState> for Principal {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &AppState) -> Result<Self, Self::Rejection> {
        principal_from_parts(parts)
    }
}

/// Any patient or caregiver account
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &AppState) -> Result<Self, Self::Rejection> {
        match principal_from_parts(parts)? {
            Principal::User(user) => Ok(Self(user)),
            _ => Err(ApiError::authorization_error("User account required")),
        }
    }
}

/// A user account flagged as caregiver
#[derive(Debug, Clone)]
pub struct CurrentCaregiver(pub User);

#[async_trait]
impl FromRequestParts<AppState> for CurrentCaregiver {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let CurrentUser(user) = CurrentUser::from_request_parts(parts, state).await?;
        if !user.is_caregiver {
            return Err(ApiError::authorization_error("User is not a caregiver"));
        }
        Ok(Self(user))
    }
}

#[derive(Debug, Clone)]
pub struct CurrentDoctor(pub Doctor);

#[async_trait]
impl FromRequestParts<AppState> for CurrentDoctor {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &AppState) -> Result<Self, Self::Rejection> {
        match principal_from_parts(parts)? {
            Principal::Doctor(doctor) => Ok(Self(doctor)),
            _ => Err(ApiError::authorization_error("Doctor account required")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CurrentAdmin(pub Admin);

#[async_trait]
impl FromRequestParts<AppState> for CurrentAdmin {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &AppState) -> Result<Self, Self::Rejection> {
        match principal_from_parts(parts)? {
            Principal::Admin(admin) => Ok(Self(admin)),
            _ => Err(ApiError::authorization_error("Admin account required")),
        }
    }
}
