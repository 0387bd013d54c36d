use std::sync::Arc;

use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier, password_hash::{SaltString, rand_core::OsRng}};
use axum::{Extension, Json, extract::{Path, State}, http::StatusCode, response::IntoResponse};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use tracing::{error, info};

use parley_db::Database;
use parley_db::models::UserRow;
use parley_gateway::NotificationHub;
use parley_types::api::{
    Claims, LoginRequest, LoginResponse, RegisterRequest, RegisterResponse, ReviseUidRequest,
    StrangerResponse, UidLoginRequest, UserResponse,
};
use parley_types::models::UserId;

use crate::error::{ApiError, ApiResult};
use crate::storage::BlobStore;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub hub: NotificationHub,
    pub blobs: Arc<dyn BlobStore>,
    pub jwt_secret: String,
    pub max_upload_bytes: usize,
}

impl AppStateInner {
    /// Run a store call off the async runtime.
    pub async fn run<F, T>(self: &Arc<Self>, f: F) -> ApiResult<T>
    where
        F: FnOnce(&Database) -> parley_db::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let state = self.clone();
        tokio::task::spawn_blocking(move || f(&state.db))
            .await
            .map_err(|e| {
                error!("spawn_blocking join error: {}", e);
                ApiError::Internal
            })?
            .map_err(ApiError::from)
    }
}

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> ApiResult<impl IntoResponse> {
    let name = req.name.trim().to_string();
    if name.is_empty() || name.chars().count() > 32 {
        return Err(ApiError::bad_request("name must be 1-32 characters"));
    }
    if req.phone.is_empty() || req.phone.len() > 20 || !req.phone.chars().all(|c| c.is_ascii_digit() || c == '+') {
        return Err(ApiError::bad_request("invalid phone number"));
    }
    if req.password.len() < 8 {
        return Err(ApiError::bad_request("password must be at least 8 characters"));
    }

    // Hash password with Argon2id
    let salt = SaltString::generate(&mut OsRng);
    let password_hash = Argon2::default()
        .hash_password(req.password.as_bytes(), &salt)
        .map_err(|e| {
            error!("Password hashing failed: {}", e);
            ApiError::Internal
        })?
        .to_string();

    let phone = req.phone;
    let user_name = name.clone();
    let user_id = state
        .run(move |db| db.create_user(&user_name, &phone, &password_hash))
        .await?;

    let token = create_token(&state.jwt_secret, user_id, &name).map_err(|e| {
        error!("Token creation failed: {}", e);
        ApiError::Internal
    })?;

    info!("Registered user {} ({})", name, user_id);
    Ok((StatusCode::CREATED, Json(RegisterResponse { user_id, token })))
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> ApiResult<impl IntoResponse> {
    let phone = req.phone;
    let user = state.run(move |db| db.get_user_by_phone(&phone)).await?;
    issue_login(&state, user, &req.password)
}

/// POST /auth/login/uid: same as phone login, keyed by the uid handle.
pub async fn login_by_uid(
    State(state): State<AppState>,
    Json(req): Json<UidLoginRequest>,
) -> ApiResult<impl IntoResponse> {
    let uid = req.uid;
    let user = state.run(move |db| db.get_user_by_uid(&uid)).await?;
    issue_login(&state, user, &req.password)
}

/// Verify the password and hand out a token. Unknown users and wrong
/// passwords look the same to the caller.
fn issue_login(state: &AppState, user: Option<UserRow>, password: &str) -> ApiResult<Json<LoginResponse>> {
    let user = user.ok_or(ApiError::Unauthorized)?;

    let parsed_hash = PasswordHash::new(&user.password).map_err(|e| {
        error!("Stored password hash for user {} is invalid: {}", user.id, e);
        ApiError::Internal
    })?;

    Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .map_err(|_| ApiError::Unauthorized)?;

    let token = create_token(&state.jwt_secret, user.id, &user.name).map_err(|e| {
        error!("Token creation failed: {}", e);
        ApiError::Internal
    })?;

    Ok(Json(LoginResponse {
        user_id: user.id,
        name: user.name,
        token,
    }))
}

pub async fn me(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let user = state
        .run(move |db| db.get_user(claims.sub))
        .await?
        .ok_or(ApiError::Unauthorized)?;

    Ok(Json(UserResponse {
        id: user.id,
        uid: user.uid,
        name: user.name,
        phone: user.phone,
    }))
}

pub async fn revise_uid(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<ReviseUidRequest>,
) -> ApiResult<impl IntoResponse> {
    let uid = req.uid.trim().to_string();
    if !valid_uid(&uid) {
        return Err(ApiError::bad_request(
            "uid must be 1-32 letters, digits, '_' or '-'",
        ));
    }

    let user_id = claims.sub;
    let new_uid = uid.clone();
    state.run(move |db| db.revise_uid(user_id, &new_uid)).await?;

    info!("User {} changed uid to {}", user_id, uid);
    Ok(StatusCode::NO_CONTENT)
}

/// GET /users/{id}: name only, for users who are not friends.
pub async fn stranger_info(
    State(state): State<AppState>,
    Path(user_id): Path<UserId>,
) -> ApiResult<impl IntoResponse> {
    let user = state.run(move |db| db.stranger_info(user_id)).await?;
    Ok(Json(StrangerResponse {
        id: user.id,
        name: user.name,
    }))
}

fn valid_uid(uid: &str) -> bool {
    !uid.is_empty()
        && uid.len() <= 32
        && uid.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

pub fn create_token(secret: &str, user_id: UserId, name: &str) -> anyhow::Result<String> {
    let claims = Claims {
        sub: user_id,
        name: name.to_string(),
        exp: (chrono::Utc::now() + chrono::Duration::days(30)).timestamp() as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok(token)
}

pub fn decode_token(secret: &str, token: &str) -> Option<Claims> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .ok()
}
