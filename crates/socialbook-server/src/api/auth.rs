use axum::{extract::State, routing::{get, post}, Json, Router};
use serde::{Deserialize, Serialize};
use tracing::info;

use socialbook_store::{NewUser, StoreError, User};

use super::require_text;
use crate::auth::{hash_password, verify_password, AuthUser};
use crate::error::ServerError;
use crate::state::AppState;

pub(super) fn routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/me", get(me))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RegisterRequest {
    first_name: String,
    last_name: String,
    email: String,
    password: String,
}

#[derive(Deserialize)]
struct LoginRequest {
    email: String,
    password: String,
}

#[derive(Serialize)]
struct AuthResponse {
    token: String,
    user: User,
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn avatar_for(first_name: &str, last_name: &str) -> String {
    format!(
        "https://ui-avatars.com/api/?name={}+{}&background=random",
        first_name.replace(' ', "+"),
        last_name.replace(' ', "+")
    )
}

async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<Json<AuthResponse>, ServerError> {
    let first_name = require_text(&req.first_name, "firstName")?;
    let last_name = require_text(&req.last_name, "lastName")?;
    let email = normalize_email(&req.email);
    if !email.contains('@') {
        return Err(ServerError::BadRequest("Invalid email address".into()));
    }
    if req.password.is_empty() {
        return Err(ServerError::BadRequest("password must not be empty".into()));
    }

    let password_hash = hash_password(&req.password)?;
    let new_user = NewUser {
        avatar: avatar_for(&first_name, &last_name),
        first_name,
        last_name,
        email,
        password_hash,
        is_admin: false,
        is_owner: false,
    };

    let user = state.db.lock().await.create_user(&new_user, state.now())?;
    info!(user = %user.id, "Registered account");

    let token = state.sessions.issue(user.id, state.now());
    Ok(Json(AuthResponse { token, user }))
}

async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, ServerError> {
    let bad_credentials = || ServerError::BadRequest("Invalid email or password".into());

    let credentials = match state.db.lock().await.find_credentials(&normalize_email(&req.email)) {
        Ok(c) => c,
        Err(StoreError::NotFound) => return Err(bad_credentials()),
        Err(e) => return Err(e.into()),
    };

    if !verify_password(&req.password, &credentials.password_hash) {
        return Err(bad_credentials());
    }
    if credentials.is_banned {
        return Err(ServerError::Forbidden("Account is banned".into()));
    }

    let user = state.db.lock().await.get_user(credentials.user_id)?;
    let token = state.sessions.issue(user.id, state.now());
    Ok(Json(AuthResponse { token, user }))
}

async fn me(AuthUser(user): AuthUser) -> Json<User> {
    Json(user)
}

/// Create the owner account from `ADMIN_EMAIL` / `ADMIN_PASSWORD` if both
/// are configured and no account uses that email yet.
pub async fn bootstrap_owner(state: &AppState) -> Result<Option<User>, ServerError> {
    let (Some(email), Some(password)) = (&state.config.admin_email, &state.config.admin_password)
    else {
        return Ok(None);
    };
    let email = normalize_email(email);

    match state.db.lock().await.find_credentials(&email) {
        Ok(_) => return Ok(None),
        Err(StoreError::NotFound) => {}
        Err(e) => return Err(e.into()),
    }

    let mut parts = state.config.admin_name.trim().splitn(2, ' ');
    let first_name = parts.next().filter(|s| !s.is_empty()).unwrap_or("Admin").to_string();
    let last_name = parts.next().unwrap_or_default().trim().to_string();

    let new_user = NewUser {
        avatar: avatar_for(&first_name, &last_name),
        first_name,
        last_name,
        email,
        password_hash: hash_password(password)?,
        is_admin: true,
        is_owner: true,
    };
    let user = state.db.lock().await.create_user(&new_user, state.now())?;
    info!(user = %user.id, "Created owner account");
    Ok(Some(user))
}
