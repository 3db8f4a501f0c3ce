//! Moderation endpoints. Every handler requires the admin or owner flag.

use axum::{
    extract::{Path, State},
    routing::{delete, get, post},
    Json, Router,
};
use serde::Serialize;
use tracing::info;

use socialbook_shared::UserId;
use socialbook_store::User;

use super::ack;
use crate::auth::AuthUser;
use crate::error::ServerError;
use crate::state::AppState;

pub(super) fn routes() -> Router<AppState> {
    Router::new()
        .route("/admin/stats", get(stats))
        .route("/admin/users", get(all_users))
        .route("/admin/users/{id}", delete(delete_user))
        .route("/admin/users/{id}/ban", post(ban_user))
        .route("/admin/users/{id}/unban", post(unban_user))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Stats {
    users: u64,
    posts: u64,
    messages: u64,
    groups: u64,
    group_messages: u64,
    stories: u64,
    online_users: usize,
    connections: usize,
}

async fn stats(State(state): State<AppState>, auth: AuthUser) -> Result<Json<Stats>, ServerError> {
    auth.require_admin()?;
    let online_users = state.registry.online_users().await.len();
    let connections = state.registry.connection_count().await;
    let db = state.db.lock().await;
    Ok(Json(Stats {
        users: db.count_users()?,
        posts: db.count_posts()?,
        messages: db.count_messages()?,
        groups: db.count_groups()?,
        group_messages: db.count_group_messages()?,
        stories: db.count_stories()?,
        online_users,
        connections,
    }))
}

async fn all_users(State(state): State<AppState>, auth: AuthUser) -> Result<Json<Vec<User>>, ServerError> {
    auth.require_admin()?;
    Ok(Json(state.db.lock().await.list_users()?))
}

async fn delete_user(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<UserId>,
) -> Result<Json<serde_json::Value>, ServerError> {
    auth.require_admin()?;
    {
        let db = state.db.lock().await;
        let target = db.get_user(id)?;
        if target.is_admin || target.is_owner {
            return Err(ServerError::Forbidden("Administrators cannot be deleted".into()));
        }
        db.delete_user(id)?;
    }
    info!(admin = %auth.0.id, user = %id, "User deleted");
    state.presence.evict(id, "Account deleted").await;
    Ok(ack("User deleted"))
}

async fn set_banned(state: &AppState, auth: &AuthUser, id: UserId, banned: bool) -> Result<(), ServerError> {
    auth.require_admin()?;
    {
        let db = state.db.lock().await;
        if db.get_user(id)?.is_owner {
            return Err(ServerError::Forbidden("The owner cannot be banned".into()));
        }
        db.set_banned(id, banned)?;
    }
    info!(admin = %auth.0.id, user = %id, banned, "Ban flag changed");
    if banned {
        state.presence.evict(id, "Account banned").await;
    }
    Ok(())
}

async fn ban_user(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<UserId>,
) -> Result<Json<serde_json::Value>, ServerError> {
    set_banned(&state, &auth, id, true).await?;
    Ok(ack("User banned"))
}

async fn unban_user(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<UserId>,
) -> Result<Json<serde_json::Value>, ServerError> {
    set_banned(&state, &auth, id, false).await?;
    Ok(ack("User unbanned"))
}
