use axum::{
    extract::{Path, State},
    routing::{get, put},
    Json, Router,
};

use socialbook_shared::UserId;
use socialbook_store::{ProfileUpdate, User};

use crate::auth::AuthUser;
use crate::error::ServerError;
use crate::state::AppState;

pub(super) fn routes() -> Router<AppState> {
    Router::new()
        .route("/users", get(list_users))
        .route("/users/online", get(online_users))
        .route("/users/profile", put(update_profile))
        .route("/users/{id}", get(get_user))
}

async fn list_users(
    State(state): State<AppState>,
    AuthUser(me): AuthUser,
) -> Result<Json<Vec<User>>, ServerError> {
    let users = state.db.lock().await.list_users_except(me.id)?;
    Ok(Json(users))
}

async fn get_user(
    State(state): State<AppState>,
    _caller: AuthUser,
    Path(id): Path<UserId>,
) -> Result<Json<User>, ServerError> {
    let user = state.db.lock().await.get_user(id)?;
    Ok(Json(user))
}

async fn update_profile(
    State(state): State<AppState>,
    AuthUser(me): AuthUser,
    Json(update): Json<ProfileUpdate>,
) -> Result<Json<User>, ServerError> {
    let user = state.db.lock().await.update_profile(me.id, &update)?;
    Ok(Json(user))
}

/// Users with at least one live, joined connection right now.
async fn online_users(State(state): State<AppState>, _caller: AuthUser) -> Json<Vec<UserId>> {
    Json(state.registry.online_users().await)
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use serde_json::json;

    use crate::api::test_support::{call, create_user};
    use crate::state::test_support::test_state;

    #[tokio::test]
    async fn test_list_excludes_caller() {
        let state = test_state();
        let alice = create_user(&state, "alice", false).await;
        let bob = create_user(&state, "bob", false).await;

        let (status, body) = call(&state, "GET", "/api/users", Some(&alice.token), None).await;
        assert_eq!(status, StatusCode::OK);
        let ids: Vec<&str> = body
            .as_array()
            .unwrap()
            .iter()
            .map(|u| u["id"].as_str().unwrap())
            .collect();
        assert_eq!(ids, vec![bob.user.id.to_string()]);
    }

    #[tokio::test]
    async fn test_get_unknown_user() {
        let state = test_state();
        let alice = create_user(&state, "alice", false).await;
        let uri = format!("/api/users/{}", socialbook_shared::UserId::new());
        let (status, _) = call(&state, "GET", &uri, Some(&alice.token), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_update_profile() {
        let state = test_state();
        let alice = create_user(&state, "alice", false).await;
        let (status, body) = call(
            &state,
            "PUT",
            "/api/users/profile",
            Some(&alice.token),
            Some(json!({ "bio": "mathematician" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["bio"], "mathematician");
        assert_eq!(body["firstName"], "alice");
    }

    #[tokio::test]
    async fn test_online_reflects_registry() {
        let state = test_state();
        let alice = create_user(&state, "alice", false).await;
        let (conn, _rx) = state.registry.register().await;
        state.presence.join(conn, alice.user.id).await;

        let (_, body) = call(&state, "GET", "/api/users/online", Some(&alice.token), None).await;
        assert_eq!(body, json!([alice.user.id.to_string()]));
    }
}
