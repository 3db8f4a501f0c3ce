use axum::{
    extract::State,
    routing::{get, put},
    Json, Router,
};
use serde::Serialize;

use socialbook_shared::constants::NOTIFICATION_PAGE_SIZE;
use socialbook_store::Notification;

use super::ack;
use crate::auth::AuthUser;
use crate::error::ServerError;
use crate::state::AppState;

pub(super) fn routes() -> Router<AppState> {
    Router::new()
        .route("/notifications", get(list))
        .route("/notifications/read", put(mark_read))
        .route("/notifications/unread", get(unread_counts))
}

#[derive(Serialize)]
struct UnreadCounts {
    notifications: u64,
    messages: u64,
}

async fn list(
    State(state): State<AppState>,
    AuthUser(me): AuthUser,
) -> Result<Json<Vec<Notification>>, ServerError> {
    let page = state
        .db
        .lock()
        .await
        .list_notifications(me.id, NOTIFICATION_PAGE_SIZE)?;
    Ok(Json(page))
}

async fn mark_read(
    State(state): State<AppState>,
    AuthUser(me): AuthUser,
) -> Result<Json<serde_json::Value>, ServerError> {
    state.db.lock().await.mark_notifications_read(me.id)?;
    Ok(ack("OK"))
}

/// Polling fallback for clients that missed realtime pings.
async fn unread_counts(
    State(state): State<AppState>,
    AuthUser(me): AuthUser,
) -> Result<Json<UnreadCounts>, ServerError> {
    let db = state.db.lock().await;
    Ok(Json(UnreadCounts {
        notifications: db.count_unread_notifications(me.id)?,
        messages: db.count_unread_messages(me.id, state.now())?,
    }))
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use serde_json::json;

    use socialbook_store::NotificationKind;

    use crate::api::test_support::{call, create_user};
    use crate::state::test_support::test_state;

    #[tokio::test]
    async fn test_unread_counts_and_mark_read() {
        let state = test_state();
        let alice = create_user(&state, "alice", false).await;
        let bob = create_user(&state, "bob", false).await;
        {
            let db = state.db.lock().await;
            db.create_notification(alice.user.id, NotificationKind::Like, "liked", None, state.now())
                .unwrap();
            db.insert_message(bob.user.id, alice.user.id, "hey", state.now())
                .unwrap();
        }

        let (status, counts) = call(&state, "GET", "/api/notifications/unread", Some(&alice.token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(counts, json!({ "notifications": 1, "messages": 1 }));

        let (_, list) = call(&state, "GET", "/api/notifications", Some(&alice.token), None).await;
        assert_eq!(list[0]["type"], "like");

        let (status, _) = call(&state, "PUT", "/api/notifications/read", Some(&alice.token), None).await;
        assert_eq!(status, StatusCode::OK);
        let (_, counts) = call(&state, "GET", "/api/notifications/unread", Some(&alice.token), None).await;
        assert_eq!(counts["notifications"], 0);
    }
}
