use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use tracing::debug;

use socialbook_shared::UserId;
use socialbook_store::{Conversation, Message};

use super::require_text;
use crate::auth::AuthUser;
use crate::error::ServerError;
use crate::realtime::ServerEvent;
use crate::state::AppState;

pub(super) fn routes() -> Router<AppState> {
    Router::new()
        .route("/messages", post(send_message))
        .route("/messages/conversations", get(conversations))
        .route("/messages/{user_id}", get(thread))
}

#[derive(Deserialize)]
struct SendMessageRequest {
    to: UserId,
    text: String,
}

async fn conversations(
    State(state): State<AppState>,
    AuthUser(me): AuthUser,
) -> Result<Json<Vec<Conversation>>, ServerError> {
    let list = state.db.lock().await.list_conversations(me.id, state.now())?;
    Ok(Json(list))
}

/// The thread with `other`, oldest first. Fetching it marks everything
/// `other` sent to the caller as read.
async fn thread(
    State(state): State<AppState>,
    AuthUser(me): AuthUser,
    Path(other): Path<UserId>,
) -> Result<Json<Vec<Message>>, ServerError> {
    let messages = {
        let db = state.db.lock().await;
        let messages = db.get_thread(me.id, other, state.now())?;
        db.mark_thread_read(me.id, other)?;
        messages
    };
    Ok(Json(messages))
}

async fn send_message(
    State(state): State<AppState>,
    AuthUser(me): AuthUser,
    Json(req): Json<SendMessageRequest>,
) -> Result<Json<Message>, ServerError> {
    let text = require_text(&req.text, "text")?;

    let message = {
        let db = state.db.lock().await;
        if !db.user_exists(req.to)? {
            return Err(ServerError::NotFound("Recipient not found".into()));
        }
        db.insert_message(me.id, req.to, &text, state.now())?
    };

    // Realtime delivery is best effort; the stored message is the truth.
    let delivered = state
        .events
        .to_user(message.to, ServerEvent::NewMessage(message.clone()))
        .await;
    if message.to != me.id {
        state
            .events
            .to_user(me.id, ServerEvent::NewMessage(message.clone()))
            .await;
    }
    debug!(message = %message.id, delivered, "Direct message stored");

    Ok(Json(message))
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use chrono::DateTime;
    use serde_json::json;

    use crate::api::test_support::{call, create_user};
    use crate::realtime::ServerEvent;
    use crate::state::test_support::test_state;

    fn parse_time(value: &serde_json::Value) -> DateTime<chrono::Utc> {
        value.as_str().unwrap().parse().unwrap()
    }

    #[tokio::test]
    async fn test_message_to_offline_user_is_fetchable_later() {
        let state = test_state();
        let u1 = create_user(&state, "u1", false).await;
        let u2 = create_user(&state, "u2", false).await;

        // u2 has no connection at all.
        let (status, sent) = call(
            &state,
            "POST",
            "/api/messages",
            Some(&u1.token),
            Some(json!({ "to": u2.user.id.to_string(), "text": "hi" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(sent["read"], false);
        let created = parse_time(&sent["createdAt"]);
        let expires = parse_time(&sent["expiresAt"]);
        assert_eq!(expires - created, chrono::Duration::hours(48));

        // The inbox reflects it without any realtime delivery.
        let (_, inbox) = call(&state, "GET", "/api/messages/conversations", Some(&u2.token), None).await;
        assert_eq!(inbox.as_array().unwrap().len(), 1);
        assert_eq!(inbox[0]["unread"], 1);
        assert_eq!(inbox[0]["user"]["firstName"], "u1");

        // u2 connects and joins, then fetches the thread.
        let (conn, _rx) = state.registry.register().await;
        state.presence.join(conn, u2.user.id).await;

        let uri = format!("/api/messages/{}", u1.user.id);
        let (status, thread) = call(&state, "GET", &uri, Some(&u2.token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(thread[0]["text"], "hi");

        let (_, inbox) = call(&state, "GET", "/api/messages/conversations", Some(&u2.token), None).await;
        assert_eq!(inbox[0]["unread"], 0);
        assert_eq!(inbox[0]["lastMessage"]["read"], true);
    }

    #[tokio::test]
    async fn test_message_reaches_every_tab_of_both_parties() {
        let state = test_state();
        let alice = create_user(&state, "alice", false).await;
        let bob = create_user(&state, "bob", false).await;

        let (b1, mut rx_b1) = state.registry.register().await;
        let (b2, mut rx_b2) = state.registry.register().await;
        let (a1, mut rx_a1) = state.registry.register().await;
        state.presence.join(b1, bob.user.id).await;
        state.presence.join(b2, bob.user.id).await;
        state.presence.join(a1, alice.user.id).await;
        for rx in [&mut rx_b1, &mut rx_b2, &mut rx_a1] {
            while rx.try_recv().is_ok() {}
        }

        call(
            &state,
            "POST",
            "/api/messages",
            Some(&alice.token),
            Some(json!({ "to": bob.user.id.to_string(), "text": "ping" })),
        )
        .await;

        for rx in [&mut rx_b1, &mut rx_b2, &mut rx_a1] {
            assert!(matches!(rx.try_recv().unwrap(), ServerEvent::NewMessage(m) if m.text == "ping"));
        }
    }

    #[tokio::test]
    async fn test_send_validation() {
        let state = test_state();
        let alice = create_user(&state, "alice", false).await;
        let bob = create_user(&state, "bob", false).await;

        let (status, _) = call(
            &state,
            "POST",
            "/api/messages",
            Some(&alice.token),
            Some(json!({ "to": socialbook_shared::UserId::new().to_string(), "text": "hi" })),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = call(
            &state,
            "POST",
            "/api/messages",
            Some(&alice.token),
            Some(json!({ "to": bob.user.id.to_string(), "text": "   " })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
