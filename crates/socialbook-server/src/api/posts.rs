use axum::{
    extract::{Path, State},
    routing::{delete, get, post},
    Json, Router,
};
use serde::Deserialize;

use socialbook_shared::{PostId, UserId};
use socialbook_store::{NotificationKind, Post};

use super::{ack, require_text};
use crate::auth::AuthUser;
use crate::error::ServerError;
use crate::realtime::ServerEvent;
use crate::state::AppState;

pub(super) fn routes() -> Router<AppState> {
    Router::new()
        .route("/posts", get(list_posts).post(create_post))
        .route("/posts/user/{id}", get(list_user_posts))
        .route("/posts/{id}", delete(delete_post))
        .route("/posts/{id}/like", post(toggle_like))
        .route("/posts/{id}/comment", post(add_comment))
}

#[derive(Deserialize)]
struct CreatePostRequest {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    image: Option<String>,
}

#[derive(Deserialize)]
struct CommentRequest {
    text: String,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

async fn list_posts(
    State(state): State<AppState>,
    _caller: AuthUser,
) -> Result<Json<Vec<Post>>, ServerError> {
    Ok(Json(state.db.lock().await.list_posts()?))
}

async fn list_user_posts(
    State(state): State<AppState>,
    _caller: AuthUser,
    Path(author): Path<UserId>,
) -> Result<Json<Vec<Post>>, ServerError> {
    Ok(Json(state.db.lock().await.list_posts_by(author)?))
}

async fn create_post(
    State(state): State<AppState>,
    AuthUser(me): AuthUser,
    Json(req): Json<CreatePostRequest>,
) -> Result<Json<Post>, ServerError> {
    let content = non_empty(req.content);
    let image = non_empty(req.image);
    if content.is_none() && image.is_none() {
        return Err(ServerError::BadRequest("A post needs content or an image".into()));
    }

    let post = state.db.lock().await.create_post(
        me.id,
        content.as_deref(),
        image.as_deref(),
        state.now(),
    )?;

    state.events.broadcast(ServerEvent::NewPost(post.clone())).await;
    Ok(Json(post))
}

async fn delete_post(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<PostId>,
) -> Result<Json<serde_json::Value>, ServerError> {
    {
        let db = state.db.lock().await;
        let post = db.get_post(id)?;
        if post.author != auth.0.id && auth.require_admin().is_err() {
            return Err(ServerError::Forbidden("Only the author can delete this post".into()));
        }
        db.delete_post(id)?;
    }

    state.events.broadcast(ServerEvent::DeletePost(id)).await;
    Ok(ack("Post deleted"))
}

async fn toggle_like(
    State(state): State<AppState>,
    AuthUser(me): AuthUser,
    Path(id): Path<PostId>,
) -> Result<Json<Post>, ServerError> {
    let now = state.now();
    let (post, notify) = {
        let db = state.db.lock().await;
        let (post, liked) = db.toggle_like(id, me.id, now)?;
        let notify = liked && post.author != me.id;
        if notify {
            db.create_notification(
                post.author,
                NotificationKind::Like,
                &format!("{} liked your post", me.display_name()),
                Some(&format!("/posts/{id}")),
                now,
            )?;
        }
        (post, notify)
    };

    if notify {
        state.events.to_user(post.author, ServerEvent::Notification).await;
    }
    state.events.broadcast(ServerEvent::UpdatePost(post.clone())).await;
    Ok(Json(post))
}

async fn add_comment(
    State(state): State<AppState>,
    AuthUser(me): AuthUser,
    Path(id): Path<PostId>,
    Json(req): Json<CommentRequest>,
) -> Result<Json<Post>, ServerError> {
    let text = require_text(&req.text, "text")?;
    let now = state.now();

    let post = {
        let db = state.db.lock().await;
        let post = db.add_comment(id, me.id, &text, now)?;
        if post.author != me.id {
            db.create_notification(
                post.author,
                NotificationKind::Comment,
                &format!("{} commented on your post", me.display_name()),
                Some(&format!("/posts/{id}")),
                now,
            )?;
        }
        post
    };

    if post.author != me.id {
        state.events.to_user(post.author, ServerEvent::Notification).await;
    }
    state.events.broadcast(ServerEvent::UpdatePost(post.clone())).await;
    Ok(Json(post))
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use serde_json::json;

    use crate::api::test_support::{call, create_user};
    use crate::realtime::ServerEvent;
    use crate::state::test_support::test_state;

    #[tokio::test]
    async fn test_create_post_broadcasts() {
        let state = test_state();
        let alice = create_user(&state, "alice", false).await;
        let (_conn, mut rx) = state.registry.register().await;

        let (status, body) = call(
            &state,
            "POST",
            "/api/posts",
            Some(&alice.token),
            Some(json!({ "content": "hello world" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["content"], "hello world");

        match rx.try_recv().unwrap() {
            ServerEvent::NewPost(post) => assert_eq!(post.content.as_deref(), Some("hello world")),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_empty_post_rejected() {
        let state = test_state();
        let alice = create_user(&state, "alice", false).await;
        let (status, _) = call(&state, "POST", "/api/posts", Some(&alice.token), Some(json!({ "content": "  " }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_like_notifies_author() {
        let state = test_state();
        let alice = create_user(&state, "alice", false).await;
        let bob = create_user(&state, "bob", false).await;
        let post = state
            .db
            .lock()
            .await
            .create_post(alice.user.id, Some("hi"), None, state.now())
            .unwrap();

        let (conn, mut alice_rx) = state.registry.register().await;
        state.presence.join(conn, alice.user.id).await;
        while alice_rx.try_recv().is_ok() {}

        let uri = format!("/api/posts/{}/like", post.id);
        let (status, body) = call(&state, "POST", &uri, Some(&bob.token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["likes"], json!([bob.user.id.to_string()]));

        assert_eq!(alice_rx.try_recv().unwrap(), ServerEvent::Notification);
        assert!(matches!(alice_rx.try_recv().unwrap(), ServerEvent::UpdatePost(_)));
        assert_eq!(state.db.lock().await.count_unread_notifications(alice.user.id).unwrap(), 1);

        // Unlike: no new notification.
        call(&state, "POST", &uri, Some(&bob.token), None).await;
        assert_eq!(state.db.lock().await.count_unread_notifications(alice.user.id).unwrap(), 1);
    }

    #[tokio::test]
    async fn test_self_comment_does_not_notify() {
        let state = test_state();
        let alice = create_user(&state, "alice", false).await;
        let post = state
            .db
            .lock()
            .await
            .create_post(alice.user.id, Some("hi"), None, state.now())
            .unwrap();

        let uri = format!("/api/posts/{}/comment", post.id);
        let (status, body) = call(&state, "POST", &uri, Some(&alice.token), Some(json!({ "text": "me too" }))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["comments"][0]["text"], "me too");
        assert_eq!(state.db.lock().await.count_unread_notifications(alice.user.id).unwrap(), 0);
    }

    #[tokio::test]
    async fn test_only_author_or_admin_deletes() {
        let state = test_state();
        let alice = create_user(&state, "alice", false).await;
        let bob = create_user(&state, "bob", false).await;
        let admin = create_user(&state, "admin", true).await;
        let post = state
            .db
            .lock()
            .await
            .create_post(alice.user.id, Some("hi"), None, state.now())
            .unwrap();
        let uri = format!("/api/posts/{}", post.id);

        let (status, _) = call(&state, "DELETE", &uri, Some(&bob.token), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _) = call(&state, "DELETE", &uri, Some(&admin.token), None).await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = call(&state, "DELETE", &uri, Some(&alice.token), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
