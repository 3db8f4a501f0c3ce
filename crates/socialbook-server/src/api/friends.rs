use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;

use socialbook_shared::constants::SUGGESTION_LIMIT;
use socialbook_shared::{FriendRequestId, UserId};
use socialbook_store::{FriendRequest, NotificationKind, StoreError, UserSummary};

use super::ack;
use crate::auth::AuthUser;
use crate::error::ServerError;
use crate::realtime::ServerEvent;
use crate::state::AppState;

pub(super) fn routes() -> Router<AppState> {
    Router::new()
        .route("/friends/requests", get(incoming_requests))
        .route("/friends/request/{user_id}", post(send_request))
        .route("/friends/accept/{request_id}", post(accept_request))
        .route("/friends/decline/{request_id}", post(decline_request))
        .route("/friends/suggestions", get(suggestions))
}

/// A pending request with the sender's public profile attached.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct IncomingRequest {
    #[serde(flatten)]
    request: FriendRequest,
    sender: Option<UserSummary>,
}

async fn incoming_requests(
    State(state): State<AppState>,
    AuthUser(me): AuthUser,
) -> Result<Json<Vec<IncomingRequest>>, ServerError> {
    let db = state.db.lock().await;
    let mut out = Vec::new();
    for request in db.incoming_friend_requests(me.id)? {
        let sender = db.user_summary(request.from)?;
        out.push(IncomingRequest { request, sender });
    }
    Ok(Json(out))
}

async fn send_request(
    State(state): State<AppState>,
    AuthUser(me): AuthUser,
    Path(target): Path<UserId>,
) -> Result<Json<FriendRequest>, ServerError> {
    if target == me.id {
        return Err(ServerError::BadRequest("Cannot befriend yourself".into()));
    }

    let now = state.now();
    let request = {
        let db = state.db.lock().await;
        if !db.user_exists(target)? {
            return Err(ServerError::NotFound("User not found".into()));
        }
        if db.are_friends(me.id, target)? {
            return Err(ServerError::BadRequest("Already friends".into()));
        }
        let request = match db.create_friend_request(me.id, target, now) {
            Ok(r) => r,
            Err(StoreError::Conflict(msg)) => return Err(ServerError::BadRequest(msg)),
            Err(e) => return Err(e.into()),
        };
        db.create_notification(
            target,
            NotificationKind::Friend,
            &format!("{} sent you a friend request", me.display_name()),
            Some("/friends"),
            now,
        )?;
        request
    };

    state.events.to_user(target, ServerEvent::Notification).await;
    state.events.to_user(target, ServerEvent::FriendRequest).await;
    Ok(Json(request))
}

/// Only the recipient of a pending request may answer it.
fn answerable(request: &FriendRequest, me: UserId) -> Result<(), ServerError> {
    if request.to != me || request.status != socialbook_store::FriendRequestStatus::Pending {
        return Err(ServerError::NotFound("Request not found".into()));
    }
    Ok(())
}

async fn accept_request(
    State(state): State<AppState>,
    AuthUser(me): AuthUser,
    Path(id): Path<FriendRequestId>,
) -> Result<Json<serde_json::Value>, ServerError> {
    let now = state.now();
    let requester = {
        let db = state.db.lock().await;
        let request = db.get_friend_request(id)?;
        answerable(&request, me.id)?;
        let request = db.accept_friend_request(id, now)?;
        db.create_notification(
            request.from,
            NotificationKind::Friend,
            &format!("{} accepted your friend request", me.display_name()),
            Some(&format!("/profile/{}", me.id)),
            now,
        )?;
        request.from
    };

    state.events.to_user(requester, ServerEvent::Notification).await;
    Ok(ack("Accepted"))
}

async fn decline_request(
    State(state): State<AppState>,
    AuthUser(me): AuthUser,
    Path(id): Path<FriendRequestId>,
) -> Result<Json<serde_json::Value>, ServerError> {
    let db = state.db.lock().await;
    let request = db.get_friend_request(id)?;
    answerable(&request, me.id)?;
    db.delete_friend_request(id)?;
    Ok(ack("Declined"))
}

async fn suggestions(
    State(state): State<AppState>,
    AuthUser(me): AuthUser,
) -> Result<Json<Vec<UserSummary>>, ServerError> {
    let list = state
        .db
        .lock()
        .await
        .friend_suggestions(me.id, SUGGESTION_LIMIT)?;
    Ok(Json(list))
}
