use axum::{
    extract::{Path, State},
    routing::{delete, get, post},
    Json, Router,
};
use serde::Deserialize;

use socialbook_shared::{GroupId, UserId};
use socialbook_store::{Group, GroupMessage, User};

use super::{ack, require_text};
use crate::auth::AuthUser;
use crate::error::ServerError;
use crate::realtime::ServerEvent;
use crate::state::AppState;

pub(super) fn routes() -> Router<AppState> {
    Router::new()
        .route("/groups", get(my_groups).post(create_group))
        .route("/groups/{id}/messages", get(group_messages).post(post_message))
        .route("/groups/{id}/members", post(add_member))
        .route("/groups/{id}/members/{user_id}", delete(remove_member))
        .route("/groups/{id}/admins", post(promote_admin))
        .route("/groups/{id}/leave", post(leave_group))
}

#[derive(Deserialize)]
struct CreateGroupRequest {
    name: String,
    #[serde(default)]
    members: Vec<UserId>,
}

#[derive(Deserialize)]
struct GroupMessageRequest {
    text: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct MemberRequest {
    user_id: UserId,
}

fn ensure_member(group: &Group, user: &User) -> Result<(), ServerError> {
    if !group.is_member(&user.id) {
        return Err(ServerError::Forbidden("Not a member of this group".into()));
    }
    Ok(())
}

fn ensure_group_admin(group: &Group, user: &User) -> Result<(), ServerError> {
    if !group.is_admin(&user.id) {
        return Err(ServerError::Forbidden("Group admin rights required".into()));
    }
    Ok(())
}

async fn my_groups(
    State(state): State<AppState>,
    AuthUser(me): AuthUser,
) -> Result<Json<Vec<Group>>, ServerError> {
    Ok(Json(state.db.lock().await.list_groups_for_member(me.id)?))
}

async fn create_group(
    State(state): State<AppState>,
    AuthUser(me): AuthUser,
    Json(req): Json<CreateGroupRequest>,
) -> Result<Json<Group>, ServerError> {
    let name = require_text(&req.name, "name")?;
    let mut others: Vec<UserId> = req.members.into_iter().filter(|m| *m != me.id).collect();
    others.sort();
    others.dedup();
    if others.is_empty() {
        return Err(ServerError::BadRequest("A group needs at least one other member".into()));
    }

    let group = {
        let db = state.db.lock().await;
        for member in &others {
            if !db.user_exists(*member)? {
                return Err(ServerError::BadRequest(format!("Unknown member {member}")));
            }
        }
        db.create_group(&name, me.id, &others, state.now())?
    };

    state
        .events
        .to_users(&others, ServerEvent::AddedToGroup(group.clone()))
        .await;
    Ok(Json(group))
}

async fn group_messages(
    State(state): State<AppState>,
    AuthUser(me): AuthUser,
    Path(id): Path<GroupId>,
) -> Result<Json<Vec<GroupMessage>>, ServerError> {
    let db = state.db.lock().await;
    ensure_member(&db.get_group(id)?, &me)?;
    Ok(Json(db.group_messages(id, state.now())?))
}

async fn post_message(
    State(state): State<AppState>,
    AuthUser(me): AuthUser,
    Path(id): Path<GroupId>,
    Json(req): Json<GroupMessageRequest>,
) -> Result<Json<GroupMessage>, ServerError> {
    let text = require_text(&req.text, "text")?;
    let message = {
        let db = state.db.lock().await;
        ensure_member(&db.get_group(id)?, &me)?;
        db.insert_group_message(id, me.id, &text, state.now())?
    };

    state
        .events
        .to_group(
            id,
            ServerEvent::NewGroupMessage {
                group_id: id,
                message: message.clone(),
            },
        )
        .await;
    Ok(Json(message))
}

async fn add_member(
    State(state): State<AppState>,
    AuthUser(me): AuthUser,
    Path(id): Path<GroupId>,
    Json(req): Json<MemberRequest>,
) -> Result<Json<Group>, ServerError> {
    let group = {
        let db = state.db.lock().await;
        ensure_group_admin(&db.get_group(id)?, &me)?;
        if !db.user_exists(req.user_id)? {
            return Err(ServerError::NotFound("User not found".into()));
        }
        db.add_group_member(id, req.user_id, state.now())?
    };

    state
        .events
        .to_user(req.user_id, ServerEvent::AddedToGroup(group.clone()))
        .await;
    Ok(Json(group))
}

async fn remove_member(
    State(state): State<AppState>,
    AuthUser(me): AuthUser,
    Path((id, target)): Path<(GroupId, UserId)>,
) -> Result<Json<Group>, ServerError> {
    let group = {
        let db = state.db.lock().await;
        ensure_group_admin(&db.get_group(id)?, &me)?;
        db.remove_group_member(id, target)?
    };

    state.events.to_user(target, ServerEvent::RemovedFromGroup(id)).await;
    Ok(Json(group))
}

async fn promote_admin(
    State(state): State<AppState>,
    AuthUser(me): AuthUser,
    Path(id): Path<GroupId>,
    Json(req): Json<MemberRequest>,
) -> Result<Json<Group>, ServerError> {
    let db = state.db.lock().await;
    ensure_group_admin(&db.get_group(id)?, &me)?;
    Ok(Json(db.promote_group_admin(id, req.user_id)?))
}

/// Leaving as the creator dissolves the group for everyone.
async fn leave_group(
    State(state): State<AppState>,
    AuthUser(me): AuthUser,
    Path(id): Path<GroupId>,
) -> Result<Json<serde_json::Value>, ServerError> {
    let group = {
        let db = state.db.lock().await;
        let group = db.get_group(id)?;
        ensure_member(&group, &me)?;
        if group.creator == me.id {
            db.delete_group(id)?;
        } else {
            db.remove_group_member(id, me.id)?;
        }
        group
    };

    if group.creator == me.id {
        state
            .events
            .to_users(&group.members, ServerEvent::GroupDeleted(id))
            .await;
        state.events.to_group(id, ServerEvent::GroupDeleted(id)).await;
        Ok(ack("Group deleted"))
    } else {
        state.events.to_user(me.id, ServerEvent::RemovedFromGroup(id)).await;
        Ok(ack("Left group"))
    }
}
