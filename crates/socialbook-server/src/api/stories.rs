use axum::{
    extract::{Path, State},
    routing::{delete, get, post},
    Json, Router,
};
use serde::Deserialize;

use socialbook_shared::StoryId;
use socialbook_store::Story;

use super::{ack, require_text};
use crate::auth::AuthUser;
use crate::error::ServerError;
use crate::realtime::ServerEvent;
use crate::state::AppState;

pub(super) fn routes() -> Router<AppState> {
    Router::new()
        .route("/stories", get(active_stories).post(create_story))
        .route("/stories/{id}/view", post(view_story))
        .route("/stories/{id}", delete(delete_story))
}

#[derive(Deserialize)]
struct CreateStoryRequest {
    image: String,
}

async fn active_stories(
    State(state): State<AppState>,
    _caller: AuthUser,
) -> Result<Json<Vec<Story>>, ServerError> {
    Ok(Json(state.db.lock().await.active_stories(state.now())?))
}

async fn create_story(
    State(state): State<AppState>,
    AuthUser(me): AuthUser,
    Json(req): Json<CreateStoryRequest>,
) -> Result<Json<Story>, ServerError> {
    let image = require_text(&req.image, "image")?;
    let story = state.db.lock().await.create_story(me.id, &image, state.now())?;

    state.events.broadcast(ServerEvent::NewStory(story.clone())).await;
    Ok(Json(story))
}

async fn view_story(
    State(state): State<AppState>,
    AuthUser(me): AuthUser,
    Path(id): Path<StoryId>,
) -> Result<Json<Story>, ServerError> {
    let now = state.now();
    let db = state.db.lock().await;
    // Expired stories behave as gone even before the TTL monitor runs.
    if db.get_story(id)?.expires_at <= now {
        return Err(ServerError::NotFound("Story not found".into()));
    }
    Ok(Json(db.mark_story_viewed(id, me.id, now)?))
}

async fn delete_story(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<StoryId>,
) -> Result<Json<serde_json::Value>, ServerError> {
    {
        let db = state.db.lock().await;
        let story = db.get_story(id)?;
        if story.author != auth.0.id && auth.require_admin().is_err() {
            return Err(ServerError::Forbidden("Only the author can delete this story".into()));
        }
        db.delete_story(id)?;
    }

    state.events.broadcast(ServerEvent::StoryDeleted(id)).await;
    Ok(ack("Story deleted"))
}
