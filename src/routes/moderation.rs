//! Moderation routes.

use axum::extract::{Path, State};
use axum::response::Json;

use crate::event::now_ms;
use crate::services::moderation::TimeoutStatus;
use crate::state::AppState;

/// `GET /api/timeouts/{user_id}`: current timeout status of a user.
pub async fn timeout_status(State(state): State<AppState>, Path(user_id): Path<String>) -> Json<TimeoutStatus> {
    let room = state.room.read().await;
    Json(room.moderation.status_at(&user_id, now_ms()))
}

#[cfg(test)]
#[path = "moderation_test.rs"]
mod tests;
