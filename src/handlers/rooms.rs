// src/handlers/rooms.rs

//! Read-only HTTP views over the live duel state.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
    response::IntoResponse,
};
use serde_json::json;

use crate::{error::AppError, session::ChallengeHub, state::AppState};

/// Liveness plus a few gauges.
pub async fn health(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    if let Some(pool) = &state.pool {
        sqlx::query("SELECT 1").execute(pool).await.map_err(|e| {
            tracing::error!("Health check failed to reach the database: {:?}", e);
            AppError::InternalServerError(e.to_string())
        })?;
    }

    Ok(Json(json!({
        "status": "ok",
        "database": state.pool.is_some(),
        "connections": state.hub.registry().connection_count(),
        "rooms": state.hub.store().room_count(),
    })))
}

/// Current snapshot of a room. Never contains correct answers.
pub async fn get_room(
    State(hub): State<Arc<ChallengeHub>>,
    Path(room_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let snapshot = hub.room_snapshot(&room_id).await?;
    Ok(Json(snapshot))
}

/// Final result while the completed room is retained.
pub async fn get_room_result(
    State(hub): State<Arc<ChallengeHub>>,
    Path(room_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let result = hub.result(&room_id).await?;
    Ok(Json(result))
}

/// The open room a user is bound to, if any.
pub async fn get_user_room(
    State(hub): State<Arc<ChallengeHub>>,
    Path(user_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let room = hub.user_room(&user_id).await;
    Ok(Json(json!({
        "userId": user_id,
        "inRoom": room.is_some(),
        "roomId": room.as_ref().map(|(id, _)| id),
        "status": room.as_ref().map(|(_, status)| status),
    })))
}
