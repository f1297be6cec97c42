// src/routes.rs

use axum::{
    Router,
    http::{HeaderValue, Method},
    routing::get,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    handlers::{rooms, ws},
    state::AppState,
};

/// Assembles the main application router.
///
/// * `/ws` carries the duel protocol.
/// * `/api` exposes read-only views of rooms and users.
/// * Applies global middleware (Trace, CORS).
pub fn create_router(state: AppState) -> Router {
    let origins: Vec<HeaderValue> = state
        .config
        .cors_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin {:?}", origin);
                None
            }
        })
        .collect();

    let cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET])
        .allow_headers([axum::http::header::CONTENT_TYPE]);

    let room_routes = Router::new()
        .route("/{room_id}", get(rooms::get_room))
        .route("/{room_id}/result", get(rooms::get_room_result));

    let user_routes = Router::new().route("/{user_id}/room", get(rooms::get_user_room));

    Router::new()
        .route("/ws", get(ws::ws_handler))
        .route("/api/health", get(rooms::health))
        .nest("/api/rooms", room_routes)
        .nest("/api/users", user_routes)
        // Global Middleware (applied from outside in)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
