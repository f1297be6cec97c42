// src/state.rs

use std::sync::Arc;

use axum::extract::FromRef;
use sqlx::PgPool;

use crate::{config::Config, session::ChallengeHub};

#[derive(Clone)]
pub struct AppState {
    pub hub: Arc<ChallengeHub>,
    /// Present only when a database is configured.
    pub pool: Option<PgPool>,
    pub config: Config,
}

impl FromRef<AppState> for Arc<ChallengeHub> {
    fn from_ref(state: &AppState) -> Self {
        state.hub.clone()
    }
}

impl FromRef<AppState> for Config {
    fn from_ref(state: &AppState) -> Self {
        state.config.clone()
    }
}
