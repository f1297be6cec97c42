// src/models/challenge.rs

use chrono::{DateTime, Utc};
use serde::Serialize;

/// A pending proposal from one user to another.
///
/// Lives in the store only while it is undecided; accept, decline,
/// withdrawal and expiry all remove it.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChallengeRequest {
    pub challenge_id: String,
    pub challenger_id: String,
    pub challenged_id: String,
    pub course_id: String,
    pub course_name: String,
    /// Room pre-allocated in `WaitingForJoin` for this challenge.
    pub room_id: String,
    pub created_at: DateTime<Utc>,
}

/// Key used to reject duplicate outstanding challenges from a flaky client.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChallengeKey {
    pub challenger_id: String,
    pub challenged_id: String,
    pub course_id: String,
}

impl ChallengeRequest {
    pub fn key(&self) -> ChallengeKey {
        ChallengeKey {
            challenger_id: self.challenger_id.clone(),
            challenged_id: self.challenged_id.clone(),
            course_id: self.course_id.clone(),
        }
    }
}

/// Why a challenge ended without a duel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeclineReason {
    /// The challenged user said no.
    Declined,
    /// The challenged user accepted a different challenge first.
    OpponentBusy,
    /// Nobody answered within the configured timeout.
    Expired,
    /// The challenger left or dropped before it was answered.
    Withdrawn,
}
