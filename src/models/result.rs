// src/models/result.rs

use serde::Serialize;
use sqlx::FromRow;

/// Display name used as `winnerName` when nobody wins.
pub const TIE_SENTINEL: &str = "Tie";

/// One side of a finished duel.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantResult {
    pub user_id: String,
    pub user_name: String,
    pub score: u32,
    pub correct_count: u32,
    pub total_time_ms: u64,
    pub average_time_ms: u64,
}

/// The terminal result of a duel, sent as `challenge_results`.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DuelResult {
    pub room_id: String,
    pub course_id: String,
    pub course_name: String,
    pub total_questions: usize,
    pub participants: Vec<ParticipantResult>,
    /// `None` on a tie.
    pub winner_id: Option<String>,
    pub winner_name: String,
    pub completed_at: chrono::DateTime<chrono::Utc>,
}

/// Represents a row of the 'duel_results' table.
/// One row is written per participant, feeding the external leaderboard.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct DuelRecord {
    pub user_id: String,
    pub course_id: String,
    pub room_id: String,
    pub score: i64,
    pub correct_count: i64,
    pub total_questions: i64,
    pub won: bool,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl DuelResult {
    /// Splits the result into the per-user rows handed to storage.
    pub fn records(&self) -> Vec<DuelRecord> {
        self.participants
            .iter()
            .map(|p| DuelRecord {
                user_id: p.user_id.clone(),
                course_id: self.course_id.clone(),
                room_id: self.room_id.clone(),
                score: i64::from(p.score),
                correct_count: i64::from(p.correct_count),
                total_questions: self.total_questions as i64,
                won: self.winner_id.as_deref() == Some(p.user_id.as_str()),
                created_at: self.completed_at,
            })
            .collect()
    }
}
