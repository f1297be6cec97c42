// src/session/scoring.rs

use std::{cmp::Ordering, sync::Arc};

use chrono::Utc;

use super::{ChallengeHub, store::RoomHandle};
use crate::models::{
    protocol::ServerEvent,
    result::{DuelResult, ParticipantResult, TIE_SENTINEL},
    room::{Participant, Room, RoomStatus},
};

/// Builds the terminal result from the room's final tallies.
pub fn compile_result(room: &Room) -> DuelResult {
    let total_questions = room.total_questions();
    let participants: Vec<ParticipantResult> = room
        .participants
        .iter()
        .map(|p| participant_result(p, total_questions))
        .collect();

    let winner = decide_winner(&participants[0], &participants[1]).map(|i| &participants[i]);

    DuelResult {
        room_id: room.room_id.clone(),
        course_id: room.course_id.clone(),
        course_name: room.course_name.clone(),
        total_questions,
        winner_id: winner.map(|w| w.user_id.clone()),
        winner_name: winner.map_or_else(|| TIE_SENTINEL.to_string(), |w| w.user_name.clone()),
        participants,
        completed_at: Utc::now(),
    }
}

fn participant_result(participant: &Participant, total_questions: usize) -> ParticipantResult {
    let average_time_ms = match total_questions {
        0 => 0,
        n => participant.time_spent_ms / n as u64,
    };
    ParticipantResult {
        user_id: participant.user_id.clone(),
        user_name: participant.display_name.clone(),
        score: participant.score,
        correct_count: participant.correct_count,
        total_time_ms: participant.time_spent_ms,
        average_time_ms,
    }
}

/// Index of the winner: higher score first, then less total time.
/// `None` when both are equal.
pub fn decide_winner(first: &ParticipantResult, second: &ParticipantResult) -> Option<usize> {
    let ordering = first
        .score
        .cmp(&second.score)
        .then_with(|| second.total_time_ms.cmp(&first.total_time_ms));
    match ordering {
        Ordering::Greater => Some(0),
        Ordering::Less => Some(1),
        Ordering::Equal => None,
    }
}

impl ChallengeHub {
    /// Closes an active room after its last question: publishes the result,
    /// frees both users and hands the scores to storage.
    pub(crate) async fn complete_room(self: &Arc<Self>, handle: &RoomHandle) {
        let result = {
            let mut room = handle.lock().await;
            if room.status != RoomStatus::Active {
                return;
            }
            let result = compile_result(&room);
            room.complete(result.clone());

            for user_id in room.user_ids() {
                self.store.release_user(&user_id, &room.room_id);
            }
            self.broadcast(&room, ServerEvent::ChallengeResults(result.clone()));
            result
        };

        tracing::info!(
            "Room {} completed, winner: {}",
            result.room_id,
            result.winner_name
        );

        self.persist_result(result.clone());
        self.schedule_eviction(result.room_id);
    }

    /// Storage runs after delivery; a failure only earns the players a warning.
    fn persist_result(self: &Arc<Self>, result: DuelResult) {
        let hub = Arc::clone(self);
        tokio::spawn(async move {
            let mut failed = false;
            for record in result.records() {
                if let Err(e) = hub.services.results.record(&record).await {
                    tracing::error!(
                        "Failed to store result of {} for {}: {}",
                        record.room_id,
                        record.user_id,
                        e
                    );
                    failed = true;
                }
            }

            if failed {
                for participant in &result.participants {
                    hub.notify(
                        &participant.user_id,
                        ServerEvent::ResultWarning {
                            room_id: result.room_id.clone(),
                            message: "Your result could not be saved".to_string(),
                        },
                    );
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        challenge::ChallengeRequest,
        question::{Difficulty, Question},
    };

    fn result(user: &str, score: u32, total_time_ms: u64) -> ParticipantResult {
        ParticipantResult {
            user_id: user.into(),
            user_name: user.to_uppercase(),
            score,
            correct_count: score,
            total_time_ms,
            average_time_ms: total_time_ms / 5,
        }
    }

    #[test]
    fn higher_score_wins() {
        assert_eq!(
            decide_winner(&result("a", 4, 9000), &result("b", 3, 1000)),
            Some(0)
        );
        assert_eq!(
            decide_winner(&result("a", 1, 1000), &result("b", 2, 9000)),
            Some(1)
        );
    }

    #[test]
    fn equal_score_goes_to_the_faster() {
        assert_eq!(
            decide_winner(&result("a", 3, 12_000), &result("b", 3, 10_000)),
            Some(1)
        );
    }

    #[test]
    fn identical_totals_tie() {
        assert_eq!(decide_winner(&result("a", 3, 5000), &result("b", 3, 5000)), None);
    }

    fn finished_room(scores: [(u32, u64); 2]) -> Room {
        let challenge = ChallengeRequest {
            challenge_id: "c1".into(),
            challenger_id: "alice".into(),
            challenged_id: "bob".into(),
            course_id: "rust-101".into(),
            course_name: "Rust 101".into(),
            room_id: "r1".into(),
            created_at: Utc::now(),
        };
        let mut room = Room::new(&challenge, "Alice", "Bob");
        let questions = (0..4)
            .map(|i| Question {
                id: format!("q{}", i),
                text: "?".into(),
                options: vec!["a".into(), "b".into(), "c".into(), "d".into()],
                correct_answer: 0,
                explanation: None,
                difficulty: Difficulty::Easy,
                time_limit_secs: 10,
            })
            .collect();
        room.activate(questions);
        for (participant, (score, time)) in room.participants.iter_mut().zip(scores) {
            participant.score = score;
            participant.correct_count = score;
            participant.time_spent_ms = time;
        }
        room
    }

    #[test]
    fn compiled_result_names_the_winner() {
        let result = compile_result(&finished_room([(3, 8000), (2, 4000)]));
        assert_eq!(result.winner_id.as_deref(), Some("alice"));
        assert_eq!(result.winner_name, "Alice");
        assert_eq!(result.total_questions, 4);
        assert_eq!(result.participants[0].average_time_ms, 2000);
        assert_eq!(result.participants[1].average_time_ms, 1000);
    }

    #[test]
    fn compiled_tie_uses_sentinel() {
        let result = compile_result(&finished_room([(2, 4000), (2, 4000)]));
        assert_eq!(result.winner_id, None);
        assert_eq!(result.winner_name, TIE_SENTINEL);

        let records = result.records();
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| !r.won));
    }
}
