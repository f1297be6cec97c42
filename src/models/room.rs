// src/models/room.rs

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::{
    sync::Notify,
    task::AbortHandle,
    time::{Duration, Instant},
};

use crate::{
    error::ChallengeError,
    models::{
        challenge::ChallengeRequest,
        question::{PublicQuestion, Question},
        result::DuelResult,
    },
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum RoomStatus {
    WaitingForJoin,
    Active,
    Completed,
    Terminated,
}

impl RoomStatus {
    /// Waiting or active rooms still bind their users.
    pub fn is_open(self) -> bool {
        matches!(self, RoomStatus::WaitingForJoin | RoomStatus::Active)
    }
}

/// One participant's answer to the question currently on screen.
#[derive(Debug, Clone)]
pub struct AnswerSlot {
    pub answer: usize,
    pub is_correct: bool,
    pub time_spent_ms: u64,
}

/// Finalized per-question outcome kept in the participant's log.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerRecord {
    pub question_id: String,
    pub answer: Option<usize>,
    pub is_correct: bool,
    pub time_spent_ms: u64,
}

#[derive(Debug, Clone)]
pub struct Participant {
    pub user_id: String,
    pub display_name: String,
    pub connected: bool,
    pub score: u32,
    pub correct_count: u32,
    pub time_spent_ms: u64,
    pub answers: Vec<AnswerRecord>,
}

impl Participant {
    fn new(user_id: &str, display_name: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            display_name: display_name.to_string(),
            connected: false,
            score: 0,
            correct_count: 0,
            time_spent_ms: 0,
            answers: Vec::new(),
        }
    }
}

#[derive(Debug)]
struct CurrentQuestion {
    index: usize,
    deadline: Instant,
    answers: [Option<AnswerSlot>; 2],
    finalized: bool,
}

/// Everything the driver needs to announce a freshly opened question.
#[derive(Debug, Clone)]
pub struct QuestionStart {
    pub question: PublicQuestion,
    pub number: usize,
    pub total: usize,
    pub time_limit: u32,
    pub deadline: Instant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubmitOutcome {
    pub question_number: usize,
    pub both_answered: bool,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Standing {
    pub user_id: String,
    pub answered: bool,
    pub is_correct: bool,
    pub score: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct QuestionOutcome {
    pub question_number: usize,
    pub timed_out: bool,
    pub standings: Vec<Standing>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantView {
    pub user_id: String,
    pub user_name: String,
    pub connected: bool,
    pub score: u32,
}

/// Client-facing view of a room. Safe to send at any time.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSnapshot {
    pub room_id: String,
    pub challenge_id: String,
    pub course_id: String,
    pub course_name: String,
    pub status: RoomStatus,
    pub participants: Vec<ParticipantView>,
    pub question_number: usize,
    pub total_questions: usize,
    pub current_question: Option<PublicQuestion>,
    pub time_left: Option<u64>,
    /// Users who already answered the open question.
    pub answered: Vec<String>,
}

/// Live state of one duel. Always accessed behind the room's mutex.
#[derive(Debug)]
pub struct Room {
    pub room_id: String,
    pub challenge_id: String,
    pub course_id: String,
    pub course_name: String,
    /// Challenger first, challenged second.
    pub participants: [Participant; 2],
    pub status: RoomStatus,
    /// The challenged user accepted; activation may still wait for a connection.
    pub accepted: bool,
    pub created_at: DateTime<Utc>,
    pub result: Option<DuelResult>,
    /// Wakes the driver when both answers are in.
    pub notify: Arc<Notify>,
    activating: bool,
    questions: Vec<Question>,
    questions_started: usize,
    current: Option<CurrentQuestion>,
    driver: Option<AbortHandle>,
}

impl Room {
    pub fn new(challenge: &ChallengeRequest, challenger_name: &str, challenged_name: &str) -> Self {
        Self {
            room_id: challenge.room_id.clone(),
            challenge_id: challenge.challenge_id.clone(),
            course_id: challenge.course_id.clone(),
            course_name: challenge.course_name.clone(),
            participants: [
                Participant::new(&challenge.challenger_id, challenger_name),
                Participant::new(&challenge.challenged_id, challenged_name),
            ],
            status: RoomStatus::WaitingForJoin,
            accepted: false,
            created_at: Utc::now(),
            result: None,
            notify: Arc::new(Notify::new()),
            activating: false,
            questions: Vec::new(),
            questions_started: 0,
            current: None,
            driver: None,
        }
    }

    pub fn slot_of(&self, user_id: &str) -> Option<usize> {
        self.participants.iter().position(|p| p.user_id == user_id)
    }

    pub fn participant(&self, user_id: &str) -> Option<&Participant> {
        self.participants.iter().find(|p| p.user_id == user_id)
    }

    /// The other seat, if `user_id` holds one.
    pub fn peer_of(&self, user_id: &str) -> Option<&Participant> {
        self.slot_of(user_id).map(|slot| &self.participants[1 - slot])
    }

    pub fn user_ids(&self) -> [String; 2] {
        [
            self.participants[0].user_id.clone(),
            self.participants[1].user_id.clone(),
        ]
    }

    /// Returns the previous value, or `None` if the user has no seat here.
    pub fn set_connected(&mut self, user_id: &str, connected: bool) -> Option<bool> {
        let slot = self.slot_of(user_id)?;
        let previous = self.participants[slot].connected;
        self.participants[slot].connected = connected;
        Some(previous)
    }

    pub fn both_connected(&self) -> bool {
        self.participants.iter().all(|p| p.connected)
    }

    pub fn ready_to_activate(&self) -> bool {
        self.status == RoomStatus::WaitingForJoin
            && self.accepted
            && !self.activating
            && self.both_connected()
    }

    /// Claims the activation so only one caller fetches questions.
    pub fn begin_activation(&mut self) -> bool {
        if !self.ready_to_activate() {
            return false;
        }
        self.activating = true;
        true
    }

    pub fn abandon_activation(&mut self) {
        self.activating = false;
    }

    /// Installs the immutable question sequence and flips to `Active`.
    pub fn activate(&mut self, questions: Vec<Question>) {
        self.questions = questions;
        self.questions_started = 0;
        self.current = None;
        self.activating = false;
        self.status = RoomStatus::Active;
    }

    pub fn total_questions(&self) -> usize {
        self.questions.len()
    }

    /// 1-based number of the question on screen, 0 before the first.
    pub fn question_number(&self) -> usize {
        self.current.as_ref().map_or(0, |c| c.index + 1)
    }

    pub fn current_finalized(&self) -> bool {
        self.current.as_ref().is_some_and(|c| c.finalized)
    }

    /// Opens the next question. Answer slots start empty.
    pub fn begin_next_question(&mut self, now: Instant) -> Option<QuestionStart> {
        if self.status != RoomStatus::Active || self.questions_started >= self.questions.len() {
            return None;
        }
        let index = self.questions_started;
        let question = &self.questions[index];
        let deadline = now + Duration::from_secs(u64::from(question.time_limit_secs));

        let start = QuestionStart {
            question: PublicQuestion::from(question),
            number: index + 1,
            total: self.questions.len(),
            time_limit: question.time_limit_secs,
            deadline,
        };

        self.current = Some(CurrentQuestion {
            index,
            deadline,
            answers: [None, None],
            finalized: false,
        });
        self.questions_started += 1;
        Some(start)
    }

    /// Stores an answer for the open question, replacing any earlier one from
    /// the same user. `time_spent_secs` is clamped to the question's limit.
    pub fn record_answer(
        &mut self,
        user_id: &str,
        question_id: &str,
        answer: usize,
        time_spent_secs: f64,
        now: Instant,
    ) -> Result<SubmitOutcome, ChallengeError> {
        let slot = self.slot_of(user_id).ok_or(ChallengeError::NotParticipant)?;
        let current = match self.current.as_mut() {
            Some(current) if !current.finalized => current,
            _ => return Err(ChallengeError::StaleQuestion),
        };
        let question = &self.questions[current.index];
        if question.id != question_id || now > current.deadline {
            return Err(ChallengeError::StaleQuestion);
        }
        if answer >= question.options.len() {
            return Err(ChallengeError::InvalidAnswer(answer));
        }

        current.answers[slot] = Some(AnswerSlot {
            answer,
            is_correct: question.is_correct(answer),
            time_spent_ms: clamp_time_spent(time_spent_secs, question.time_limit_secs),
        });

        Ok(SubmitOutcome {
            question_number: current.index + 1,
            both_answered: current.answers.iter().all(Option::is_some),
        })
    }

    /// Settles the open question exactly once. A seat without an answer is
    /// scored incorrect with the full time limit.
    pub fn finalize_current(&mut self, points_per_correct: u32) -> Option<QuestionOutcome> {
        let current = self.current.as_mut()?;
        if current.finalized {
            return None;
        }
        current.finalized = true;

        let question = &self.questions[current.index];
        let full_time_ms = u64::from(question.time_limit_secs) * 1000;
        let timed_out = current.answers.iter().any(Option::is_none);
        let mut standings = Vec::with_capacity(2);

        for (participant, slot) in self.participants.iter_mut().zip(current.answers.iter()) {
            let record = match slot {
                Some(slot) => AnswerRecord {
                    question_id: question.id.clone(),
                    answer: Some(slot.answer),
                    is_correct: slot.is_correct,
                    time_spent_ms: slot.time_spent_ms,
                },
                None => AnswerRecord {
                    question_id: question.id.clone(),
                    answer: None,
                    is_correct: false,
                    time_spent_ms: full_time_ms,
                },
            };

            if record.is_correct {
                participant.score += points_per_correct;
                participant.correct_count += 1;
            }
            participant.time_spent_ms += record.time_spent_ms;

            standings.push(Standing {
                user_id: participant.user_id.clone(),
                answered: record.answer.is_some(),
                is_correct: record.is_correct,
                score: participant.score,
            });
            participant.answers.push(record);
        }

        Some(QuestionOutcome {
            question_number: current.index + 1,
            timed_out,
            standings,
        })
    }

    pub fn set_driver(&mut self, handle: AbortHandle) {
        if let Some(previous) = self.driver.replace(handle) {
            previous.abort();
        }
    }

    fn abort_driver(&mut self) {
        if let Some(handle) = self.driver.take() {
            handle.abort();
        }
    }

    /// Moves an open room to `Terminated`. Returns false if it was already closed.
    pub fn terminate(&mut self) -> bool {
        if !self.status.is_open() {
            return false;
        }
        self.status = RoomStatus::Terminated;
        self.activating = false;
        self.abort_driver();
        true
    }

    pub fn complete(&mut self, result: DuelResult) {
        self.status = RoomStatus::Completed;
        self.result = Some(result);
        // The driver itself calls this; dropping the handle does not abort it.
        self.driver = None;
    }

    pub fn snapshot(&self, now: Instant) -> RoomSnapshot {
        let open = self
            .current
            .as_ref()
            .filter(|c| self.status == RoomStatus::Active && !c.finalized);

        RoomSnapshot {
            room_id: self.room_id.clone(),
            challenge_id: self.challenge_id.clone(),
            course_id: self.course_id.clone(),
            course_name: self.course_name.clone(),
            status: self.status,
            participants: self
                .participants
                .iter()
                .map(|p| ParticipantView {
                    user_id: p.user_id.clone(),
                    user_name: p.display_name.clone(),
                    connected: p.connected,
                    score: p.score,
                })
                .collect(),
            question_number: self.question_number(),
            total_questions: self.total_questions(),
            current_question: open.map(|c| PublicQuestion::from(&self.questions[c.index])),
            time_left: open.map(|c| seconds_left(c.deadline, now)),
            answered: open
                .map(|c| {
                    c.answers
                        .iter()
                        .zip(self.participants.iter())
                        .filter(|(slot, _)| slot.is_some())
                        .map(|(_, p)| p.user_id.clone())
                        .collect()
                })
                .unwrap_or_default(),
        }
    }
}

/// Whole seconds remaining, rounded up so "1" is shown until the very end.
pub fn seconds_left(deadline: Instant, now: Instant) -> u64 {
    let left = deadline.saturating_duration_since(now);
    left.as_millis().div_ceil(1000) as u64
}

fn clamp_time_spent(secs: f64, time_limit_secs: u32) -> u64 {
    let limit = f64::from(time_limit_secs);
    let secs = if secs.is_finite() { secs.clamp(0.0, limit) } else { limit };
    (secs * 1000.0).round() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::question::Difficulty;

    fn challenge() -> ChallengeRequest {
        ChallengeRequest {
            challenge_id: "c1".into(),
            challenger_id: "alice".into(),
            challenged_id: "bob".into(),
            course_id: "rust-101".into(),
            course_name: "Rust 101".into(),
            room_id: "r1".into(),
            created_at: Utc::now(),
        }
    }

    fn question(id: &str, correct: usize) -> Question {
        Question {
            id: id.into(),
            text: format!("Question {}", id),
            options: vec!["A".into(), "B".into(), "C".into(), "D".into()],
            correct_answer: correct,
            explanation: None,
            difficulty: Difficulty::Medium,
            time_limit_secs: 10,
        }
    }

    fn active_room() -> Room {
        let mut room = Room::new(&challenge(), "Alice", "Bob");
        room.accepted = true;
        room.set_connected("alice", true);
        room.set_connected("bob", true);
        assert!(room.begin_activation());
        room.activate(vec![question("q1", 0), question("q2", 1)]);
        room
    }

    #[test]
    fn activation_requires_accept_and_both_connections() {
        let mut room = Room::new(&challenge(), "Alice", "Bob");
        room.set_connected("alice", true);
        room.accepted = true;
        assert!(!room.ready_to_activate());
        room.set_connected("bob", true);
        assert!(room.begin_activation());
        // A second caller loses the race.
        assert!(!room.begin_activation());
    }

    #[test]
    fn duplicate_submission_overwrites() {
        let mut room = active_room();
        let now = Instant::now();
        room.begin_next_question(now).unwrap();

        room.record_answer("alice", "q1", 0, 2.0, now).unwrap();
        room.record_answer("alice", "q1", 0, 2.0, now).unwrap();
        room.record_answer("bob", "q1", 3, 4.0, now).unwrap();

        let outcome = room.finalize_current(1).unwrap();
        assert!(!outcome.timed_out);
        assert_eq!(room.participants[0].score, 1);
        assert_eq!(room.participants[0].time_spent_ms, 2000);
        assert_eq!(room.participants[0].answers.len(), 1);
        assert_eq!(room.participants[1].score, 0);
    }

    #[test]
    fn wrong_question_id_is_stale() {
        let mut room = active_room();
        let now = Instant::now();
        room.begin_next_question(now).unwrap();
        assert_eq!(
            room.record_answer("alice", "q2", 0, 1.0, now),
            Err(ChallengeError::StaleQuestion)
        );
    }

    #[test]
    fn finalized_question_rejects_late_answers() {
        let mut room = active_room();
        let now = Instant::now();
        room.begin_next_question(now).unwrap();
        room.finalize_current(1).unwrap();
        assert!(room.finalize_current(1).is_none());
        assert_eq!(
            room.record_answer("bob", "q1", 0, 1.0, now),
            Err(ChallengeError::StaleQuestion)
        );
    }

    #[test]
    fn missing_answer_counts_full_time_limit() {
        let mut room = active_room();
        let now = Instant::now();
        room.begin_next_question(now).unwrap();
        room.record_answer("bob", "q1", 0, 3.0, now).unwrap();

        let outcome = room.finalize_current(1).unwrap();
        assert!(outcome.timed_out);
        assert!(!outcome.standings[0].answered);
        assert_eq!(room.participants[0].time_spent_ms, 10_000);
        assert_eq!(room.participants[0].score, 0);
        assert_eq!(room.participants[1].score, 1);
    }

    #[test]
    fn out_of_range_answer_and_outsider_rejected() {
        let mut room = active_room();
        let now = Instant::now();
        room.begin_next_question(now).unwrap();
        assert_eq!(
            room.record_answer("alice", "q1", 4, 1.0, now),
            Err(ChallengeError::InvalidAnswer(4))
        );
        assert_eq!(
            room.record_answer("mallory", "q1", 0, 1.0, now),
            Err(ChallengeError::NotParticipant)
        );
    }

    #[test]
    fn question_numbers_increase_until_exhausted() {
        let mut room = active_room();
        let now = Instant::now();
        let first = room.begin_next_question(now).unwrap();
        room.finalize_current(1);
        let second = room.begin_next_question(now).unwrap();
        room.finalize_current(1);
        assert_eq!((first.number, second.number), (1, 2));
        assert!(room.begin_next_question(now).is_none());
    }

    #[test]
    fn time_spent_is_clamped() {
        assert_eq!(clamp_time_spent(-3.0, 10), 0);
        assert_eq!(clamp_time_spent(99.0, 10), 10_000);
        assert_eq!(clamp_time_spent(f64::NAN, 10), 10_000);
        assert_eq!(clamp_time_spent(1.25, 10), 1250);
    }

    #[test]
    fn seconds_left_rounds_up() {
        let now = Instant::now();
        assert_eq!(seconds_left(now + Duration::from_millis(1500), now), 2);
        assert_eq!(seconds_left(now, now + Duration::from_secs(1)), 0);
    }

    #[test]
    fn terminate_is_idempotent() {
        let mut room = active_room();
        assert!(room.terminate());
        assert!(!room.terminate());
        assert_eq!(room.status, RoomStatus::Terminated);
    }
}
