// src/session/quiz.rs

//! Question sequencing for active rooms.
//!
//! Each active room gets one driver task. It opens questions one at a time
//! and closes each either when both answers are in (woken through the
//! room's `Notify`) or when the deadline passes. Submissions never advance
//! the room themselves; they only record and finalize under the room lock.

use std::{sync::Arc, time::Duration};

use tokio::{
    sync::Notify,
    time::{self, Instant, MissedTickBehavior},
};

use super::{ChallengeHub, store::RoomHandle};
use crate::{
    error::ChallengeError,
    models::{
        protocol::{ServerEvent, SubmitAnswerPayload},
        question::Question,
        room::{QuestionOutcome, Room, RoomStatus, seconds_left},
    },
    services::Course,
};

const TIME_SYNC_INTERVAL: Duration = Duration::from_secs(1);

enum QuestionEnd {
    Settled,
    RoomClosed,
}

impl ChallengeHub {
    pub(crate) fn spawn_activation(self: &Arc<Self>, handle: RoomHandle) {
        let hub = Arc::clone(self);
        tokio::spawn(async move { hub.activate(handle).await });
    }

    /// Fetches the question sequence, then starts the driver. The room lock
    /// is not held while the generator runs.
    async fn activate(self: Arc<Self>, handle: RoomHandle) {
        let course = {
            let room = handle.lock().await;
            Course {
                id: room.course_id.clone(),
                name: room.course_name.clone(),
            }
        };

        let fetched = self.fetch_questions(&course).await;

        let mut room = handle.lock().await;
        if room.status != RoomStatus::WaitingForJoin {
            tracing::debug!("Room {} closed while questions were generated", room.room_id);
            room.abandon_activation();
            return;
        }

        let questions = match fetched {
            Ok(questions) if !questions.is_empty() => questions,
            Ok(_) => {
                drop(room);
                self.cancel_room(&handle, "No questions were generated".to_string())
                    .await;
                return;
            }
            Err(e) => {
                tracing::error!("Failed to prepare questions for room: {}", e);
                drop(room);
                self.cancel_room(&handle, e.to_string()).await;
                return;
            }
        };

        let first_time_limit = questions[0].time_limit_secs;
        room.activate(questions);
        let started = ServerEvent::ChallengeStarted {
            room: room.snapshot(Instant::now()),
            total_questions: room.total_questions(),
            first_time_limit,
        };
        self.broadcast(&room, started);
        tracing::info!(
            "Room {} started with {} questions",
            room.room_id,
            room.total_questions()
        );

        // The driver blocks on this lock until the handle is stored.
        let driver = tokio::spawn(Arc::clone(&self).run_quiz(Arc::clone(&handle)));
        room.set_driver(driver.abort_handle());
    }

    async fn fetch_questions(&self, course: &Course) -> Result<Vec<Question>, ChallengeError> {
        let lessons = self.services.catalog.lessons(&course.id).await?;
        let questions = self
            .services
            .generator
            .generate(course, &lessons, self.settings.question_count.max(1))
            .await?;
        Ok(questions)
    }

    /// Generation failed: nobody can play this room.
    async fn cancel_room(self: &Arc<Self>, handle: &RoomHandle, reason: String) {
        let mut room = handle.lock().await;
        if !room.terminate() {
            return;
        }
        for user_id in room.user_ids() {
            self.store.release_user(&user_id, &room.room_id);
        }
        self.store.remove_room(&room.room_id);
        self.store.tombstone(&room.room_id);
        self.broadcast(
            &room,
            ServerEvent::ChallengeCancelled {
                room_id: room.room_id.clone(),
                reason,
            },
        );
        tracing::warn!("Room {} cancelled before start", room.room_id);
        self.schedule_eviction(room.room_id.clone());
    }

    /// The per-room driver. Aborted through the room's handle on termination.
    async fn run_quiz(self: Arc<Self>, handle: RoomHandle) {
        loop {
            let (room_id, number, deadline, notify) = {
                let mut room = handle.lock().await;
                if room.status != RoomStatus::Active {
                    return;
                }
                let Some(start) = room.begin_next_question(Instant::now()) else {
                    break;
                };
                self.broadcast(
                    &room,
                    ServerEvent::NewQuestion {
                        room_id: room.room_id.clone(),
                        question: start.question,
                        question_number: start.number,
                        total_questions: start.total,
                        time_limit: start.time_limit,
                    },
                );
                (
                    room.room_id.clone(),
                    start.number,
                    start.deadline,
                    Arc::clone(&room.notify),
                )
            };

            match self
                .await_question(&handle, &room_id, number, deadline, &notify)
                .await
            {
                QuestionEnd::Settled => time::sleep(self.settings.reveal_pause).await,
                QuestionEnd::RoomClosed => return,
            }
        }

        self.complete_room(&handle).await;
    }

    async fn await_question(
        &self,
        handle: &RoomHandle,
        room_id: &str,
        number: usize,
        deadline: Instant,
        notify: &Notify,
    ) -> QuestionEnd {
        let mut ticker = time::interval_at(Instant::now() + TIME_SYNC_INTERVAL, TIME_SYNC_INTERVAL);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;

                _ = notify.notified() => {
                    let room = handle.lock().await;
                    if room.status != RoomStatus::Active {
                        return QuestionEnd::RoomClosed;
                    }
                    // A permit left over from an earlier question is ignored.
                    if room.current_finalized() {
                        return QuestionEnd::Settled;
                    }
                }

                _ = time::sleep_until(deadline) => {
                    let mut room = handle.lock().await;
                    if room.status != RoomStatus::Active {
                        return QuestionEnd::RoomClosed;
                    }
                    if let Some(outcome) = room.finalize_current(self.settings.points_per_correct) {
                        tracing::debug!("Question {} of room {} timed out", number, room_id);
                        self.broadcast_outcome(&room, outcome);
                    }
                    return QuestionEnd::Settled;
                }

                _ = ticker.tick() => {
                    let room = handle.lock().await;
                    if room.status != RoomStatus::Active {
                        return QuestionEnd::RoomClosed;
                    }
                    if room.current_finalized() {
                        return QuestionEnd::Settled;
                    }
                    self.broadcast(
                        &room,
                        ServerEvent::TimeSync {
                            room_id: room_id.to_string(),
                            question_number: number,
                            time_left: seconds_left(deadline, Instant::now()),
                        },
                    );
                }
            }
        }
    }

    /// Records an answer to the open question. A repeated submission
    /// replaces the earlier one; the second distinct answer settles the
    /// question immediately.
    pub(crate) async fn submit_answer(
        &self,
        connection_id: &str,
        payload: SubmitAnswerPayload,
    ) -> Result<(), ChallengeError> {
        let user_id = self.authenticate(connection_id, Some(payload.user_id.as_str()))?;
        let handle = self
            .store
            .room(&payload.room_id)
            .ok_or_else(|| ChallengeError::RoomNotFound(payload.room_id.clone()))?;

        let mut room = handle.lock().await;
        match room.status {
            RoomStatus::Active => {}
            RoomStatus::WaitingForJoin => {
                return Err(ChallengeError::InvalidRequest(
                    "The duel has not started yet".to_string(),
                ));
            }
            RoomStatus::Completed => return Err(ChallengeError::StaleQuestion),
            RoomStatus::Terminated => return Err(ChallengeError::RoomNotFound(payload.room_id)),
        }

        let outcome = room.record_answer(
            &user_id,
            &payload.question_id,
            payload.answer,
            payload.time_spent,
            Instant::now(),
        )?;

        self.broadcast(
            &room,
            ServerEvent::AnswerSubmitted {
                room_id: room.room_id.clone(),
                user_id,
                question_number: outcome.question_number,
            },
        );

        if outcome.both_answered {
            if let Some(settled) = room.finalize_current(self.settings.points_per_correct) {
                self.broadcast_outcome(&room, settled);
                room.notify.notify_one();
            }
        }
        Ok(())
    }

    fn broadcast_outcome(&self, room: &Room, outcome: QuestionOutcome) {
        self.broadcast(
            room,
            ServerEvent::BothAnswered {
                room_id: room.room_id.clone(),
                question_number: outcome.question_number,
                timed_out: outcome.timed_out,
                standings: outcome.standings,
            },
        );
    }
}
