// src/session/lifecycle.rs

//! Challenge request, accept, decline and join.

use std::sync::Arc;

use chrono::Utc;
use tokio::time::Instant;

use super::ChallengeHub;
use crate::{
    error::ChallengeError,
    models::{
        challenge::{ChallengeKey, ChallengeRequest, DeclineReason},
        protocol::{ChallengeDecisionPayload, CreateChallengePayload, JoinChallengePayload, ServerEvent},
        room::{Room, RoomStatus},
    },
    utils::id,
};

impl ChallengeHub {
    /// Proposes a duel and pre-allocates its room in `WaitingForJoin`.
    /// Repeating an outstanding request answers with the existing ids.
    pub(crate) async fn request_challenge(
        self: &Arc<Self>,
        connection_id: &str,
        payload: CreateChallengePayload,
    ) -> Result<(), ChallengeError> {
        let challenger_id = self.authenticate(connection_id, Some(payload.challenger_id.as_str()))?;
        if challenger_id == payload.challenged_id {
            return Err(ChallengeError::InvalidRequest(
                "You cannot challenge yourself".to_string(),
            ));
        }
        if !self.registry.is_known(&payload.challenged_id) {
            return Err(ChallengeError::UserNotFound(payload.challenged_id));
        }

        let key = ChallengeKey {
            challenger_id: challenger_id.clone(),
            challenged_id: payload.challenged_id.clone(),
            course_id: payload.course_id.clone(),
        };
        if let Some(existing) = self.store.pending_challenge(&key) {
            tracing::debug!("Duplicate challenge request, returning {}", existing.challenge_id);
            self.reply_created(connection_id, &existing);
            return Ok(());
        }
        if let Some(room_id) = self.store.room_of(&challenger_id) {
            return Err(ChallengeError::DuplicateActiveRoom(room_id));
        }

        let course = self
            .services
            .catalog
            .find_course(&payload.course_id)
            .await?
            .ok_or_else(|| ChallengeError::CourseNotFound(payload.course_id.clone()))?;

        let challenge = ChallengeRequest {
            challenge_id: id::challenge_id(),
            challenger_id: challenger_id.clone(),
            challenged_id: payload.challenged_id.clone(),
            course_id: course.id,
            course_name: course.name,
            room_id: id::room_id(),
            created_at: Utc::now(),
        };

        // The lookup above released no lock, so a concurrent duplicate may
        // have won the binding in the meantime.
        if let Err(err) = self.store.bind_user(&challenger_id, &challenge.room_id) {
            if let Some(existing) = self.store.pending_challenge(&key) {
                self.reply_created(connection_id, &existing);
                return Ok(());
            }
            return Err(err);
        }

        let challenger_name = self.display_name_of(&challenger_id);
        let challenged_name = self.display_name_of(&challenge.challenged_id);
        let mut room = Room::new(&challenge, &challenger_name, &challenged_name);
        room.set_connected(&challenger_id, self.registry.is_connected(&challenger_id));
        self.store.insert_room(room);

        if let Err(existing) = self.store.insert_challenge(challenge.clone()) {
            self.store.remove_room(&challenge.room_id);
            self.store.release_user(&challenger_id, &challenge.room_id);
            self.reply_created(connection_id, &existing);
            return Ok(());
        }

        tracing::info!(
            "Challenge {} created: {} vs {} on {} (room {})",
            challenge.challenge_id,
            challenge.challenger_id,
            challenge.challenged_id,
            challenge.course_id,
            challenge.room_id
        );

        self.reply_created(connection_id, &challenge);
        self.notify(&challenge.challenged_id, self.received_event(&challenge));

        if let Some(timeout) = self.settings.challenge_timeout {
            self.schedule_expiry(challenge.challenge_id, timeout);
        }
        Ok(())
    }

    /// Accepts a pending challenge. Exactly one accept (or decline) wins.
    /// Activation starts as soon as both participants are connected.
    pub(crate) async fn accept_challenge(
        self: &Arc<Self>,
        connection_id: &str,
        payload: ChallengeDecisionPayload,
    ) -> Result<(), ChallengeError> {
        let user_id = self.authenticate(connection_id, Some(payload.user_id.as_str()))?;
        let challenge = self.take_own_challenge(&payload.challenge_id, &user_id)?;

        if let Err(err) = self.store.bind_user(&user_id, &challenge.room_id) {
            tracing::info!(
                "{} accepted {} while already in another room; declining it",
                user_id,
                challenge.challenge_id
            );
            self.discard_pending_room(&challenge).await;
            self.notify(
                &challenge.challenger_id,
                self.declined_event(&challenge, DeclineReason::OpponentBusy),
            );
            return Err(err);
        }

        let Some(handle) = self.store.room(&challenge.room_id) else {
            self.store.release_user(&user_id, &challenge.room_id);
            return Err(ChallengeError::ChallengeNotFound(challenge.challenge_id));
        };

        let activate = {
            let mut room = handle.lock().await;
            if room.status != RoomStatus::WaitingForJoin {
                self.store.release_user(&user_id, &challenge.room_id);
                return Err(ChallengeError::ChallengeNotFound(challenge.challenge_id));
            }
            room.accepted = true;
            room.set_connected(&user_id, true);

            let accepted = ServerEvent::ChallengeAccepted {
                challenge_id: challenge.challenge_id.clone(),
                room_id: challenge.room_id.clone(),
                user_id: user_id.clone(),
                user_name: self.display_name_of(&user_id),
            };
            self.broadcast(&room, accepted);
            room.begin_activation()
        };

        tracing::info!("Challenge {} accepted by {}", challenge.challenge_id, user_id);
        if activate {
            self.spawn_activation(handle);
        } else {
            tracing::debug!(
                "Room {} waits for {} to reconnect before starting",
                challenge.room_id,
                challenge.challenger_id
            );
        }
        Ok(())
    }

    pub(crate) async fn decline_challenge(
        self: &Arc<Self>,
        connection_id: &str,
        payload: ChallengeDecisionPayload,
    ) -> Result<(), ChallengeError> {
        let user_id = self.authenticate(connection_id, Some(payload.user_id.as_str()))?;
        let challenge = self.take_own_challenge(&payload.challenge_id, &user_id)?;

        self.discard_pending_room(&challenge).await;

        let declined = self.declined_event(&challenge, DeclineReason::Declined);
        self.notify(&challenge.challenger_id, declined.clone());
        self.reply(connection_id, declined);

        tracing::info!("Challenge {} declined by {}", challenge.challenge_id, user_id);
        Ok(())
    }

    /// Enters a room as a participant, typically after navigating to the
    /// duel screen. Answers with the current snapshot, or the result if
    /// the duel is already over.
    pub(crate) async fn join_challenge(
        self: &Arc<Self>,
        connection_id: &str,
        payload: JoinChallengePayload,
    ) -> Result<(), ChallengeError> {
        let user_id = self.authenticate(connection_id, Some(payload.user_id.as_str()))?;
        let handle = self
            .store
            .room(&payload.room_id)
            .ok_or_else(|| ChallengeError::RoomNotFound(payload.room_id.clone()))?;

        let activate = {
            let mut room = handle.lock().await;
            if room.slot_of(&user_id).is_none() {
                return Err(ChallengeError::NotParticipant);
            }

            let status = room.status;
            match status {
                RoomStatus::Terminated => {
                    return Err(ChallengeError::RoomNotFound(payload.room_id));
                }
                RoomStatus::Completed => {
                    if let Some(result) = room.result.clone() {
                        self.reply(connection_id, ServerEvent::ChallengeResults(result));
                    }
                    false
                }
                RoomStatus::WaitingForJoin | RoomStatus::Active => {
                    if room.set_connected(&user_id, true) == Some(false) {
                        if let Some(peer) = room.peer_of(&user_id) {
                            self.notify(
                                &peer.user_id,
                                ServerEvent::OpponentReconnected {
                                    room_id: room.room_id.clone(),
                                    user_id: user_id.clone(),
                                },
                            );
                        }
                    }
                    self.reply(
                        connection_id,
                        ServerEvent::RoomState(room.snapshot(Instant::now())),
                    );
                    room.begin_activation()
                }
            }
        };

        if activate {
            self.spawn_activation(handle);
        }
        Ok(())
    }

    /// Removes the challenge if it exists and is addressed to `user_id`.
    fn take_own_challenge(
        &self,
        challenge_id: &str,
        user_id: &str,
    ) -> Result<ChallengeRequest, ChallengeError> {
        match self.store.challenge(challenge_id) {
            None => return Err(ChallengeError::ChallengeNotFound(challenge_id.to_string())),
            Some(c) if c.challenged_id != user_id => return Err(ChallengeError::NotParticipant),
            Some(_) => {}
        }
        self.store
            .take_challenge_if(challenge_id, |c| c.challenged_id == user_id)
            .ok_or_else(|| ChallengeError::ChallengeNotFound(challenge_id.to_string()))
    }

    /// Tears down the room of a challenge that will never start.
    async fn discard_pending_room(&self, challenge: &ChallengeRequest) {
        if let Some(handle) = self.store.remove_room(&challenge.room_id) {
            handle.lock().await.terminate();
        }
        self.store
            .release_user(&challenge.challenger_id, &challenge.room_id);
    }

    fn schedule_expiry(self: &Arc<Self>, challenge_id: String, timeout: std::time::Duration) {
        let hub = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            let Some(challenge) = hub.store.remove_challenge(&challenge_id) else {
                return;
            };
            hub.discard_pending_room(&challenge).await;

            tracing::info!("Challenge {} expired unanswered", challenge_id);
            let expired = hub.declined_event(&challenge, DeclineReason::Expired);
            hub.notify(&challenge.challenger_id, expired.clone());
            hub.notify(&challenge.challenged_id, expired);
        });
    }

    fn declined_event(&self, challenge: &ChallengeRequest, reason: DeclineReason) -> ServerEvent {
        ServerEvent::ChallengeDeclined {
            challenge_id: challenge.challenge_id.clone(),
            room_id: challenge.room_id.clone(),
            user_id: challenge.challenged_id.clone(),
            user_name: self.display_name_of(&challenge.challenged_id),
            reason,
        }
    }

    pub(super) fn received_event(&self, challenge: &ChallengeRequest) -> ServerEvent {
        ServerEvent::ChallengeReceived {
            challenge_id: challenge.challenge_id.clone(),
            room_id: challenge.room_id.clone(),
            challenger_id: challenge.challenger_id.clone(),
            challenger_name: self.display_name_of(&challenge.challenger_id),
            course_id: challenge.course_id.clone(),
            course_name: challenge.course_name.clone(),
        }
    }

    fn reply_created(&self, connection_id: &str, challenge: &ChallengeRequest) {
        self.reply(
            connection_id,
            ServerEvent::ChallengeCreated {
                challenge_id: challenge.challenge_id.clone(),
                room_id: challenge.room_id.clone(),
            },
        );
    }

    fn display_name_of(&self, user_id: &str) -> String {
        self.registry
            .display_name(user_id)
            .unwrap_or_else(|| user_id.to_string())
    }
}
