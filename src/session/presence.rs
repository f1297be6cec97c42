// src/session/presence.rs

use std::sync::Arc;

use tokio::time::Instant;

use super::ChallengeHub;
use crate::{
    error::ChallengeError,
    models::{
        challenge::DeclineReason,
        protocol::{IdentifyPayload, LeaveRoomPayload, ServerEvent},
        room::RoomStatus,
    },
    utils::html::sanitize_message,
};

impl ChallengeHub {
    /// Binds the connection to a user id. A user coming back while bound to
    /// an open room is restored into it.
    pub(crate) async fn identify(
        self: &Arc<Self>,
        connection_id: &str,
        payload: IdentifyPayload,
    ) -> Result<(), ChallengeError> {
        let outcome = self.registry.identify(
            connection_id,
            &payload.user_id,
            payload.user_name.as_deref(),
        )?;

        tracing::info!(
            "Connection {} identified as {}",
            connection_id,
            outcome.user_id
        );
        self.reply(
            connection_id,
            ServerEvent::Identified {
                user_id: outcome.user_id.clone(),
                user_name: outcome.display_name,
            },
        );

        // Challenges that arrived while the user was away.
        for challenge in self.store.challenges_for(&outcome.user_id) {
            self.reply(connection_id, self.received_event(&challenge));
        }

        if let Some(room_id) = self.store.room_of(&outcome.user_id) {
            self.restore_participant(connection_id, &outcome.user_id, &room_id)
                .await;
        }
        Ok(())
    }

    async fn restore_participant(self: &Arc<Self>, connection_id: &str, user_id: &str, room_id: &str) {
        let Some(handle) = self.store.room(room_id) else {
            return;
        };

        let activate = {
            let mut room = handle.lock().await;
            if !room.status.is_open() {
                return;
            }
            if room.set_connected(user_id, true) == Some(false) {
                tracing::info!("{} is back in room {}", user_id, room_id);
                if let Some(peer) = room.peer_of(user_id) {
                    self.notify(
                        &peer.user_id,
                        ServerEvent::OpponentReconnected {
                            room_id: room_id.to_string(),
                            user_id: user_id.to_string(),
                        },
                    );
                }
            }
            self.reply(
                connection_id,
                ServerEvent::RoomState(room.snapshot(Instant::now())),
            );
            room.begin_activation()
        };

        if activate {
            self.spawn_activation(handle);
        }
    }

    /// Transport closed. A participant of an open room gets the grace
    /// period to re-identify before the room is terminated on their behalf.
    pub async fn disconnect(self: &Arc<Self>, connection_id: &str) {
        let Some((user_id, generation)) = self.registry.on_disconnect(connection_id) else {
            tracing::debug!("Connection {} closed", connection_id);
            return;
        };
        tracing::info!("User {} disconnected ({})", user_id, connection_id);

        let mut in_room = None;
        if let Some(room_id) = self.store.room_of(&user_id) {
            if let Some(handle) = self.store.room(&room_id) {
                let mut room = handle.lock().await;
                // A re-identify may have restored the seat while we waited.
                let current = self.registry.generation(&user_id) == Some(generation)
                    && !self.registry.is_connected(&user_id);
                if current && room.status.is_open() {
                    room.set_connected(&user_id, false);
                    // An unanswered challenge has no opponent to warn yet.
                    if let Some(peer) = room.peer_of(&user_id).filter(|_| room.accepted) {
                        self.notify(
                            &peer.user_id,
                            ServerEvent::OpponentDisconnected {
                                room_id: room_id.clone(),
                                user_id: user_id.clone(),
                                grace_seconds: self.settings.grace_period.as_secs(),
                            },
                        );
                    }
                    in_room = Some(room_id);
                }
            }
        }

        let hub = Arc::clone(self);
        let grace = self.settings.grace_period;
        tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            hub.expire_grace(&user_id, generation, in_room.as_deref())
                .await;
        });
    }

    /// Runs once the grace period of a disconnect has passed. Nothing
    /// happens if the user identified again in the meantime.
    async fn expire_grace(self: &Arc<Self>, user_id: &str, generation: u64, room_id: Option<&str>) {
        if self.registry.is_connected(user_id) || self.registry.generation(user_id) != Some(generation) {
            tracing::debug!("{} reconnected within the grace period", user_id);
            return;
        }

        if let Some(room_id) = room_id {
            if self.terminate_room(room_id, user_id, None).await {
                tracing::info!(
                    "Grace period of {} expired, room {} terminated",
                    user_id,
                    room_id
                );
            }
        }
        self.registry.forget(user_id, generation);
    }

    /// Explicit exit. Leaving a room that is already gone is a no-op.
    pub(crate) async fn leave_room(
        self: &Arc<Self>,
        connection_id: &str,
        payload: LeaveRoomPayload,
    ) -> Result<(), ChallengeError> {
        let user_id = self.authenticate(connection_id, Some(payload.user_id.as_str()))?;
        let left = ServerEvent::LeftRoom {
            room_id: payload.room_id.clone(),
        };

        let Some(handle) = self.store.room(&payload.room_id) else {
            if self.store.is_tombstoned(&payload.room_id) {
                self.reply(connection_id, left);
                return Ok(());
            }
            return Err(ChallengeError::RoomNotFound(payload.room_id));
        };

        {
            let room = handle.lock().await;
            if room.slot_of(&user_id).is_none() {
                return Err(ChallengeError::NotParticipant);
            }
            if room.status == RoomStatus::Completed {
                self.store.release_user(&user_id, &payload.room_id);
                self.reply(connection_id, left);
                return Ok(());
            }
        }

        let message = payload
            .custom_message
            .as_deref()
            .and_then(sanitize_message);
        self.terminate_room(&payload.room_id, &user_id, message).await;
        self.reply(connection_id, left);
        Ok(())
    }

    /// Ends an open room because `leaver` is gone. Returns false if the room
    /// was already closed by someone else.
    async fn terminate_room(
        self: &Arc<Self>,
        room_id: &str,
        leaver: &str,
        custom_message: Option<String>,
    ) -> bool {
        let Some(handle) = self.store.room(room_id) else {
            return false;
        };

        {
            let mut room = handle.lock().await;
            if !room.terminate() {
                return false;
            }

            if let Some(peer) = room.peer_of(leaver) {
                let leaver_name = room
                    .participant(leaver)
                    .map_or_else(|| leaver.to_string(), |p| p.display_name.clone());
                let event = if room.accepted {
                    ServerEvent::OpponentLeft {
                        room_id: room_id.to_string(),
                        user_id: leaver.to_string(),
                        user_name: leaver_name,
                        custom_message,
                    }
                } else {
                    ServerEvent::ChallengeDeclined {
                        challenge_id: room.challenge_id.clone(),
                        room_id: room_id.to_string(),
                        user_id: leaver.to_string(),
                        user_name: leaver_name,
                        reason: DeclineReason::Withdrawn,
                    }
                };
                self.notify(&peer.user_id, event);
            }

            for user_id in room.user_ids() {
                self.store.release_user(&user_id, room_id);
            }
            // Withdraws the challenge if it was never answered.
            self.store.remove_challenge(&room.challenge_id);
        }

        self.store.remove_room(room_id);
        self.store.tombstone(room_id);
        self.schedule_eviction(room_id.to_string());
        tracing::info!("Room {} terminated, {} left", room_id, leaver);
        true
    }
}
