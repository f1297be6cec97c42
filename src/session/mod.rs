// src/session/mod.rs

//! The real-time duel subsystem.
//!
//! [`ChallengeHub`] owns the identity registry and the room store and is
//! shared by every socket task. Each inbound event is resolved to a user id
//! first, then routed to the lifecycle, quiz or presence operations, which
//! live in the submodules as further `impl ChallengeHub` blocks.

pub mod lifecycle;
pub mod presence;
pub mod quiz;
pub mod registry;
pub mod scoring;
pub mod store;

use std::sync::Arc;

use tokio::time::Instant;

use crate::{
    config::DuelSettings,
    error::ChallengeError,
    models::{
        protocol::{ClientEvent, ServerEvent},
        result::DuelResult,
        room::{Room, RoomSnapshot, RoomStatus},
    },
    services::Services,
};

use registry::{ConnectionRegistry, EventSender};
use store::RoomStore;

pub struct ChallengeHub {
    registry: ConnectionRegistry,
    store: RoomStore,
    services: Services,
    settings: DuelSettings,
}

impl ChallengeHub {
    pub fn new(services: Services, settings: DuelSettings) -> Arc<Self> {
        Arc::new(Self {
            registry: ConnectionRegistry::new(),
            store: RoomStore::new(),
            services,
            settings,
        })
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    pub fn store(&self) -> &RoomStore {
        &self.store
    }

    /// Registers a new transport connection.
    pub fn connect(&self, sender: EventSender) -> String {
        let connection_id = self.registry.attach(sender);
        tracing::debug!("Connection {} opened", connection_id);
        connection_id
    }

    /// Entry point for every inbound event. Failures are answered with an
    /// `error` event on the same connection and never propagate further.
    pub async fn handle_event(self: &Arc<Self>, connection_id: &str, event: ClientEvent) {
        let name = event.name();
        let outcome = match event.validate() {
            Ok(()) => self.dispatch(connection_id, event).await,
            Err(errors) => Err(errors.into()),
        };

        if let Err(err) = outcome {
            match &err {
                ChallengeError::IdentityUnresolved | ChallengeError::StaleQuestion => {
                    tracing::debug!("{} on {} ignored: {}", name, connection_id, err)
                }
                _ => tracing::warn!("{} on {} rejected: {}", name, connection_id, err),
            }
            self.registry
                .send_to_connection(connection_id, ServerEvent::error(&err, Some(name)));
        }
    }

    async fn dispatch(
        self: &Arc<Self>,
        connection_id: &str,
        event: ClientEvent,
    ) -> Result<(), ChallengeError> {
        match event {
            ClientEvent::Identify(p) => self.identify(connection_id, p).await,
            ClientEvent::CreateChallengeRoom(p) => self.request_challenge(connection_id, p).await,
            ClientEvent::AcceptChallenge(p) => self.accept_challenge(connection_id, p).await,
            ClientEvent::DeclineChallenge(p) => self.decline_challenge(connection_id, p).await,
            ClientEvent::JoinChallenge(p) => self.join_challenge(connection_id, p).await,
            ClientEvent::SubmitAnswer(p) => self.submit_answer(connection_id, p).await,
            ClientEvent::LeaveRoom(p) => self.leave_room(connection_id, p).await,
            ClientEvent::CheckInRoom(p) => {
                let user_id = self.authenticate(connection_id, Some(p.user_id.as_str()))?;
                let response = self.check_in_room(&user_id).await;
                self.reply(connection_id, response);
                Ok(())
            }
            ClientEvent::GetRoomState(p) => {
                let user_id = self.authenticate(connection_id, None)?;
                let snapshot = self.participant_snapshot(&p.room_id, &user_id).await?;
                self.reply(connection_id, ServerEvent::RoomState(snapshot));
                Ok(())
            }
            ClientEvent::GetResult(p) => {
                let user_id = self.authenticate(connection_id, None)?;
                let result = self.result(&p.room_id).await?;
                if !result.participants.iter().any(|r| r.user_id == user_id) {
                    return Err(ChallengeError::NotParticipant);
                }
                self.reply(connection_id, ServerEvent::ChallengeResults(result));
                Ok(())
            }
        }
    }

    /// Resolves the connection to a user id. When the event names a user,
    /// it must be the identified one.
    fn authenticate(
        &self,
        connection_id: &str,
        claimed: Option<&str>,
    ) -> Result<String, ChallengeError> {
        let user_id = self
            .registry
            .resolve(connection_id)
            .ok_or(ChallengeError::IdentityUnresolved)?;
        match claimed {
            Some(claimed) if claimed != user_id => Err(ChallengeError::NotParticipant),
            _ => Ok(user_id),
        }
    }

    fn reply(&self, connection_id: &str, event: ServerEvent) {
        if !self.registry.send_to_connection(connection_id, event) {
            tracing::debug!("Connection {} closed before reply", connection_id);
        }
    }

    /// Best-effort push. An offline peer recovers through reconnection and
    /// snapshots, not through redelivery.
    fn notify(&self, user_id: &str, event: ServerEvent) {
        let name = event.name();
        if let Err(err) = self.registry.send_to_user(user_id, event) {
            tracing::debug!("{} not delivered: {}", name, err);
        }
    }

    fn broadcast(&self, room: &Room, event: ServerEvent) {
        self.notify(&room.participants[0].user_id, event.clone());
        self.notify(&room.participants[1].user_id, event);
    }

    /// The open room a user is bound to, with its status.
    pub async fn user_room(&self, user_id: &str) -> Option<(String, RoomStatus)> {
        let room_id = self.store.room_of(user_id)?;
        let handle = self.store.room(&room_id)?;
        let status = handle.lock().await.status;
        status.is_open().then_some((room_id, status))
    }

    /// `in_room_response` for a user.
    pub async fn check_in_room(&self, user_id: &str) -> ServerEvent {
        match self.user_room(user_id).await {
            Some((room_id, status)) => ServerEvent::InRoomResponse {
                in_room: true,
                room_id: Some(room_id),
                status: Some(status),
            },
            None => ServerEvent::InRoomResponse {
                in_room: false,
                room_id: None,
                status: None,
            },
        }
    }

    pub async fn room_snapshot(&self, room_id: &str) -> Result<RoomSnapshot, ChallengeError> {
        let handle = self
            .store
            .room(room_id)
            .ok_or_else(|| ChallengeError::RoomNotFound(room_id.to_string()))?;
        let room = handle.lock().await;
        Ok(room.snapshot(Instant::now()))
    }

    async fn participant_snapshot(
        &self,
        room_id: &str,
        user_id: &str,
    ) -> Result<RoomSnapshot, ChallengeError> {
        let snapshot = self.room_snapshot(room_id).await?;
        if snapshot.participants.iter().any(|p| p.user_id == user_id) {
            Ok(snapshot)
        } else {
            Err(ChallengeError::NotParticipant)
        }
    }

    /// The terminal result of a completed room still inside its retention window.
    pub async fn result(&self, room_id: &str) -> Result<DuelResult, ChallengeError> {
        let handle = self
            .store
            .room(room_id)
            .ok_or_else(|| ChallengeError::RoomNotFound(room_id.to_string()))?;
        let room = handle.lock().await;
        match (&room.status, &room.result) {
            (RoomStatus::Completed, Some(result)) => Ok(result.clone()),
            _ => Err(ChallengeError::InvalidRequest(format!(
                "Room '{}' has not finished yet",
                room_id
            ))),
        }
    }

    /// Drops a closed room (and its tombstone) once the retention window ends.
    fn schedule_eviction(self: &Arc<Self>, room_id: String) {
        let hub = Arc::clone(self);
        let retention = self.settings.result_retention;
        tokio::spawn(async move {
            tokio::time::sleep(retention).await;
            if let Some(handle) = hub.store.room(&room_id) {
                if handle.lock().await.status.is_open() {
                    return;
                }
                hub.store.remove_room(&room_id);
            }
            hub.store.clear_tombstone(&room_id);
            tracing::debug!("Room {} evicted", room_id);
        });
    }
}
