// src/session/store.rs

use std::sync::Arc;

use dashmap::{DashMap, mapref::entry::Entry};
use tokio::sync::Mutex;

use crate::{
    error::ChallengeError,
    models::{
        challenge::{ChallengeKey, ChallengeRequest},
        room::Room,
    },
};

/// A room is its own unit of mutual exclusion.
pub type RoomHandle = Arc<Mutex<Room>>;

/// In-memory indexes over rooms and pending challenges.
///
/// Only the per-room mutex is ever held across several steps; the maps are
/// touched one entry at a time so different rooms never contend.
#[derive(Default)]
pub struct RoomStore {
    rooms: DashMap<String, RoomHandle>,
    /// user id -> the one open room that user is bound to.
    user_rooms: DashMap<String, String>,
    challenges: DashMap<String, ChallengeRequest>,
    /// Dedupe key -> outstanding challenge id.
    pending: DashMap<ChallengeKey, String>,
    /// Recently terminated rooms, so repeated leaves stay idempotent.
    tombstones: DashMap<String, ()>,
}

impl RoomStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_room(&self, room: Room) -> RoomHandle {
        let room_id = room.room_id.clone();
        let handle = Arc::new(Mutex::new(room));
        self.rooms.insert(room_id, handle.clone());
        handle
    }

    pub fn room(&self, room_id: &str) -> Option<RoomHandle> {
        self.rooms.get(room_id).map(|r| r.value().clone())
    }

    pub fn remove_room(&self, room_id: &str) -> Option<RoomHandle> {
        self.rooms.remove(room_id).map(|(_, handle)| handle)
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// Claims `user_id` for `room_id`. Fails if the user already holds a
    /// different room; claiming the same room again is a no-op.
    pub fn bind_user(&self, user_id: &str, room_id: &str) -> Result<(), ChallengeError> {
        match self.user_rooms.entry(user_id.to_string()) {
            Entry::Occupied(existing) if existing.get() != room_id => {
                Err(ChallengeError::DuplicateActiveRoom(existing.get().clone()))
            }
            Entry::Occupied(_) => Ok(()),
            Entry::Vacant(slot) => {
                slot.insert(room_id.to_string());
                Ok(())
            }
        }
    }

    /// Releases the binding only if it still points at `room_id`.
    pub fn release_user(&self, user_id: &str, room_id: &str) -> bool {
        self.user_rooms
            .remove_if(user_id, |_, bound| bound == room_id)
            .is_some()
    }

    pub fn room_of(&self, user_id: &str) -> Option<String> {
        self.user_rooms.get(user_id).map(|r| r.value().clone())
    }

    /// Registers a challenge unless one with the same key is outstanding,
    /// in which case the existing one is returned as the error.
    pub fn insert_challenge(&self, challenge: ChallengeRequest) -> Result<(), ChallengeRequest> {
        match self.pending.entry(challenge.key()) {
            Entry::Occupied(existing) => {
                let existing_id = existing.get().clone();
                drop(existing);
                match self.challenge(&existing_id) {
                    Some(existing) => Err(existing),
                    None => {
                        // Stale key left behind by a concurrent removal.
                        self.pending.insert(challenge.key(), challenge.challenge_id.clone());
                        self.challenges.insert(challenge.challenge_id.clone(), challenge);
                        Ok(())
                    }
                }
            }
            Entry::Vacant(slot) => {
                slot.insert(challenge.challenge_id.clone());
                self.challenges.insert(challenge.challenge_id.clone(), challenge);
                Ok(())
            }
        }
    }

    pub fn challenge(&self, challenge_id: &str) -> Option<ChallengeRequest> {
        self.challenges.get(challenge_id).map(|c| c.value().clone())
    }

    /// The outstanding challenge for this (challenger, challenged, course).
    pub fn pending_challenge(&self, key: &ChallengeKey) -> Option<ChallengeRequest> {
        let challenge_id = self.pending.get(key)?.value().clone();
        self.challenge(&challenge_id)
    }

    /// Undecided challenges addressed to `user_id`, oldest first.
    pub fn challenges_for(&self, user_id: &str) -> Vec<ChallengeRequest> {
        let mut found: Vec<ChallengeRequest> = self
            .challenges
            .iter()
            .filter(|c| c.challenged_id == user_id)
            .map(|c| c.value().clone())
            .collect();
        found.sort_by_key(|c| c.created_at);
        found
    }

    /// Atomically removes the challenge if `accept` approves it. Exactly one
    /// of several racing callers gets `Some`.
    pub fn take_challenge_if(
        &self,
        challenge_id: &str,
        accept: impl FnOnce(&ChallengeRequest) -> bool,
    ) -> Option<ChallengeRequest> {
        let (_, challenge) = self
            .challenges
            .remove_if(challenge_id, |_, challenge| accept(challenge))?;
        self.pending
            .remove_if(&challenge.key(), |_, id| id == challenge_id);
        Some(challenge)
    }

    pub fn remove_challenge(&self, challenge_id: &str) -> Option<ChallengeRequest> {
        self.take_challenge_if(challenge_id, |_| true)
    }

    pub fn tombstone(&self, room_id: &str) {
        self.tombstones.insert(room_id.to_string(), ());
    }

    pub fn is_tombstoned(&self, room_id: &str) -> bool {
        self.tombstones.contains_key(room_id)
    }

    pub fn clear_tombstone(&self, room_id: &str) {
        self.tombstones.remove(room_id);
    }
}
