// src/session/registry.rs

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use tokio::sync::mpsc;

use crate::{error::ChallengeError, models::protocol::ServerEvent, utils::id};

/// Outbound queue of one socket. The socket task drains it in order.
pub type EventSender = mpsc::UnboundedSender<ServerEvent>;

const MAX_USER_ID_LEN: usize = 128;

struct ConnectionEntry {
    sender: EventSender,
    /// Claimed identity. Only trusted while the user's binding still points here.
    user_id: Option<String>,
}

struct UserBinding {
    connection_id: Option<String>,
    display_name: String,
    /// Bumped on every (re)bind so grace timers can tell a reconnect happened.
    generation: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentifyOutcome {
    pub user_id: String,
    pub display_name: String,
    pub generation: u64,
    /// Connection that was routed to this user before, now orphaned.
    pub orphaned: Option<String>,
}

/// Maps transport connections to user ids and back.
pub struct ConnectionRegistry {
    connections: DashMap<String, ConnectionEntry>,
    users: DashMap<String, UserBinding>,
    generations: AtomicU64,
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            connections: DashMap::new(),
            users: DashMap::new(),
            generations: AtomicU64::new(1),
        }
    }

    /// Registers a freshly opened socket and returns its connection id.
    pub fn attach(&self, sender: EventSender) -> String {
        let connection_id = id::connection_id();
        self.connections.insert(
            connection_id.clone(),
            ConnectionEntry {
                sender,
                user_id: None,
            },
        );
        connection_id
    }

    /// Binds `user_id` to the connection, replacing any previous binding of
    /// that user. The previous connection stays open but is no longer routed.
    pub fn identify(
        &self,
        connection_id: &str,
        user_id: &str,
        display_name: Option<&str>,
    ) -> Result<IdentifyOutcome, ChallengeError> {
        validate_user_id(user_id)?;

        let claimed = self
            .connections
            .get(connection_id)
            .map(|entry| entry.user_id.clone())
            .ok_or(ChallengeError::IdentityUnresolved)?;
        if let Some(existing) = claimed.filter(|existing| existing != user_id) {
            if self.is_bound_to(&existing, connection_id) {
                return Err(ChallengeError::InvalidRequest(format!(
                    "Connection is already identified as '{}'",
                    existing
                )));
            }
        }

        let generation = self.generations.fetch_add(1, Ordering::Relaxed);
        let (previous, display_name) = {
            let mut binding = self
                .users
                .entry(user_id.to_string())
                .or_insert_with(|| UserBinding {
                    connection_id: None,
                    display_name: user_id.to_string(),
                    generation,
                });
            if let Some(name) = display_name.map(str::trim).filter(|n| !n.is_empty()) {
                binding.display_name = name.to_string();
            }
            binding.generation = generation;
            let previous = binding.connection_id.replace(connection_id.to_string());
            (previous, binding.display_name.clone())
        };

        if let Some(mut entry) = self.connections.get_mut(connection_id) {
            entry.user_id = Some(user_id.to_string());
        }

        let orphaned = previous.filter(|prev| prev != connection_id);
        if let Some(prev) = &orphaned {
            if let Some(mut entry) = self.connections.get_mut(prev) {
                entry.user_id = None;
            }
            tracing::info!(
                "User {} rebound from connection {} to {}",
                user_id,
                prev,
                connection_id
            );
        }

        Ok(IdentifyOutcome {
            user_id: user_id.to_string(),
            display_name,
            generation,
            orphaned,
        })
    }

    /// The user currently routed through this connection, if any.
    pub fn resolve(&self, connection_id: &str) -> Option<String> {
        let user_id = self.connections.get(connection_id)?.user_id.clone()?;
        self.is_bound_to(&user_id, connection_id).then_some(user_id)
    }

    /// Forgets the connection. Returns the user and binding generation only
    /// when this was the user's live connection; an orphaned connection
    /// closing affects nobody.
    pub fn on_disconnect(&self, connection_id: &str) -> Option<(String, u64)> {
        let (_, entry) = self.connections.remove(connection_id)?;
        let user_id = entry.user_id?;

        let mut binding = self.users.get_mut(&user_id)?;
        if binding.connection_id.as_deref() != Some(connection_id) {
            return None;
        }
        binding.connection_id = None;
        Some((user_id.clone(), binding.generation))
    }

    pub fn send_to_connection(&self, connection_id: &str, event: ServerEvent) -> bool {
        self.connections
            .get(connection_id)
            .is_some_and(|entry| entry.sender.send(event).is_ok())
    }

    /// Best-effort delivery to a user's live connection.
    pub fn send_to_user(&self, user_id: &str, event: ServerEvent) -> Result<(), ChallengeError> {
        let connection_id = self
            .users
            .get(user_id)
            .and_then(|binding| binding.connection_id.clone())
            .ok_or_else(|| ChallengeError::PeerUnreachable(user_id.to_string()))?;

        if self.send_to_connection(&connection_id, event) {
            Ok(())
        } else {
            Err(ChallengeError::PeerUnreachable(user_id.to_string()))
        }
    }

    /// Has identified at least once and was not forgotten since.
    pub fn is_known(&self, user_id: &str) -> bool {
        self.users.contains_key(user_id)
    }

    pub fn is_connected(&self, user_id: &str) -> bool {
        self.users
            .get(user_id)
            .is_some_and(|binding| binding.connection_id.is_some())
    }

    pub fn display_name(&self, user_id: &str) -> Option<String> {
        self.users.get(user_id).map(|b| b.display_name.clone())
    }

    pub fn generation(&self, user_id: &str) -> Option<u64> {
        self.users.get(user_id).map(|b| b.generation)
    }

    /// Drops a user that is still offline at `generation`.
    pub fn forget(&self, user_id: &str, generation: u64) -> bool {
        self.users
            .remove_if(user_id, |_, b| b.connection_id.is_none() && b.generation == generation)
            .is_some()
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    fn is_bound_to(&self, user_id: &str, connection_id: &str) -> bool {
        self.users
            .get(user_id)
            .is_some_and(|b| b.connection_id.as_deref() == Some(connection_id))
    }
}

fn validate_user_id(user_id: &str) -> Result<(), ChallengeError> {
    let valid = !user_id.trim().is_empty()
        && user_id.len() <= MAX_USER_ID_LEN
        && !user_id.chars().any(char::is_control);
    if valid {
        Ok(())
    } else {
        tracing::warn!("Rejected malformed user id {:?}", user_id);
        Err(ChallengeError::InvalidIdentity(user_id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attach(registry: &ConnectionRegistry) -> (String, mpsc::UnboundedReceiver<ServerEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (registry.attach(tx), rx)
    }

    #[test]
    fn identify_and_resolve() {
        let registry = ConnectionRegistry::new();
        let (conn, _rx) = attach(&registry);
        assert_eq!(registry.resolve(&conn), None);

        let outcome = registry.identify(&conn, "alice", Some("Alice")).unwrap();
        assert_eq!(outcome.display_name, "Alice");
        assert_eq!(outcome.orphaned, None);
        assert_eq!(registry.resolve(&conn).as_deref(), Some("alice"));
    }

    #[test]
    fn rebind_orphans_previous_connection() {
        let registry = ConnectionRegistry::new();
        let (old, _old_rx) = attach(&registry);
        let (new, mut new_rx) = attach(&registry);

        registry.identify(&old, "alice", None).unwrap();
        let outcome = registry.identify(&new, "alice", None).unwrap();

        assert_eq!(outcome.orphaned.as_deref(), Some(old.as_str()));
        assert_eq!(registry.resolve(&old), None);
        assert_eq!(registry.resolve(&new).as_deref(), Some("alice"));

        // Closing the orphan does not mark alice offline.
        assert_eq!(registry.on_disconnect(&old), None);
        assert!(registry.is_connected("alice"));

        registry
            .send_to_user("alice", ServerEvent::LeftRoom { room_id: "r".into() })
            .unwrap();
        assert!(new_rx.try_recv().is_ok());
    }

    #[test]
    fn malformed_ids_are_rejected_without_binding() {
        let registry = ConnectionRegistry::new();
        let (conn, _rx) = attach(&registry);
        assert!(matches!(
            registry.identify(&conn, "  ", None),
            Err(ChallengeError::InvalidIdentity(_))
        ));
        assert!(registry.identify(&conn, "bad\nid", None).is_err());
        assert!(registry.identify(&conn, &"x".repeat(200), None).is_err());
        assert_eq!(registry.resolve(&conn), None);
    }

    #[test]
    fn disconnect_reports_generation_and_reconnect_bumps_it() {
        let registry = ConnectionRegistry::new();
        let (conn, _rx) = attach(&registry);
        let first = registry.identify(&conn, "bob", None).unwrap().generation;

        let (user, generation) = registry.on_disconnect(&conn).unwrap();
        assert_eq!((user.as_str(), generation), ("bob", first));
        assert!(!registry.is_connected("bob"));
        assert!(registry.is_known("bob"));
        assert!(matches!(
            registry.send_to_user("bob", ServerEvent::LeftRoom { room_id: "r".into() }),
            Err(ChallengeError::PeerUnreachable(_))
        ));

        let (conn2, _rx2) = attach(&registry);
        let second = registry.identify(&conn2, "bob", None).unwrap().generation;
        assert!(second > first);
        assert!(!registry.forget("bob", first));
    }

    #[test]
    fn connection_cannot_switch_identity() {
        let registry = ConnectionRegistry::new();
        let (conn, _rx) = attach(&registry);
        registry.identify(&conn, "alice", None).unwrap();
        assert!(registry.identify(&conn, "mallory", None).is_err());
        assert!(registry.identify(&conn, "alice", None).is_ok());
    }
}
