// src/utils/id.rs

use uuid::Uuid;

/// Random identifier for a transport connection.
pub fn connection_id() -> String {
    format!("conn_{}", Uuid::new_v4().simple())
}

pub fn challenge_id() -> String {
    format!("ch_{}", Uuid::new_v4().simple())
}

pub fn room_id() -> String {
    format!("room_{}", Uuid::new_v4().simple())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_prefixed_and_unique() {
        let a = room_id();
        let b = room_id();
        assert!(a.starts_with("room_"));
        assert_ne!(a, b);
        assert!(challenge_id().starts_with("ch_"));
        assert!(connection_id().starts_with("conn_"));
    }
}
