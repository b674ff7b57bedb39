//! Room registry
//!
//! Built once at startup, shared read-only (behind an `Arc`) by every
//! connection afterwards. No locking: nothing mutates it after construction.

use std::collections::BTreeMap;

use tracing::info;

use crate::message::LINE_SEPARATOR;
use crate::room::RoomHandle;
use crate::types::RoomId;

/// Mapping from room id to its running actor
#[derive(Debug)]
pub struct Registry {
    rooms: BTreeMap<RoomId, RoomHandle>,
}

impl Registry {
    /// Start one room actor per id on the current runtime
    ///
    /// Duplicate ids collapse into a single room.
    pub fn spawn<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut rooms = BTreeMap::new();
        for id in ids {
            let id = RoomId::new(id);
            if !rooms.contains_key(&id) {
                let handle = RoomHandle::spawn(id.clone());
                rooms.insert(id, handle);
            }
        }
        info!("Registry started with {} rooms", rooms.len());
        Self { rooms }
    }

    pub fn get(&self, id: &str) -> Option<&RoomHandle> {
        self.rooms.get(id)
    }

    /// Room ids in sorted order
    pub fn room_ids(&self) -> impl Iterator<Item = &RoomId> {
        self.rooms.keys()
    }

    /// Payload of the room-list frame
    pub fn room_list(&self) -> String {
        self.room_ids()
            .map(RoomId::as_str)
            .collect::<Vec<_>>()
            .join(LINE_SEPARATOR)
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_lookup() {
        let registry = Registry::spawn(["1", "2"]);

        assert_eq!(registry.get("1").map(|r| r.id().as_str()), Some("1"));
        assert!(registry.get("3").is_none());
        assert!(registry.get("").is_none());
    }

    #[tokio::test]
    async fn test_room_list_is_sorted_and_deduplicated() {
        let registry = Registry::spawn(["lounge", "1", "2", "1"]);

        assert_eq!(registry.len(), 3);
        assert_eq!(registry.room_list(), "1\n2\nlounge");
    }
}
