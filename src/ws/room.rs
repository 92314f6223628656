use super::connection::WsConnection;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};
use uuid::Uuid;

/// Mapping from room name to the set of connections in it, plus a side
/// table of all live connections by id. Rooms are process-local (no
/// cluster-wide broadcast); joins/leaves/drops keep both directions in
/// sync and prune empty rooms, so room membership never outlives the
/// connections in it.
#[derive(Default)]
pub(crate) struct RoomIndex {
    rooms: RwLock<HashMap<Box<str>, HashSet<Uuid>>>,
    connections: RwLock<HashMap<Uuid, Arc<WsConnection>>>,
}

impl RoomIndex {
    pub(crate) fn register(&self, connection: Arc<WsConnection>) {
        self.connections
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(connection.id, connection);
    }

    pub(crate) fn join(&self, id: Uuid, room: &str) {
        self.rooms
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .entry(Box::from(room))
            .or_default()
            .insert(id);
        if let Some(connection) = self.connection(id) {
            connection.rooms().insert(Box::from(room));
        }
    }

    pub(crate) fn leave(&self, id: Uuid, room: &str) {
        let mut rooms = self.rooms.write().unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Some(members) = rooms.get_mut(room) {
            members.remove(&id);
            if members.is_empty() {
                rooms.remove(room);
            }
        }
        if let Some(connection) = self.connection(id) {
            connection.rooms().remove(room);
        }
    }

    /// Removes `id` from every room and from the connection table -
    /// called once, when the connection's reader task exits.
    pub(crate) fn drop_connection(&self, id: Uuid) {
        let mut rooms = self.rooms.write().unwrap_or_else(std::sync::PoisonError::into_inner);
        rooms.retain(|_, members| {
            members.remove(&id);
            !members.is_empty()
        });
        self.connections
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .remove(&id);
    }

    fn connection(&self, id: Uuid) -> Option<Arc<WsConnection>> {
        self.connections
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(&id)
            .cloned()
    }

    /// Sends `text` to every member of `room` other than `exclude`. The
    /// membership set is snapshotted before any write happens, so a slow or
    /// misbehaving connection's send can't hold the room lock open for
    /// everyone else.
    pub(crate) fn broadcast_text(&self, room: &str, text: &str, exclude: Option<Uuid>) {
        for connection in self.snapshot_members(room, exclude) {
            connection.send_text(text);
        }
    }

    /// As [`RoomIndex::broadcast_text`], but for binary payloads. Each
    /// member gets its own copy of `payload`.
    pub(crate) fn broadcast_binary(&self, room: &str, payload: &[u8], exclude: Option<Uuid>) {
        for connection in self.snapshot_members(room, exclude) {
            connection.send_binary(payload.to_vec());
        }
    }

    fn snapshot_members(&self, room: &str, exclude: Option<Uuid>) -> Vec<Arc<WsConnection>> {
        let rooms = self.rooms.read().unwrap_or_else(std::sync::PoisonError::into_inner);
        let connections = self.connections.read().unwrap_or_else(std::sync::PoisonError::into_inner);
        rooms
            .get(room)
            .into_iter()
            .flatten()
            .filter(|id| Some(**id) != exclude)
            .filter_map(|id| connections.get(id).cloned())
            .collect()
    }

    #[cfg(test)]
    pub(crate) fn room_members(&self, room: &str) -> HashSet<Uuid> {
        self.rooms
            .read()
            .unwrap()
            .get(room)
            .cloned()
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_then_leave_clears_membership_both_directions() {
        let index = RoomIndex::default();
        let connection = Arc::new(WsConnection::for_test("/chat"));
        let id = connection.id;
        index.register(connection.clone());

        index.join(id, "lobby");
        assert!(index.room_members("lobby").contains(&id));
        assert!(connection.rooms().contains("lobby"));

        index.leave(id, "lobby");
        assert!(!index.room_members("lobby").contains(&id));
        assert!(!connection.rooms().contains("lobby"));
    }

    #[test]
    fn dropping_a_connection_removes_it_from_every_room() {
        let index = RoomIndex::default();
        let connection = Arc::new(WsConnection::for_test("/chat"));
        let id = connection.id;
        index.register(connection);
        index.join(id, "a");
        index.join(id, "b");

        index.drop_connection(id);
        assert!(!index.room_members("a").contains(&id));
        assert!(!index.room_members("b").contains(&id));
    }

    #[test]
    fn empty_rooms_are_pruned() {
        let index = RoomIndex::default();
        let connection = Arc::new(WsConnection::for_test("/chat"));
        let id = connection.id;
        index.register(connection);
        index.join(id, "solo");
        index.leave(id, "solo");
        assert!(index.rooms.read().unwrap().get("solo").is_none());
    }
}
