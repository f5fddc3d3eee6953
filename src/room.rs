//! Chat room
//!
//! Membership, display names and a bounded history of formatted broadcasts.
//! The room refers to connections by id only; delivery goes through the
//! `ConnectionRegistry`, which appends to each member's outbound queue and
//! never waits on the socket.
//!
//! A `ChatRoom` is not synchronized. The `ChatServer` actor owns it, so
//! enter, leave and broadcast never interleave.

use std::collections::{HashMap, VecDeque};

use bytes::{BufMut, BytesMut};
use tracing::{debug, info, warn};

use crate::error::CodecError;
use crate::message::{body_size, Message};
use crate::registry::ConnectionRegistry;
use crate::types::ConnectionId;

/// Broadcast domain with replay history
#[derive(Debug)]
pub struct ChatRoom {
    /// Member id -> display name. Holding both in one map keeps membership
    /// and names in lockstep.
    members: HashMap<ConnectionId, String>,
    /// Oldest first, never longer than `capacity`
    history: VecDeque<Message>,
    capacity: usize,
}

impl ChatRoom {
    /// Create an empty room keeping at most `capacity` past broadcasts
    pub fn new(capacity: usize) -> Self {
        Self {
            members: HashMap::new(),
            history: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Add a member and replay the history to it, oldest first
    ///
    /// Entering again under the same id only updates the name and replays
    /// the history again.
    pub fn enter(&mut self, id: ConnectionId, name: String, registry: &ConnectionRegistry) {
        info!("Connection {} entered as '{}'", id, name);
        self.members.insert(id, name);
        for message in &self.history {
            registry.deliver(id, message.clone());
        }
        debug!(
            "Replayed {} messages to {}, members: {}",
            self.history.len(),
            id,
            self.members.len()
        );
    }

    /// Remove a member. Absent ids are ignored.
    ///
    /// Returns true if the id was a member. Other members are not told.
    pub fn leave(&mut self, id: ConnectionId) -> bool {
        let removed = self.members.remove(&id).is_some();
        if removed {
            info!("Connection {} left, members: {}", id, self.members.len());
        }
        removed
    }

    /// Format a message from `sender`, record it and deliver it to every
    /// member, the sender included
    ///
    /// Returns the formatted message, or None if `sender` is not a member or
    /// the formatted body would not fit in a frame. Dropped messages are not
    /// recorded.
    pub fn broadcast(
        &mut self,
        sender: ConnectionId,
        message: &Message,
        registry: &ConnectionRegistry,
    ) -> Option<Message> {
        let Some(name) = self.members.get(&sender) else {
            debug!("Dropping message from non-member {}", sender);
            return None;
        };
        let formatted = match format_message(sender, name, &timestamp(), message) {
            Ok(formatted) => formatted,
            Err(e) => {
                warn!("Dropping message from {}: {}", sender, e);
                return None;
            }
        };

        self.history.push_back(formatted.clone());
        while self.history.len() > self.capacity {
            self.history.pop_front();
        }

        for &id in self.members.keys() {
            registry.deliver(id, formatted.clone());
        }
        debug!(
            "Broadcast {} bytes from {} to {} members",
            formatted.len(),
            sender,
            self.members.len()
        );

        Some(formatted)
    }

    pub fn contains(&self, id: ConnectionId) -> bool {
        self.members.contains_key(&id)
    }

    pub fn name_of(&self, id: ConnectionId) -> Option<&str> {
        self.members.get(&id).map(String::as_str)
    }

    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    /// Past broadcasts, oldest first
    pub fn history(&self) -> impl Iterator<Item = &Message> {
        self.history.iter()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Local time as `[YYYY-MM-DD HH:MM:SS] `
pub fn timestamp() -> String {
    chrono::Local::now().format("[%Y-%m-%d %H:%M:%S] ").to_string()
}

/// `<timestamp><name>: <body>`, stamped with the sender's id
///
/// Fails without allocating if the result would exceed the frame size limit.
pub fn format_message(
    sender: ConnectionId,
    name: &str,
    timestamp: &str,
    message: &Message,
) -> Result<Message, CodecError> {
    let len = formatted_len(name, timestamp, message.body.len())?;
    let mut body = BytesMut::with_capacity(len);
    body.put_slice(timestamp.as_bytes());
    body.put_slice(name.as_bytes());
    body.put_slice(b": ");
    body.put_slice(&message.body);
    Message::try_new(sender.0, body.freeze())
}

/// Length of a formatted body, if it fits in a frame
fn formatted_len(name: &str, timestamp: &str, body_len: usize) -> Result<usize, CodecError> {
    let len = timestamp
        .len()
        .saturating_add(name.len())
        .saturating_add(2)
        .saturating_add(body_len);
    body_size(len)?;
    Ok(len)
}

#[cfg(test)]
mod tests {
    use crate::connection::ConnectionHandle;

    use super::*;

    fn member(registry: &mut ConnectionRegistry, id: u32) -> ConnectionHandle {
        let handle = ConnectionHandle::new(ConnectionId(id));
        registry.insert(handle.clone());
        handle
    }

    fn text(message: &Message) -> String {
        String::from_utf8_lossy(&message.body).into_owned()
    }

    #[test]
    fn test_broadcast_reaches_every_member_once() {
        let mut registry = ConnectionRegistry::new();
        let mut room = ChatRoom::new(10);
        let handles: Vec<_> = (1..=5).map(|id| member(&mut registry, id)).collect();
        for handle in &handles {
            room.enter(handle.id(), format!("user{}", handle.id()), &registry);
        }

        room.broadcast(ConnectionId(2), &Message::new(0, "ping"), &registry)
            .unwrap();

        for handle in &handles {
            let queued = handle.queued();
            assert_eq!(queued.len(), 1, "member {}", handle.id());
            assert!(text(&queued[0]).ends_with("user2: ping"));
        }
    }

    #[test]
    fn test_two_members_see_formatted_message() {
        let mut registry = ConnectionRegistry::new();
        let mut room = ChatRoom::new(10);
        let a = member(&mut registry, 1);
        let b = member(&mut registry, 2);
        room.enter(a.id(), "alice".to_string(), &registry);
        room.enter(b.id(), "bob".to_string(), &registry);

        room.broadcast(a.id(), &Message::new(0, "hi"), &registry);

        for handle in [&a, &b] {
            let queued = handle.queued();
            assert_eq!(queued.len(), 1);
            let body = text(&queued[0]);
            assert!(body.starts_with('['));
            assert!(body.contains("] alice: "));
            assert!(body.ends_with("hi"));
            assert_eq!(queued[0].header.id, 1);
            assert_eq!(queued[0].header.size as usize, queued[0].body.len());
        }
    }

    #[test]
    fn test_history_evicts_oldest() {
        let mut registry = ConnectionRegistry::new();
        let mut room = ChatRoom::new(3);
        let sender = member(&mut registry, 1);
        room.enter(sender.id(), "s".to_string(), &registry);

        for body in ["a", "b", "c", "d"] {
            room.broadcast(sender.id(), &Message::new(0, body), &registry);
        }

        let history: Vec<String> = room.history().map(text).collect();
        assert_eq!(history.len(), 3);
        assert!(history[0].ends_with("s: b"));
        assert!(history[1].ends_with("s: c"));
        assert!(history[2].ends_with("s: d"));
    }

    #[test]
    fn test_newcomer_gets_history_in_order_then_live() {
        let mut registry = ConnectionRegistry::new();
        let mut room = ChatRoom::new(3);
        let sender = member(&mut registry, 1);
        room.enter(sender.id(), "s".to_string(), &registry);
        for body in ["a", "b", "c", "d"] {
            room.broadcast(sender.id(), &Message::new(0, body), &registry);
        }

        let late = member(&mut registry, 2);
        room.enter(late.id(), "late".to_string(), &registry);

        let replay: Vec<String> = late.queued().iter().map(text).collect();
        assert_eq!(replay.len(), 3);
        assert!(replay[0].ends_with("s: b"));
        assert!(replay[1].ends_with("s: c"));
        assert!(replay[2].ends_with("s: d"));

        room.broadcast(sender.id(), &Message::new(0, "e"), &registry);
        let queued = late.queued();
        assert_eq!(queued.len(), 4);
        assert!(text(&queued[3]).ends_with("s: e"));
    }

    #[test]
    fn test_short_history_replays_everything() {
        let mut registry = ConnectionRegistry::new();
        let mut room = ChatRoom::new(100);
        let sender = member(&mut registry, 1);
        room.enter(sender.id(), "s".to_string(), &registry);
        room.broadcast(sender.id(), &Message::new(0, "only"), &registry);

        let late = member(&mut registry, 2);
        room.enter(late.id(), "late".to_string(), &registry);
        assert_eq!(late.queued().len(), 1);
    }

    #[test]
    fn test_leave_is_idempotent() {
        let mut registry = ConnectionRegistry::new();
        let mut room = ChatRoom::new(10);
        let a = member(&mut registry, 1);
        let b = member(&mut registry, 2);
        room.enter(a.id(), "alice".to_string(), &registry);
        room.enter(b.id(), "bob".to_string(), &registry);

        assert!(room.leave(a.id()));
        assert!(!room.leave(a.id()));
        assert!(!room.leave(ConnectionId(99)));
        assert_eq!(room.member_count(), 1);
        assert_eq!(room.name_of(b.id()), Some("bob"));
        assert_eq!(room.name_of(a.id()), None);

        room.broadcast(b.id(), &Message::new(0, "still here"), &registry);
        assert_eq!(a.queued().len(), 0);
        assert_eq!(b.queued().len(), 1);
    }

    #[test]
    fn test_non_member_cannot_broadcast() {
        let mut registry = ConnectionRegistry::new();
        let mut room = ChatRoom::new(10);
        let a = member(&mut registry, 1);
        room.enter(a.id(), "alice".to_string(), &registry);

        assert!(room.broadcast(ConnectionId(5), &Message::new(0, "x"), &registry).is_none());
        assert_eq!(room.history().count(), 0);
        assert!(a.queued().is_empty());
    }

    #[test]
    fn test_closed_member_does_not_block_others() {
        let mut registry = ConnectionRegistry::new();
        let mut room = ChatRoom::new(10);
        let a = member(&mut registry, 1);
        let b = member(&mut registry, 2);
        room.enter(a.id(), "alice".to_string(), &registry);
        room.enter(b.id(), "bob".to_string(), &registry);
        b.close();

        room.broadcast(a.id(), &Message::new(0, "hi"), &registry);
        assert_eq!(a.queued().len(), 1);
        assert!(b.queued().is_empty());
    }

    #[test]
    fn test_format_message() {
        let msg = format_message(ConnectionId(4), "zoe", "[T] ", &Message::new(9, "yo")).unwrap();
        assert_eq!(&msg.body[..], b"[T] zoe: yo");
        assert_eq!(msg.header.id, 4);
        assert_eq!(msg.header.size, 11);
    }

    #[test]
    fn test_formatted_len_counts_prefix() {
        assert_eq!(formatted_len("zoe", "[T] ", 2), Ok(11));
        assert_eq!(formatted_len("", "", usize::MAX), Err(CodecError::BodyTooLarge(usize::MAX)));
    }

    #[cfg(target_pointer_width = "64")]
    #[test]
    fn test_prefix_pushes_body_over_frame_limit() {
        // a body that fits alone but not once name and timestamp are added
        let body_len = u32::MAX as usize - 5;
        assert!(body_size(body_len).is_ok());
        assert_eq!(
            formatted_len("zoe", "[T] ", body_len),
            Err(CodecError::BodyTooLarge(body_len + 9))
        );
    }
}
