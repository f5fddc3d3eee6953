//! Connection registry
//!
//! Arena of live connection handles indexed by `ConnectionId`. Rooms store
//! ids only and go through the registry to reach a connection's queue.

use std::collections::HashMap;

use tracing::debug;

use crate::connection::ConnectionHandle;
use crate::message::Message;
use crate::types::ConnectionId;

#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: HashMap<ConnectionId, ConnectionHandle>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, handle: ConnectionHandle) {
        self.connections.insert(handle.id(), handle);
    }

    pub fn remove(&mut self, id: ConnectionId) -> Option<ConnectionHandle> {
        self.connections.remove(&id)
    }

    pub fn get(&self, id: ConnectionId) -> Option<&ConnectionHandle> {
        self.connections.get(&id)
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Queue a message on one connection
    ///
    /// Returns false if the id is unknown or the connection is closing.
    pub fn deliver(&self, id: ConnectionId, message: Message) -> bool {
        let Some(handle) = self.connections.get(&id) else {
            debug!("Deliver to unknown connection {}", id);
            return false;
        };
        match handle.send(message) {
            Ok(()) => true,
            Err(e) => {
                debug!("Deliver to {} skipped: {}", id, e);
                false
            }
        }
    }
}
