//! Basic type definitions for the chat transport
//!
//! Provides:
//! - `ConnectionId`: integer connection identifier assigned at accept time
//! - `IdAllocator`: process-wide sequential id source
//! - `PeerState`: connection lifecycle states

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// Connection identifier (newtype pattern)
///
/// Assigned once by the server when a socket is accepted and never reused
/// for the lifetime of the process. Implements Hash and Eq for use as
/// HashMap keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub u32);

impl ConnectionId {
    /// Id used by a client-side connection, which has no server-assigned id
    pub const CLIENT: ConnectionId = ConnectionId(0);
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Sequential `ConnectionId` source shared by every listener in the process
///
/// Starts at 1 so that no server-side connection collides with
/// `ConnectionId::CLIENT`.
#[derive(Debug, Clone)]
pub struct IdAllocator(Arc<AtomicU32>);

impl IdAllocator {
    pub fn new() -> Self {
        Self(Arc::new(AtomicU32::new(1)))
    }

    /// Hand out the next id
    pub fn next_id(&self) -> ConnectionId {
        ConnectionId(self.0.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for IdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

/// Connection lifecycle
///
/// Ordered so that `state >= PeerState::Closing` means "going away".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PeerState {
    /// Transport handshake (identity exchange) not finished yet
    Connecting,
    /// Read and write loops running
    Open,
    /// Close requested or an I/O error seen; loops are winding down
    Closing,
    /// Socket released (terminal)
    Closed,
}

impl PeerState {
    pub fn is_closing(self) -> bool {
        self >= PeerState::Closing
    }
}
