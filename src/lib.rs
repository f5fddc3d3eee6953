//! Framed TCP Chat Transport Library
//!
//! Many clients hold a persistent TCP connection to a server. Every byte on
//! the wire is either the one-off nickname buffer or a frame of
//! `[u32 id][u32 size][body]`. Messages a member sends are timestamped,
//! prefixed with its nickname, recorded in a bounded history and fanned out
//! to every member of the room.
//!
//! # Architecture
//! - `Connection` runs a read loop and a write loop over one socket;
//!   producers reach it through a cloneable `ConnectionHandle` whose
//!   `OutboundQueue` keeps at most one write in flight
//! - `ChatServer` is an actor owning the `ConnectionRegistry` and the
//!   `ChatRoom`; connection tasks report to it over an `mpsc` channel, so
//!   room state needs no locks
//! - `Server` accepts sockets and hands each to `handle_connection`
//! - `ChatClient` is the client end of the same connection type
//!
//! # Example
//! ```ignore
//! use chat_transport::{IdAllocator, Server, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = ServerConfig::default();
//!     let server = Server::bind("127.0.0.1:9000", &config, IdAllocator::new())
//!         .await
//!         .unwrap();
//!     server.run().await.unwrap();
//! }
//! ```

pub mod client;
pub mod codec;
pub mod config;
pub mod connection;
pub mod error;
pub mod handler;
pub mod message;
pub mod queue;
pub mod registry;
pub mod room;
pub mod server;
pub mod types;

// Re-export main types for convenience
pub use client::ChatClient;
pub use config::{ClientConfig, ServerConfig};
pub use connection::{Connection, ConnectionEvent, ConnectionHandle, Role};
pub use error::{AppError, CodecError, ConfigError, SendError};
pub use handler::handle_connection;
pub use message::{Message, MessageHeader};
pub use queue::OutboundQueue;
pub use registry::ConnectionRegistry;
pub use room::ChatRoom;
pub use server::{ChatServer, Server, ServerCommand};
pub use types::{ConnectionId, IdAllocator, PeerState};
