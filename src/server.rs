//! Server: room actor and accept loop
//!
//! `ChatServer` is the actor that owns the connection registry and the room.
//! Every connection task reports to it over one mpsc channel, so membership,
//! history and fan-out are only ever touched from a single task.
//!
//! `Server` binds one port, starts its `ChatServer`, and accepts sockets.

use std::io;
use std::net::SocketAddr;

use tokio::net::{TcpListener, ToSocketAddrs};
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use crate::codec;
use crate::config::ServerConfig;
use crate::connection::{ConnectionEvent, ConnectionHandle};
use crate::error::AppError;
use crate::handler::handle_connection;
use crate::message::Message;
use crate::registry::ConnectionRegistry;
use crate::room::ChatRoom;
use crate::types::{ConnectionId, IdAllocator};

/// Commands sent from connection tasks to the ChatServer actor
#[derive(Debug)]
pub enum ServerCommand {
    /// Socket accepted; handle is not open yet
    Connect { handle: ConnectionHandle },
    /// Something happened on a registered connection
    Connection(ConnectionEvent),
}

impl From<ConnectionEvent> for ServerCommand {
    fn from(event: ConnectionEvent) -> Self {
        ServerCommand::Connection(event)
    }
}

/// The room actor
///
/// Processes commands one at a time, so a newcomer's history replay is
/// queued before any broadcast that is handled after its `Opened` event.
pub struct ChatServer {
    /// All live connections: ConnectionId -> handle
    registry: ConnectionRegistry,
    room: ChatRoom,
    /// Command receiver channel
    receiver: mpsc::Receiver<ServerCommand>,
}

impl ChatServer {
    pub fn new(receiver: mpsc::Receiver<ServerCommand>, history_capacity: usize) -> Self {
        Self {
            registry: ConnectionRegistry::new(),
            room: ChatRoom::new(history_capacity),
            receiver,
        }
    }

    /// Run the event loop until every command sender is dropped
    pub async fn run(mut self) {
        info!("ChatServer started");

        while let Some(cmd) = self.receiver.recv().await {
            self.handle_command(cmd);
        }

        info!("ChatServer shutting down");
    }

    fn handle_command(&mut self, cmd: ServerCommand) {
        match cmd {
            ServerCommand::Connect { handle } => self.handle_connect(handle),
            ServerCommand::Connection(ConnectionEvent::Opened { id, identity }) => {
                self.handle_opened(id, &identity);
            }
            ServerCommand::Connection(ConnectionEvent::Message { id, message }) => {
                self.handle_message(id, message);
            }
            ServerCommand::Connection(ConnectionEvent::Closed { id }) => {
                self.handle_closed(id);
            }
        }
    }

    fn handle_connect(&mut self, handle: ConnectionHandle) {
        debug!("Registered connection {}", handle.id());
        self.registry.insert(handle);
        debug!("Total connections: {}", self.registry.len());
    }

    /// Identity read: the connection joins the room under its nickname
    fn handle_opened(&mut self, id: ConnectionId, identity: &[u8]) {
        let mut name = codec::decode_identity(identity);
        if name.is_empty() {
            name = format!("guest-{}", id);
        }
        self.room.enter(id, name, &self.registry);
    }

    fn handle_message(&mut self, id: ConnectionId, message: Message) {
        self.room.broadcast(id, &message, &self.registry);
    }

    /// Socket gone: drop the member silently
    fn handle_closed(&mut self, id: ConnectionId) {
        self.room.leave(id);
        self.registry.remove(id);
        debug!(
            "Total connections: {}, room members: {}",
            self.registry.len(),
            self.room.member_count()
        );
    }
}

/// One listening port with its own room
pub struct Server {
    listener: TcpListener,
    commands: mpsc::Sender<ServerCommand>,
    ids: IdAllocator,
}

impl Server {
    /// Bind the listener and start the room actor
    ///
    /// `ids` is shared by every server in the process so connection ids stay
    /// unique across ports.
    pub async fn bind<A: ToSocketAddrs>(
        addr: A,
        config: &ServerConfig,
        ids: IdAllocator,
    ) -> Result<Self, AppError> {
        let listener = TcpListener::bind(addr).await?;
        let (cmd_tx, cmd_rx) = mpsc::channel(config.channel_buffer);
        tokio::spawn(ChatServer::new(cmd_rx, config.history_capacity).run());

        Ok(Self {
            listener,
            commands: cmd_tx,
            ids,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept connections forever
    ///
    /// Each socket gets the next id and its own task; acceptance is re-armed
    /// immediately, without waiting for the handshake. There is no connection
    /// limit. Only returns if the room actor has gone away.
    pub async fn run(self) -> Result<(), AppError> {
        info!("Chat server listening on {}", self.local_addr()?);

        loop {
            match self.listener.accept().await {
                Ok((stream, addr)) => {
                    let id = self.ids.next_id();
                    info!("New connection {} from {}", id, addr);
                    let cmd_tx = self.commands.clone();

                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, id, cmd_tx).await {
                            error!("Connection handler error: {}", e);
                        }
                    });
                }
                Err(e) => {
                    error!("Failed to accept connection: {}", e);
                }
            }

            if self.commands.is_closed() {
                error!("ChatServer actor stopped");
                return Err(AppError::ChannelSend);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;

    fn actor() -> ChatServer {
        let (_tx, rx) = mpsc::channel(1);
        ChatServer::new(rx, 2)
    }

    fn connect(server: &mut ChatServer, id: u32, nickname: &str) -> ConnectionHandle {
        let handle = ConnectionHandle::new(ConnectionId(id));
        server.handle_command(ServerCommand::Connect {
            handle: handle.clone(),
        });
        server.handle_command(
            ConnectionEvent::Opened {
                id: handle.id(),
                identity: codec::encode_identity(nickname),
            }
            .into(),
        );
        handle
    }

    fn say(server: &mut ChatServer, id: u32, text: &'static str) {
        server.handle_command(
            ConnectionEvent::Message {
                id: ConnectionId(id),
                message: Message::new(0, Bytes::from_static(text.as_bytes())),
            }
            .into(),
        );
    }

    #[test]
    fn test_message_fans_out_to_all_members() {
        let mut server = actor();
        let a = connect(&mut server, 1, "alice");
        let b = connect(&mut server, 2, "bob");

        say(&mut server, 1, "hi");

        for handle in [&a, &b] {
            let queued = handle.queued();
            assert_eq!(queued.len(), 1);
            assert!(String::from_utf8_lossy(&queued[0].body).ends_with("alice: hi"));
        }
    }

    #[test]
    fn test_closed_connection_is_dropped_silently() {
        let mut server = actor();
        let a = connect(&mut server, 1, "alice");
        let _b = connect(&mut server, 2, "bob");

        server.handle_command(ConnectionEvent::Closed { id: ConnectionId(2) }.into());
        assert_eq!(server.room.member_count(), 1);
        assert_eq!(server.registry.len(), 1);
        assert!(a.queued().is_empty());

        // a second Closed for the same id is a no-op
        server.handle_command(ConnectionEvent::Closed { id: ConnectionId(2) }.into());
        assert_eq!(server.room.member_count(), 1);
    }

    #[test]
    fn test_history_is_bounded_for_newcomers() {
        let mut server = actor();
        connect(&mut server, 1, "alice");
        say(&mut server, 1, "one");
        say(&mut server, 1, "two");
        say(&mut server, 1, "three");

        let late = connect(&mut server, 2, "bob");
        let replay: Vec<String> = late
            .queued()
            .iter()
            .map(|m| String::from_utf8_lossy(&m.body).into_owned())
            .collect();
        assert_eq!(replay.len(), 2);
        assert!(replay[0].ends_with("alice: two"));
        assert!(replay[1].ends_with("alice: three"));
    }

    #[test]
    fn test_empty_nickname_gets_guest_name() {
        let mut server = actor();
        connect(&mut server, 8, "");
        assert_eq!(server.room.name_of(ConnectionId(8)), Some("guest-8"));
    }

    #[tokio::test]
    async fn test_bind_reports_local_addr() {
        let server = Server::bind("127.0.0.1:0", &ServerConfig::default(), IdAllocator::new())
            .await
            .unwrap();
        let addr = server.local_addr().unwrap();
        assert_ne!(addr.port(), 0);
    }
}
