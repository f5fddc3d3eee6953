//! Framed connection
//!
//! One `Connection` owns one socket and runs two state machines over it:
//!
//! - the read loop: read a header, read the body if the header announces
//!   one, hand the assembled message to the owner, repeat;
//! - the write loop: drain the outbound queue one frame at a time, then sleep
//!   until a `send` finds the queue empty and kicks it awake.
//!
//! Both loops live in the same task, so the socket is released exactly once
//! when that task finishes. The rest of the program talks to the connection
//! only through a cloneable `ConnectionHandle`.
//!
//! Lifecycle: `Connecting -> Open -> Closing -> Closed`. Any read or write
//! error, or an explicit `close`, moves the connection to `Closing`. Errors
//! are not retried. A frame that has started going out is always finished
//! before the socket is shut down; frames still waiting in the queue are
//! dropped.

use std::io;
use std::sync::Arc;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch, Notify};
use tracing::{debug, info, warn};

use crate::codec::{self, HEADER_LEN, IDENTITY_LEN};
use crate::error::SendError;
use crate::message::Message;
use crate::queue::OutboundQueue;
use crate::types::{ConnectionId, PeerState};

/// Which end of the chat protocol this connection plays
#[derive(Debug, Clone)]
pub enum Role {
    /// Accepted socket: read the peer's nickname buffer before anything else
    Server,
    /// Outgoing socket: write our nickname buffer before anything else
    Client { identity: Bytes },
}

/// Events a connection reports to its owner
#[derive(Debug)]
pub enum ConnectionEvent {
    /// Identity exchanged, loops armed
    Opened { id: ConnectionId, identity: Bytes },
    /// A fully assembled inbound message
    Message { id: ConnectionId, message: Message },
    /// Socket released; always the last event for this id
    Closed { id: ConnectionId },
}

#[derive(Debug)]
struct Shared {
    id: ConnectionId,
    outbound: OutboundQueue<Message>,
    /// Wakes the write loop when a push finds the queue empty
    kick: Notify,
    state: watch::Sender<PeerState>,
}

impl Shared {
    /// Move to `Closing` unless already there. Returns true on transition.
    fn begin_close(&self) -> bool {
        self.state.send_if_modified(|state| {
            if state.is_closing() {
                false
            } else {
                *state = PeerState::Closing;
                true
            }
        })
    }

    /// Move `Connecting -> Open`. Fails if a close got there first.
    fn open(&self) -> bool {
        self.state.send_if_modified(|state| {
            if *state == PeerState::Connecting {
                *state = PeerState::Open;
                true
            } else {
                false
            }
        })
    }
}

/// Cloneable handle to a connection
///
/// Safe to use from any task or thread. `send` only touches the locked queue
/// and the wake-up signal; all socket I/O happens in the connection's task.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    shared: Arc<Shared>,
}

impl ConnectionHandle {
    /// Create a handle in the `Connecting` state
    ///
    /// Messages sent before the connection opens wait in the queue.
    pub fn new(id: ConnectionId) -> Self {
        let (state, _) = watch::channel(PeerState::Connecting);
        Self {
            shared: Arc::new(Shared {
                id,
                outbound: OutboundQueue::new(),
                kick: Notify::new(),
                state,
            }),
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.shared.id
    }

    pub fn state(&self) -> PeerState {
        *self.shared.state.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == PeerState::Open
    }

    /// Queue a message for the peer
    ///
    /// Only a push onto an empty queue wakes the write loop; otherwise a
    /// write is already in flight and the loop will reach this message on
    /// its own. That keeps at most one write outstanding per socket.
    pub fn send(&self, message: Message) -> Result<(), SendError> {
        if self.state().is_closing() {
            return Err(SendError::Closed);
        }
        if self.shared.outbound.push_back(message) {
            self.shared.kick.notify_one();
        }
        Ok(())
    }

    /// Ask the connection to shut down
    ///
    /// The connection task does the actual teardown. Calling this more than
    /// once is harmless.
    pub fn close(&self) {
        if self.shared.begin_close() {
            debug!("Connection {} close requested", self.shared.id);
        }
    }

    /// Wait until the socket has been released
    pub async fn closed(&self) {
        let mut state = self.shared.state.subscribe();
        let _ = state.wait_for(|s| *s == PeerState::Closed).await;
    }

    /// Number of messages waiting to be written
    pub fn pending(&self) -> usize {
        self.shared.outbound.len()
    }

    #[cfg(test)]
    pub(crate) fn queued(&self) -> Vec<Message> {
        self.shared.outbound.snapshot()
    }
}

/// Socket plus handle, ready to be driven by `run`
pub struct Connection {
    stream: TcpStream,
    handle: ConnectionHandle,
    role: Role,
}

impl Connection {
    pub fn new(stream: TcpStream, handle: ConnectionHandle, role: Role) -> Self {
        Self {
            stream,
            handle,
            role,
        }
    }

    /// Drive the connection until it closes
    ///
    /// Reports `Opened`, then every inbound `Message`, then `Closed` on
    /// `events`. Never returns an error: every failure ends in `Closed`.
    pub async fn run<E>(self, events: mpsc::Sender<E>)
    where
        E: From<ConnectionEvent> + Send + 'static,
    {
        let shared = self.handle.shared;
        let id = shared.id;
        let peer = self
            .stream
            .peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "unknown".to_string());
        let (mut reader, mut writer) = self.stream.into_split();

        match handshake(&shared, &self.role, &mut reader, &mut writer).await {
            Ok(Some(identity)) if shared.open() => {
                info!("Connection {} open ({})", id, peer);
                let mut state = shared.state.subscribe();
                tokio::select! {
                    sent = events.send(ConnectionEvent::Opened { id, identity }.into()) => {
                        if sent.is_err() {
                            shared.begin_close();
                        }
                    }
                    _ = closing(&mut state) => {}
                }
                tokio::join!(
                    read_loop(&shared, &mut reader, &events),
                    write_loop(&shared, &mut writer),
                );
            }
            Ok(_) => debug!("Connection {} closed before opening", id),
            Err(e) => warn!("Connection {} handshake failed: {}", id, e),
        }

        shared.begin_close();
        let _ = writer.shutdown().await;
        drop(reader);
        drop(writer);
        shared.outbound.clear();
        shared.state.send_replace(PeerState::Closed);
        info!("Connection {} closed ({})", id, peer);

        // Closed must reach the owner, but the task may not wait on a full
        // channel nobody drains
        if let Err(TrySendError::Full(event)) = events.try_send(ConnectionEvent::Closed { id }.into()) {
            tokio::spawn(async move {
                let _ = events.send(event).await;
            });
        }
    }
}

/// Read one frame: exactly `HEADER_LEN` bytes, then exactly `size` more
pub async fn read_message<R>(reader: &mut R) -> io::Result<Message>
where
    R: AsyncRead + Unpin,
{
    let mut raw_header = [0u8; HEADER_LEN];
    reader.read_exact(&mut raw_header).await?;
    let header = codec::decode_header(&raw_header)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

    let size = header.size as usize;
    let mut raw_body = vec![0u8; size];
    if size > 0 {
        reader.read_exact(&mut raw_body).await?;
    }
    let body = codec::decode_body(&raw_body, size)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

    Ok(Message { header, body })
}

/// Write one frame: header, then the body if there is one
pub async fn write_message<W>(writer: &mut W, message: &Message) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(&codec::encode_header(&message.header)).await?;
    if !message.body.is_empty() {
        writer.write_all(&message.body).await?;
    }
    Ok(())
}

/// Resolves once the connection is `Closing` or `Closed`
async fn closing(state: &mut watch::Receiver<PeerState>) {
    let _ = state.wait_for(|s| s.is_closing()).await;
}

/// Exchange the nickname buffer. `Ok(None)` means a close won the race.
async fn handshake(
    shared: &Shared,
    role: &Role,
    reader: &mut OwnedReadHalf,
    writer: &mut OwnedWriteHalf,
) -> io::Result<Option<Bytes>> {
    let mut state = shared.state.subscribe();
    let exchange = async {
        match role {
            Role::Server => {
                let mut buf = vec![0u8; IDENTITY_LEN];
                reader.read_exact(&mut buf).await?;
                Ok::<_, io::Error>(Bytes::from(buf))
            }
            Role::Client { identity } => {
                writer.write_all(identity).await?;
                Ok::<_, io::Error>(identity.clone())
            }
        }
    };

    tokio::select! {
        result = exchange => result.map(Some),
        _ = closing(&mut state) => Ok(None),
    }
}

async fn read_loop<E>(shared: &Shared, reader: &mut OwnedReadHalf, events: &mpsc::Sender<E>)
where
    E: From<ConnectionEvent>,
{
    let mut state = shared.state.subscribe();
    loop {
        let message = tokio::select! {
            result = read_message(&mut *reader) => match result {
                Ok(message) => message,
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                    debug!("Connection {} peer closed", shared.id);
                    break;
                }
                Err(e) => {
                    warn!("Connection {} read failed: {}", shared.id, e);
                    break;
                }
            },
            _ = closing(&mut state) => break,
        };

        debug!(
            "Connection {} received message {} ({} bytes)",
            shared.id,
            message.header.id,
            message.len()
        );
        let event = ConnectionEvent::Message {
            id: shared.id,
            message,
        };
        tokio::select! {
            sent = events.send(event.into()) => {
                if sent.is_err() {
                    debug!("Owner gone, ending read loop for {}", shared.id);
                    break;
                }
            }
            // an owner that stopped draining must not keep us from closing
            _ = closing(&mut state) => break,
        }
    }
    shared.begin_close();
}

async fn write_loop(shared: &Shared, writer: &mut OwnedWriteHalf) {
    let mut state = shared.state.subscribe();
    loop {
        // The message stays at the front while it is being written, so a
        // concurrent send sees a non-empty queue and does not kick.
        while let Some(message) = shared.outbound.front() {
            if shared.state.borrow().is_closing() {
                return;
            }
            if let Err(e) = write_message(&mut *writer, &message).await {
                warn!("Connection {} write failed: {}", shared.id, e);
                shared.begin_close();
                return;
            }
            shared.outbound.pop_front();
        }

        tokio::select! {
            _ = shared.kick.notified() => {}
            _ = closing(&mut state) => return,
        }
    }
}
