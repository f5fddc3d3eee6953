//! Chat client
//!
//! One client-role connection to a server. Writes and closes are posted to
//! the connection task through its handle rather than done on the caller's
//! thread, so the console thread never touches the socket.

use std::io::BufRead;
use std::sync::atomic::{AtomicU32, Ordering};
use std::thread;

use bytes::Bytes;
use tokio::net::{lookup_host, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::codec;
use crate::config::CHANNEL_BUFFER_SIZE;
use crate::connection::{Connection, ConnectionEvent, ConnectionHandle, Role};
use crate::error::{AppError, SendError};
use crate::message::Message;
use crate::types::{ConnectionId, PeerState};

/// Connected chat client
#[derive(Debug)]
pub struct ChatClient {
    handle: ConnectionHandle,
    events: mpsc::Receiver<ConnectionEvent>,
    task: JoinHandle<()>,
    /// Correlation id for the next outgoing message
    next_id: AtomicU32,
}

impl ChatClient {
    /// Resolve `host:port`, connect, and start the connection task
    ///
    /// Resolution and connect failures are returned here and not retried.
    /// The nickname buffer is the first thing written once connected.
    pub async fn connect(nickname: &str, host: &str, port: u16) -> Result<Self, AppError> {
        let addrs: Vec<_> = lookup_host((host, port))
            .await
            .map_err(|source| AppError::Resolve {
                host: host.to_string(),
                source,
            })?
            .collect();
        if addrs.is_empty() {
            return Err(AppError::NoAddress(host.to_string()));
        }

        let stream = TcpStream::connect(&addrs[..]).await?;
        info!("Connected to {}:{}", host, port);

        let handle = ConnectionHandle::new(ConnectionId::CLIENT);
        let (tx, rx) = mpsc::channel(CHANNEL_BUFFER_SIZE);
        let role = Role::Client {
            identity: codec::encode_identity(nickname),
        };
        let task = tokio::spawn(Connection::new(stream, handle.clone(), role).run(tx));

        Ok(Self {
            handle,
            events: rx,
            task,
            next_id: AtomicU32::new(1),
        })
    }

    /// Queue a message body for the server
    ///
    /// Bodies too long for the frame size field are rejected, not truncated.
    pub fn write(&self, body: impl Into<Bytes>) -> Result<(), SendError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.handle.send(Message::try_new(id, body)?)
    }

    /// Ask the connection to close; returns immediately
    pub fn close(&self) {
        self.handle.close();
    }

    pub fn is_connected(&self) -> bool {
        self.handle.is_connected()
    }

    pub fn state(&self) -> PeerState {
        self.handle.state()
    }

    /// Next message from the server, or None once the connection is closed
    pub async fn recv(&mut self) -> Option<Message> {
        loop {
            match self.events.recv().await? {
                ConnectionEvent::Opened { .. } => debug!("Client connection open"),
                ConnectionEvent::Message { message, .. } => return Some(message),
                ConnectionEvent::Closed { .. } => return None,
            }
        }
    }

    /// Close and wait for the socket to be released
    pub async fn shutdown(self) {
        self.handle.close();
        let _ = self.task.await;
    }
}

/// Read lines from `input` on a dedicated OS thread
///
/// The channel closes at end of input, on a read error, or never if the
/// input stays silent. The thread is detached, so a caller that stops
/// listening can return without waiting on a blocked read.
pub fn spawn_line_reader<R>(input: R) -> mpsc::Receiver<String>
where
    R: BufRead + Send + 'static,
{
    let (tx, rx) = mpsc::channel(CHANNEL_BUFFER_SIZE);
    thread::spawn(move || {
        for line in input.lines() {
            match line {
                Ok(line) => {
                    if tx.blocking_send(line).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    warn!("Input read failed: {}", e);
                    break;
                }
            }
        }
    });
    rx
}
