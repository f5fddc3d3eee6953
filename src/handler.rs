//! Per-socket connection handler
//!
//! Registers an accepted socket with the room actor and drives its
//! connection until the peer goes away.

use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::{debug, error};

use crate::connection::{Connection, ConnectionHandle, Role};
use crate::error::AppError;
use crate::server::ServerCommand;
use crate::types::ConnectionId;

/// Handle a newly accepted TCP connection
///
/// The handle is registered before the connection task starts, so the actor
/// always knows the id by the time the connection reports `Opened`.
pub async fn handle_connection(
    stream: TcpStream,
    id: ConnectionId,
    cmd_tx: mpsc::Sender<ServerCommand>,
) -> Result<(), AppError> {
    let handle = ConnectionHandle::new(id);

    if cmd_tx
        .send(ServerCommand::Connect {
            handle: handle.clone(),
        })
        .await
        .is_err()
    {
        error!("Failed to register connection {} - server closed", id);
        return Err(AppError::ChannelSend);
    }

    Connection::new(stream, handle, Role::Server).run(cmd_tx).await;

    debug!("Handler for connection {} finished", id);
    Ok(())
}
