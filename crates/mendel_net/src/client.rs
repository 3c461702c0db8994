//! The consumer side of the socket.

use futures::{SinkExt, StreamExt};
use mendel_cache::Entry;
use std::path::Path;
use tokio::net::UnixStream;
use tokio_util::codec::Framed;

use crate::error::NetError;
use crate::frame::FrameCodec;
use crate::protocol::{ClientMessage, ServerMessage};
use crate::unix_socket;

/// A connection to a running daemon.
pub struct CacheClient {
    framed: Framed<UnixStream, FrameCodec>,
}

impl CacheClient {
    /// Connects to the daemon listening at `path`.
    pub async fn connect(path: &Path) -> Result<Self, NetError> {
        Ok(Self {
            framed: unix_socket::connect(path).await?,
        })
    }

    /// Sends one request.
    pub async fn send(&mut self, message: &ClientMessage) -> Result<(), NetError> {
        self.framed.send(serde_json::to_string(message)?).await
    }

    /// Waits for the next message. `None` once the daemon closed the socket.
    pub async fn recv(&mut self) -> Result<Option<ServerMessage>, NetError> {
        match self.framed.next().await {
            Some(frame) => Ok(Some(serde_json::from_str(&frame?)?)),
            None => Ok(None),
        }
    }

    /// Subscribes to `environment` and collects entries until the first idle.
    pub async fn bootstrap(&mut self, environment: &str) -> Result<Vec<Entry>, NetError> {
        self.send(&ClientMessage::Bootstrap {
            environment: environment.to_string(),
        })
        .await?;
        let mut entries = Vec::new();
        loop {
            match self.recv().await? {
                Some(ServerMessage::AddEntry { entry, .. }) => entries.push(entry),
                Some(ServerMessage::Idle { .. }) => return Ok(entries),
                Some(ServerMessage::Error { code, message }) => {
                    return Err(NetError::Remote { code, message })
                }
                Some(_) => {}
                None => return Err(closed()),
            }
        }
    }

    /// Sends a tree request and waits for the tree or error reply.
    pub async fn request_tree(&mut self, request: ClientMessage) -> Result<ServerMessage, NetError> {
        self.send(&request).await?;
        loop {
            match self.recv().await? {
                Some(reply @ (ServerMessage::Tree { .. } | ServerMessage::Error { .. })) => {
                    return Ok(reply)
                }
                Some(_) => {}
                None => return Err(closed()),
            }
        }
    }
}

fn closed() -> NetError {
    NetError::Io(std::io::Error::new(
        std::io::ErrorKind::UnexpectedEof,
        "daemon closed the connection",
    ))
}
