//! The daemon side of the socket.

use futures::{SinkExt, StreamExt};
use mendel_common::Lifecycle;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::mpsc::{self, UnboundedSender};
use tokio::sync::oneshot;
use tokio_util::codec::Framed;
use tracing::{debug, error, warn};

use crate::error::NetError;
use crate::frame::FrameCodec;
use crate::protocol::{ClientMessage, ServerMessage};
use crate::unix_socket;

/// Identifies one client connection for the lifetime of the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub u64);

/// What the server reports to the daemon loop.
#[derive(Debug)]
pub enum ServerEvent {
    /// A client connected. Messages sent to `outbox` are written to it.
    Connected {
        /// The new connection.
        connection: ConnectionId,
        /// Queue of messages for this client.
        outbox: UnboundedSender<ServerMessage>,
    },
    /// A client sent a request.
    Request {
        /// The sending connection.
        connection: ConnectionId,
        /// The request.
        message: ClientMessage,
    },
    /// A client went away.
    Disconnected {
        /// The closed connection.
        connection: ConnectionId,
    },
    /// The listener failed and no longer accepts connections.
    Failed {
        /// Description of the failure.
        message: String,
    },
}

/// Accepts client connections and relays their traffic to the daemon.
///
/// Connections run on their own tasks. Requests are forwarded as
/// [`ServerEvent::Request`]; replies are whatever the daemon pushes into
/// the connection's outbox. Malformed requests are answered directly with a
/// `BADMSG` error.
#[derive(Debug)]
pub struct CacheServer {
    path: PathBuf,
    shutdown: Mutex<Option<oneshot::Sender<()>>>,
}

impl CacheServer {
    /// Binds `path` and starts accepting connections.
    pub async fn start(
        path: &Path,
        events: UnboundedSender<ServerEvent>,
    ) -> Result<Self, NetError> {
        let listener = unix_socket::bind(path).await?;
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        tokio::spawn(accept_loop(listener, events, shutdown_rx));
        debug!(path = %path.display(), "cache server listening");
        Ok(Self {
            path: path.to_path_buf(),
            shutdown: Mutex::new(Some(shutdown_tx)),
        })
    }

    /// The socket path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn stop(&self) {
        let sender = self.shutdown.lock().ok().and_then(|mut guard| guard.take());
        if let Some(sender) = sender {
            let _ = sender.send(());
            if let Err(e) = std::fs::remove_file(&self.path) {
                debug!(path = %self.path.display(), error = %e, "socket already gone");
            }
        }
    }
}

impl Lifecycle for CacheServer {
    fn name(&self) -> &'static str {
        "cache server"
    }

    fn on_exit(&self) {
        self.stop();
    }
}

async fn accept_loop(
    listener: UnixListener,
    events: UnboundedSender<ServerEvent>,
    mut shutdown: oneshot::Receiver<()>,
) {
    let mut next_id = 0u64;
    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, _)) => {
                    let connection = ConnectionId(next_id);
                    next_id += 1;
                    tokio::spawn(serve_connection(connection, stream, events.clone()));
                }
                Err(e) => {
                    error!(error = %e, "unrecoverable server error");
                    let _ = events.send(ServerEvent::Failed { message: e.to_string() });
                    break;
                }
            },
        }
    }
    debug!("cache server stopped");
}

async fn serve_connection(
    connection: ConnectionId,
    stream: UnixStream,
    events: UnboundedSender<ServerEvent>,
) {
    let mut framed = Framed::new(stream, FrameCodec::default());
    let (outbox, mut inbox) = mpsc::unbounded_channel();
    if events
        .send(ServerEvent::Connected { connection, outbox })
        .is_err()
    {
        return;
    }
    debug!(connection = connection.0, "client connected");

    loop {
        tokio::select! {
            frame = framed.next() => {
                let reply = match frame {
                    Some(Ok(text)) => match serde_json::from_str::<ClientMessage>(&text) {
                        Ok(message) => {
                            if events.send(ServerEvent::Request { connection, message }).is_err() {
                                break;
                            }
                            None
                        }
                        Err(e) => Some(ServerMessage::Error {
                            code: "BADMSG".into(),
                            message: e.to_string(),
                        }),
                    },
                    Some(Err(e)) => {
                        warn!(connection = connection.0, error = %e, "dropping client");
                        break;
                    }
                    None => break,
                };
                if let Some(reply) = reply {
                    if send(&mut framed, &reply).await.is_err() {
                        break;
                    }
                }
            }
            outgoing = inbox.recv() => match outgoing {
                Some(message) => {
                    if let Err(e) = send(&mut framed, &message).await {
                        warn!(connection = connection.0, error = %e, "write failed");
                        break;
                    }
                }
                None => break,
            },
        }
    }
    debug!(connection = connection.0, "client disconnected");
    let _ = events.send(ServerEvent::Disconnected { connection });
}

async fn send(
    framed: &mut Framed<UnixStream, FrameCodec>,
    message: &ServerMessage,
) -> Result<(), NetError> {
    framed.send(serde_json::to_string(message)?).await
}
