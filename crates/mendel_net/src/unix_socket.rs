//! Binding and connecting the daemon socket.

use std::path::Path;
use tokio::net::{UnixListener, UnixStream};
use tokio_util::codec::Framed;
use tracing::{debug, error};

use crate::error::NetError;
use crate::frame::FrameCodec;

/// Makes sure `path` is free for a new listener.
///
/// A missing path is free. If a file exists a connection is attempted:
/// when a peer answers, another daemon owns the socket and
/// [`NetError::ForeignServerActive`] is returned with the file left in
/// place. Otherwise the stale file is removed.
pub async fn server_precondition(path: &Path) -> Result<(), NetError> {
    if tokio::fs::symlink_metadata(path).await.is_err() {
        debug!(path = %path.display(), "socket path is free");
        return Ok(());
    }
    match UnixStream::connect(path).await {
        Ok(_) => {
            error!(path = %path.display(), "another daemon is listening");
            Err(NetError::ForeignServerActive {
                path: path.to_path_buf(),
            })
        }
        Err(e) => {
            debug!(path = %path.display(), error = %e, "removing stale socket");
            tokio::fs::remove_file(path).await?;
            Ok(())
        }
    }
}

/// Checks [`server_precondition`] and binds a listener at `path`.
pub async fn bind(path: &Path) -> Result<UnixListener, NetError> {
    server_precondition(path).await?;
    Ok(UnixListener::bind(path)?)
}

/// Connects to the daemon at `path`.
pub async fn connect(path: &Path) -> Result<Framed<UnixStream, FrameCodec>, NetError> {
    let stream = UnixStream::connect(path).await?;
    Ok(Framed::new(stream, FrameCodec::default()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_path_is_free() {
        let dir = tempfile::tempdir().unwrap();
        server_precondition(&dir.path().join("ipc")).await.unwrap();
    }

    #[tokio::test]
    async fn stale_socket_is_removed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ipc");
        drop(std::os::unix::net::UnixListener::bind(&path).unwrap());
        assert!(path.exists());

        server_precondition(&path).await.unwrap();
        assert!(!path.exists());
        let _listener = bind(&path).await.unwrap();
        assert!(path.exists());
    }

    #[tokio::test]
    async fn live_listener_is_left_alone() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ipc");
        let _live = UnixListener::bind(&path).unwrap();

        let err = bind(&path).await.unwrap_err();
        assert!(matches!(err, NetError::ForeignServerActive { .. }));
        assert!(path.exists());
    }

    #[tokio::test]
    async fn plain_file_is_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ipc");
        std::fs::write(&path, "").unwrap();
        let _listener = bind(&path).await.unwrap();
    }
}
