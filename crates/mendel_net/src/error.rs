//! Transport errors.

use std::path::{Path, PathBuf};

/// Errors raised by the socket transport.
#[derive(Debug, thiserror::Error)]
pub enum NetError {
    /// An I/O error on the socket.
    #[error("socket I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Another daemon is listening on the socket path.
    #[error("{}", other_daemon_banner(path))]
    ForeignServerActive {
        /// The contested socket path.
        path: PathBuf,
    },

    /// A frame could not be encoded or decoded.
    #[error("bad frame: {reason}")]
    Frame {
        /// What was wrong with the frame.
        reason: String,
    },

    /// The daemon answered a request with an error.
    #[error("daemon replied {code}: {message}")]
    Remote {
        /// Machine-readable error code.
        code: String,
        /// Description from the daemon.
        message: String,
    },

    /// A frame did not contain a valid message.
    #[error("protocol error: {0}")]
    Protocol(#[from] serde_json::Error),
}

/// The message shown when a second daemon is started on the same socket.
pub fn other_daemon_banner(path: &Path) -> String {
    let rule = "=".repeat(50);
    format!(
        "{rule}\n[Mendel][Error] Another builder is already running.\n\
         If no server process is active,\n\
         please remove or kill \"{}\" manually.\n{rule}",
        path.display()
    )
}
