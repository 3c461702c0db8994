//! Unix-socket transport between the Mendel daemon and its consumers.
//!
//! Messages are JSON documents framed by the `0x04` byte (see [`frame`]).
//! Only one daemon may listen on a socket path: [`unix_socket::bind`]
//! refuses to replace a socket that still has a live listener and removes
//! one that was left behind by a dead process.

#![warn(missing_docs)]

pub mod error;
pub mod frame;
pub mod protocol;

#[cfg(unix)]
pub mod client;
#[cfg(unix)]
pub mod server;
#[cfg(unix)]
pub mod unix_socket;

pub use error::NetError;
pub use frame::{FrameCodec, FRAME_DELIMITER};
pub use protocol::{ClientMessage, ServerMessage};

#[cfg(unix)]
pub use client::CacheClient;
#[cfg(unix)]
pub use server::{CacheServer, ConnectionId, ServerEvent};
