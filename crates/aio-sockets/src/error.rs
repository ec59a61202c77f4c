// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Socket error types.

use std::io;
use std::net::SocketAddr;

/// Errors from building or connecting sockets.
#[derive(Debug, thiserror::Error)]
pub enum SocketError {
    /// socket() failed.
    #[error("socket creation failed: {0}")]
    Create(#[source] io::Error),

    /// setsockopt() or fcntl() failed.
    #[error("failed to set {option}: {source}")]
    SetOption {
        option: &'static str,
        #[source]
        source: io::Error,
    },

    /// bind() failed.
    #[error("bind to {addr} failed: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    /// listen() failed.
    #[error("listen failed: {0}")]
    Listen(#[source] io::Error),

    /// connect() failed, either immediately or once the socket became
    /// writable.
    #[error("connect to {addr} failed: {source}")]
    Connect {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
}
