// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Socket factories.
//!
//! Both factories build the same sockets (`SO_REUSEADDR` on, stream type);
//! they differ only in the blocking flag they leave behind. Tasks on the
//! scheduler want the non-blocking flavour from [`AsyncSocketFactory`].

use std::net::{SocketAddr, TcpListener};
use std::os::fd::AsRawFd;

use aio_rt::RuntimeConfig;
use tracing::debug;

use crate::error::SocketError;
use crate::socket::{AddressFamily, Socket};

const DEFAULT_BACKLOG: i32 = 128;

/// Builds listening and connecting sockets.
pub trait SocketFactory {
    /// Bind a listening socket on `addr`.
    fn build_read_socket(&self, addr: SocketAddr) -> Result<TcpListener, SocketError>;

    /// Create an unconnected socket for outgoing connections.
    fn build_write_socket(&self, family: AddressFamily) -> Result<Socket, SocketError>;
}

/// Factory for blocking sockets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockingSocketFactory {
    backlog: i32,
}

/// Factory for non-blocking sockets, ready for the `wait_*` primitives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AsyncSocketFactory {
    backlog: i32,
}

macro_rules! impl_factory {
    ($ty:ident, blocking = $blocking:expr) => {
        impl $ty {
            pub fn new() -> Self {
                Self::with_backlog(DEFAULT_BACKLOG)
            }

            pub fn with_backlog(backlog: i32) -> Self {
                Self { backlog }
            }

            /// Take the listen backlog from the runtime configuration.
            pub fn from_config(config: &RuntimeConfig) -> Self {
                Self::with_backlog(config.listen_backlog)
            }

            pub fn backlog(&self) -> i32 {
                self.backlog
            }
        }

        impl Default for $ty {
            fn default() -> Self {
                Self::new()
            }
        }

        impl SocketFactory for $ty {
            fn build_read_socket(&self, addr: SocketAddr) -> Result<TcpListener, SocketError> {
                build_read_socket(addr, self.backlog, $blocking)
            }

            fn build_write_socket(&self, family: AddressFamily) -> Result<Socket, SocketError> {
                build_write_socket(family, $blocking)
            }
        }
    };
}

impl_factory!(BlockingSocketFactory, blocking = true);
impl_factory!(AsyncSocketFactory, blocking = false);

fn build_read_socket(
    addr: SocketAddr,
    backlog: i32,
    blocking: bool,
) -> Result<TcpListener, SocketError> {
    let socket = Socket::new(AddressFamily::of(&addr))?;
    socket.set_reuse_address(true)?;
    socket.bind(addr)?;
    socket.set_blocking(blocking)?;
    let listener = socket.listen(backlog)?;
    debug!(%addr, fd = listener.as_raw_fd(), backlog, blocking, "listening");
    Ok(listener)
}

fn build_write_socket(family: AddressFamily, blocking: bool) -> Result<Socket, SocketError> {
    let socket = Socket::new(family)?;
    socket.set_reuse_address(true)?;
    socket.set_blocking(blocking)?;
    Ok(socket)
}
