// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Owned, not-yet-connected stream sockets.

use std::io;
use std::mem;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, FromRawFd, OwnedFd, RawFd};

use aio_rt::TaskContext;
use tracing::debug;

use crate::addr::std_to_sockaddr;
use crate::error::SocketError;

/// Address family of a stream socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressFamily {
    V4,
    V6,
}

impl AddressFamily {
    /// Family matching `addr`.
    pub fn of(addr: &SocketAddr) -> Self {
        match addr {
            SocketAddr::V4(_) => AddressFamily::V4,
            SocketAddr::V6(_) => AddressFamily::V6,
        }
    }

    fn as_raw(self) -> libc::c_int {
        match self {
            AddressFamily::V4 => libc::AF_INET,
            AddressFamily::V6 => libc::AF_INET6,
        }
    }
}

/// A TCP socket that has not been bound for listening or connected yet.
///
/// Closed on drop. Turn it into a `TcpListener` with [`listen`](Self::listen)
/// or into a `TcpStream` once connected.
#[derive(Debug)]
pub struct Socket(OwnedFd);

impl Socket {
    /// Create a close-on-exec stream socket.
    pub fn new(family: AddressFamily) -> Result<Self, SocketError> {
        let fd = unsafe { libc::socket(family.as_raw(), libc::SOCK_STREAM, 0) };
        if fd < 0 {
            return Err(SocketError::Create(io::Error::last_os_error()));
        }
        // SAFETY: fd was just returned by socket() and nothing else owns it.
        let socket = Socket(unsafe { OwnedFd::from_raw_fd(fd) });

        let ret = unsafe { libc::fcntl(fd, libc::F_SETFD, libc::FD_CLOEXEC) };
        if ret < 0 {
            return Err(SocketError::SetOption {
                option: "FD_CLOEXEC",
                source: io::Error::last_os_error(),
            });
        }
        Ok(socket)
    }

    /// Set `SO_REUSEADDR`.
    pub fn set_reuse_address(&self, reuse: bool) -> Result<(), SocketError> {
        self.setsockopt_int(libc::SO_REUSEADDR, reuse as libc::c_int)
            .map_err(|source| SocketError::SetOption {
                option: "SO_REUSEADDR",
                source,
            })
    }

    /// Toggle `O_NONBLOCK`.
    pub fn set_blocking(&self, blocking: bool) -> Result<(), SocketError> {
        aio_rt::io::set_blocking(self.as_raw_fd(), blocking).map_err(|source| {
            SocketError::SetOption {
                option: "O_NONBLOCK",
                source,
            }
        })
    }

    pub fn bind(&self, addr: SocketAddr) -> Result<(), SocketError> {
        let (storage, len) = std_to_sockaddr(&addr);
        let ret = unsafe {
            libc::bind(
                self.as_raw_fd(),
                &storage as *const _ as *const libc::sockaddr,
                len,
            )
        };
        if ret < 0 {
            return Err(SocketError::Bind {
                addr,
                source: io::Error::last_os_error(),
            });
        }
        Ok(())
    }

    /// Start listening and hand the socket over as a `TcpListener`.
    pub fn listen(self, backlog: i32) -> Result<TcpListener, SocketError> {
        let ret = unsafe { libc::listen(self.as_raw_fd(), backlog) };
        if ret < 0 {
            return Err(SocketError::Listen(io::Error::last_os_error()));
        }
        Ok(TcpListener::from(self.0))
    }

    /// Address the socket is bound to.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        let mut storage: libc::sockaddr_storage = unsafe { mem::zeroed() };
        let mut len = mem::size_of::<libc::sockaddr_storage>() as libc::socklen_t;
        let ret = unsafe {
            libc::getsockname(
                self.as_raw_fd(),
                &mut storage as *mut _ as *mut libc::sockaddr,
                &mut len,
            )
        };
        if ret < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(aio_rt::io::sockaddr_to_std(&storage))
    }

    /// Start connecting to `addr`.
    ///
    /// Returns `Ok(true)` if the connection is already established and
    /// `Ok(false)` if it is in progress, in which case the socket becomes
    /// writable once it settles and [`take_error`](Self::take_error) says
    /// how it went. A blocking socket always returns `Ok(true)` or an error.
    pub fn connect_nonblocking(&self, addr: SocketAddr) -> io::Result<bool> {
        let (storage, len) = std_to_sockaddr(&addr);
        let ret = unsafe {
            libc::connect(
                self.as_raw_fd(),
                &storage as *const _ as *const libc::sockaddr,
                len,
            )
        };
        if ret == 0 {
            return Ok(true);
        }
        let err = io::Error::last_os_error();
        match err.raw_os_error() {
            // An interrupted connect carries on asynchronously.
            Some(libc::EINPROGRESS) | Some(libc::EINTR) => Ok(false),
            _ => Err(err),
        }
    }

    /// Read and clear the pending socket error (`SO_ERROR`).
    pub fn take_error(&self) -> io::Result<Option<io::Error>> {
        let mut value: libc::c_int = 0;
        let mut len = mem::size_of::<libc::c_int>() as libc::socklen_t;
        let ret = unsafe {
            libc::getsockopt(
                self.as_raw_fd(),
                libc::SOL_SOCKET,
                libc::SO_ERROR,
                &mut value as *mut _ as *mut libc::c_void,
                &mut len,
            )
        };
        if ret < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok((value != 0).then(|| io::Error::from_raw_os_error(value)))
    }

    /// Connect from inside a task: start the connect, park on writable,
    /// then check `SO_ERROR`. The socket should be non-blocking.
    pub async fn wait_connect(
        self,
        cx: &TaskContext,
        addr: SocketAddr,
    ) -> Result<TcpStream, SocketError> {
        let connect_err = |source| SocketError::Connect { addr, source };

        if !self.connect_nonblocking(addr).map_err(connect_err)? {
            cx.writable(self.as_raw_fd()).await;
            if let Some(err) = self.take_error().map_err(connect_err)? {
                return Err(connect_err(err));
            }
        }

        debug!(%addr, fd = self.as_raw_fd(), task = %cx.id(), "connected");
        Ok(self.into_tcp_stream())
    }

    /// Hand the socket over as a `TcpStream`. Meant for connected sockets.
    pub fn into_tcp_stream(self) -> TcpStream {
        TcpStream::from(self.0)
    }

    fn setsockopt_int(&self, option: libc::c_int, value: libc::c_int) -> io::Result<()> {
        let ret = unsafe {
            libc::setsockopt(
                self.as_raw_fd(),
                libc::SOL_SOCKET,
                option,
                &value as *const _ as *const libc::c_void,
                mem::size_of::<libc::c_int>() as libc::socklen_t,
            )
        };
        if ret < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }
}

impl AsRawFd for Socket {
    fn as_raw_fd(&self) -> RawFd {
        self.0.as_raw_fd()
    }
}

impl AsFd for Socket {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.0.as_fd()
    }
}

impl From<Socket> for OwnedFd {
    fn from(socket: Socket) -> Self {
        socket.0
    }
}
