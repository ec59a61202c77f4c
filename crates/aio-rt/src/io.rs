// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Wait-then-do I/O primitives.
//!
//! Each operation parks the current task as the reader or writer of the
//! handle, and performs the syscall only after the multiplexer has reported
//! the handle ready. Nothing is attempted eagerly. Handles are expected to
//! be in non-blocking mode already; errors (including `WouldBlock` after a
//! spurious wakeup) go straight back to the caller.

use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, SocketAddrV4, SocketAddrV6, TcpStream};
use std::os::unix::io::{AsRawFd, FromRawFd, RawFd};

use crate::task::TaskContext;

impl TaskContext {
    /// Wait until `io` is readable, then read at most `max_bytes`.
    ///
    /// An empty buffer means end of stream, so a `max_bytes` of zero is
    /// rejected up front with `InvalidInput`.
    pub async fn wait_recv<S>(&self, io: &S, max_bytes: usize) -> io::Result<Vec<u8>>
    where
        S: AsRawFd + ?Sized,
    {
        if max_bytes == 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "wait_recv needs room for at least one byte",
            ));
        }
        let fd = io.as_raw_fd();
        self.readable(fd).await;
        read_fd(fd, max_bytes)
    }

    /// Wait until `io` is writable, then write as much of `data` as the
    /// kernel takes. Returns the number of bytes written.
    pub async fn wait_send<S>(&self, io: &S, data: &[u8]) -> io::Result<usize>
    where
        S: AsRawFd + ?Sized,
    {
        let fd = io.as_raw_fd();
        self.writable(fd).await;
        write_fd(fd, data)
    }

    /// Keep calling [`wait_send`](Self::wait_send) until all of `data` is out.
    pub async fn wait_send_all<S>(&self, io: &S, mut data: &[u8]) -> io::Result<()>
    where
        S: AsRawFd + ?Sized,
    {
        while !data.is_empty() {
            let n = self.wait_send(io, data).await?;
            if n == 0 {
                return Err(io::Error::new(io::ErrorKind::WriteZero, "peer accepted no bytes"));
            }
            data = &data[n..];
        }
        Ok(())
    }

    /// Wait until the listening socket is readable, then accept one
    /// connection. The accepted stream is switched to non-blocking mode.
    pub async fn wait_accept<L>(&self, listener: &L) -> io::Result<(TcpStream, SocketAddr)>
    where
        L: AsRawFd + ?Sized,
    {
        let fd = listener.as_raw_fd();
        self.readable(fd).await;
        accept_fd(fd)
    }
}

fn read_fd(fd: RawFd, max_bytes: usize) -> io::Result<Vec<u8>> {
    let mut buf = vec![0u8; max_bytes];
    let n = unsafe { libc::read(fd, buf.as_mut_ptr() as *mut libc::c_void, buf.len()) };
    if n < 0 {
        return Err(io::Error::last_os_error());
    }
    buf.truncate(n as usize);
    Ok(buf)
}

fn write_fd(fd: RawFd, data: &[u8]) -> io::Result<usize> {
    let n = unsafe { libc::write(fd, data.as_ptr() as *const libc::c_void, data.len()) };
    if n < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(n as usize)
}

fn accept_fd(fd: RawFd) -> io::Result<(TcpStream, SocketAddr)> {
    let mut addr: libc::sockaddr_storage = unsafe { std::mem::zeroed() };
    let mut addrlen = std::mem::size_of::<libc::sockaddr_storage>() as libc::socklen_t;

    let client_fd = unsafe {
        libc::accept(
            fd,
            &mut addr as *mut _ as *mut libc::sockaddr,
            &mut addrlen,
        )
    };
    if client_fd < 0 {
        return Err(io::Error::last_os_error());
    }

    // Owns client_fd from here on; closes it if the fcntls below fail.
    let stream = unsafe { TcpStream::from_raw_fd(client_fd) };
    set_cloexec(client_fd)?;
    set_nonblocking(client_fd)?;
    Ok((stream, sockaddr_to_std(&addr)))
}

/// Convert a raw `sockaddr_storage` filled in by the kernel.
pub fn sockaddr_to_std(addr: &libc::sockaddr_storage) -> SocketAddr {
    match addr.ss_family as i32 {
        libc::AF_INET => {
            // SAFETY: ss_family says this storage holds a sockaddr_in.
            let addr4 = unsafe { &*(addr as *const _ as *const libc::sockaddr_in) };
            let ip = Ipv4Addr::from(u32::from_be(addr4.sin_addr.s_addr));
            let port = u16::from_be(addr4.sin_port);
            SocketAddr::V4(SocketAddrV4::new(ip, port))
        }
        libc::AF_INET6 => {
            // SAFETY: ss_family says this storage holds a sockaddr_in6.
            let addr6 = unsafe { &*(addr as *const _ as *const libc::sockaddr_in6) };
            let ip = Ipv6Addr::from(addr6.sin6_addr.s6_addr);
            let port = u16::from_be(addr6.sin6_port);
            SocketAddr::V6(SocketAddrV6::new(
                ip,
                port,
                addr6.sin6_flowinfo,
                addr6.sin6_scope_id,
            ))
        }
        _ => SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0)),
    }
}

/// Set a file descriptor to non-blocking mode.
pub fn set_nonblocking(fd: RawFd) -> io::Result<()> {
    set_blocking(fd, false)
}

/// Set or clear `O_NONBLOCK` on a file descriptor.
pub fn set_blocking(fd: RawFd, blocking: bool) -> io::Result<()> {
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFL) };
    if flags < 0 {
        return Err(io::Error::last_os_error());
    }
    let flags = if blocking {
        flags & !libc::O_NONBLOCK
    } else {
        flags | libc::O_NONBLOCK
    };
    let ret = unsafe { libc::fcntl(fd, libc::F_SETFL, flags) };
    if ret < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

fn set_cloexec(fd: RawFd) -> io::Result<()> {
    let ret = unsafe { libc::fcntl(fd, libc::F_SETFD, libc::FD_CLOEXEC) };
    if ret < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::os::unix::net::UnixStream;

    #[test]
    fn read_fd_would_block_when_empty() {
        let (a, _b) = UnixStream::pair().unwrap();
        set_nonblocking(a.as_raw_fd()).unwrap();
        let err = read_fd(a.as_raw_fd(), 16).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::WouldBlock);
    }

    #[test]
    fn read_fd_truncates_to_bytes_read() {
        let (a, mut b) = UnixStream::pair().unwrap();
        b.write_all(b"hey").unwrap();
        assert_eq!(read_fd(a.as_raw_fd(), 64).unwrap(), b"hey");
    }

    #[test]
    fn write_fd_reports_count() {
        let (a, _b) = UnixStream::pair().unwrap();
        assert_eq!(write_fd(a.as_raw_fd(), b"abcd").unwrap(), 4);
    }

    #[test]
    fn blocking_flag_round_trips() {
        let (a, _b) = UnixStream::pair().unwrap();
        let fd = a.as_raw_fd();
        let flags = || unsafe { libc::fcntl(fd, libc::F_GETFL) };

        set_nonblocking(fd).unwrap();
        assert_ne!(flags() & libc::O_NONBLOCK, 0);
        set_blocking(fd, true).unwrap();
        assert_eq!(flags() & libc::O_NONBLOCK, 0);
    }

    #[test]
    fn sockaddr_v4_conversion() {
        let mut storage: libc::sockaddr_storage = unsafe { std::mem::zeroed() };
        {
            let sin = unsafe { &mut *(&mut storage as *mut _ as *mut libc::sockaddr_in) };
            sin.sin_family = libc::AF_INET as libc::sa_family_t;
            sin.sin_port = 8880u16.to_be();
            sin.sin_addr.s_addr = u32::from(Ipv4Addr::LOCALHOST).to_be();
        }
        assert_eq!(sockaddr_to_std(&storage), "127.0.0.1:8880".parse().unwrap());
    }
}
