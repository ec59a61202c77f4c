// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! `epoll(7)` backend (Linux).
//!
//! Level-triggered. The kernel interest list is kept in sync with the
//! scheduler's registries on each call: handles no longer waited on are
//! deleted, new ones added, the rest re-armed with their current mask.

use std::collections::HashMap;
use std::io;
use std::os::unix::io::RawFd;
use std::time::Duration;

use super::{timeout_ms, Multiplexer, Readiness};
use crate::error::RuntimeError;

/// Epoll-backed multiplexer.
pub struct EpollMultiplexer {
    epoll_fd: RawFd,
    /// FD → event mask currently installed in the kernel.
    registered: HashMap<RawFd, u32>,
    events: Vec<libc::epoll_event>,
}

impl EpollMultiplexer {
    /// Create an epoll instance that reports up to `max_events` handles per
    /// call.
    pub fn new(max_events: usize) -> io::Result<Self> {
        let epoll_fd = unsafe { libc::epoll_create1(libc::EPOLL_CLOEXEC) };
        if epoll_fd < 0 {
            return Err(io::Error::last_os_error());
        }

        Ok(Self {
            epoll_fd,
            registered: HashMap::new(),
            events: vec![libc::epoll_event { events: 0, u64: 0 }; max_events.max(1)],
        })
    }

    fn ctl(&self, op: libc::c_int, fd: RawFd, events: u32) -> io::Result<()> {
        let mut ev = libc::epoll_event {
            events,
            u64: fd as u64,
        };
        let ret = unsafe { libc::epoll_ctl(self.epoll_fd, op, fd, &mut ev) };
        if ret < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    fn sync(&mut self, readable: &[RawFd], writable: &[RawFd]) -> Result<(), RuntimeError> {
        let mut wanted: HashMap<RawFd, u32> = HashMap::with_capacity(readable.len() + writable.len());
        for &fd in readable {
            *wanted.entry(fd).or_default() |= libc::EPOLLIN as u32;
        }
        for &fd in writable {
            *wanted.entry(fd).or_default() |= libc::EPOLLOUT as u32;
        }

        let stale: Vec<RawFd> = self
            .registered
            .keys()
            .filter(|fd| !wanted.contains_key(fd))
            .copied()
            .collect();
        for fd in stale {
            self.registered.remove(&fd);
            if let Err(err) = self.ctl(libc::EPOLL_CTL_DEL, fd, 0) {
                // ENOENT / EBADF are expected if the FD was already closed.
                if err.raw_os_error() != Some(libc::ENOENT)
                    && err.raw_os_error() != Some(libc::EBADF)
                {
                    return Err(RuntimeError::Multiplex(err));
                }
            }
        }

        for (fd, mask) in wanted {
            let result = if self.registered.contains_key(&fd) {
                // Closing an FD silently drops it from the kernel set, and the
                // number may since have been reused. MOD fails with ENOENT then.
                match self.ctl(libc::EPOLL_CTL_MOD, fd, mask) {
                    Err(err) if err.raw_os_error() == Some(libc::ENOENT) => {
                        self.ctl(libc::EPOLL_CTL_ADD, fd, mask)
                    }
                    other => other,
                }
            } else {
                self.ctl(libc::EPOLL_CTL_ADD, fd, mask)
            };
            match result {
                Ok(()) => {
                    self.registered.insert(fd, mask);
                }
                Err(err) if err.raw_os_error() == Some(libc::EBADF) => {
                    self.registered.remove(&fd);
                    return Err(RuntimeError::StaleHandle { fd });
                }
                Err(err) => return Err(RuntimeError::Multiplex(err)),
            }
        }
        Ok(())
    }
}

impl Multiplexer for EpollMultiplexer {
    fn wait(
        &mut self,
        readable: &[RawFd],
        writable: &[RawFd],
        timeout: Option<Duration>,
    ) -> Result<Readiness, RuntimeError> {
        self.sync(readable, writable)?;

        let n = unsafe {
            libc::epoll_wait(
                self.epoll_fd,
                self.events.as_mut_ptr(),
                self.events.len() as libc::c_int,
                timeout_ms(timeout),
            )
        };

        if n < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                return Ok(Readiness::default()); // EINTR: retry next cycle.
            }
            return Err(RuntimeError::Multiplex(err));
        }

        let mut ready = Readiness::default();
        for ev in &self.events[..n as usize] {
            let fd = ev.u64 as RawFd;
            let Some(&mask) = self.registered.get(&fd) else {
                continue;
            };
            let bits = ev.events;
            let failed = bits & (libc::EPOLLERR | libc::EPOLLHUP) as u32 != 0;
            if mask & libc::EPOLLIN as u32 != 0 && (failed || bits & libc::EPOLLIN as u32 != 0) {
                ready.readable.push(fd);
            }
            if mask & libc::EPOLLOUT as u32 != 0 && (failed || bits & libc::EPOLLOUT as u32 != 0) {
                ready.writable.push(fd);
            }
        }

        Ok(ready)
    }
}

impl Drop for EpollMultiplexer {
    fn drop(&mut self) {
        for &fd in self.registered.keys() {
            unsafe {
                libc::epoll_ctl(self.epoll_fd, libc::EPOLL_CTL_DEL, fd, std::ptr::null_mut());
            }
        }
        unsafe {
            libc::close(self.epoll_fd);
        }
    }
}
