// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! `poll(2)` backend.

use std::io;
use std::os::unix::io::RawFd;
use std::time::Duration;

use super::{timeout_ms, Multiplexer, Readiness};
use crate::error::RuntimeError;

/// Stateless `poll(2)` multiplexer. The pollfd array is rebuilt from the
/// interest sets on every call; the buffer is reused between calls.
#[derive(Debug, Default)]
pub struct PollMultiplexer {
    fds: Vec<libc::pollfd>,
}

impl PollMultiplexer {
    pub fn new() -> Self {
        Self { fds: Vec::new() }
    }

    fn build(&mut self, readable: &[RawFd], writable: &[RawFd]) {
        self.fds.clear();
        for &fd in readable {
            self.fds.push(libc::pollfd {
                fd,
                events: libc::POLLIN,
                revents: 0,
            });
        }
        for &fd in writable {
            // Same handle in both directions shares one entry.
            match self.fds.iter_mut().find(|p| p.fd == fd) {
                Some(entry) => entry.events |= libc::POLLOUT,
                None => self.fds.push(libc::pollfd {
                    fd,
                    events: libc::POLLOUT,
                    revents: 0,
                }),
            }
        }
    }
}

impl Multiplexer for PollMultiplexer {
    fn wait(
        &mut self,
        readable: &[RawFd],
        writable: &[RawFd],
        timeout: Option<Duration>,
    ) -> Result<Readiness, RuntimeError> {
        self.build(readable, writable);

        let n = unsafe {
            libc::poll(
                self.fds.as_mut_ptr(),
                self.fds.len() as libc::nfds_t,
                timeout_ms(timeout),
            )
        };

        if n < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                // EINTR: report nothing ready, the loop re-polls.
                return Ok(Readiness::default());
            }
            return Err(RuntimeError::Multiplex(err));
        }

        let mut ready = Readiness::default();
        if n == 0 {
            return Ok(ready);
        }

        for p in &self.fds {
            if p.revents == 0 {
                continue;
            }
            if p.revents & libc::POLLNVAL != 0 {
                return Err(RuntimeError::StaleHandle { fd: p.fd });
            }
            let failed = p.revents & (libc::POLLERR | libc::POLLHUP) != 0;
            if p.events & libc::POLLIN != 0 && (failed || p.revents & libc::POLLIN != 0) {
                ready.readable.push(p.fd);
            }
            if p.events & libc::POLLOUT != 0 && (failed || p.revents & libc::POLLOUT != 0) {
                ready.writable.push(p.fd);
            }
        }

        Ok(ready)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::os::unix::io::AsRawFd;
    use std::os::unix::net::UnixStream;

    #[test]
    fn no_handles_times_out_empty() {
        let mut mux = PollMultiplexer::new();
        let ready = mux.wait(&[], &[], Some(Duration::from_millis(1))).unwrap();
        assert!(ready.is_empty());
    }

    #[test]
    fn reports_readable_after_write() {
        let (a, mut b) = UnixStream::pair().unwrap();
        let mut mux = PollMultiplexer::new();

        let ready = mux.wait(&[a.as_raw_fd()], &[], Some(Duration::ZERO)).unwrap();
        assert!(ready.readable.is_empty());

        b.write_all(b"x").unwrap();
        let ready = mux
            .wait(&[a.as_raw_fd()], &[], Some(Duration::from_millis(100)))
            .unwrap();
        assert_eq!(ready.readable, vec![a.as_raw_fd()]);
    }

    #[test]
    fn shared_handle_reports_both_directions() {
        let (a, mut b) = UnixStream::pair().unwrap();
        b.write_all(b"x").unwrap();
        let fd = a.as_raw_fd();

        let mut mux = PollMultiplexer::new();
        let ready = mux.wait(&[fd], &[fd], Some(Duration::from_millis(100))).unwrap();
        assert_eq!(ready.readable, vec![fd]);
        assert_eq!(ready.writable, vec![fd]);
    }

    #[test]
    fn hangup_counts_as_readable() {
        let (a, b) = UnixStream::pair().unwrap();
        drop(b);
        let mut mux = PollMultiplexer::new();
        let ready = mux
            .wait(&[a.as_raw_fd()], &[], Some(Duration::from_millis(100)))
            .unwrap();
        assert_eq!(ready.readable, vec![a.as_raw_fd()]);
    }

    #[test]
    fn closed_handle_is_stale() {
        // Far above any descriptor the test process has open.
        let bogus: RawFd = 1 << 20;
        let mut mux = PollMultiplexer::new();
        match mux.wait(&[bogus], &[], Some(Duration::from_millis(1))) {
            Err(RuntimeError::StaleHandle { fd }) => assert_eq!(fd, bogus),
            other => panic!("expected StaleHandle, got {:?}", other),
        }
    }
}
