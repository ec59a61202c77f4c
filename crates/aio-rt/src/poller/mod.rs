// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Readiness multiplexing backends.
//!
//! The scheduler hands the multiplexer the full set of handles it is
//! waiting on every iteration and gets back the subset that became ready.
//! Backends keep no waiter state of their own; the scheduler's registries
//! are the source of truth.
//!
//! - `poll`:  `poll(2)`, rebuilt from the interest sets on every call
//! - `epoll`: `epoll(7)` (Linux), interest list re-synced on each call

use std::os::unix::io::RawFd;
use std::time::Duration;

use crate::config::Backend;
use crate::error::RuntimeError;

#[cfg(target_os = "linux")]
mod epoll;
mod poll;

#[cfg(target_os = "linux")]
pub use epoll::EpollMultiplexer;
pub use poll::PollMultiplexer;

/// Direction of interest on a handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Interest {
    Readable,
    Writable,
}

/// Handles reported ready by one multiplexing call.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Readiness {
    pub readable: Vec<RawFd>,
    pub writable: Vec<RawFd>,
}

impl Readiness {
    pub fn is_empty(&self) -> bool {
        self.readable.is_empty() && self.writable.is_empty()
    }
}

/// A blocking readiness-notification call.
pub trait Multiplexer {
    /// Block until at least one handle in `readable` / `writable` is ready or
    /// `timeout` elapses (`None` blocks indefinitely).
    ///
    /// Errors and hang-ups are reported as readiness in every direction the
    /// handle was registered for, so the waiting I/O call surfaces the
    /// error. A handle that is not open at all is a
    /// [`RuntimeError::StaleHandle`].
    fn wait(
        &mut self,
        readable: &[RawFd],
        writable: &[RawFd],
        timeout: Option<Duration>,
    ) -> Result<Readiness, RuntimeError>;
}

/// Build the multiplexer for a configured backend.
pub fn from_backend(backend: Backend, max_events: usize) -> Result<Box<dyn Multiplexer>, RuntimeError> {
    match backend {
        Backend::Poll => Ok(Box::new(PollMultiplexer::new())),
        #[cfg(target_os = "linux")]
        Backend::Epoll => Ok(Box::new(
            EpollMultiplexer::new(max_events).map_err(RuntimeError::Multiplex)?,
        )),
        #[cfg(not(target_os = "linux"))]
        Backend::Epoll => {
            let _ = max_events;
            tracing::warn!("epoll is unavailable on this platform, using poll");
            Ok(Box::new(PollMultiplexer::new()))
        }
    }
}

/// Milliseconds for a poll-style timeout argument. Rounds up so a wakeup
/// never lands before the deadline it was computed from.
pub(crate) fn timeout_ms(timeout: Option<Duration>) -> libc::c_int {
    match timeout {
        None => -1,
        Some(d) => {
            let ms = d.as_nanos().div_ceil(1_000_000);
            ms.min(libc::c_int::MAX as u128) as libc::c_int
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_rounds_up_to_whole_milliseconds() {
        assert_eq!(timeout_ms(None), -1);
        assert_eq!(timeout_ms(Some(Duration::ZERO)), 0);
        assert_eq!(timeout_ms(Some(Duration::from_micros(1))), 1);
        assert_eq!(timeout_ms(Some(Duration::from_millis(50))), 50);
        assert_eq!(timeout_ms(Some(Duration::MAX)), libc::c_int::MAX);
    }

    #[test]
    fn backend_selection_builds_a_multiplexer() {
        let mut mux = from_backend(Backend::Poll, 64).unwrap();
        let ready = mux.wait(&[], &[], Some(Duration::ZERO)).unwrap();
        assert!(ready.is_empty());
    }
}
