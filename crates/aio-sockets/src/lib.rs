// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Stream sockets for the aio runtime.
//!
//! Factories build listening and connecting sockets in either blocking or
//! non-blocking mode. The non-blocking ones are what the scheduler's
//! `wait_*` primitives expect.

mod addr;
pub mod error;
pub mod factory;
pub mod socket;

pub use error::SocketError;
pub use factory::{AsyncSocketFactory, BlockingSocketFactory, SocketFactory};
pub use socket::{AddressFamily, Socket};
