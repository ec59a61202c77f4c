// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Cooperative single-threaded task runtime.
//!
//! One scheduler multiplexes socket readiness and timer deadlines to drive
//! many suspended tasks on a single OS thread. Tasks yield only at explicit
//! suspension points; nothing is preempted.
//!
//! Components:
//! - `task`:      Task, TaskContext, the `Suspend` primitive
//! - `scheduler`: ready/timer queues, reader/writer registries, run loop
//! - `queue`:     FIFO ready queue + (deadline, sequence) timer heap
//! - `poller`:    poll(2) / epoll(7) readiness multiplexers
//! - `io`:        wait_recv / wait_send / wait_accept
//! - `clock`:     monotonic time sources
//! - `config`:    runtime configuration
//!
//! ```no_run
//! use std::time::Duration;
//! use aio_rt::Scheduler;
//!
//! let mut sched = Scheduler::new();
//! sched.new_task(|cx| async move {
//!     cx.sleep(Duration::from_millis(50)).await;
//!     println!("woke up");
//!     Ok::<(), std::io::Error>(())
//! });
//! sched.run().unwrap();
//! ```

pub mod clock;
pub mod config;
pub mod error;
pub mod io;
pub mod poller;
mod queue;
pub mod scheduler;
pub mod task;

pub use clock::{Clock, ManualClock, MonotonicClock};
pub use config::{Backend, RuntimeConfig};
pub use error::{BoxError, ConfigError, RuntimeError};
pub use poller::{Interest, Multiplexer, Readiness};
pub use scheduler::{Continuation, Handle, RuntimeStats, Scheduler};
pub use task::{suspend, Suspend, TaskContext, TaskId, TaskState};
