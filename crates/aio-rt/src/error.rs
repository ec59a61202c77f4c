// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Runtime and configuration errors.

use std::io;
use std::os::unix::io::RawFd;
use std::path::PathBuf;

use thiserror::Error;

use crate::task::TaskId;

/// Error type produced by a task's computation. Anything convertible into a
/// boxed error can be returned from a task (`io::Error`, `String`, `&str`, ...).
pub type BoxError = Box<dyn std::error::Error + 'static>;

/// Errors that stop the run loop.
///
/// None of these are recovered inside the runtime: a continuation failing
/// during the drain phase unwinds straight out of `Scheduler::run`.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// A task's computation finished with an error.
    #[error("{id} failed: {source}")]
    Task {
        id: TaskId,
        #[source]
        source: BoxError,
    },

    /// The readiness-multiplexing call itself failed.
    #[error("readiness multiplexing failed: {0}")]
    Multiplex(#[source] io::Error),

    /// The multiplexer reported a handle that is no longer valid
    /// (closed while a waiter was still registered on it).
    #[error("registered handle {fd} is no longer valid")]
    StaleHandle { fd: RawFd },

    /// A continuation tried to step a task that already completed.
    #[error("{id} was resumed after it completed")]
    TaskFinished { id: TaskId },

    /// A task tried to suspend through a context that belongs to another
    /// task. Parking would have left the running task current, so it would
    /// have been resumed without waiting.
    #[error("{running} tried to suspend through the context of {context}")]
    ForeignContext { context: TaskId, running: TaskId },
}

/// Errors loading a [`RuntimeConfig`](crate::config::RuntimeConfig).
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid value `{value}` for {key}")]
    InvalidValue { key: &'static str, value: String },
}
