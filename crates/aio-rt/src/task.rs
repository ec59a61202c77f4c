// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Task representation and suspension primitives.
//!
//! A task owns one future and advances it by exactly one poll per step.
//! Futures are polled with a no-op waker: resumption never comes from the
//! waker, only from a continuation the task itself parked in one of the
//! scheduler's structures (ready queue, timer queue, reader/writer maps).
//!
//! "Current task" is per-task state rather than a scheduler field. Each
//! step puts the task into its own [`StepSlot`]; a primitive that parks
//! the task takes it back out. If the slot is still occupied when the poll
//! returns `Pending`, the step ran without parking and the task requeues
//! itself.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, Waker};
use std::time::Duration;

use tracing::{trace, warn};

use crate::error::{BoxError, RuntimeError};
use crate::poller::Interest;
use crate::scheduler::{Continuation, Handle};

/// Scheduler-unique task identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(pub(crate) u64);

impl TaskId {
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task#{}", self.0)
    }
}

/// Task lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    /// In the ready queue.
    Ready,
    /// Being stepped right now.
    Running,
    /// Parked in the timer queue.
    WaitingTimer,
    /// Parked as the reader of a handle.
    WaitingReadable,
    /// Parked as the writer of a handle.
    WaitingWritable,
    /// Left its step slot without a runtime wait: either someone else holds
    /// its continuation (see [`TaskContext::take_current`]) or it was
    /// abandoned.
    Parked,
    /// Computation finished. Never stepped again.
    Done,
}

pub(crate) type LocalBoxFuture = Pin<Box<dyn Future<Output = Result<(), BoxError>>>>;

/// Holds the task while one of its steps is running.
pub(crate) struct StepSlot {
    current: RefCell<Option<Rc<Task>>>,
}

impl StepSlot {
    fn new() -> Rc<Self> {
        Rc::new(Self {
            current: RefCell::new(None),
        })
    }

    fn enter(&self, task: Rc<Task>) {
        *self.current.borrow_mut() = Some(task);
    }

    fn take(&self) -> Option<Rc<Task>> {
        self.current.borrow_mut().take()
    }

    fn is_occupied(&self) -> bool {
        self.current.borrow().is_some()
    }
}

/// A unit of work driven by the scheduler.
pub struct Task {
    id: TaskId,
    state: Rc<Cell<TaskState>>,
    slot: Rc<StepSlot>,
    future: RefCell<Option<LocalBoxFuture>>,
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("state", &self.state.get())
            .finish()
    }
}

impl Task {
    /// Build the task and the context its computation runs with.
    pub(crate) fn new<F, Fut, E>(id: TaskId, handle: Handle, f: F) -> Rc<Self>
    where
        F: FnOnce(TaskContext) -> Fut,
        Fut: Future<Output = Result<(), E>> + 'static,
        E: Into<BoxError>,
    {
        let slot = StepSlot::new();
        let cx = TaskContext {
            id,
            handle,
            slot: slot.clone(),
        };
        let fut = f(cx);
        let future: LocalBoxFuture = Box::pin(async move { fut.await.map_err(Into::into) });

        Rc::new(Self {
            id,
            state: Rc::new(Cell::new(TaskState::Ready)),
            slot,
            future: RefCell::new(Some(future)),
        })
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn state(&self) -> TaskState {
        self.state.get()
    }

    pub(crate) fn set_state(&self, state: TaskState) {
        self.state.set(state);
    }

    /// The cell the scheduler reads to answer [`Handle::task_state`].
    pub(crate) fn state_cell(&self) -> Rc<Cell<TaskState>> {
        self.state.clone()
    }

    /// Continuation that resumes this task with one more step.
    pub(crate) fn resume(self: Rc<Self>) -> Continuation {
        Box::new(move |handle: &Handle| self.step(handle))
    }

    /// Advance the computation by one poll.
    ///
    /// A computation error propagates to the caller; it is not caught here.
    pub(crate) fn step(self: &Rc<Self>, handle: &Handle) -> Result<(), RuntimeError> {
        if self.state() == TaskState::Done {
            return Err(RuntimeError::TaskFinished { id: self.id });
        }

        self.set_state(TaskState::Running);
        self.slot.enter(self.clone());
        handle.enter_step(self.id);

        let poll = {
            let mut slot = self.future.borrow_mut();
            match slot.as_mut() {
                Some(fut) => fut.as_mut().poll(&mut Context::from_waker(Waker::noop())),
                None => Poll::Ready(Ok(())),
            }
        };

        // The slot only lives for one step.
        let still_current = self.slot.take();
        if let Some(fault) = handle.leave_step() {
            return Err(fault);
        }

        match poll {
            Poll::Ready(result) => {
                let finished = self.future.borrow_mut().take();
                drop(finished);
                self.set_state(TaskState::Done);
                handle.record_completion();
                trace!(task = %self.id, ok = result.is_ok(), "task finished");
                result.map_err(|source| RuntimeError::Task {
                    id: self.id,
                    source,
                })
            }
            Poll::Pending => {
                match still_current {
                    Some(task) => {
                        // Stepped without parking anywhere: go round again.
                        task.set_state(TaskState::Ready);
                        handle.submit_continuation(task.resume());
                    }
                    None if self.state() == TaskState::Running => self.set_state(TaskState::Parked),
                    None => {}
                }
                Ok(())
            }
        }
    }
}

/// Future that is pending exactly once.
///
/// Awaiting it hands control back to the step driving the task. It does
/// not arrange any resumption: a task that cleared its current slot before
/// awaiting must already sit in a timer or readiness registry, or it is
/// abandoned.
#[derive(Debug, Default)]
#[must_use = "futures do nothing unless awaited"]
pub struct Suspend {
    yielded: bool,
}

impl Suspend {
    pub fn new() -> Self {
        Self { yielded: false }
    }
}

impl Future for Suspend {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<()> {
        if self.yielded {
            Poll::Ready(())
        } else {
            self.yielded = true;
            Poll::Pending
        }
    }
}

/// The suspension primitive.
pub fn suspend() -> Suspend {
    Suspend::new()
}

/// Execution context handed to a task's computation.
///
/// Carries the scheduler handle and the task's own step slot. Every
/// suspension primitive that parks the task goes through here.
///
/// Not `Clone`: each task owns exactly one context and a spawned child gets
/// a fresh one. A context moved into another task fails with
/// [`RuntimeError::ForeignContext`] when it is used to suspend.
pub struct TaskContext {
    id: TaskId,
    handle: Handle,
    slot: Rc<StepSlot>,
}

impl fmt::Debug for TaskContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskContext")
            .field("id", &self.id)
            .field("current", &self.is_current())
            .finish()
    }
}

impl TaskContext {
    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn handle(&self) -> &Handle {
        &self.handle
    }

    /// True while a step is running and nothing has parked the task yet.
    pub fn is_current(&self) -> bool {
        self.slot.is_occupied()
    }

    /// Take the task out of its step slot. Whoever holds the returned
    /// continuation is now responsible for resuming the task.
    pub fn take_current(&self) -> Option<Continuation> {
        self.slot.take().map(Task::resume)
    }

    /// Spawn another task on the same scheduler.
    pub fn spawn<F, Fut, E>(&self, f: F) -> TaskId
    where
        F: FnOnce(TaskContext) -> Fut,
        Fut: Future<Output = Result<(), E>> + 'static,
        E: Into<BoxError>,
    {
        self.handle.new_task(f)
    }

    /// Give other ready work a turn. The task stays current, so the step
    /// puts it back on the ready queue.
    pub fn yield_now(&self) -> Suspend {
        Suspend::new()
    }

    /// Clear the current slot and suspend. Unless the caller registered a
    /// resumption beforehand (via [`take_current`](Self::take_current)), the
    /// task is dropped once this step returns.
    pub fn park(&self) -> Suspend {
        if let Some(task) = self.take_for_parking("park") {
            trace!(task = %task.id(), "parked without a resumption");
        }
        Suspend::new()
    }

    /// Suspend for at least `delay` of monotonic time.
    pub async fn sleep(&self, delay: Duration) {
        if let Some(task) = self.take_for_parking("sleep") {
            task.set_state(TaskState::WaitingTimer);
            self.handle.submit_timer(delay, task.resume());
        }
        Suspend::new().await
    }

    /// Suspend until `fd` is reported ready in the given direction.
    pub async fn ready(&self, fd: std::os::unix::io::RawFd, interest: Interest) {
        if let Some(task) = self.take_for_parking("wait") {
            let state = match interest {
                Interest::Readable => TaskState::WaitingReadable,
                Interest::Writable => TaskState::WaitingWritable,
            };
            task.set_state(state);
            self.handle.register(fd, interest, task.resume());
        }
        Suspend::new().await
    }

    /// Take this task out of its step slot so a primitive can park it.
    ///
    /// An empty slot while another task is stepping means this context
    /// leaked into that task; the fault stops the run once the step ends.
    fn take_for_parking(&self, op: &'static str) -> Option<Rc<Task>> {
        if let Some(task) = self.slot.take() {
            return Some(task);
        }
        match self.handle.stepping() {
            Some(running) if running != self.id => {
                self.handle.raise(RuntimeError::ForeignContext {
                    context: self.id,
                    running,
                });
            }
            _ => warn!(task = %self.id, op, "suspended without being current; task will not resume"),
        }
        None
    }

    pub async fn readable(&self, fd: std::os::unix::io::RawFd) {
        self.ready(fd, Interest::Readable).await
    }

    pub async fn writable(&self, fd: std::os::unix::io::RawFd) {
        self.ready(fd, Interest::Writable).await
    }
}
