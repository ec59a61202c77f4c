// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Single-threaded cooperative scheduler.
//!
//! Owns the ready queue, the timer queue and the reader/writer registries,
//! and runs the event loop until all four are empty. Continuations are
//! plain closures; a task's continuation is a closure that steps it.
//!
//! One loop iteration:
//! 1. If the ready queue is non-empty, skip straight to the drain.
//! 2. Otherwise block in the multiplexer over every registered handle, for
//!    at most the time until the nearest timer (indefinitely if none).
//! 3. Move ready readers, then ready writers, onto the ready queue.
//! 4. Pop every expired timer onto the ready queue, earliest first.
//! 5. Drain the ready queue in FIFO order, including anything queued while
//!    draining.
//!
//! Errors from a continuation abort `run` immediately. There is no
//! isolation between tasks.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::future::Future;
use std::os::unix::io::RawFd;
use std::rc::Rc;
use std::time::{Duration, Instant};

use tracing::{debug, trace, warn};

use crate::clock::{Clock, MonotonicClock};
use crate::config::RuntimeConfig;
use crate::error::{BoxError, RuntimeError};
use crate::poller::{self, Interest, Multiplexer, PollMultiplexer, Readiness};
use crate::queue::{ReadyQueue, TimerQueue};
use crate::task::{Task, TaskContext, TaskId, TaskState};

/// A suspended unit of work: a callable plus whatever it captured.
pub type Continuation = Box<dyn FnOnce(&Handle) -> Result<(), RuntimeError>>;

/// Used when `now + delay` overflows `Instant`.
const FAR_FUTURE: Duration = Duration::from_secs(60 * 60 * 24 * 365 * 30);

/// Counters collected while the scheduler runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RuntimeStats {
    pub tasks_spawned: u64,
    pub tasks_completed: u64,
    pub steps: u64,
    pub timers_fired: u64,
    pub io_wakeups: u64,
    pub iterations: u64,
}

/// Scheduler state shared by every [`Handle`].
struct Core {
    ready: ReadyQueue,
    timers: TimerQueue,
    readers: HashMap<RawFd, Continuation>,
    writers: HashMap<RawFd, Continuation>,
    clock: Rc<dyn Clock>,
    next_task: u64,
    /// State cells of tasks that are alive, or dropped since the last
    /// blocking wait.
    tasks: HashMap<TaskId, Rc<Cell<TaskState>>>,
    /// Task whose step is on the stack right now.
    stepping: Option<TaskId>,
    /// Fatal error raised from inside a step, reported when it returns.
    fault: Option<RuntimeError>,
    stats: RuntimeStats,
}

impl Core {
    fn is_quiescent(&self) -> bool {
        self.ready.is_empty()
            && self.timers.is_empty()
            && self.readers.is_empty()
            && self.writers.is_empty()
    }

    fn registry(&mut self, interest: Interest) -> &mut HashMap<RawFd, Continuation> {
        match interest {
            Interest::Readable => &mut self.readers,
            Interest::Writable => &mut self.writers,
        }
    }

    fn poll_timeout(&self, now: Instant) -> Option<Duration> {
        self.timers
            .next_deadline()
            .map(|deadline| deadline.saturating_duration_since(now))
    }

    /// Move the continuations of ready handles onto the ready queue.
    fn promote_ready(&mut self, readiness: Readiness) {
        for fd in readiness.readable {
            if let Some(cont) = self.readers.remove(&fd) {
                self.stats.io_wakeups += 1;
                self.ready.push(cont);
            }
        }
        for fd in readiness.writable {
            if let Some(cont) = self.writers.remove(&fd) {
                self.stats.io_wakeups += 1;
                self.ready.push(cont);
            }
        }
    }

    /// Pop every timer with `deadline <= now` onto the ready queue.
    fn promote_expired(&mut self, now: Instant) {
        while let Some(entry) = self.timers.pop_expired(now) {
            trace!(sequence = entry.sequence, "timer expired");
            self.stats.timers_fired += 1;
            self.ready.push(entry.cont);
        }
    }

    /// Forget tasks whose only remaining reference is this map.
    fn prune_tasks(&mut self) {
        self.tasks.retain(|_, state| Rc::strong_count(state) > 1);
    }

    fn drain_all(&mut self) -> Vec<Continuation> {
        let mut all = self.ready.drain_all();
        all.extend(self.timers.drain_all());
        all.extend(self.readers.drain().map(|(_, c)| c));
        all.extend(self.writers.drain().map(|(_, c)| c));
        all
    }
}

/// Cloneable reference to a scheduler's queues and registries.
///
/// Continuations receive one so they can submit more work. The scheduler is
/// single-threaded; a `Handle` is neither `Send` nor `Sync`.
#[derive(Clone)]
pub struct Handle {
    core: Rc<RefCell<Core>>,
}

impl Handle {
    fn new(clock: Rc<dyn Clock>) -> Self {
        Self {
            core: Rc::new(RefCell::new(Core {
                ready: ReadyQueue::new(),
                timers: TimerQueue::new(),
                readers: HashMap::new(),
                writers: HashMap::new(),
                clock,
                next_task: 0,
                tasks: HashMap::new(),
                stepping: None,
                fault: None,
                stats: RuntimeStats::default(),
            })),
        }
    }

    /// Current monotonic time according to the scheduler's clock.
    pub fn now(&self) -> Instant {
        self.core.borrow().clock.now()
    }

    /// Queue `f` to run on the next drain, after everything already queued.
    pub fn submit_now<F>(&self, f: F)
    where
        F: FnOnce(&Handle) -> Result<(), RuntimeError> + 'static,
    {
        self.submit_continuation(Box::new(f));
    }

    pub(crate) fn submit_continuation(&self, cont: Continuation) {
        self.core.borrow_mut().ready.push(cont);
    }

    /// Queue `f` to become ready once `delay` has elapsed.
    ///
    /// A zero delay still waits for the next pass through the timer phase.
    pub fn submit_after<F>(&self, delay: Duration, f: F)
    where
        F: FnOnce(&Handle) -> Result<(), RuntimeError> + 'static,
    {
        self.submit_timer(delay, Box::new(f));
    }

    pub(crate) fn submit_timer(&self, delay: Duration, cont: Continuation) {
        let mut core = self.core.borrow_mut();
        let now = core.clock.now();
        let deadline = now.checked_add(delay).unwrap_or_else(|| now + FAR_FUTURE);
        let sequence = core.timers.push(deadline, cont);
        trace!(sequence, ?delay, "timer scheduled");
    }

    /// Make `f` the continuation run when `fd` becomes readable.
    ///
    /// Replaces any reader already waiting on `fd`; the replaced one is
    /// dropped without running.
    pub fn wait_readable<F>(&self, fd: RawFd, f: F)
    where
        F: FnOnce(&Handle) -> Result<(), RuntimeError> + 'static,
    {
        self.register(fd, Interest::Readable, Box::new(f));
    }

    /// Make `f` the continuation run when `fd` becomes writable.
    ///
    /// Replaces any writer already waiting on `fd`.
    pub fn wait_writable<F>(&self, fd: RawFd, f: F)
    where
        F: FnOnce(&Handle) -> Result<(), RuntimeError> + 'static,
    {
        self.register(fd, Interest::Writable, Box::new(f));
    }

    pub(crate) fn register(&self, fd: RawFd, interest: Interest, cont: Continuation) {
        let replaced = self.core.borrow_mut().registry(interest).insert(fd, cont);
        if replaced.is_some() {
            debug!(fd, ?interest, "replaced pending waiter");
        }
        // Dropped outside the borrow: it may own a task whose drop code
        // touches the scheduler.
        drop(replaced);
    }

    /// Wrap a computation in a task and queue its first step.
    ///
    /// `f` receives the task's [`TaskContext`] and returns the future to run.
    /// The task is fire-and-forget: an `Ok` result is discarded, an `Err`
    /// stops [`Scheduler::run`].
    pub fn new_task<F, Fut, E>(&self, f: F) -> TaskId
    where
        F: FnOnce(TaskContext) -> Fut,
        Fut: Future<Output = Result<(), E>> + 'static,
        E: Into<BoxError>,
    {
        let id = {
            let mut core = self.core.borrow_mut();
            core.next_task += 1;
            core.stats.tasks_spawned += 1;
            TaskId(core.next_task)
        };
        let task = Task::new(id, self.clone(), f);
        self.core.borrow_mut().tasks.insert(id, task.state_cell());
        trace!(task = %id, "task spawned");
        self.submit_continuation(task.resume());
        id
    }

    /// True when nothing is ready, no timer is pending and nobody waits on
    /// any handle.
    pub fn is_quiescent(&self) -> bool {
        self.core.borrow().is_quiescent()
    }

    pub fn stats(&self) -> RuntimeStats {
        self.core.borrow().stats
    }

    /// Number of continuations in (ready, timers, readers, writers).
    pub fn pending(&self) -> (usize, usize, usize, usize) {
        let core = self.core.borrow();
        (
            core.ready.len(),
            core.timers.len(),
            core.readers.len(),
            core.writers.len(),
        )
    }

    /// Lifecycle state of a task.
    ///
    /// Finished or abandoned tasks keep reporting their last state until
    /// the next blocking wait, after which their id is unknown (`None`).
    pub fn task_state(&self, id: TaskId) -> Option<TaskState> {
        self.core.borrow().tasks.get(&id).map(|state| state.get())
    }

    pub(crate) fn enter_step(&self, id: TaskId) {
        let mut core = self.core.borrow_mut();
        core.stepping = Some(id);
        core.stats.steps += 1;
    }

    /// End the current step, returning any fault raised during it.
    pub(crate) fn leave_step(&self) -> Option<RuntimeError> {
        let mut core = self.core.borrow_mut();
        core.stepping = None;
        core.fault.take()
    }

    pub(crate) fn stepping(&self) -> Option<TaskId> {
        self.core.borrow().stepping
    }

    /// Record a fatal error from inside a step. The first one wins.
    pub(crate) fn raise(&self, err: RuntimeError) {
        let mut core = self.core.borrow_mut();
        if core.fault.is_none() {
            core.fault = Some(err);
        }
    }

    pub(crate) fn record_completion(&self) {
        self.core.borrow_mut().stats.tasks_completed += 1;
    }

    fn pop_ready(&self) -> Option<Continuation> {
        self.core.borrow_mut().ready.pop()
    }
}

/// The event loop. Create one, add tasks, then [`run`](Scheduler::run).
pub struct Scheduler {
    handle: Handle,
    mux: Box<dyn Multiplexer>,
}

impl Scheduler {
    /// `poll(2)` backend and the monotonic clock.
    pub fn new() -> Self {
        Self::with_parts(Rc::new(MonotonicClock), Box::new(PollMultiplexer::new()))
    }

    /// Build a scheduler from a clock and a multiplexer.
    pub fn with_parts(clock: Rc<dyn Clock>, mux: Box<dyn Multiplexer>) -> Self {
        Self {
            handle: Handle::new(clock),
            mux,
        }
    }

    /// Build a scheduler with the backend named in `config`.
    pub fn from_config(config: &RuntimeConfig) -> Result<Self, RuntimeError> {
        let mux = poller::from_backend(config.backend, config.max_events)?;
        debug!(backend = %config.backend, "scheduler created");
        Ok(Self::with_parts(Rc::new(MonotonicClock), mux))
    }

    pub fn handle(&self) -> &Handle {
        &self.handle
    }

    pub fn submit_now<F>(&self, f: F)
    where
        F: FnOnce(&Handle) -> Result<(), RuntimeError> + 'static,
    {
        self.handle.submit_now(f);
    }

    pub fn submit_after<F>(&self, delay: Duration, f: F)
    where
        F: FnOnce(&Handle) -> Result<(), RuntimeError> + 'static,
    {
        self.handle.submit_after(delay, f);
    }

    pub fn wait_readable<F>(&self, fd: RawFd, f: F)
    where
        F: FnOnce(&Handle) -> Result<(), RuntimeError> + 'static,
    {
        self.handle.wait_readable(fd, f);
    }

    pub fn wait_writable<F>(&self, fd: RawFd, f: F)
    where
        F: FnOnce(&Handle) -> Result<(), RuntimeError> + 'static,
    {
        self.handle.wait_writable(fd, f);
    }

    pub fn new_task<F, Fut, E>(&self, f: F) -> TaskId
    where
        F: FnOnce(TaskContext) -> Fut,
        Fut: Future<Output = Result<(), E>> + 'static,
        E: Into<BoxError>,
    {
        self.handle.new_task(f)
    }

    pub fn is_quiescent(&self) -> bool {
        self.handle.is_quiescent()
    }

    pub fn stats(&self) -> RuntimeStats {
        self.handle.stats()
    }

    pub fn task_state(&self, id: TaskId) -> Option<TaskState> {
        self.handle.task_state(id)
    }

    /// Run until quiescent.
    pub fn run(&mut self) -> Result<(), RuntimeError> {
        debug!("scheduler running");
        while !self.handle.is_quiescent() {
            self.handle.core.borrow_mut().stats.iterations += 1;

            if self.handle.core.borrow().ready.is_empty() {
                self.wait_for_events()?;
            }

            while let Some(cont) = self.handle.pop_ready() {
                cont(&self.handle)?;
            }
        }
        let stats = self.handle.stats();
        debug!(?stats, "scheduler quiescent");
        Ok(())
    }

    /// Block for readiness or the next deadline, then promote what is due.
    fn wait_for_events(&mut self) -> Result<(), RuntimeError> {
        let (readable, writable, timeout) = {
            let mut core = self.handle.core.borrow_mut();
            core.prune_tasks();
            let now = core.clock.now();
            (
                core.readers.keys().copied().collect::<Vec<_>>(),
                core.writers.keys().copied().collect::<Vec<_>>(),
                core.poll_timeout(now),
            )
        };

        trace!(
            readers = readable.len(),
            writers = writable.len(),
            ?timeout,
            "waiting for events"
        );
        let readiness = self.mux.wait(&readable, &writable, timeout)?;

        let mut core = self.handle.core.borrow_mut();
        // Readiness first, then timers.
        core.promote_ready(readiness);
        let now = core.clock.now();
        core.promote_expired(now);
        Ok(())
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        // Pending continuations can own tasks that hold handles back to
        // this core. Drop them outside the borrow to break the cycle.
        let leftover = self.handle.core.borrow_mut().drain_all();
        if !leftover.is_empty() {
            warn!(pending = leftover.len(), "scheduler dropped with pending work");
        }
        drop(leftover);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    /// Multiplexer that never reports readiness and jumps the manual clock
    /// forward by whatever timeout it is given.
    struct SkipAhead {
        clock: Rc<ManualClock>,
        calls: Rc<RefCell<Vec<Option<Duration>>>>,
    }

    impl Multiplexer for SkipAhead {
        fn wait(
            &mut self,
            _readable: &[RawFd],
            _writable: &[RawFd],
            timeout: Option<Duration>,
        ) -> Result<Readiness, RuntimeError> {
            self.calls.borrow_mut().push(timeout);
            let Some(t) = timeout else {
                panic!("test multiplexer asked to block forever");
            };
            self.clock.advance(t);
            Ok(Readiness::default())
        }
    }

    fn manual() -> (Scheduler, Rc<ManualClock>, Rc<RefCell<Vec<Option<Duration>>>>) {
        let clock = Rc::new(ManualClock::new());
        let calls = Rc::new(RefCell::new(Vec::new()));
        let mux = SkipAhead {
            clock: clock.clone(),
            calls: calls.clone(),
        };
        (Scheduler::with_parts(clock.clone(), Box::new(mux)), clock, calls)
    }

    fn recorder() -> Rc<RefCell<Vec<&'static str>>> {
        Rc::new(RefCell::new(Vec::new()))
    }

    fn push(log: &Rc<RefCell<Vec<&'static str>>>, name: &'static str) -> impl FnOnce(&Handle) -> Result<(), RuntimeError> {
        let log = log.clone();
        move |_| {
            log.borrow_mut().push(name);
            Ok(())
        }
    }

    #[test]
    fn fresh_scheduler_is_quiescent() {
        let mut sched = Scheduler::new();
        assert!(sched.is_quiescent());
        sched.run().unwrap();
        assert_eq!(sched.stats().iterations, 0);
    }

    #[test]
    fn any_pending_structure_blocks_quiescence() {
        let timer_only = Scheduler::new();
        timer_only.submit_after(Duration::from_secs(1), |_| Ok(()));
        assert_eq!(timer_only.handle().pending(), (0, 1, 0, 0));
        assert!(!timer_only.is_quiescent());

        let reader_only = Scheduler::new();
        reader_only.wait_readable(0, |_| Ok(()));
        assert_eq!(reader_only.handle().pending(), (0, 0, 1, 0));
        assert!(!reader_only.is_quiescent());

        let writer_only = Scheduler::new();
        writer_only.wait_writable(1, |_| Ok(()));
        assert_eq!(writer_only.handle().pending(), (0, 0, 0, 1));
        assert!(!writer_only.is_quiescent());
    }

    #[test]
    fn submit_now_runs_in_submission_order() {
        let (mut sched, _, calls) = manual();
        let log = recorder();
        for name in ["a", "b", "c", "d"] {
            sched.submit_now(push(&log, name));
        }
        assert!(!sched.is_quiescent());
        sched.run().unwrap();
        assert_eq!(*log.borrow(), vec!["a", "b", "c", "d"]);
        // Ready work never touches the multiplexer.
        assert!(calls.borrow().is_empty());
        assert!(sched.is_quiescent());
    }

    #[test]
    fn work_queued_during_drain_runs_in_same_drain() {
        let (mut sched, _, calls) = manual();
        let log = recorder();
        let inner = push(&log, "inner");
        let outer_log = log.clone();
        sched.submit_now(move |h| {
            outer_log.borrow_mut().push("outer");
            h.submit_now(inner);
            Ok(())
        });
        sched.submit_now(push(&log, "second"));
        sched.run().unwrap();
        assert_eq!(*log.borrow(), vec!["outer", "second", "inner"]);
        assert!(calls.borrow().is_empty());
        assert_eq!(sched.stats().iterations, 1);
    }

    #[test]
    fn shorter_delay_fires_first() {
        let (mut sched, _, _) = manual();
        let log = recorder();
        sched.submit_after(Duration::from_millis(20), push(&log, "d2"));
        sched.submit_after(Duration::from_millis(10), push(&log, "d1"));
        sched.run().unwrap();
        assert_eq!(*log.borrow(), vec!["d1", "d2"]);
    }

    #[test]
    fn equal_deadlines_fire_in_submission_order() {
        let (mut sched, _, _) = manual();
        let log = recorder();
        sched.submit_after(Duration::from_millis(5), push(&log, "A"));
        sched.submit_after(Duration::from_millis(5), push(&log, "B"));
        sched.submit_after(Duration::from_millis(5), push(&log, "C"));
        sched.run().unwrap();
        assert_eq!(*log.borrow(), vec!["A", "B", "C"]);
    }

    #[test]
    fn zero_delay_waits_for_one_timer_pass() {
        let (mut sched, _, calls) = manual();
        let log = recorder();
        sched.submit_after(Duration::ZERO, push(&log, "timer"));
        sched.submit_now(push(&log, "now"));
        sched.run().unwrap();
        assert_eq!(*log.borrow(), vec!["now", "timer"]);
        assert_eq!(*calls.borrow(), vec![Some(Duration::ZERO)]);
    }

    #[test]
    fn timeout_is_time_until_nearest_deadline() {
        let (mut sched, clock, calls) = manual();
        let start = clock.now();
        let seen = Rc::new(RefCell::new(Vec::new()));
        for ms in [30u64, 10] {
            let seen = seen.clone();
            sched.submit_after(Duration::from_millis(ms), move |h| {
                seen.borrow_mut().push(h.now() - start);
                Ok(())
            });
        }
        sched.run().unwrap();
        assert_eq!(
            *calls.borrow(),
            vec![Some(Duration::from_millis(10)), Some(Duration::from_millis(20))]
        );
        assert_eq!(
            *seen.borrow(),
            vec![Duration::from_millis(10), Duration::from_millis(30)]
        );
    }

    #[test]
    fn stats_count_timers_and_iterations() {
        let (mut sched, _, _) = manual();
        sched.submit_after(Duration::from_millis(1), |_| Ok(()));
        sched.submit_after(Duration::from_millis(2), |_| Ok(()));
        sched.run().unwrap();
        let stats = sched.stats();
        assert_eq!(stats.timers_fired, 2);
        assert_eq!(stats.iterations, 2);
    }

    #[test]
    fn continuation_error_stops_the_loop() {
        let (mut sched, _, _) = manual();
        let log = recorder();
        sched.submit_now(|_| Err(RuntimeError::StaleHandle { fd: 42 }));
        sched.submit_now(push(&log, "never"));
        let err = sched.run().unwrap_err();
        assert!(matches!(err, RuntimeError::StaleHandle { fd: 42 }));
        assert!(log.borrow().is_empty());
        assert!(!sched.is_quiescent());
    }

    #[test]
    fn second_reader_replaces_first() {
        let (sched, _, _) = manual();
        let log = recorder();
        sched.wait_readable(3, push(&log, "r1"));
        sched.wait_readable(3, push(&log, "r2"));
        sched.wait_writable(3, push(&log, "w"));
        assert_eq!(sched.handle().pending(), (0, 0, 1, 1));
    }

    #[test]
    fn dropping_with_pending_work_releases_tasks() {
        let (sched, _, _) = manual();
        let marker = Rc::new(());
        let held = marker.clone();
        sched.new_task(move |cx| async move {
            let _held = held;
            cx.sleep(Duration::from_secs(60)).await;
            Ok::<(), BoxError>(())
        });
        assert_eq!(Rc::strong_count(&marker), 2);
        drop(sched);
        assert_eq!(Rc::strong_count(&marker), 1);
    }
}
