//! Delay-based scheduling behind a small capability trait.
//!
//! Every long-lived asynchronous operation in the core (escalation steps, sound
//! fades and completions, the arming countdown) goes through [`Scheduler`].
//! [`TokioScheduler`] runs tasks on a tokio runtime in real time,
//! [`ManualScheduler`] is a virtual clock that only moves when told to.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::runtime::Handle;
use tokio::time::Instant;

/// A unit of deferred work.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

const PENDING: u8 = 0;
const FIRED: u8 = 1;
const CANCELLED: u8 = 2;

/// Handle to a scheduled task.
///
/// Firing and cancelling race on a single atomic slot, so a task runs at most
/// once and never after `cancel()` has returned.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    slot: Arc<AtomicU8>,
}

impl CancelHandle {
    fn new() -> Self {
        Self {
            slot: Arc::new(AtomicU8::new(PENDING)),
        }
    }

    /// Cancel the task. Returns true if this call stopped it from running.
    /// Calling it again, or after the task fired, is a no-op.
    pub fn cancel(&self) -> bool {
        self.slot
            .compare_exchange(PENDING, CANCELLED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// True while the task has neither fired nor been cancelled.
    pub fn is_pending(&self) -> bool {
        self.slot.load(Ordering::Acquire) == PENDING
    }

    fn try_fire(&self) -> bool {
        self.slot
            .compare_exchange(PENDING, FIRED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

/// Clock plus delayed execution.
pub trait Scheduler: Send + Sync {
    /// Monotonic time since the scheduler was created.
    fn now(&self) -> Duration;

    /// Wall-clock time, used for alert and frame timestamps.
    fn timestamp(&self) -> DateTime<Utc> {
        Utc::now()
    }

    /// Run `task` once after `delay` unless the returned handle is cancelled first.
    fn schedule(&self, delay: Duration, task: Task) -> CancelHandle;
}

/// Real-time scheduler backed by a tokio runtime.
pub struct TokioScheduler {
    handle: Handle,
    origin: Instant,
}

impl TokioScheduler {
    pub fn new(handle: Handle) -> Self {
        Self {
            handle,
            origin: Instant::now(),
        }
    }

    /// Build a scheduler on the runtime the caller is running in, if any.
    pub fn current() -> Option<Self> {
        Handle::try_current().ok().map(Self::new)
    }
}

impl Scheduler for TokioScheduler {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }

    fn schedule(&self, delay: Duration, task: Task) -> CancelHandle {
        let cancel = CancelHandle::new();
        let slot = cancel.clone();
        self.handle.spawn(async move {
            tokio::time::sleep(delay).await;
            if slot.try_fire() {
                task();
            }
        });
        cancel
    }
}

struct QueuedTask {
    cancel: CancelHandle,
    task: Task,
}

#[derive(Default)]
struct ManualState {
    now: Duration,
    seq: u64,
    queue: BTreeMap<(Duration, u64), QueuedTask>,
}

/// Virtual clock for deterministic tests and simulations.
///
/// Tasks only run inside [`ManualScheduler::advance`], in due-time order, on
/// the caller's thread. Tasks scheduled by other tasks run in the same call if
/// they fall due before the target time.
pub struct ManualScheduler {
    epoch: DateTime<Utc>,
    state: Mutex<ManualState>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::with_epoch(Utc::now())
    }

    pub fn with_epoch(epoch: DateTime<Utc>) -> Self {
        Self {
            epoch,
            state: Mutex::new(ManualState::default()),
        }
    }

    /// Move the clock forward, running every task that falls due on the way.
    pub fn advance(&self, by: Duration) {
        let target = self.lock().now + by;
        loop {
            let next = {
                let mut state = self.lock();
                let first = state.queue.keys().next().copied();
                let due = match first {
                    Some(key) if key.0 <= target => key,
                    _ => {
                        state.now = target;
                        break;
                    }
                };
                if due.0 > state.now {
                    state.now = due.0;
                }
                state.queue.remove(&due)
            };
            // Run outside the lock: tasks reschedule through `schedule`.
            if let Some(queued) = next {
                if queued.cancel.try_fire() {
                    (queued.task)();
                }
            }
        }
    }

    /// Tasks still waiting (including cancelled ones not yet reached).
    pub fn pending_tasks(&self) -> usize {
        self.lock()
            .queue
            .values()
            .filter(|queued| queued.cancel.is_pending())
            .count()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ManualState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for ManualScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler for ManualScheduler {
    fn now(&self) -> Duration {
        self.lock().now
    }

    fn timestamp(&self) -> DateTime<Utc> {
        let now = self.now();
        self.epoch + chrono::Duration::from_std(now).unwrap_or_else(|_| chrono::Duration::zero())
    }

    fn schedule(&self, delay: Duration, task: Task) -> CancelHandle {
        let cancel = CancelHandle::new();
        let mut state = self.lock();
        let due = state.now + delay;
        let seq = state.seq;
        state.seq += 1;
        state.queue.insert(
            (due, seq),
            QueuedTask {
                cancel: cancel.clone(),
                task,
            },
        );
        cancel
    }
}
