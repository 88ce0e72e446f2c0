//! # Task Registry
//!
//! Fixed-capacity table of [`TaskTracker`]s with dynamic registration and
//! management of cooperative tasks.
//!
//! Occupied slots always form the contiguous prefix `[0, n)`; a task's id
//! is its slot index. Detaching shifts the suffix left and renotifies
//! every moved task of its new id, so a task always knows its current id
//! without asking the registry.
//!
//! Every mutation asserts the `hot` flag so the dispatcher knows sleeping
//! is unsafe until it has re-examined the table, and signals the platform
//! wake object (where one exists) to break an in-progress idle sleep.
//!
//! `attach`/`detach`/`clear` must run from cooperative context. All other
//! operations are ISR-safe.

use core::ptr;
use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crate::config::MAX_TASK_CAPACITY;
use crate::platform::Platform;
use crate::task::{Task, TaskId};
use crate::tracker::TaskTracker;

/// Why an attach was rejected.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AttachError {
    /// All `N` slots are occupied.
    Capacity,
    /// The task is already registered.
    Duplicate,
}

/// Object-safe registry surface consumed by task handles.
///
/// [`TaskRegistry`] is generic over platform and capacity; tasks hold a
/// `&dyn Schedule` back-reference instead so those parameters do not leak
/// into every task type.
pub trait Schedule<'a>: Sync {
    /// Register a task. Rejects duplicates and over-capacity attaches.
    /// Not ISR-safe.
    fn attach(
        &self,
        task: &'a dyn Task,
        period_ms: u32,
        enabled: bool,
    ) -> Result<TaskId, AttachError>;

    /// Remove the task at `id`, notify it with [`TaskId::INVALID`], shift
    /// the suffix left and renotify every moved task. Returns false for
    /// unknown ids (idempotent). Not ISR-safe.
    fn detach(&self, id: TaskId) -> bool;

    /// [`Schedule::detach`] by task reference.
    fn detach_task(&self, task: &dyn Task) -> bool;

    /// Detach every task, notifying each with [`TaskId::INVALID`].
    /// Not ISR-safe.
    fn clear(&self);

    /// The id currently assigned to `task`, if registered. ISR-safe.
    fn task_id_of(&self, task: &dyn Task) -> Option<TaskId>;

    /// Whether `task` is registered. ISR-safe.
    fn contains(&self, task: &dyn Task) -> bool;

    /// Whether the slot at `id` is enabled. False for invalid ids.
    /// ISR-safe.
    fn is_enabled(&self, id: TaskId) -> bool;

    /// The period of the slot at `id`; `0` for invalid ids. ISR-safe.
    fn period(&self, id: TaskId) -> u32;

    /// Set a task's run period. Silent no-op on invalid ids. ISR-safe.
    fn set_period(&self, id: TaskId, period_ms: u32);

    /// Enable or disable a task. Enabling a disabled task re-anchors its
    /// phase to now. Silent no-op on invalid ids. ISR-safe.
    fn set_enabled(&self, id: TaskId, enabled: bool);

    /// Set period and enabled state as one atomic update. Silent no-op on
    /// invalid ids. ISR-safe.
    fn set_period_and_enabled(&self, id: TaskId, period_ms: u32, enabled: bool);

    /// Make the task runnable immediately and wake the sleeping
    /// dispatcher. The lowest-overhead wake path; intended for ISRs.
    fn wake_from_isr(&self, id: TaskId);

    /// Number of registered tasks.
    fn len(&self) -> usize;

    /// Maximum number of tasks.
    fn capacity(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Statically-sized task registry over platform `P` with capacity `N`.
pub struct TaskRegistry<'a, P: Platform, const N: usize> {
    platform: P,
    trackers: [TaskTracker<'a>; N],
    count: AtomicUsize,
    hot: AtomicBool,
}

impl<'a, P: Platform, const N: usize> TaskRegistry<'a, P, N> {
    /// Build an empty registry. `const`, so registries can live in
    /// `static`s on firmware targets.
    pub const fn new(platform: P) -> Self {
        assert!(N <= MAX_TASK_CAPACITY);
        Self {
            platform,
            trackers: [TaskTracker::EMPTY; N],
            count: AtomicUsize::new(0),
            hot: AtomicBool::new(false),
        }
    }

    pub(crate) fn platform(&self) -> &P {
        &self.platform
    }

    /// Run the task in `slot` if it is due. Sets the hot flag when it
    /// fires. Slots at or past `len()` are vacant and never fire.
    pub(crate) fn run_slot(&self, slot: usize) -> bool {
        if slot >= self.count.load(Ordering::Relaxed) {
            return false;
        }
        let fired = self.trackers[slot].run_if_due(self.platform.now_ms());
        if fired {
            self.hot.store(true, Ordering::Relaxed);
        }
        fired
    }

    pub(crate) fn clear_hot(&self) {
        self.hot.store(false, Ordering::Relaxed);
    }

    pub(crate) fn is_hot(&self) -> bool {
        self.hot.load(Ordering::Relaxed)
    }

    /// Shortest time until any task is due at `now`, exiting early once a
    /// slot reports `early_exit` or less. `u32::MAX` when nothing will
    /// ever fire.
    pub(crate) fn shortest_wait(&self, now: u32, early_exit: u32) -> u32 {
        let mut shortest = u32::MAX;
        for slot in 0..self.count.load(Ordering::Relaxed) {
            let wait = self.trackers[slot].time_until_next_run(now);
            if wait < shortest {
                shortest = wait;
                if shortest <= early_exit {
                    break;
                }
            }
        }
        shortest
    }

    /// Milliseconds until the next scheduled task is due.
    pub fn time_until_next_run(&self) -> u32 {
        self.shortest_wait(self.platform.now_ms(), 0)
    }

    /// Advance the scheduler's notion of time by `offset_ms`, compensating
    /// for a deep-sleep interval that bypassed the millisecond clock.
    ///
    /// Rather than adding a runtime offset to the timestamp source, every
    /// tracker's anchor is rolled back by the offset.
    pub fn advance_timestamp(&self, offset_ms: u32) {
        for slot in 0..self.count.load(Ordering::Relaxed) {
            self.trackers[slot].rollback(offset_ms);
        }
    }

    fn slot_of(&self, task: &dyn Task) -> Option<usize> {
        (0..self.count.load(Ordering::Relaxed)).find(|&slot| {
            self.trackers[slot]
                .task()
                .is_some_and(|t| ptr::addr_eq(t as *const dyn Task, task as *const dyn Task))
        })
    }

    fn valid(&self, id: TaskId) -> bool {
        let valid = !id.is_invalid() && id.index() < self.count.load(Ordering::Relaxed);
        #[cfg(feature = "defmt")]
        if !valid {
            defmt::debug!("[REGISTRY] ignoring op on stale id {}", id);
        }
        valid
    }
}

impl<'a, P: Platform, const N: usize> Schedule<'a> for TaskRegistry<'a, P, N> {
    fn attach(
        &self,
        task: &'a dyn Task,
        period_ms: u32,
        enabled: bool,
    ) -> Result<TaskId, AttachError> {
        let n = self.count.load(Ordering::Relaxed);
        if self.slot_of(task).is_some() {
            return Err(AttachError::Duplicate);
        }
        if n >= N {
            return Err(AttachError::Capacity);
        }

        // Task id is the position in the table.
        let id = TaskId(n as u8);
        self.trackers[n].bind(task, self.platform.now_ms(), period_ms, enabled);
        task.on_task_id_updated(id);
        self.count.store(n + 1, Ordering::Relaxed);
        self.hot.store(true, Ordering::Relaxed);
        self.platform.signal_wake();

        #[cfg(feature = "defmt")]
        defmt::debug!("[ATTACH] {} period: {} enabled: {}", id, period_ms, enabled);
        Ok(id)
    }

    fn detach(&self, id: TaskId) -> bool {
        let n = self.count.load(Ordering::Relaxed);
        if id.is_invalid() || id.index() >= n {
            return false;
        }

        let slot = id.index();
        if let Some(outgoing) = self.trackers[slot].task() {
            outgoing.on_task_id_updated(TaskId::INVALID);
        }

        // Close the gap: shift the suffix one slot left and tell each
        // moved task its new id.
        for from in slot + 1..n {
            self.trackers[from - 1].adopt(&self.trackers[from]);
            if let Some(moved) = self.trackers[from - 1].task() {
                moved.on_task_id_updated(TaskId((from - 1) as u8));
            }
        }
        self.trackers[n - 1].clear();
        self.count.store(n - 1, Ordering::Relaxed);
        self.hot.store(true, Ordering::Relaxed);

        #[cfg(feature = "defmt")]
        defmt::debug!("[DETACH] {}", id);
        true
    }

    fn detach_task(&self, task: &dyn Task) -> bool {
        match self.slot_of(task) {
            Some(slot) => self.detach(TaskId(slot as u8)),
            None => false,
        }
    }

    fn clear(&self) {
        let n = self.count.load(Ordering::Relaxed);
        for slot in 0..n {
            if let Some(task) = self.trackers[slot].task() {
                task.on_task_id_updated(TaskId::INVALID);
            }
            self.trackers[slot].clear();
        }
        self.count.store(0, Ordering::Relaxed);
        self.hot.store(true, Ordering::Relaxed);
    }

    fn task_id_of(&self, task: &dyn Task) -> Option<TaskId> {
        self.slot_of(task).map(|slot| TaskId(slot as u8))
    }

    fn contains(&self, task: &dyn Task) -> bool {
        self.slot_of(task).is_some()
    }

    fn is_enabled(&self, id: TaskId) -> bool {
        !id.is_invalid()
            && id.index() < self.count.load(Ordering::Relaxed)
            && self.trackers[id.index()].is_enabled()
    }

    fn period(&self, id: TaskId) -> u32 {
        if id.is_invalid() || id.index() >= self.count.load(Ordering::Relaxed) {
            return 0;
        }
        self.trackers[id.index()].period()
    }

    fn set_period(&self, id: TaskId, period_ms: u32) {
        if self.valid(id) {
            self.trackers[id.index()].set_period(period_ms);
            self.hot.store(true, Ordering::Relaxed);
        }
    }

    fn set_enabled(&self, id: TaskId, enabled: bool) {
        if self.valid(id) {
            self.trackers[id.index()].set_enabled(enabled, self.platform.now_ms());
            self.hot.store(true, Ordering::Relaxed);
        }
    }

    fn set_period_and_enabled(&self, id: TaskId, period_ms: u32, enabled: bool) {
        if self.valid(id) {
            self.trackers[id.index()].set_period_and_enabled(
                period_ms,
                enabled,
                self.platform.now_ms(),
            );
            self.hot.store(true, Ordering::Relaxed);
        }
    }

    fn wake_from_isr(&self, id: TaskId) {
        if self.valid(id) {
            self.trackers[id.index()].wake();
            self.hot.store(true, Ordering::Relaxed);
            self.platform.signal_wake();
        }
    }

    fn len(&self) -> usize {
        self.count.load(Ordering::Relaxed)
    }

    fn capacity(&self) -> usize {
        N
    }
}
