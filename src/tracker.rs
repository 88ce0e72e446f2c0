//! # Task Tracker
//!
//! Per-slot scheduling record: the task reference, its period, the
//! last-run anchor and the enabled flag, plus the firing decision itself.
//!
//! ## Timing policy
//!
//! `run_if_due` fires a task iff `period == 0` or `elapsed > period`
//! (wrapping arithmetic, so a 2³²-ms clock rollover is transparent). The
//! strict `>` gives every firing a *late bias*: a task never runs earlier
//! than its nominal period, and lands in `(period, period + loop_jitter]`.
//!
//! After a firing the anchor normally advances by exactly one period,
//! preserving the task's phase. If the firing was more than one full
//! period late (a long-running neighbor stalled the loop), the anchor
//! resynchronizes to `now` instead — one catch-up run, then back on
//! cadence. The scheduler never bursts N missed firings.
//!
//! ## Concurrency
//!
//! `period_ms` and `enabled` are written from ISR context. Single-field
//! accesses are word atomics; pair reads and transition-sensitive writes
//! take the critical section so an ISR sees either the pre- or
//! post-mutation snapshot, never a torn one. The task callback always runs
//! outside the guard.

use core::cell::Cell;
use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use crate::sync::{critical_section, Mutex};
use crate::task::Task;

/// Tracks and manages the execution of a single task.
pub struct TaskTracker<'a> {
    /// The tracked task; `None` while the slot is vacant.
    task: Mutex<Cell<Option<&'a dyn Task>>>,

    /// Minimum milliseconds between consecutive runs. `0` runs on every
    /// dispatcher pass; `u32::MAX` effectively never fires.
    period_ms: AtomicU32,

    /// Millisecond timestamp anchoring the next firing decision.
    last_run_ms: AtomicU32,

    /// Whether the slot takes part in dispatch and deadline computation.
    enabled: AtomicBool,
}

impl<'a> TaskTracker<'a> {
    /// A vacant tracker. Used to seed the registry's fixed table.
    pub const EMPTY: Self = Self::new();

    pub const fn new() -> Self {
        Self {
            task: Mutex::new(Cell::new(None)),
            period_ms: AtomicU32::new(0),
            last_run_ms: AtomicU32::new(0),
            enabled: AtomicBool::new(false),
        }
    }

    /// Install `task` and reset the scheduling state. The anchor starts at
    /// `now` when enabled, so the first firing honors the full period.
    pub(crate) fn bind(&self, task: &'a dyn Task, now: u32, period_ms: u32, enabled: bool) {
        critical_section(|cs| {
            self.task.borrow(cs).set(Some(task));
            self.period_ms.store(period_ms, Ordering::Relaxed);
            self.last_run_ms
                .store(if enabled { now } else { 0 }, Ordering::Relaxed);
            self.enabled.store(enabled, Ordering::Relaxed);
        });
    }

    /// Vacate the slot.
    pub(crate) fn clear(&self) {
        critical_section(|cs| {
            self.task.borrow(cs).set(None);
            self.period_ms.store(0, Ordering::Relaxed);
            self.last_run_ms.store(0, Ordering::Relaxed);
            self.enabled.store(false, Ordering::Relaxed);
        });
    }

    /// Take over `src`'s state. Used when a detach shifts the suffix left.
    pub(crate) fn adopt(&self, src: &TaskTracker<'a>) {
        critical_section(|cs| {
            self.task.borrow(cs).set(src.task.borrow(cs).get());
            self.period_ms
                .store(src.period_ms.load(Ordering::Relaxed), Ordering::Relaxed);
            self.last_run_ms
                .store(src.last_run_ms.load(Ordering::Relaxed), Ordering::Relaxed);
            self.enabled
                .store(src.enabled.load(Ordering::Relaxed), Ordering::Relaxed);
        });
    }

    /// Run the task if it is enabled and due at `now`.
    ///
    /// Returns whether the task ran. The `(enabled, period, task)` triple
    /// is snapshotted under the guard; the callback runs outside it.
    pub(crate) fn run_if_due(&self, now: u32) -> bool {
        let due = critical_section(|cs| {
            if !self.enabled.load(Ordering::Relaxed) {
                return None;
            }
            self.task
                .borrow(cs)
                .get()
                .map(|task| (task, self.period_ms.load(Ordering::Relaxed)))
        });
        let Some((task, period)) = due else {
            return false;
        };

        let last_run = self.last_run_ms.load(Ordering::Relaxed);
        let elapsed = now.wrapping_sub(last_run);
        if period != 0 && elapsed <= period {
            return false;
        }

        task.run();

        if period > 1 && u64::from(elapsed) > 2 * u64::from(period) {
            // Missed more than one full period: resynchronize instead of
            // bursting the backlog.
            self.last_run_ms.store(now, Ordering::Relaxed);
        } else {
            self.last_run_ms
                .store(last_run.wrapping_add(period), Ordering::Relaxed);
        }
        true
    }

    /// Milliseconds until this slot is next due at `now`.
    /// `u32::MAX` when disabled or vacant; `0` when due immediately.
    pub fn time_until_next_run(&self, now: u32) -> u32 {
        let (enabled, period, last_run) = critical_section(|cs| {
            (
                self.enabled.load(Ordering::Relaxed) && self.task.borrow(cs).get().is_some(),
                self.period_ms.load(Ordering::Relaxed),
                self.last_run_ms.load(Ordering::Relaxed),
            )
        });

        if !enabled {
            u32::MAX
        } else if period == 0 {
            0
        } else {
            let elapsed = now.wrapping_sub(last_run);
            if elapsed >= period {
                0
            } else {
                period - elapsed
            }
        }
    }

    pub(crate) fn set_period(&self, period_ms: u32) {
        self.period_ms.store(period_ms, Ordering::Relaxed);
    }

    /// Enable or disable the slot. A false→true transition re-anchors
    /// `last_run` to `now` so the first post-enable firing honors the full
    /// period rather than catching up on a stale anchor.
    pub(crate) fn set_enabled(&self, enabled: bool, now: u32) {
        critical_section(|_cs| {
            if enabled && !self.enabled.load(Ordering::Relaxed) {
                self.last_run_ms.store(now, Ordering::Relaxed);
            }
            self.enabled.store(enabled, Ordering::Relaxed);
        });
    }

    /// Set period and enabled state as one atomic update.
    pub(crate) fn set_period_and_enabled(&self, period_ms: u32, enabled: bool, now: u32) {
        critical_section(|_cs| {
            self.period_ms.store(period_ms, Ordering::Relaxed);
            if enabled && !self.enabled.load(Ordering::Relaxed) {
                self.last_run_ms.store(now, Ordering::Relaxed);
            }
            self.enabled.store(enabled, Ordering::Relaxed);
        });
    }

    /// ISR fast path: `period = 0, enabled = true` in one guarded update.
    /// The next dispatcher pass runs the task unconditionally.
    pub(crate) fn wake(&self) {
        critical_section(|_cs| {
            self.period_ms.store(0, Ordering::Relaxed);
            self.enabled.store(true, Ordering::Relaxed);
        });
    }

    /// Roll the anchor back by `offset` ms, compensating for a deep-sleep
    /// interval that bypassed the millisecond clock.
    pub(crate) fn rollback(&self, offset_ms: u32) {
        critical_section(|_cs| {
            let last_run = self.last_run_ms.load(Ordering::Relaxed);
            self.last_run_ms
                .store(last_run.wrapping_sub(offset_ms), Ordering::Relaxed);
        });
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    pub fn period(&self) -> u32 {
        self.period_ms.load(Ordering::Relaxed)
    }

    pub(crate) fn task(&self) -> Option<&'a dyn Task> {
        critical_section(|cs| self.task.borrow(cs).get())
    }

    #[cfg(test)]
    pub(crate) fn last_run(&self) -> u32 {
        self.last_run_ms.load(Ordering::Relaxed)
    }
}

impl Default for TaskTracker<'_> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct CountingTask(AtomicU32);

    impl CountingTask {
        const fn new() -> Self {
            Self(AtomicU32::new(0))
        }

        fn runs(&self) -> u32 {
            self.0.load(Ordering::Relaxed)
        }
    }

    impl Task for CountingTask {
        fn run(&self) {
            self.0.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[test]
    fn test_vacant_tracker_never_runs() {
        let tracker = TaskTracker::new();
        assert!(!tracker.run_if_due(0));
        assert_eq!(tracker.time_until_next_run(0), u32::MAX);
    }

    #[test]
    fn test_strict_late_bias() {
        let task = CountingTask::new();
        let tracker = TaskTracker::new();
        tracker.bind(&task, 0, 10, true);

        // Exactly one period elapsed: not yet due.
        assert!(!tracker.run_if_due(10));
        assert_eq!(task.runs(), 0);

        // One past the period: fires.
        assert!(tracker.run_if_due(11));
        assert_eq!(task.runs(), 1);
    }

    #[test]
    fn test_period_zero_fires_every_pass() {
        let task = CountingTask::new();
        let tracker = TaskTracker::new();
        tracker.bind(&task, 0, 0, true);

        assert!(tracker.run_if_due(0));
        assert!(tracker.run_if_due(0));
        assert_eq!(task.runs(), 2);
    }

    #[test]
    fn test_disabled_never_fires() {
        let task = CountingTask::new();
        let tracker = TaskTracker::new();
        tracker.bind(&task, 0, 0, false);

        assert!(!tracker.run_if_due(1000));
        assert_eq!(task.runs(), 0);
    }

    #[test]
    fn test_phase_preserving_anchor() {
        let task = CountingTask::new();
        let tracker = TaskTracker::new();
        tracker.bind(&task, 0, 10, true);

        // Fires one ms late; the anchor still advances by exactly one
        // period, keeping the original phase.
        assert!(tracker.run_if_due(11));
        assert_eq!(tracker.last_run(), 10);

        assert!(!tracker.run_if_due(20));
        assert!(tracker.run_if_due(21));
        assert_eq!(tracker.last_run(), 20);
    }

    #[test]
    fn test_resync_after_missing_more_than_one_period() {
        let task = CountingTask::new();
        let tracker = TaskTracker::new();
        tracker.bind(&task, 0, 10, true);

        // 31 ms late on a 10 ms period: elapsed > 2·period, so the anchor
        // snaps to now instead of bursting the backlog.
        assert!(tracker.run_if_due(31));
        assert_eq!(tracker.last_run(), 31);

        assert!(!tracker.run_if_due(41));
        assert!(tracker.run_if_due(42));
    }

    #[test]
    fn test_exactly_two_periods_late_keeps_phase() {
        let task = CountingTask::new();
        let tracker = TaskTracker::new();
        tracker.bind(&task, 0, 10, true);

        // elapsed == 2·period is the boundary: still phase-preserving.
        assert!(tracker.run_if_due(20));
        assert_eq!(tracker.last_run(), 10);
    }

    #[test]
    fn test_enable_resets_anchor() {
        let task = CountingTask::new();
        let tracker = TaskTracker::new();
        tracker.bind(&task, 0, 10, false);

        tracker.set_enabled(true, 100);
        assert_eq!(tracker.last_run(), 100);

        assert!(!tracker.run_if_due(110));
        assert!(tracker.run_if_due(111));
    }

    #[test]
    fn test_redundant_enable_keeps_anchor() {
        let task = CountingTask::new();
        let tracker = TaskTracker::new();
        tracker.bind(&task, 0, 10, true);

        tracker.set_enabled(true, 500);
        assert_eq!(tracker.last_run(), 0);
    }

    #[test]
    fn test_wake_overrides_period_and_enabled() {
        let task = CountingTask::new();
        let tracker = TaskTracker::new();
        tracker.bind(&task, 0, 12_345_679, false);

        tracker.wake();
        assert!(tracker.is_enabled());
        assert_eq!(tracker.period(), 0);
        assert!(tracker.run_if_due(0));
    }

    #[test]
    fn test_time_until_next_run() {
        let task = CountingTask::new();
        let tracker = TaskTracker::new();
        tracker.bind(&task, 0, 100, true);

        assert_eq!(tracker.time_until_next_run(0), 100);
        assert_eq!(tracker.time_until_next_run(60), 40);
        assert_eq!(tracker.time_until_next_run(100), 0);
        assert_eq!(tracker.time_until_next_run(250), 0);

        tracker.set_enabled(false, 250);
        assert_eq!(tracker.time_until_next_run(250), u32::MAX);

        tracker.set_period_and_enabled(0, true, 300);
        assert_eq!(tracker.time_until_next_run(300), 0);
    }

    #[test]
    fn test_clock_wraparound() {
        let task = CountingTask::new();
        let tracker = TaskTracker::new();
        let start = u32::MAX - 5;
        tracker.bind(&task, start, 10, true);

        // Clock wraps between the anchor and now.
        assert!(!tracker.run_if_due(4)); // elapsed == 10
        assert!(tracker.run_if_due(5)); // elapsed == 11
        assert_eq!(tracker.last_run(), start.wrapping_add(10));
    }

    #[test]
    fn test_rollback_shifts_anchor() {
        let task = CountingTask::new();
        let tracker = TaskTracker::new();
        tracker.bind(&task, 1000, 100, true);

        tracker.rollback(50);
        assert_eq!(tracker.last_run(), 950);
        assert_eq!(tracker.time_until_next_run(1000), 50);
    }
}
