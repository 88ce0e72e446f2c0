//! # Profiling
//!
//! Compile-time-selected timing measurement for the dispatcher:
//!
//! - [`NoProfiler`] — zero overhead; the dispatcher takes no timestamps.
//! - [`AggregateProfiler`] — per-iteration totals: iteration count,
//!   scheduling time, busy time, idle-sleep time.
//! - [`PerTaskProfiler`] — aggregate totals plus per-task cumulative
//!   duration, worst-case duration and iteration count.
//!
//! Accumulators are written only from the dispatcher's context; a trace
//! snapshot (`take_trace`) reads and zeroes the window under the guard so
//! a trace-log task can consume it from inside the loop. Reading a trace
//! always resets the window.

use core::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

use crate::sync::critical_section;

/// Dispatcher instrumentation hooks.
///
/// `ENABLED` gates the dispatcher's timestamp reads at compile time, so
/// the no-op variant costs nothing per pass.
pub trait Profiler: Sync {
    const ENABLED: bool;

    /// A dispatch pass is starting over `task_count` slots.
    fn pass_begin(&self, task_count: usize);

    /// The task in `slot` fired and ran for `duration_us`.
    fn task_ran(&self, slot: usize, duration_us: u32);

    /// The pass finished; `scheduling_us` spans loop entry to end of
    /// dispatch (sleep excluded).
    fn pass_end(&self, scheduling_us: u32);

    /// The dispatcher slept for `duration_us`.
    fn slept(&self, duration_us: u32);
}

// ---------------------------------------------------------------------------
// No profiling
// ---------------------------------------------------------------------------

/// No measurement; minimum overhead.
pub struct NoProfiler;

impl Profiler for NoProfiler {
    const ENABLED: bool = false;

    fn pass_begin(&self, _task_count: usize) {}
    fn task_ran(&self, _slot: usize, _duration_us: u32) {}
    fn pass_end(&self, _scheduling_us: u32) {}
    fn slept(&self, _duration_us: u32) {}
}

// ---------------------------------------------------------------------------
// Aggregate profiling
// ---------------------------------------------------------------------------

/// Aggregate totals for one measurement window.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SchedulerTrace {
    /// Dispatch passes in the window.
    pub iterations: u32,
    /// Cumulative loop-entry-to-end-of-dispatch time, µs. Includes task
    /// execution; excludes sleep.
    pub scheduling_us: u32,
    /// Cumulative task execution time, µs.
    pub busy_us: u32,
    /// Cumulative idle-sleep time, µs.
    pub idle_sleep_us: u32,
}

/// Coarse-grained profiler: totals across all tasks, O(1) memory.
pub struct AggregateProfiler {
    iterations: AtomicU32,
    scheduling_us: AtomicU32,
    busy_us: AtomicU32,
    idle_sleep_us: AtomicU32,
}

impl AggregateProfiler {
    pub const fn new() -> Self {
        Self {
            iterations: AtomicU32::new(0),
            scheduling_us: AtomicU32::new(0),
            busy_us: AtomicU32::new(0),
            idle_sleep_us: AtomicU32::new(0),
        }
    }

    /// Snapshot and reset the current window.
    ///
    /// Returns `None` when no iterations have occurred since the last
    /// call — there is no data worth reporting.
    pub fn take_trace(&self) -> Option<SchedulerTrace> {
        critical_section(|_cs| {
            let trace = SchedulerTrace {
                iterations: self.iterations.swap(0, Ordering::Relaxed),
                scheduling_us: self.scheduling_us.swap(0, Ordering::Relaxed),
                busy_us: self.busy_us.swap(0, Ordering::Relaxed),
                idle_sleep_us: self.idle_sleep_us.swap(0, Ordering::Relaxed),
            };
            (trace.iterations != 0).then_some(trace)
        })
    }
}

impl Default for AggregateProfiler {
    fn default() -> Self {
        Self::new()
    }
}

impl Profiler for AggregateProfiler {
    const ENABLED: bool = true;

    fn pass_begin(&self, _task_count: usize) {}

    fn task_ran(&self, _slot: usize, duration_us: u32) {
        self.busy_us.fetch_add(duration_us, Ordering::Relaxed);
    }

    fn pass_end(&self, scheduling_us: u32) {
        self.iterations.fetch_add(1, Ordering::Relaxed);
        self.scheduling_us.fetch_add(scheduling_us, Ordering::Relaxed);
    }

    fn slept(&self, duration_us: u32) {
        self.idle_sleep_us.fetch_add(duration_us, Ordering::Relaxed);
    }
}

// ---------------------------------------------------------------------------
// Per-task profiling
// ---------------------------------------------------------------------------

/// One task's share of a measurement window.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TaskTrace {
    /// Cumulative execution time, µs.
    pub duration_us: u32,
    /// Worst-case single execution, µs.
    pub max_duration_us: u32,
    /// Number of firings.
    pub iterations: u32,
}

/// Aggregate header of a per-task window.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PerTaskTrace {
    pub iterations: u32,
    pub scheduling_us: u32,
    pub idle_sleep_us: u32,
    /// Tasks covered by the window (snapshot at window start).
    pub task_count: usize,
}

struct TaskStats {
    duration_us: AtomicU32,
    max_duration_us: AtomicU32,
    iterations: AtomicU32,
}

impl TaskStats {
    const EMPTY: Self = Self {
        duration_us: AtomicU32::new(0),
        max_duration_us: AtomicU32::new(0),
        iterations: AtomicU32::new(0),
    };

    fn reset(&self) {
        self.duration_us.store(0, Ordering::Relaxed);
        self.max_duration_us.store(0, Ordering::Relaxed);
        self.iterations.store(0, Ordering::Relaxed);
    }
}

/// Per-task profiler: O(N) memory, per-slot duration/max/iterations on top
/// of the aggregate totals.
///
/// If the registered task count changes mid-window (attach or detach), the
/// whole window is cleared so statistics from different task
/// configurations never mix.
pub struct PerTaskProfiler<const N: usize> {
    iterations: AtomicU32,
    scheduling_us: AtomicU32,
    idle_sleep_us: AtomicU32,
    task_count: AtomicUsize,
    tasks: [TaskStats; N],
}

impl<const N: usize> PerTaskProfiler<N> {
    pub const fn new() -> Self {
        Self {
            iterations: AtomicU32::new(0),
            scheduling_us: AtomicU32::new(0),
            idle_sleep_us: AtomicU32::new(0),
            task_count: AtomicUsize::new(0),
            tasks: [TaskStats::EMPTY; N],
        }
    }

    fn reset(&self) {
        self.iterations.store(0, Ordering::Relaxed);
        self.scheduling_us.store(0, Ordering::Relaxed);
        self.idle_sleep_us.store(0, Ordering::Relaxed);
        for stats in &self.tasks {
            stats.reset();
        }
    }

    /// Snapshot and reset the current window, copying per-task entries
    /// into `tasks_out` (truncated to its length).
    ///
    /// Returns `None` when no iterations have occurred since the last call.
    pub fn take_trace(&self, tasks_out: &mut [TaskTrace]) -> Option<PerTaskTrace> {
        critical_section(|_cs| {
            let iterations = self.iterations.load(Ordering::Relaxed);
            if iterations == 0 {
                return None;
            }

            let task_count = self.task_count.load(Ordering::Relaxed);
            let trace = PerTaskTrace {
                iterations,
                scheduling_us: self.scheduling_us.load(Ordering::Relaxed),
                idle_sleep_us: self.idle_sleep_us.load(Ordering::Relaxed),
                task_count,
            };
            for (out, stats) in tasks_out.iter_mut().zip(&self.tasks[..task_count.min(N)]) {
                *out = TaskTrace {
                    duration_us: stats.duration_us.load(Ordering::Relaxed),
                    max_duration_us: stats.max_duration_us.load(Ordering::Relaxed),
                    iterations: stats.iterations.load(Ordering::Relaxed),
                };
            }
            self.reset();
            Some(trace)
        })
    }
}

impl<const N: usize> Default for PerTaskProfiler<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> Profiler for PerTaskProfiler<N> {
    const ENABLED: bool = true;

    fn pass_begin(&self, task_count: usize) {
        if self.iterations.load(Ordering::Relaxed) == 0 {
            self.task_count.store(task_count, Ordering::Relaxed);
        } else if self.task_count.load(Ordering::Relaxed) != task_count {
            // Attach/detach mid-window: drop the stale data.
            self.reset();
            self.task_count.store(task_count, Ordering::Relaxed);
        }
    }

    fn task_ran(&self, slot: usize, duration_us: u32) {
        let Some(stats) = self.tasks.get(slot) else {
            return;
        };
        stats.iterations.fetch_add(1, Ordering::Relaxed);
        stats.duration_us.fetch_add(duration_us, Ordering::Relaxed);
        if stats.max_duration_us.load(Ordering::Relaxed) < duration_us {
            stats.max_duration_us.store(duration_us, Ordering::Relaxed);
        }
    }

    fn pass_end(&self, scheduling_us: u32) {
        self.iterations.fetch_add(1, Ordering::Relaxed);
        self.scheduling_us.fetch_add(scheduling_us, Ordering::Relaxed);
    }

    fn slept(&self, duration_us: u32) {
        self.idle_sleep_us.fetch_add(duration_us, Ordering::Relaxed);
    }
}
