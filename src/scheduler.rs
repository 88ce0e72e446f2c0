//! # Dispatcher
//!
//! The main scheduler loop. One [`run_once`](Scheduler::run_once) pass:
//!
//! 1. Clear the registry's hot flag.
//! 2. Visit every occupied slot in ascending id order and run the tasks
//!    that are due. A firing re-asserts the hot flag.
//! 3. If nothing fired, the flag is still clear and idle sleep is compiled
//!    in (`SLEEP = true`), sleep until the next deadline or interrupt.
//!
//! Tasks never preempt each other: a task runs to completion before the
//! next slot is considered, and effects of task `A` are visible to any
//! task `B > A` within the same pass.
//!
//! ## The sleep race
//!
//! A wake that arrives between the dispatch pass and the sleep must not be
//! lost. Mutators assert the hot flag *before* the dispatcher commits to
//! sleeping; on bare-metal ports the dispatcher additionally re-reads the
//! clock and the flag right before halting, and on OS-backed ports the
//! wake object's "give" persists across the subsequent "take". Bounded
//! sleeps are shortened by one tick so the dispatcher wakes no later than
//! the next deadline.

use crate::platform::Platform;
use crate::profile::Profiler;
use crate::registry::{Schedule, TaskRegistry};

/// Cooperative task dispatcher over a borrowed registry.
///
/// `SLEEP` selects idle sleep at compile time; the profiler variant is
/// selected by the `PR` type parameter. Both default-away to zero cost.
pub struct Scheduler<'a, P: Platform, PR: Profiler, const N: usize, const SLEEP: bool> {
    registry: &'a TaskRegistry<'a, P, N>,
    profiler: &'a PR,
}

impl<'a, P: Platform, PR: Profiler, const N: usize, const SLEEP: bool>
    Scheduler<'a, P, PR, N, SLEEP>
{
    pub const fn new(registry: &'a TaskRegistry<'a, P, N>, profiler: &'a PR) -> Self {
        Self { registry, profiler }
    }

    pub fn registry(&self) -> &'a TaskRegistry<'a, P, N> {
        self.registry
    }

    /// Run the dispatcher forever.
    pub fn run(&self) -> ! {
        loop {
            self.run_once();
        }
    }

    /// One scheduling iteration. Call as often as possible from the main
    /// loop.
    pub fn run_once(&self) {
        let platform = self.registry.platform();
        let loop_start = if PR::ENABLED { platform.now_us() } else { 0 };

        self.profiler.pass_begin(self.registry.len());
        self.registry.clear_hot();

        for slot in 0..self.registry.len() {
            if PR::ENABLED {
                let run_start = platform.now_us();
                if self.registry.run_slot(slot) {
                    self.profiler
                        .task_ran(slot, platform.now_us().wrapping_sub(run_start));
                }
            } else {
                self.registry.run_slot(slot);
            }
        }

        if PR::ENABLED {
            self.profiler
                .pass_end(platform.now_us().wrapping_sub(loop_start));
        }

        if SLEEP && !self.registry.is_hot() {
            self.idle_sleep();
        }
    }

    /// Milliseconds until the next scheduled task is due.
    pub fn time_until_next_run(&self) -> u32 {
        self.registry.time_until_next_run()
    }

    /// See [`TaskRegistry::advance_timestamp`].
    pub fn advance_timestamp(&self, offset_ms: u32) {
        self.registry.advance_timestamp(offset_ms);
    }

    fn idle_sleep(&self) {
        let platform = self.registry.platform();
        let now = platform.now_ms();

        // Sleep only when nothing is due this millisecond or the next;
        // below that the clock tick itself would cut the sleep short.
        let wait = self.registry.shortest_wait(now, 1);
        if wait <= 1 {
            return;
        }

        if P::WAKE_SIGNAL {
            if wait > P::TICK_MS {
                let sleep_start = if PR::ENABLED { platform.now_us() } else { 0 };
                platform.idle_sleep_ms(wait - P::TICK_MS);
                if PR::ENABLED {
                    self.profiler
                        .slept(platform.now_us().wrapping_sub(sleep_start));
                }
            }
        } else if platform.now_ms() == now && !self.registry.is_hot() {
            // The clock has not advanced and no wake arrived since the
            // dispatch pass: halting until the next interrupt is safe.
            let sleep_start = if PR::ENABLED { platform.now_us() } else { 0 };
            platform.idle_sleep();
            if PR::ENABLED {
                self.profiler
                    .slept(platform.now_us().wrapping_sub(sleep_start));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::{MockOsPlatform, MockPlatform};
    use crate::profile::{AggregateProfiler, NoProfiler};
    use crate::registry::Schedule;
    use crate::task::CallableTask;
    use core::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    #[test]
    fn test_tasks_run_in_ascending_id_order() {
        let clock = MockPlatform::new();
        let order: Mutex<Vec<u8>> = Mutex::new(Vec::new());
        let first = || order.lock().unwrap().push(0);
        let second = || order.lock().unwrap().push(1);
        let task_a = CallableTask::new(&first);
        let task_b = CallableTask::new(&second);
        let registry: TaskRegistry<_, 4> = TaskRegistry::new(&clock);
        task_a.attach(&registry, 0, true).unwrap();
        task_b.attach(&registry, 0, true).unwrap();

        let scheduler: Scheduler<_, _, 4, false> = Scheduler::new(&registry, &NoProfiler);
        scheduler.run_once();
        scheduler.run_once();

        assert_eq!(*order.lock().unwrap(), [0, 1, 0, 1]);
    }

    #[test]
    fn test_effects_visible_within_the_same_pass() {
        let clock = MockPlatform::new();
        let sequence = AtomicU32::new(0);
        let producer = || {
            sequence.store(7, Ordering::Relaxed);
        };
        let observed = AtomicU32::new(0);
        let consumer = || {
            observed.store(sequence.load(Ordering::Relaxed), Ordering::Relaxed);
        };
        let task_a = CallableTask::new(&producer);
        let task_b = CallableTask::new(&consumer);
        let registry: TaskRegistry<_, 4> = TaskRegistry::new(&clock);
        task_a.attach(&registry, 0, true).unwrap();
        task_b.attach(&registry, 0, true).unwrap();

        let scheduler: Scheduler<_, _, 4, false> = Scheduler::new(&registry, &NoProfiler);
        scheduler.run_once();

        assert_eq!(observed.load(Ordering::Relaxed), 7);
    }

    #[test]
    fn test_sleep_skipped_while_tasks_fire() {
        let clock = MockPlatform::new();
        let noop = || {};
        let task = CallableTask::new(&noop);
        let registry: TaskRegistry<_, 4> = TaskRegistry::new(&clock);
        task.attach(&registry, 0, true).unwrap();

        let scheduler: Scheduler<_, _, 4, true> = Scheduler::new(&registry, &NoProfiler);
        scheduler.run_once();

        assert_eq!(clock.sleep_count(), 0);
    }

    #[test]
    fn test_sleeps_when_idle() {
        let clock = MockPlatform::new();
        let noop = || {};
        let task = CallableTask::new(&noop);
        let registry: TaskRegistry<_, 4> = TaskRegistry::new(&clock);
        task.attach(&registry, 100, true).unwrap();

        let scheduler: Scheduler<_, _, 4, true> = Scheduler::new(&registry, &NoProfiler);
        scheduler.run_once();

        // Nothing fired, nothing due within a millisecond: slept once.
        assert_eq!(clock.sleep_count(), 1);
    }

    #[test]
    fn test_no_sleep_when_deadline_is_imminent() {
        let clock = MockPlatform::new();
        let noop = || {};
        let task = CallableTask::new(&noop);
        let registry: TaskRegistry<_, 4> = TaskRegistry::new(&clock);
        task.attach(&registry, 100, true).unwrap();
        clock.advance(99); // 1 ms to the deadline

        let scheduler: Scheduler<_, _, 4, true> = Scheduler::new(&registry, &NoProfiler);
        scheduler.run_once();

        assert_eq!(clock.sleep_count(), 0);
    }

    #[test]
    fn test_wake_between_pass_and_sleep_prevents_sleep() {
        let clock = MockPlatform::new();
        let registry: TaskRegistry<_, 4> = TaskRegistry::new(&clock);
        let waker = || {};
        let task = CallableTask::new(&waker);
        task.attach(&registry, 1_000_000, false).unwrap();

        // Simulate an ISR firing right after the dispatch pass: hot is
        // set again, so the sleep must be skipped.
        registry.clear_hot();
        registry.wake_from_isr(task.task_id());
        let scheduler: Scheduler<_, _, 4, true> = Scheduler::new(&registry, &NoProfiler);

        // wake set period 0, so the pass itself fires the task and stays
        // hot; no sleep either way.
        scheduler.run_once();
        assert_eq!(clock.sleep_count(), 0);
    }

    #[test]
    fn test_os_sleep_is_bounded_and_tick_shortened() {
        let clock = MockOsPlatform::new();
        let noop = || {};
        let task = CallableTask::new(&noop);
        let registry: TaskRegistry<_, 4> = TaskRegistry::new(&clock);
        task.attach(&registry, 100, true).unwrap();

        let scheduler: Scheduler<_, _, 4, true> = Scheduler::new(&registry, &NoProfiler);
        // The attach signaled the wake object; the first sleep consumes
        // that pending give and returns immediately.
        scheduler.run_once();
        assert_eq!(clock.slept_ms(), 0);

        // Slept one tick short of the 100 ms deadline.
        scheduler.run_once();
        assert_eq!(clock.slept_ms(), 99);
    }

    #[test]
    fn test_pending_wake_signal_cuts_os_sleep_short() {
        let clock = MockOsPlatform::new();
        let noop = || {};
        let task = CallableTask::new(&noop);
        let registry: TaskRegistry<_, 4> = TaskRegistry::new(&clock);
        task.attach(&registry, 12_345_679, false).unwrap();

        // An attach signals the wake object; the pending "give" persists
        // and releases the very next "take" immediately.
        let scheduler: Scheduler<_, _, 4, true> = Scheduler::new(&registry, &NoProfiler);
        scheduler.run_once();

        assert_eq!(clock.slept_ms(), 0);
    }

    #[test]
    fn test_immediate_wake_fires_on_next_pass() {
        let clock = MockPlatform::new();
        let runs = AtomicU32::new(0);
        let count = || {
            runs.fetch_add(1, Ordering::Relaxed);
        };
        let task = CallableTask::new(&count);
        let registry: TaskRegistry<_, 4> = TaskRegistry::new(&clock);
        task.attach(&registry, 12_345_679, false).unwrap();

        let scheduler: Scheduler<_, _, 4, false> = Scheduler::new(&registry, &NoProfiler);
        scheduler.run_once();
        assert_eq!(runs.load(Ordering::Relaxed), 0);

        task.wake_from_isr();
        scheduler.run_once();
        assert_eq!(runs.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_profiled_pass_accounts_busy_and_sleep() {
        let clock = MockPlatform::new();
        let busy_work = || {
            clock.advance_us(400);
        };
        let task = CallableTask::new(&busy_work);
        let registry: TaskRegistry<_, 4> = TaskRegistry::new(&clock);
        task.attach(&registry, 0, true).unwrap();

        let profiler = AggregateProfiler::new();
        let scheduler: Scheduler<_, _, 4, true> = Scheduler::new(&registry, &profiler);
        scheduler.run_once();

        // Fired: busy time recorded, no sleep.
        let trace = profiler.take_trace().unwrap();
        assert_eq!(trace.iterations, 1);
        assert_eq!(trace.busy_us, 400);
        assert!(trace.scheduling_us >= 400);
        assert_eq!(trace.idle_sleep_us, 0);

        // Park the task far in the future: the next pass only sleeps.
        task.set_period_and_enabled(1_000_000, true);
        scheduler.run_once();
        let trace = profiler.take_trace().unwrap();
        assert_eq!(trace.busy_us, 0);
        assert_eq!(trace.idle_sleep_us, 1000);
    }

    #[test]
    fn test_detach_during_pass_is_safe() {
        let clock = MockPlatform::new();
        let registry: TaskRegistry<_, 4> = TaskRegistry::new(&clock);

        // A task that detaches itself when it runs. The pass bound was
        // captured before the table shrank; the vacated slot is skipped.
        let detach_self = || {
            registry.detach(crate::task::TaskId(0));
        };
        let task = CallableTask::new(&detach_self);
        task.attach(&registry, 0, true).unwrap();

        let scheduler: Scheduler<_, _, 4, false> = Scheduler::new(&registry, &NoProfiler);
        scheduler.run_once();
        scheduler.run_once();

        assert!(registry.is_empty());
        assert!(!registry.contains(&task));
    }
}
