//! # Compatibility Shim
//!
//! Source-level emulation of the classic Arduino `TaskScheduler` task
//! API, for migrating sketches onto the cooperative registry. Covers the
//! iteration, enable/disable and interval logic of the original; it is a
//! thin façade over [`Schedule`] with no state beyond the iteration
//! counter and target.
//!
//! Not covered: task chaining, dynamic scheduler reassignment, and the
//! original's pointer-based callback plumbing (callbacks are a
//! [`LegacyCallbacks`] implementation here).

use core::sync::atomic::{AtomicI32, AtomicU32, Ordering};

use crate::registry::{AttachError, Schedule};
use crate::task::{Task, TaskHandle, TaskId};

/// Run on the next dispatch pass.
pub const TASK_IMMEDIATE: u32 = 0;
/// Repeat until disabled.
pub const TASK_FOREVER: i32 = -1;
/// Run exactly once.
pub const TASK_ONCE: i32 = 1;

/// Callbacks of a legacy task.
pub trait LegacyCallbacks: Sync {
    /// The task body, invoked once per iteration.
    fn callback(&self);

    /// Invoked when the task transitions to enabled; returning false
    /// vetoes the enable.
    fn on_enable(&self) -> bool {
        true
    }

    /// Invoked when [`LegacyTask::disable`] disables the task.
    fn on_disable(&self) {}
}

/// A `TaskScheduler`-style task: interval, iteration budget,
/// enable/disable hooks.
pub struct LegacyTask<'a> {
    handle: TaskHandle<'a>,
    callbacks: &'a dyn LegacyCallbacks,
    iterations: AtomicU32,
    target_iterations: AtomicI32,
}

impl<'a> LegacyTask<'a> {
    /// Build a task that runs `iterations` times ([`TASK_FOREVER`] for
    /// unbounded) every `interval` ms.
    pub const fn new(iterations: i32, callbacks: &'a dyn LegacyCallbacks) -> Self {
        Self {
            handle: TaskHandle::new(),
            callbacks,
            iterations: AtomicU32::new(0),
            target_iterations: AtomicI32::new(iterations),
        }
    }

    /// Register with `registry` at `interval` ms, optionally enabled.
    pub fn attach(
        &'a self,
        registry: &'a dyn Schedule<'a>,
        interval: u32,
        enable: bool,
    ) -> Result<TaskId, AttachError> {
        self.handle.attach(registry, self, interval, enable)
    }

    /// Enable the task, honoring the `on_enable` veto.
    pub fn enable(&self) -> bool {
        if !self.handle.is_enabled() && !self.callbacks.on_enable() {
            return false;
        }
        self.handle.set_enabled(true);
        true
    }

    pub fn enable_if_not(&self) -> bool {
        self.enable()
    }

    /// Enable with a one-shot delay before the first iteration.
    pub fn enable_delayed(&self, delay: u32) -> bool {
        if !self.handle.is_enabled() {
            self.callbacks.on_enable();
        }
        self.handle.set_period_and_enabled(delay, true);
        self.is_enabled()
    }

    /// Restart the task on its current interval, resetting the phase.
    pub fn restart(&self) -> bool {
        if !self.handle.is_enabled() {
            self.callbacks.on_enable();
        }
        let interval = self.handle.period();
        self.handle.set_period_and_enabled(0, false);
        self.handle.set_period_and_enabled(interval, true);
        self.is_enabled()
    }

    /// Restart with a new initial delay.
    pub fn restart_delayed(&self, delay: u32) -> bool {
        if !self.handle.is_enabled() {
            self.callbacks.on_enable();
        }
        self.handle.set_period_and_enabled(0, false);
        self.handle.set_period_and_enabled(delay, true);
        self.is_enabled()
    }

    /// Postpone the next iteration by `delay` ms.
    pub fn delay(&self, delay: u32) {
        self.handle.set_period(delay);
    }

    /// Change the interval, re-anchoring the phase.
    pub fn adjust(&self, interval: u32) {
        self.handle.set_period_and_enabled(0, false);
        self.handle.set_period_and_enabled(interval, true);
    }

    /// Schedule the next iteration for the next dispatch pass.
    pub fn force_next_iteration(&self) {
        if !self.handle.is_enabled() {
            self.callbacks.on_enable();
            self.handle.set_period_and_enabled(0, true);
        }
    }

    /// Disable the task, invoking `on_disable`. Returns whether the task
    /// was enabled.
    pub fn disable(&self) -> bool {
        if self.is_enabled() {
            self.handle.set_enabled(false);
            self.callbacks.on_disable();
            true
        } else {
            false
        }
    }

    pub fn abort(&self) {
        self.disable();
    }

    pub fn cancel(&self) {
        self.disable();
    }

    pub fn is_enabled(&self) -> bool {
        self.handle.is_enabled()
    }

    pub fn canceled(&self) -> bool {
        !self.is_enabled()
    }

    /// Change interval and iteration budget together.
    pub fn set(&self, interval: u32, iterations: i32) {
        self.target_iterations.store(iterations, Ordering::Relaxed);
        self.handle.set_period(interval);
    }

    pub fn set_interval(&self, interval: u32) {
        self.handle.set_period(interval);
    }

    pub fn interval(&self) -> u32 {
        self.handle.period()
    }

    pub fn set_iterations(&self, iterations: i32) {
        self.target_iterations.store(iterations, Ordering::Relaxed);
    }

    /// Completed iterations since attach (or the last reset).
    pub fn iterations(&self) -> u32 {
        self.iterations.load(Ordering::Relaxed)
    }

    pub fn run_counter(&self) -> u32 {
        self.iterations()
    }

    pub fn is_first_iteration(&self) -> bool {
        self.iterations() == 0
    }

    /// Whether the iteration budget is exhausted.
    pub fn is_last_iteration(&self) -> bool {
        let target = self.target_iterations.load(Ordering::Relaxed);
        target >= 0 && self.iterations() >= target as u32
    }

    pub fn reset(&self) -> bool {
        self.restart()
    }

    pub fn task_id(&self) -> TaskId {
        self.handle.task_id()
    }
}

impl Task for LegacyTask<'_> {
    fn run(&self) {
        if self.is_last_iteration() {
            self.disable();
        } else {
            self.callbacks.callback();
            self.iterations.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn on_task_id_updated(&self, id: TaskId) {
        self.handle.on_task_id_updated(id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::MockPlatform;
    use crate::registry::TaskRegistry;
    use core::sync::atomic::AtomicBool;

    struct Callbacks {
        runs: AtomicU32,
        enables: AtomicU32,
        disables: AtomicU32,
        veto_enable: AtomicBool,
    }

    impl Callbacks {
        const fn new() -> Self {
            Self {
                runs: AtomicU32::new(0),
                enables: AtomicU32::new(0),
                disables: AtomicU32::new(0),
                veto_enable: AtomicBool::new(false),
            }
        }

        fn runs(&self) -> u32 {
            self.runs.load(Ordering::Relaxed)
        }
    }

    impl LegacyCallbacks for Callbacks {
        fn callback(&self) {
            self.runs.fetch_add(1, Ordering::Relaxed);
        }

        fn on_enable(&self) -> bool {
            self.enables.fetch_add(1, Ordering::Relaxed);
            !self.veto_enable.load(Ordering::Relaxed)
        }

        fn on_disable(&self) {
            self.disables.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[test]
    fn test_iteration_budget_disables_task() {
        let clock = MockPlatform::new();
        let callbacks = Callbacks::new();
        let task = LegacyTask::new(2, &callbacks);
        let registry: TaskRegistry<_, 4> = TaskRegistry::new(&clock);
        task.attach(&registry, TASK_IMMEDIATE, true).unwrap();

        assert!(task.is_first_iteration());
        assert!(registry.run_slot(0));
        assert!(registry.run_slot(0));
        assert_eq!(callbacks.runs(), 2);
        assert!(task.is_last_iteration());

        // The budget-exhausted run disables instead of calling back.
        assert!(registry.run_slot(0));
        assert_eq!(callbacks.runs(), 2);
        assert!(!task.is_enabled());
        assert_eq!(callbacks.disables.load(Ordering::Relaxed), 1);

        assert!(!registry.run_slot(0));
    }

    #[test]
    fn test_forever_never_exhausts() {
        let clock = MockPlatform::new();
        let callbacks = Callbacks::new();
        let task = LegacyTask::new(TASK_FOREVER, &callbacks);
        let registry: TaskRegistry<_, 4> = TaskRegistry::new(&clock);
        task.attach(&registry, TASK_IMMEDIATE, true).unwrap();

        for _ in 0..100 {
            registry.run_slot(0);
        }
        assert_eq!(callbacks.runs(), 100);
        assert!(!task.is_last_iteration());
    }

    #[test]
    fn test_enable_veto() {
        let clock = MockPlatform::new();
        let callbacks = Callbacks::new();
        let task = LegacyTask::new(TASK_FOREVER, &callbacks);
        let registry: TaskRegistry<_, 4> = TaskRegistry::new(&clock);
        task.attach(&registry, TASK_IMMEDIATE, false).unwrap();

        callbacks.veto_enable.store(true, Ordering::Relaxed);
        assert!(!task.enable());
        assert!(!task.is_enabled());

        callbacks.veto_enable.store(false, Ordering::Relaxed);
        assert!(task.enable());
        assert!(task.is_enabled());

        // Enabling an enabled task skips the hook.
        let enables = callbacks.enables.load(Ordering::Relaxed);
        assert!(task.enable());
        assert_eq!(callbacks.enables.load(Ordering::Relaxed), enables);
    }

    #[test]
    fn test_restart_reanchors_phase() {
        let clock = MockPlatform::new();
        let callbacks = Callbacks::new();
        let task = LegacyTask::new(TASK_FOREVER, &callbacks);
        let registry: TaskRegistry<_, 4> = TaskRegistry::new(&clock);
        task.attach(&registry, 100, true).unwrap();

        clock.advance(95);
        assert!(task.restart());
        assert_eq!(task.interval(), 100);

        // The restart pushed the next firing a full interval out.
        clock.advance(10); // t = 105
        assert!(!registry.run_slot(0));
        clock.advance(91); // t = 196 > 95 + 100
        assert!(registry.run_slot(0));
    }

    #[test]
    fn test_force_next_iteration() {
        let clock = MockPlatform::new();
        let callbacks = Callbacks::new();
        let task = LegacyTask::new(TASK_FOREVER, &callbacks);
        let registry: TaskRegistry<_, 4> = TaskRegistry::new(&clock);
        task.attach(&registry, 50_000, false).unwrap();

        task.force_next_iteration();
        assert!(registry.run_slot(0));
        assert_eq!(callbacks.runs(), 1);
    }

    #[test]
    fn test_set_and_adjust() {
        let clock = MockPlatform::new();
        let callbacks = Callbacks::new();
        let task = LegacyTask::new(TASK_ONCE, &callbacks);
        let registry: TaskRegistry<_, 4> = TaskRegistry::new(&clock);
        task.attach(&registry, 10, true).unwrap();

        task.set(250, 5);
        assert_eq!(task.interval(), 250);
        assert!(!task.is_last_iteration());

        task.adjust(30);
        assert_eq!(task.interval(), 30);
        assert!(task.is_enabled());
    }

    #[test]
    fn test_delayed_enable_runs_after_delay() {
        let clock = MockPlatform::new();
        let callbacks = Callbacks::new();
        let task = LegacyTask::new(TASK_FOREVER, &callbacks);
        let registry: TaskRegistry<_, 4> = TaskRegistry::new(&clock);
        task.attach(&registry, TASK_IMMEDIATE, false).unwrap();

        assert!(task.enable_delayed(20));
        assert!(!registry.run_slot(0));
        clock.advance(21);
        assert!(registry.run_slot(0));
        assert_eq!(callbacks.runs(), 1);
    }
}
