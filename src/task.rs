//! # Task Model
//!
//! The [`Task`] trait, the [`TaskId`] handle type, and the user-facing
//! building blocks: [`TaskHandle`] (registry back-reference + id),
//! [`TaskWrapper`] (composition over an interchangeable runner) and
//! [`CallableTask`] (wraps a plain callable).

use core::cell::Cell;
use core::sync::atomic::{AtomicU8, Ordering};

use crate::registry::{AttachError, Schedule};
use crate::sync::{critical_section, Mutex};

/// A cooperative task.
///
/// `run` is the task's execution callback. It must complete quickly
/// (design target: under one millisecond) and must not block — a slow task
/// delays every other task in the loop, though it cannot deadlock it.
///
/// `on_task_id_updated` is called by the registry whenever the task's id
/// changes: on attach, after a neighbor's detach shifts the slot, and on
/// detach (with [`TaskId::INVALID`]). Implementations that self-address
/// the registry store the value; others can ignore it.
pub trait Task: Sync {
    /// Execute the run callback.
    fn run(&self);

    /// The registry assigned, moved or revoked this task's id.
    fn on_task_id_updated(&self, id: TaskId) {
        let _ = id;
    }
}

/// A task's slot index in the registry.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct TaskId(pub(crate) u8);

impl TaskId {
    /// Sentinel for "not registered" (all-ones of the id type). Never
    /// assigned as a live id, which caps usable capacity at 255 slots.
    pub const INVALID: TaskId = TaskId(u8::MAX);

    pub const fn is_invalid(self) -> bool {
        self.0 == u8::MAX
    }

    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for TaskId {
    fn format(&self, fmt: defmt::Formatter) {
        if self.is_invalid() {
            defmt::write!(fmt, "T---");
        } else {
            defmt::write!(fmt, "T{=u8:03}", self.0);
        }
    }
}

/// Registry back-reference plus the task's current id.
///
/// Embed one in a task type to let the task manage its own schedule:
/// the registry keeps the stored id current through every attach, shift
/// and detach (via [`Task::on_task_id_updated`] forwarded to
/// [`TaskHandle::on_task_id_updated`]), so the task can self-address the
/// registry without a lookup.
///
/// All forwarding methods are no-ops while unbound or unregistered.
pub struct TaskHandle<'a> {
    registry: Mutex<Cell<Option<&'a dyn Schedule<'a>>>>,
    id: AtomicU8,
}

impl<'a> TaskHandle<'a> {
    pub const fn new() -> Self {
        Self {
            registry: Mutex::new(Cell::new(None)),
            id: AtomicU8::new(TaskId::INVALID.0),
        }
    }

    /// Store the registry reference and attach `task` to it.
    ///
    /// `task` is the outer task embedding this handle; the registry's
    /// attach callback routes the assigned id back here. Not ISR-safe.
    pub fn attach(
        &self,
        registry: &'a dyn Schedule<'a>,
        task: &'a dyn Task,
        period_ms: u32,
        enabled: bool,
    ) -> Result<TaskId, AttachError> {
        critical_section(|cs| self.registry.borrow(cs).set(Some(registry)));
        registry.attach(task, period_ms, enabled)
    }

    /// Detach from the registry. Returns false if not registered.
    /// Not ISR-safe.
    pub fn detach(&self) -> bool {
        match self.registry() {
            Some(registry) => registry.detach(self.task_id()),
            None => false,
        }
    }

    /// Record the id assigned by the registry. Call from the outer task's
    /// [`Task::on_task_id_updated`].
    pub fn on_task_id_updated(&self, id: TaskId) {
        self.id.store(id.0, Ordering::Relaxed);
    }

    /// The current id, or [`TaskId::INVALID`] when unregistered.
    pub fn task_id(&self) -> TaskId {
        TaskId(self.id.load(Ordering::Relaxed))
    }

    /// Set the task's execution period. ISR-safe.
    pub fn set_period(&self, period_ms: u32) {
        if let Some(registry) = self.registry() {
            registry.set_period(self.task_id(), period_ms);
        }
    }

    /// Enable or disable the task. ISR-safe.
    pub fn set_enabled(&self, enabled: bool) {
        if let Some(registry) = self.registry() {
            registry.set_enabled(self.task_id(), enabled);
        }
    }

    /// Set period and enabled state atomically. ISR-safe.
    pub fn set_period_and_enabled(&self, period_ms: u32, enabled: bool) {
        if let Some(registry) = self.registry() {
            registry.set_period_and_enabled(self.task_id(), period_ms, enabled);
        }
    }

    /// Wake the scheduler and run the task on the next pass. The lowest
    /// overhead ISR-to-task path.
    pub fn wake_from_isr(&self) {
        if let Some(registry) = self.registry() {
            registry.wake_from_isr(self.task_id());
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.registry()
            .is_some_and(|registry| registry.is_enabled(self.task_id()))
    }

    pub fn period(&self) -> u32 {
        self.registry()
            .map_or(0, |registry| registry.period(self.task_id()))
    }

    fn registry(&self) -> Option<&'a dyn Schedule<'a>> {
        critical_section(|cs| self.registry.borrow(cs).get())
    }
}

impl Default for TaskHandle<'_> {
    fn default() -> Self {
        Self::new()
    }
}

/// Composition wrapper: forwards `run` to an interchangeable inner runner.
///
/// The runner can be swapped (or removed) at any time from cooperative
/// context; `run` is a no-op while no runner is installed.
pub struct TaskWrapper<'a> {
    handle: TaskHandle<'a>,
    runner: Mutex<Cell<Option<&'a dyn Task>>>,
}

impl<'a> TaskWrapper<'a> {
    pub const fn new() -> Self {
        Self {
            handle: TaskHandle::new(),
            runner: Mutex::new(Cell::new(None)),
        }
    }

    pub fn attach(
        &'a self,
        registry: &'a dyn Schedule<'a>,
        period_ms: u32,
        enabled: bool,
    ) -> Result<TaskId, AttachError> {
        self.handle.attach(registry, self, period_ms, enabled)
    }

    pub fn set_runner(&self, runner: Option<&'a dyn Task>) {
        critical_section(|cs| self.runner.borrow(cs).set(runner));
    }

    pub fn handle(&self) -> &TaskHandle<'a> {
        &self.handle
    }
}

impl Default for TaskWrapper<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl Task for TaskWrapper<'_> {
    fn run(&self) {
        if let Some(runner) = critical_section(|cs| self.runner.borrow(cs).get()) {
            runner.run();
        }
    }

    fn on_task_id_updated(&self, id: TaskId) {
        self.handle.on_task_id_updated(id);
    }
}

/// A task that wraps a plain callable. No allocation, no `fn` boxing —
/// the callable is borrowed for the task's lifetime.
pub struct CallableTask<'a> {
    handle: TaskHandle<'a>,
    callable: &'a (dyn Fn() + Sync),
}

impl<'a> CallableTask<'a> {
    pub const fn new(callable: &'a (dyn Fn() + Sync)) -> Self {
        Self {
            handle: TaskHandle::new(),
            callable,
        }
    }

    /// Register with `registry` and set the initial schedule. Call during
    /// setup, from cooperative context.
    pub fn attach(
        &'a self,
        registry: &'a dyn Schedule<'a>,
        period_ms: u32,
        enabled: bool,
    ) -> Result<TaskId, AttachError> {
        self.handle.attach(registry, self, period_ms, enabled)
    }

    pub fn task_id(&self) -> TaskId {
        self.handle.task_id()
    }

    pub fn is_enabled(&self) -> bool {
        self.handle.is_enabled()
    }

    pub fn period(&self) -> u32 {
        self.handle.period()
    }

    pub fn set_period(&self, period_ms: u32) {
        self.handle.set_period(period_ms);
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.handle.set_enabled(enabled);
    }

    pub fn set_period_and_enabled(&self, period_ms: u32, enabled: bool) {
        self.handle.set_period_and_enabled(period_ms, enabled);
    }

    /// Wake the scheduler and run this task on the next pass. ISR-safe.
    pub fn wake_from_isr(&self) {
        self.handle.wake_from_isr();
    }

    pub fn detach(&self) -> bool {
        self.handle.detach()
    }
}

impl Task for CallableTask<'_> {
    fn run(&self) {
        (self.callable)();
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
    use core::sync::atomic::AtomicU32;

    #[test]
    fn test_task_id_sentinel() {
        assert!(TaskId::INVALID.is_invalid());
        assert!(!TaskId(0).is_invalid());
        assert_eq!(TaskId(3).index(), 3);
    }

    #[test]
    fn test_unbound_handle_is_inert() {
        let handle = TaskHandle::new();
        assert_eq!(handle.task_id(), TaskId::INVALID);
        assert!(!handle.is_enabled());
        assert_eq!(handle.period(), 0);
        assert!(!handle.detach());
        handle.set_period(100);
        handle.set_enabled(true);
        handle.wake_from_isr();
    }

    #[test]
    fn test_callable_task_runs_and_self_manages() {
        let clock = MockPlatform::new();
        let runs = AtomicU32::new(0);
        let callable = || {
            runs.fetch_add(1, Ordering::Relaxed);
        };
        let task = CallableTask::new(&callable);
        let registry: TaskRegistry<_, 4> = TaskRegistry::new(&clock);

        let id = task.attach(&registry, 250, true).unwrap();
        assert_eq!(task.task_id(), id);
        assert_eq!(task.period(), 250);
        assert!(task.is_enabled());

        task.set_period_and_enabled(0, true);
        assert!(registry.run_slot(0));
        assert_eq!(runs.load(Ordering::Relaxed), 1);

        assert!(task.detach());
        assert_eq!(task.task_id(), TaskId::INVALID);
    }

    #[test]
    fn test_wrapper_forwards_to_runner() {
        let clock = MockPlatform::new();
        let runs = AtomicU32::new(0);
        let callable = || {
            runs.fetch_add(1, Ordering::Relaxed);
        };
        let inner = CallableTask::new(&callable);
        let wrapper = TaskWrapper::new();
        let registry: TaskRegistry<_, 4> = TaskRegistry::new(&clock);

        wrapper.attach(&registry, 0, true).unwrap();

        // No runner installed yet: dispatch is a no-op.
        assert!(registry.run_slot(0));
        assert_eq!(runs.load(Ordering::Relaxed), 0);

        wrapper.set_runner(Some(&inner));
        assert!(registry.run_slot(0));
        assert_eq!(runs.load(Ordering::Relaxed), 1);

        wrapper.set_runner(None);
        assert!(registry.run_slot(0));
        assert_eq!(runs.load(Ordering::Relaxed), 1);
    }
}
