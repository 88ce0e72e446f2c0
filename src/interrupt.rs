//! # Interrupt Adapters
//!
//! Pre-built tasks that bridge ISRs to the cooperative loop. The ISR side
//! performs only O(1) guarded state updates and requests a wake; all
//! semantic work runs later in cooperative context, where user code may
//! use non-reentrant services freely. The scheduler never re-enters user
//! code from ISR context.
//!
//! Three aggregation shapes:
//!
//! - [`FlagTask`]: one boolean; repeated interrupts before the next
//!   dispatch pass coalesce into a single listener call.
//! - [`SignalTask`]: a saturating counter of configurable width; the
//!   listener receives the count.
//! - [`EventTask`]: a saturating counter plus the timestamp of the first
//!   unhandled event of the batch.
//!
//! Each adapter attaches disabled with period 0: an interrupt wakes it,
//! the next pass runs it, and it disables itself once nothing is pending.

use core::cell::Cell;

use crate::platform::TimestampSource;
use crate::registry::{AttachError, Schedule};
use crate::sync::{critical_section, Mutex};
use crate::task::{Task, TaskHandle, TaskId};

// ---------------------------------------------------------------------------
// Counter widths
// ---------------------------------------------------------------------------

mod sealed {
    pub trait Sealed {}
    impl Sealed for u8 {}
    impl Sealed for u16 {}
    impl Sealed for u32 {}
}

/// Saturating event counter width. Implemented for `u8`, `u16` and `u32`;
/// the counter clamps at the type's maximum instead of wrapping, so a
/// burst past capacity is observable only as a saturated count.
pub trait Count: Copy + PartialEq + Send + sealed::Sealed {
    const ZERO: Self;
    const MAX: Self;

    fn saturating_inc(self) -> Self;
    fn is_zero(self) -> bool;
}

macro_rules! impl_count {
    ($($t:ty),*) => {$(
        impl Count for $t {
            const ZERO: Self = 0;
            const MAX: Self = <$t>::MAX;

            fn saturating_inc(self) -> Self {
                self.saturating_add(1)
            }

            fn is_zero(self) -> bool {
                self == 0
            }
        }
    )*};
}

impl_count!(u8, u16, u32);

// ---------------------------------------------------------------------------
// Listeners
// ---------------------------------------------------------------------------

/// Receives coalesced flag interrupts in cooperative context.
pub trait FlagListener: Sync {
    fn on_flag_interrupt(&self);
}

/// Receives aggregated signal counts in cooperative context.
pub trait SignalListener<C: Count>: Sync {
    fn on_signal_interrupt(&self, count: C);
}

/// Receives a batch timestamp and count in cooperative context.
pub trait EventListener<C: Count>: Sync {
    fn on_event_interrupt(&self, timestamp: u32, count: C);
}

// ---------------------------------------------------------------------------
// Flag adapter
// ---------------------------------------------------------------------------

/// Single-flag interrupt adapter.
///
/// `on_interrupt` (ISR) sets the flag and wakes the scheduler; a flag
/// that is already set coalesces. The dispatched `run` clears the flag
/// and notifies the listener exactly once per batch.
pub struct FlagTask<'a> {
    handle: TaskHandle<'a>,
    flag: Mutex<Cell<bool>>,
    listener: Mutex<Cell<Option<&'a dyn FlagListener>>>,
}

impl<'a> FlagTask<'a> {
    pub const fn new() -> Self {
        Self {
            handle: TaskHandle::new(),
            flag: Mutex::new(Cell::new(false)),
            listener: Mutex::new(Cell::new(None)),
        }
    }

    /// Register with the scheduler (period 0, disabled until the first
    /// interrupt) and install the listener. Not ISR-safe.
    pub fn attach(
        &'a self,
        registry: &'a dyn Schedule<'a>,
        listener: &'a dyn FlagListener,
    ) -> Result<TaskId, AttachError> {
        let id = self.handle.attach(registry, self, 0, false)?;
        critical_section(|cs| {
            self.listener.borrow(cs).set(Some(listener));
            self.flag.borrow(cs).set(false);
        });
        Ok(id)
    }

    /// ISR entry point: latch the flag and wake the scheduler. Repeated
    /// calls before the next dispatch pass are coalesced.
    pub fn on_interrupt(&self) {
        let first = critical_section(|cs| {
            let flag = self.flag.borrow(cs);
            if flag.get() {
                false
            } else {
                flag.set(true);
                true
            }
        });
        if first {
            self.handle.wake_from_isr();
        }
    }

    pub fn task_id(&self) -> TaskId {
        self.handle.task_id()
    }
}

impl Default for FlagTask<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl Task for FlagTask<'_> {
    fn run(&self) {
        let flag = critical_section(|cs| self.flag.borrow(cs).replace(false));

        if flag {
            if let Some(listener) = critical_section(|cs| self.listener.borrow(cs).get()) {
                listener.on_flag_interrupt();
            }
        }

        // Stay armed only if another interrupt landed while the listener
        // ran.
        let pending = critical_section(|cs| self.flag.borrow(cs).get());
        self.handle.set_enabled(pending);
    }

    fn on_task_id_updated(&self, id: TaskId) {
        self.handle.on_task_id_updated(id);
    }
}

// ---------------------------------------------------------------------------
// Signal adapter
// ---------------------------------------------------------------------------

/// Counting interrupt adapter.
///
/// `on_interrupt` (ISR) increments a saturating counter and wakes the
/// scheduler; the dispatched `run` snapshots-and-clears the counter and
/// hands the count to the listener.
pub struct SignalTask<'a, C: Count = u8> {
    handle: TaskHandle<'a>,
    count: Mutex<Cell<C>>,
    listener: Mutex<Cell<Option<&'a dyn SignalListener<C>>>>,
}

impl<'a, C: Count> SignalTask<'a, C> {
    pub const fn new() -> Self {
        Self {
            handle: TaskHandle::new(),
            count: Mutex::new(Cell::new(C::ZERO)),
            listener: Mutex::new(Cell::new(None)),
        }
    }

    /// Register with the scheduler (period 0, disabled until the first
    /// interrupt) and install the listener. Not ISR-safe.
    pub fn attach(
        &'a self,
        registry: &'a dyn Schedule<'a>,
        listener: &'a dyn SignalListener<C>,
    ) -> Result<TaskId, AttachError> {
        let id = self.handle.attach(registry, self, 0, false)?;
        critical_section(|cs| {
            self.listener.borrow(cs).set(Some(listener));
            self.count.borrow(cs).set(C::ZERO);
        });
        Ok(id)
    }

    /// ISR entry point: bump the counter (clamping at the width's
    /// maximum) and wake the scheduler.
    pub fn on_interrupt(&self) {
        critical_section(|cs| {
            let count = self.count.borrow(cs);
            count.set(count.get().saturating_inc());
        });
        self.handle.wake_from_isr();
    }

    pub fn task_id(&self) -> TaskId {
        self.handle.task_id()
    }
}

impl<C: Count> Default for SignalTask<'_, C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Count> Task for SignalTask<'_, C> {
    fn run(&self) {
        let count = critical_section(|cs| self.count.borrow(cs).replace(C::ZERO));

        if !count.is_zero() {
            if let Some(listener) = critical_section(|cs| self.listener.borrow(cs).get()) {
                listener.on_signal_interrupt(count);
            }
        }

        let pending = critical_section(|cs| !self.count.borrow(cs).get().is_zero());
        self.handle.set_enabled(pending);
    }

    fn on_task_id_updated(&self, id: TaskId) {
        self.handle.on_task_id_updated(id);
    }
}

// ---------------------------------------------------------------------------
// Event adapter
// ---------------------------------------------------------------------------

/// Timestamped interrupt adapter.
///
/// The first ISR of a batch samples the configured timestamp source
/// (microseconds or milliseconds, chosen by the `clock` passed at
/// construction); later ISRs only bump the saturating counter. The
/// dispatched `run` delivers `(timestamp, count)` to the listener.
pub struct EventTask<'a, C: Count = u8> {
    handle: TaskHandle<'a>,
    clock: &'a dyn TimestampSource,
    timestamp: Mutex<Cell<u32>>,
    count: Mutex<Cell<C>>,
    listener: Mutex<Cell<Option<&'a dyn EventListener<C>>>>,
}

impl<'a, C: Count> EventTask<'a, C> {
    pub const fn new(clock: &'a dyn TimestampSource) -> Self {
        Self {
            handle: TaskHandle::new(),
            clock,
            timestamp: Mutex::new(Cell::new(0)),
            count: Mutex::new(Cell::new(C::ZERO)),
            listener: Mutex::new(Cell::new(None)),
        }
    }

    /// Register with the scheduler (period 0, disabled until the first
    /// interrupt) and install the listener. Not ISR-safe.
    pub fn attach(
        &'a self,
        registry: &'a dyn Schedule<'a>,
        listener: &'a dyn EventListener<C>,
    ) -> Result<TaskId, AttachError> {
        let id = self.handle.attach(registry, self, 0, false)?;
        critical_section(|cs| {
            self.listener.borrow(cs).set(Some(listener));
            self.count.borrow(cs).set(C::ZERO);
        });
        Ok(id)
    }

    /// ISR entry point: record the batch timestamp on the first event,
    /// bump the saturating counter, wake the scheduler.
    pub fn on_interrupt(&self) {
        let first = critical_section(|cs| {
            let count = self.count.borrow(cs);
            let current = count.get();
            if current.is_zero() {
                self.timestamp.borrow(cs).set(self.clock.now());
            }
            count.set(current.saturating_inc());
            current.is_zero()
        });
        if first {
            self.handle.wake_from_isr();
        }
    }

    pub fn task_id(&self) -> TaskId {
        self.handle.task_id()
    }
}

impl<C: Count> Task for EventTask<'_, C> {
    fn run(&self) {
        let (timestamp, count) = critical_section(|cs| {
            (
                self.timestamp.borrow(cs).get(),
                self.count.borrow(cs).replace(C::ZERO),
            )
        });

        if !count.is_zero() {
            if let Some(listener) = critical_section(|cs| self.listener.borrow(cs).get()) {
                listener.on_event_interrupt(timestamp, count);
            }
        }

        let pending = critical_section(|cs| !self.count.borrow(cs).get().is_zero());
        self.handle.set_enabled(pending);
    }

    fn on_task_id_updated(&self, id: TaskId) {
        self.handle.on_task_id_updated(id);
    }
}
