//! # Platform Port Layer
//!
//! Hardware abstraction boundary for the scheduler: monotonic clocks, the
//! idle-sleep primitive and the wake signal. The Cortex-M port lives in
//! [`cortex_m`] (behind the `rt` feature); [`mock`] provides a host-side
//! clock for tests and simulation.

#[cfg(feature = "rt")]
pub mod cortex_m;
pub mod mock;

#[cfg(feature = "rt")]
pub use self::cortex_m::CortexM;
pub use mock::{MockOsPlatform, MockPlatform};

/// Host-supplied platform primitives.
///
/// Implementations fall in two families, distinguished by
/// [`WAKE_SIGNAL`](Platform::WAKE_SIGNAL):
///
/// - **Bare-metal** (`WAKE_SIGNAL = false`): [`idle_sleep`](Platform::idle_sleep)
///   halts the CPU until the next interrupt (e.g. `wfi`); there is no wake
///   object, the millisecond tick interrupt itself ends the sleep.
/// - **OS-backed** (`WAKE_SIGNAL = true`): [`idle_sleep_ms`](Platform::idle_sleep_ms)
///   blocks the scheduler thread on a wake object with a bounded timeout,
///   and [`signal_wake`](Platform::signal_wake) releases it early from ISR
///   context. A "give" persists across a subsequent "take", so a wake that
///   arrives before the sleep is not lost.
pub trait Platform: Sync {
    /// Whether this platform has a wake object backing `idle_sleep_ms` /
    /// `signal_wake`. Selects the dispatcher's sleep strategy at compile
    /// time.
    const WAKE_SIGNAL: bool = false;

    /// Tick granularity of the bounded sleep in milliseconds. The
    /// dispatcher shortens every bounded sleep by one tick so it wakes no
    /// later than the next deadline.
    const TICK_MS: u32 = 1;

    /// Monotonic millisecond counter; wraps at 2³².
    fn now_ms(&self) -> u32;

    /// Monotonic microsecond counter; wraps at 2³². Used for profiling and
    /// event timestamps only — scheduling decisions are millisecond-based.
    fn now_us(&self) -> u32;

    /// Halt until the next interrupt (bare-metal platforms).
    fn idle_sleep(&self);

    /// Block on the wake object for at most `ms` milliseconds (OS-backed
    /// platforms). Released early by [`signal_wake`](Platform::signal_wake).
    fn idle_sleep_ms(&self, ms: u32) {
        let _ = ms;
        self.idle_sleep();
    }

    /// ISR-safe signal to the wake object. No-op on bare-metal platforms.
    fn signal_wake(&self) {}
}

impl<P: Platform> Platform for &P {
    const WAKE_SIGNAL: bool = P::WAKE_SIGNAL;
    const TICK_MS: u32 = P::TICK_MS;

    fn now_ms(&self) -> u32 {
        (**self).now_ms()
    }

    fn now_us(&self) -> u32 {
        (**self).now_us()
    }

    fn idle_sleep(&self) {
        (**self).idle_sleep()
    }

    fn idle_sleep_ms(&self, ms: u32) {
        (**self).idle_sleep_ms(ms)
    }

    fn signal_wake(&self) {
        (**self).signal_wake()
    }
}

/// A 32-bit timestamp source, selectable per consumer.
///
/// The event interrupt adapter and the trace-log tasks take one of these
/// instead of a whole [`Platform`], so the resolution (microseconds or
/// milliseconds) is chosen where the adapter is constructed.
pub trait TimestampSource: Sync {
    fn now(&self) -> u32;
}

/// Microsecond [`TimestampSource`] borrowed from a platform.
pub struct Micros<'a, P: Platform>(pub &'a P);

impl<P: Platform> TimestampSource for Micros<'_, P> {
    fn now(&self) -> u32 {
        self.0.now_us()
    }
}

/// Millisecond [`TimestampSource`] borrowed from a platform.
pub struct Millis<'a, P: Platform>(pub &'a P);

impl<P: Platform> TimestampSource for Millis<'_, P> {
    fn now(&self) -> u32 {
        self.0.now_ms()
    }
}
