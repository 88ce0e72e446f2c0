//! Host-side mock platform.
//!
//! A manually advanced clock for unit tests, behavior tests and
//! simulation. `idle_sleep` models "halt until the next millisecond tick"
//! by advancing the clock one millisecond; the OS-backed variant advances
//! by the requested duration and records wake signals.

use core::sync::atomic::{AtomicU32, Ordering};

use super::Platform;

/// Bare-metal mock: no wake object, sleeping advances time by one tick.
pub struct MockPlatform {
    now_us: AtomicU32,
    sleep_count: AtomicU32,
}

impl MockPlatform {
    pub const fn new() -> Self {
        Self {
            now_us: AtomicU32::new(0),
            sleep_count: AtomicU32::new(0),
        }
    }

    /// Advance the clock by `ms` milliseconds.
    pub fn advance(&self, ms: u32) {
        self.advance_us(ms.wrapping_mul(1000));
    }

    /// Advance the clock by `us` microseconds.
    pub fn advance_us(&self, us: u32) {
        self.now_us.fetch_add(us, Ordering::Relaxed);
    }

    /// Jump the clock to an absolute millisecond value.
    pub fn set_now_ms(&self, ms: u32) {
        self.now_us.store(ms.wrapping_mul(1000), Ordering::Relaxed);
    }

    /// How many times `idle_sleep` was entered.
    pub fn sleep_count(&self) -> u32 {
        self.sleep_count.load(Ordering::Relaxed)
    }
}

impl Default for MockPlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl Platform for MockPlatform {
    fn now_ms(&self) -> u32 {
        self.now_us.load(Ordering::Relaxed) / 1000
    }

    fn now_us(&self) -> u32 {
        self.now_us.load(Ordering::Relaxed)
    }

    fn idle_sleep(&self) {
        self.sleep_count.fetch_add(1, Ordering::Relaxed);
        self.advance(1);
    }
}

/// OS-backed mock: bounded sleeps advance the full duration unless a wake
/// signal is pending, and every `signal_wake` is counted.
pub struct MockOsPlatform {
    inner: MockPlatform,
    slept_ms: AtomicU32,
    wake_pending: AtomicU32,
    wake_count: AtomicU32,
}

impl MockOsPlatform {
    pub const fn new() -> Self {
        Self {
            inner: MockPlatform::new(),
            slept_ms: AtomicU32::new(0),
            wake_pending: AtomicU32::new(0),
            wake_count: AtomicU32::new(0),
        }
    }

    pub fn advance(&self, ms: u32) {
        self.inner.advance(ms);
    }

    /// Total milliseconds spent in bounded sleeps.
    pub fn slept_ms(&self) -> u32 {
        self.slept_ms.load(Ordering::Relaxed)
    }

    /// How many times `signal_wake` was called.
    pub fn wake_count(&self) -> u32 {
        self.wake_count.load(Ordering::Relaxed)
    }
}

impl Default for MockOsPlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl Platform for MockOsPlatform {
    const WAKE_SIGNAL: bool = true;

    fn now_ms(&self) -> u32 {
        self.inner.now_ms()
    }

    fn now_us(&self) -> u32 {
        self.inner.now_us()
    }

    fn idle_sleep(&self) {
        self.inner.idle_sleep();
    }

    fn idle_sleep_ms(&self, ms: u32) {
        // A pending "give" is consumed by the "take" and ends the sleep
        // immediately, mirroring a binary semaphore.
        if self.wake_pending.swap(0, Ordering::Relaxed) == 0 {
            self.inner.advance(ms);
            self.slept_ms.fetch_add(ms, Ordering::Relaxed);
        }
    }

    fn signal_wake(&self) {
        self.wake_pending.store(1, Ordering::Relaxed);
        self.wake_count.fetch_add(1, Ordering::Relaxed);
    }
}
