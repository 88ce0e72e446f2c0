//! # Cortex-M Port
//!
//! Bare-metal platform implementation for ARM Cortex-M (Thumb-2):
//!
//! - **Milliseconds**: a SysTick interrupt at [`TICK_HZ`] increments a
//!   free-running counter.
//! - **Microseconds**: the DWT cycle counter divided by the core clock.
//! - **Idle sleep**: `wfi` — the next interrupt (usually SysTick itself)
//!   resumes the dispatcher within a millisecond.
//!
//! This port owns the `SysTick` exception; link exactly one of it per
//! firmware image.

use core::sync::atomic::{AtomicU32, Ordering};

use cortex_m::peripheral::syst::SystClkSource;
use cortex_m::peripheral::{DCB, DWT, SYST};

use crate::config::TICK_HZ;

use super::Platform;

/// Milliseconds since [`CortexM::init`], driven by SysTick.
static MILLIS: AtomicU32 = AtomicU32::new(0);

/// DWT cycles per microsecond, set once during init.
static CYCLES_PER_US: AtomicU32 = AtomicU32::new(1);

/// Bare-metal Cortex-M platform. Zero-sized; all state lives in the
/// SysTick counter and the DWT.
pub struct CortexM;

impl CortexM {
    /// Configure SysTick as the millisecond tick and the DWT cycle counter
    /// as the microsecond source.
    ///
    /// Call once during startup, before the scheduler loop:
    ///
    /// ```ignore
    /// let mut cp = cortex_m::Peripherals::take().unwrap();
    /// CortexM::init(&mut cp.SYST, &mut cp.DWT, &mut cp.DCB, SYSTEM_CLOCK_HZ);
    /// ```
    pub fn init(syst: &mut SYST, dwt: &mut DWT, dcb: &mut DCB, sysclk_hz: u32) {
        CYCLES_PER_US.store(sysclk_hz / 1_000_000, Ordering::Relaxed);

        dcb.enable_trace();
        dwt.enable_cycle_counter();

        syst.set_clock_source(SystClkSource::Core);
        syst.set_reload(sysclk_hz / TICK_HZ - 1);
        syst.clear_current();
        syst.enable_counter();
        syst.enable_interrupt();
    }
}

impl Platform for CortexM {
    fn now_ms(&self) -> u32 {
        MILLIS.load(Ordering::Relaxed)
    }

    fn now_us(&self) -> u32 {
        DWT::cycle_count() / CYCLES_PER_US.load(Ordering::Relaxed)
    }

    fn idle_sleep(&self) {
        cortex_m::asm::wfi();
    }
}

/// SysTick exception handler — advances the millisecond counter.
#[no_mangle]
extern "C" fn SysTick() {
    MILLIS.fetch_add(1, Ordering::Relaxed);
}
