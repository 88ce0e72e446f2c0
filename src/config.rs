//! # Configuration
//!
//! Compile-time constants governing scheduler limits and the Cortex-M port.
//! All limits are fixed at compile time — no dynamic allocation.

/// Hard upper bound on registry capacity. Task ids are `u8` and the
/// all-ones value is reserved as the "unregistered" sentinel, so at most
/// 255 slots can ever be addressed.
pub const MAX_TASK_CAPACITY: usize = 255;

/// SysTick frequency in Hz for the Cortex-M port. One interrupt per
/// millisecond drives the scheduler's monotonic millisecond counter.
pub const TICK_HZ: u32 = 1000;

/// System clock frequency in Hz used by the demo firmware
/// (STM32F4 at 16 MHz HSI). Real applications pass their own clock
/// frequency to `platform::CortexM::init`.
#[cfg(feature = "rt")]
pub const SYSTEM_CLOCK_HZ: u32 = 16_000_000;
