//! # Synchronization Primitives
//!
//! Interrupt-safe critical section abstractions. All scheduler state that
//! is shared with ISRs is either a word-sized atomic or accessed within a
//! critical section.
//!
//! The guard comes from the [`critical-section`] crate: the final binary
//! selects the implementation (e.g. `cortex-m`'s single-core PRIMASK
//! save/mask/restore, or the `std` backend under test). Nested sections
//! are permitted; only the outermost restores the interrupt state.
//!
//! [`critical-section`]: https://docs.rs/critical-section

pub use critical_section::{CriticalSection, Mutex};

/// Execute a closure within a critical section.
///
/// This is the primary mechanism for compound reads and writes of shared
/// scheduler state: a `(period, enabled)` pair update, a counter
/// snapshot-and-clear, a tracker slot move. Single word loads and stores
/// go through atomics instead and do not need the guard.
///
/// # Performance
/// Keep critical sections as short as possible to minimize interrupt
/// latency. Every section in this crate is a bounded handful of loads and
/// stores; user callbacks always run outside the guard.
#[inline]
pub fn critical_section<F, R>(f: F) -> R
where
    F: FnOnce(CriticalSection<'_>) -> R,
{
    critical_section::with(f)
}
