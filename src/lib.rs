//! # Ostinato — cooperative millisecond task scheduler
//!
//! A cooperative, statically-sized, millisecond-granularity task scheduler
//! for resource-constrained single-core microcontrollers.
//!
//! ## Overview
//!
//! Ostinato runs a fixed set of tasks from a tight main-loop dispatcher.
//! Each task declares a period in milliseconds; the dispatcher fires tasks
//! that are due, integrates with interrupt service routines so ISRs can wake
//! tasks on external events, and optionally puts the CPU to sleep between
//! ticks to save power.
//!
//! - **No preemption**: tasks run to completion, in ascending id order.
//! - **No heap**: all state is statically sized; capacity is a compile-time
//!   constant.
//! - **ISR-safe wake**: `wake_from_isr` is a pair of guarded stores; the
//!   woken task runs on the next dispatcher pass.
//! - **Late-bias timing**: a task never fires earlier than its nominal
//!   period; an overrun is absorbed by at most one catch-up firing.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                    Application Tasks                     │
//! ├─────────────────────────────────────────────────────────┤
//! │   Task surface (task.rs · interrupt.rs · compat.rs)     │
//! │   Task · TaskHandle · CallableTask · Flag/Signal/Event  │
//! ├──────────────┬───────────────────────┬──────────────────┤
//! │  Dispatcher  │   Registry            │  Profiling       │
//! │  scheduler.rs│   registry.rs         │  profile.rs      │
//! │  ─ run_once()│   ─ attach()/detach() │  ─ NoProfiler    │
//! │  ─ idle sleep│   ─ wake_from_isr()   │  ─ Aggregate     │
//! │              │   ─ hot flag          │  ─ PerTask       │
//! ├──────────────┴───────────────────────┴──────────────────┤
//! │              Tracker (tracker.rs)                        │
//! │    period · last_run · enabled · run_if_due()            │
//! ├─────────────────────────────────────────────────────────┤
//! │            Platform port (platform/)                     │
//! │    now_ms · now_us · idle_sleep · wake signal            │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Memory model
//!
//! - **No heap, no `alloc`**: pure `core` plus fixed buffers.
//! - **Fixed tracker table**: `[TaskTracker; N]`, `N` per registry
//!   instantiation, at most 255 slots.
//! - **Shared state**: fields mutable from ISR context are word atomics;
//!   compound updates and snapshots use the `critical-section` guard.
//!
//! ## Example
//!
//! ```
//! use ostinato::platform::MockPlatform;
//! use ostinato::profile::NoProfiler;
//! use ostinato::{CallableTask, Scheduler, TaskRegistry};
//!
//! let clock = MockPlatform::new();
//! let blink = || { /* toggle a pin */ };
//! let task = CallableTask::new(&blink);
//! let registry: TaskRegistry<_, 4> = TaskRegistry::new(&clock);
//! task.attach(&registry, 500, true).unwrap();
//!
//! let profiler = NoProfiler;
//! let scheduler: Scheduler<_, _, 4, false> = Scheduler::new(&registry, &profiler);
//! scheduler.run_once();
//! ```

#![cfg_attr(not(test), no_std)]

pub mod compat;
pub mod config;
pub mod interrupt;
pub mod platform;
pub mod profile;
pub mod registry;
pub mod scheduler;
pub mod sync;
pub mod task;
pub mod trace_log;
pub mod tracker;

pub use platform::Platform;
pub use registry::{AttachError, Schedule, TaskRegistry};
pub use scheduler::Scheduler;
pub use task::{CallableTask, Task, TaskHandle, TaskId, TaskWrapper};
