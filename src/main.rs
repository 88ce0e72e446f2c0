//! # Ostinato Example Firmware
//!
//! Demonstrates the cooperative scheduler with three tasks:
//!
//! | Task | Period | Behavior |
//! |------|--------|----------|
//! | `HeartbeatTask` | 500 ms | Toggles a heartbeat counter |
//! | `SensorTask` | 50 ms | Simulated sensor poll, self-throttles |
//! | `FlagTask` (button) | on demand | Woken from the EXTI ISR, counts presses |
//!
//! The registry and all tasks live in `static`s — `TaskRegistry::new` and
//! the task constructors are `const`, so no runtime init or `unsafe` is
//! needed. The main loop is `Scheduler::run()` with idle sleep enabled:
//! between deadlines the core executes `wfi` and wakes on the next
//! SysTick or external interrupt.

#![no_std]
#![no_main]

use core::sync::atomic::{AtomicU32, Ordering};

use cortex_m_rt::entry;
use panic_halt as _;

use ostinato::config::SYSTEM_CLOCK_HZ;
use ostinato::interrupt::{FlagListener, FlagTask};
use ostinato::platform::CortexM;
use ostinato::profile::NoProfiler;
use ostinato::{Scheduler, Task, TaskHandle, TaskId, TaskRegistry};

// ---------------------------------------------------------------------------
// Tasks
// ---------------------------------------------------------------------------

/// Periodic heartbeat. In a real firmware this would toggle an LED.
struct HeartbeatTask {
    handle: TaskHandle<'static>,
    beats: AtomicU32,
}

impl HeartbeatTask {
    const fn new() -> Self {
        Self {
            handle: TaskHandle::new(),
            beats: AtomicU32::new(0),
        }
    }
}

impl Task for HeartbeatTask {
    fn run(&self) {
        self.beats.fetch_add(1, Ordering::Relaxed);
    }

    fn on_task_id_updated(&self, id: TaskId) {
        self.handle.on_task_id_updated(id);
    }
}

/// Simulated sensor poll. Slows itself down once enough samples are in,
/// showing a task re-scheduling itself through its handle.
struct SensorTask {
    handle: TaskHandle<'static>,
    samples: AtomicU32,
}

impl SensorTask {
    const fn new() -> Self {
        Self {
            handle: TaskHandle::new(),
            samples: AtomicU32::new(0),
        }
    }
}

impl Task for SensorTask {
    fn run(&self) {
        let samples = self.samples.fetch_add(1, Ordering::Relaxed) + 1;
        if samples == 1000 {
            // Warm-up finished: drop from 20 Hz to 1 Hz.
            self.handle.set_period(1000);
        }
    }

    fn on_task_id_updated(&self, id: TaskId) {
        self.handle.on_task_id_updated(id);
    }
}

/// Receives coalesced button presses in cooperative context.
struct ButtonListener {
    presses: AtomicU32,
}

impl FlagListener for ButtonListener {
    fn on_flag_interrupt(&self) {
        self.presses.fetch_add(1, Ordering::Relaxed);
    }
}

// ---------------------------------------------------------------------------
// Static instances
// ---------------------------------------------------------------------------

static REGISTRY: TaskRegistry<'static, CortexM, 8> = TaskRegistry::new(CortexM);
static PROFILER: NoProfiler = NoProfiler;

static HEARTBEAT: HeartbeatTask = HeartbeatTask::new();
static SENSOR: SensorTask = SensorTask::new();
static BUTTON: FlagTask<'static> = FlagTask::new();
static BUTTON_LISTENER: ButtonListener = ButtonListener {
    presses: AtomicU32::new(0),
};

/// Wire this into the board's button EXTI handler:
///
/// ```ignore
/// #[interrupt]
/// fn EXTI0() {
///     on_button_isr();
/// }
/// ```
#[allow(dead_code)]
fn on_button_isr() {
    BUTTON.on_interrupt();
}

// ---------------------------------------------------------------------------
// Main entry point
// ---------------------------------------------------------------------------

#[entry]
fn main() -> ! {
    let mut cp = cortex_m::Peripherals::take().unwrap();
    CortexM::init(&mut cp.SYST, &mut cp.DWT, &mut cp.DCB, SYSTEM_CLOCK_HZ);

    HEARTBEAT
        .handle
        .attach(&REGISTRY, &HEARTBEAT, 500, true)
        .expect("Failed to attach heartbeat task");
    SENSOR
        .handle
        .attach(&REGISTRY, &SENSOR, 50, true)
        .expect("Failed to attach sensor task");
    BUTTON
        .attach(&REGISTRY, &BUTTON_LISTENER)
        .expect("Failed to attach button task");

    let scheduler: Scheduler<CortexM, NoProfiler, 8, true> = Scheduler::new(&REGISTRY, &PROFILER);
    scheduler.run()
}
