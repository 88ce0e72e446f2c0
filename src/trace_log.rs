//! # Trace Logging Tasks
//!
//! Periodic tasks that consume a profiler snapshot and render it as
//! tab-separated text lines to a [`TraceSink`]. One variant per profiler:
//! [`TraceLogTask`] for [`AggregateProfiler`], [`PerTaskTraceLogTask`]
//! for [`PerTaskProfiler`].
//!
//! Output layout:
//!
//! ```text
//! ID      CPU(%)  CALLS   TIME(us)        MAX(us)
//! BUSY    3       1024    31250           1000000
//! IDLE    96
//! SLEEP   0               0
//! -----------------------------------------------
//! Log     0       1       83              91
//! ```

use core::fmt::Write;
use core::sync::atomic::{AtomicI32, AtomicU32, Ordering};

use heapless::String;

use crate::platform::TimestampSource;
use crate::profile::{AggregateProfiler, PerTaskProfiler, TaskTrace};
use crate::registry::{AttachError, Schedule};
use crate::task::{Task, TaskHandle, TaskId};

const LOG_HEADER: &str = "ID\tCPU(%)\tCALLS\tTIME(us)\tMAX(us)";
const SEPARATOR_WIDTH: usize = 47;

/// Destination for rendered trace lines. Implementations forward to a
/// serial port, a log buffer, RTT, or anything else line-shaped.
pub trait TraceSink: Sync {
    fn write_line(&self, line: &str);
}

type Line = String<64>;

fn percent(part: u32, total: u32) -> u32 {
    if total > 0 {
        ((u64::from(part) * 100) / u64::from(total)) as u32
    } else {
        0
    }
}

fn write_separator(sink: &dyn TraceSink) {
    let mut line = Line::new();
    for _ in 0..SEPARATOR_WIDTH {
        let _ = line.push('-');
    }
    sink.write_line(&line);
}

/// Periodic logger for the aggregate profiler.
///
/// Each run snapshots the profiler window (which resets it) and emits the
/// BUSY/IDLE/SLEEP summary plus a self-measuring `Log` row. Windows with
/// no iterations emit nothing.
pub struct TraceLogTask<'a> {
    handle: TaskHandle<'a>,
    profiler: &'a AggregateProfiler,
    sink: &'a dyn TraceSink,
    clock: &'a dyn TimestampSource,
    /// Duration of the previous log pass in µs; negative until the first
    /// pass has been measured.
    last_log_us: AtomicI32,
    max_log_us: AtomicU32,
}

impl<'a> TraceLogTask<'a> {
    pub const fn new(
        profiler: &'a AggregateProfiler,
        sink: &'a dyn TraceSink,
        clock: &'a dyn TimestampSource,
    ) -> Self {
        Self {
            handle: TaskHandle::new(),
            profiler,
            sink,
            clock,
            last_log_us: AtomicI32::new(i32::MIN),
            max_log_us: AtomicU32::new(0),
        }
    }

    /// Attach to the scheduler, logging every `period_ms`.
    pub fn start(
        &'a self,
        registry: &'a dyn Schedule<'a>,
        period_ms: u32,
    ) -> Result<TaskId, AttachError> {
        self.handle.attach(registry, self, period_ms, true)
    }

    pub fn stop(&self) -> bool {
        self.handle.detach()
    }
}

impl Task for TraceLogTask<'_> {
    fn run(&self) {
        let log_start = self.clock.now();
        let Some(trace) = self.profiler.take_trace() else {
            return;
        };

        let trace_time = trace.scheduling_us.wrapping_add(trace.idle_sleep_us);
        let idle_time = trace.scheduling_us.saturating_sub(trace.busy_us);

        self.sink.write_line("");
        self.sink.write_line(LOG_HEADER);

        let mut line = Line::new();
        let _ = write!(
            line,
            "BUSY\t{}\t{}\t{}\t\t{}",
            percent(trace.busy_us, trace_time),
            trace.iterations,
            trace.busy_us,
            trace_time
        );
        self.sink.write_line(&line);

        line.clear();
        let _ = write!(line, "IDLE\t{}", percent(idle_time, trace_time));
        self.sink.write_line(&line);

        line.clear();
        let _ = write!(
            line,
            "SLEEP\t{}\t\t{}",
            percent(trace.idle_sleep_us, trace_time),
            trace.idle_sleep_us
        );
        self.sink.write_line(&line);

        write_separator(self.sink);

        let last_log = self.last_log_us.load(Ordering::Relaxed);
        line.clear();
        if last_log >= 0 {
            let _ = write!(
                line,
                "Log\t{}\t1\t{}\t\t{}",
                percent(last_log as u32, trace_time),
                last_log,
                self.max_log_us.load(Ordering::Relaxed)
            );
        } else {
            // First window: approximate with the duration so far.
            let first = self.clock.now().wrapping_sub(log_start);
            let _ = write!(line, "Log\t0\t1\t{first}\t\t{first}");
        }
        self.sink.write_line(&line);

        let duration = self.clock.now().wrapping_sub(log_start) as i32;
        self.last_log_us.store(duration, Ordering::Relaxed);
        if duration > 0 && self.max_log_us.load(Ordering::Relaxed) < duration as u32 {
            self.max_log_us.store(duration as u32, Ordering::Relaxed);
        }
    }

    fn on_task_id_updated(&self, id: TaskId) {
        self.handle.on_task_id_updated(id);
    }
}

/// Periodic logger for the per-task profiler: the aggregate summary plus
/// one row per task, with this task's own row tagged `Log`.
pub struct PerTaskTraceLogTask<'a, const N: usize> {
    handle: TaskHandle<'a>,
    profiler: &'a PerTaskProfiler<N>,
    sink: &'a dyn TraceSink,
}

impl<'a, const N: usize> PerTaskTraceLogTask<'a, N> {
    pub const fn new(profiler: &'a PerTaskProfiler<N>, sink: &'a dyn TraceSink) -> Self {
        Self {
            handle: TaskHandle::new(),
            profiler,
            sink,
        }
    }

    /// Attach to the scheduler, logging every `period_ms`.
    pub fn start(
        &'a self,
        registry: &'a dyn Schedule<'a>,
        period_ms: u32,
    ) -> Result<TaskId, AttachError> {
        self.handle.attach(registry, self, period_ms, true)
    }

    pub fn stop(&self) -> bool {
        self.handle.detach()
    }
}

impl<const N: usize> Task for PerTaskTraceLogTask<'_, N> {
    fn run(&self) {
        let mut tasks = [TaskTrace::default(); N];
        let Some(trace) = self.profiler.take_trace(&mut tasks) else {
            return;
        };

        let task_count = trace.task_count.min(N);
        let busy_us: u32 = tasks[..task_count]
            .iter()
            .fold(0, |sum, t| sum.wrapping_add(t.duration_us));
        let trace_time = trace.scheduling_us.wrapping_add(trace.idle_sleep_us);
        let idle_time = trace.scheduling_us.saturating_sub(busy_us);

        self.sink.write_line("");
        self.sink.write_line(LOG_HEADER);

        let mut line = Line::new();
        let _ = write!(
            line,
            "BUSY\t{}\t{}\t{}\t\t{}",
            percent(busy_us, trace_time),
            trace.iterations,
            busy_us,
            trace_time
        );
        self.sink.write_line(&line);

        line.clear();
        let _ = write!(line, "IDLE\t{}", percent(idle_time, trace_time));
        self.sink.write_line(&line);

        line.clear();
        let _ = write!(
            line,
            "SLEEP\t{}\t\t{}",
            percent(trace.idle_sleep_us, trace_time),
            trace.idle_sleep_us
        );
        self.sink.write_line(&line);

        write_separator(self.sink);

        let own = self.handle.task_id();
        for (slot, task) in tasks[..task_count].iter().enumerate() {
            line.clear();
            if own.index() == slot {
                let _ = write!(line, "Log");
            } else {
                let _ = write!(line, "Task{slot}");
            }
            let _ = write!(
                line,
                "\t{}\t{}\t{}\t\t{}",
                percent(task.duration_us, trace_time),
                task.iterations,
                task.duration_us,
                task.max_duration_us
            );
            self.sink.write_line(&line);
        }
    }

    fn on_task_id_updated(&self, id: TaskId) {
        self.handle.on_task_id_updated(id);
    }
}
