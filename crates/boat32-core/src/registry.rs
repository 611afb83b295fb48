//! Task registry and diagnostics
//!
//! Every long-lived task is listed here in startup order. Tasks record a
//! heartbeat after each cycle; the diagnostics loop walks the registry and
//! reports how long ago each task last made progress.

use core::sync::atomic::{AtomicU32, Ordering};

use embassy_time::{Duration, Instant, Timer};
use log::info;

use crate::app_state::{DebugFlags, DebugSwitch};

/// Sentinel for a task that has not completed a cycle yet.
const NEVER: u32 = u32::MAX;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskId {
    Status,
    SerialWriter,
    Commands,
    Connectivity,
    StatusServer,
    Requests,
    Temperature,
    Position,
    Instrumentation,
    Auxiliary,
    Control,
    Diagnostics,
}

impl TaskId {
    pub const COUNT: usize = 12;

    pub const ALL: [TaskId; Self::COUNT] = [
        Self::Status,
        Self::SerialWriter,
        Self::Commands,
        Self::Connectivity,
        Self::StatusServer,
        Self::Requests,
        Self::Temperature,
        Self::Position,
        Self::Instrumentation,
        Self::Auxiliary,
        Self::Control,
        Self::Diagnostics,
    ];

    pub const fn name(self) -> &'static str {
        match self {
            Self::Status => "status",
            Self::SerialWriter => "serial-writer",
            Self::Commands => "commands",
            Self::Connectivity => "connectivity",
            Self::StatusServer => "status-server",
            Self::Requests => "requests",
            Self::Temperature => "temperature",
            Self::Position => "position",
            Self::Instrumentation => "instrumentation",
            Self::Auxiliary => "auxiliary",
            Self::Control => "control",
            Self::Diagnostics => "diagnostics",
        }
    }

    const fn index(self) -> usize {
        self as usize
    }
}

struct TaskEntry {
    /// Milliseconds since boot of the last heartbeat, or [`NEVER`]
    last_beat_ms: AtomicU32,
    cycles: AtomicU32,
}

impl TaskEntry {
    const fn new() -> Self {
        Self {
            last_beat_ms: AtomicU32::new(NEVER),
            cycles: AtomicU32::new(0),
        }
    }
}

/// One line of the diagnostics report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskReport {
    pub id: TaskId,
    pub cycles: u32,
    /// Time since the last heartbeat; `None` if the task never completed a cycle
    pub idle: Option<Duration>,
}

pub struct TaskRegistry {
    entries: [TaskEntry; TaskId::COUNT],
}

impl Default for TaskRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskRegistry {
    pub const fn new() -> Self {
        Self {
            entries: [const { TaskEntry::new() }; TaskId::COUNT],
        }
    }

    pub fn heartbeat(&self, id: TaskId) -> Heartbeat<'_> {
        Heartbeat { registry: self, id }
    }

    fn beat(&self, id: TaskId, now: Instant) {
        let entry = &self.entries[id.index()];
        // Wraps after ~49 days of uptime; only the relative age is reported.
        let ms = (now.as_millis() as u32).min(NEVER - 1);
        entry.last_beat_ms.store(ms, Ordering::Relaxed);
        entry.cycles.fetch_add(1, Ordering::Relaxed);
    }

    pub fn report(&self, id: TaskId, now: Instant) -> TaskReport {
        let entry = &self.entries[id.index()];
        let last = entry.last_beat_ms.load(Ordering::Relaxed);
        let idle = (last != NEVER).then(|| {
            let now_ms = now.as_millis() as u32;
            Duration::from_millis(u64::from(now_ms.wrapping_sub(last)))
        });

        TaskReport {
            id,
            cycles: entry.cycles.load(Ordering::Relaxed),
            idle,
        }
    }

    /// Reports for every task in registration order.
    pub fn reports(&self, now: Instant) -> impl Iterator<Item = TaskReport> + '_ {
        TaskId::ALL.into_iter().map(move |id| self.report(id, now))
    }
}

/// Handle a task uses to record progress.
#[derive(Clone, Copy)]
pub struct Heartbeat<'a> {
    registry: &'a TaskRegistry,
    id: TaskId,
}

impl Heartbeat<'_> {
    pub fn beat(&self) {
        self.registry.beat(self.id, Instant::now());
    }

    pub fn id(&self) -> TaskId {
        self.id
    }
}

/// Periodic task report, logged only while `HIGH_WATER` is enabled.
pub struct Diagnostics<'a, H> {
    pub registry: &'a TaskRegistry,
    pub debug: &'a DebugSwitch,
    /// Free heap in bytes
    pub free_heap: H,
    pub period: Duration,
}

impl<H: Fn() -> usize> Diagnostics<'_, H> {
    pub fn log_report(&self) {
        let now = Instant::now();
        info!(target: "task", "Free heap: {} bytes", (self.free_heap)());
        for report in self.registry.reports(now) {
            match report.idle {
                Some(idle) => info!(
                    target: "task",
                    "{}: {} cycles, last active {} ms ago",
                    report.id.name(),
                    report.cycles,
                    idle.as_millis()
                ),
                None => info!(target: "task", "{}: not started", report.id.name()),
            }
        }
    }

    pub async fn step(&self) {
        Timer::after(self.period).await;
        if self.debug.enabled(DebugFlags::HIGH_WATER) {
            self.log_report();
        }
    }

    pub async fn run(self, heartbeat: Heartbeat<'_>) -> ! {
        loop {
            self.step().await;
            heartbeat.beat();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_registered_in_order() {
        for (index, id) in TaskId::ALL.iter().enumerate() {
            assert_eq!(id.index(), index);
        }
    }

    #[test]
    fn test_reports_track_heartbeats() {
        let registry = TaskRegistry::new();
        let start = Instant::from_millis(1_000);

        assert_eq!(registry.report(TaskId::Control, start).idle, None);

        registry.beat(TaskId::Control, start);
        registry.beat(TaskId::Control, start + Duration::from_millis(5));

        let report = registry.report(TaskId::Control, start + Duration::from_millis(105));
        assert_eq!(report.cycles, 2);
        assert_eq!(report.idle, Some(Duration::from_millis(100)));
        assert_eq!(registry.report(TaskId::Temperature, start).cycles, 0);
    }

    #[test]
    fn test_reports_cover_every_task() {
        let registry = TaskRegistry::new();
        let names: std::vec::Vec<_> = registry
            .reports(Instant::from_millis(0))
            .map(|r| r.id.name())
            .collect();
        assert_eq!(names.len(), TaskId::COUNT);
        assert_eq!(names[0], "status");
        assert_eq!(names[TaskId::COUNT - 1], "diagnostics");
    }
}
