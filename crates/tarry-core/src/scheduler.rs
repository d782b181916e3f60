use web_time::Duration;

use crate::event_loop::{EventLoop, TaskId};

/// Which primitive family a [`Scheduler`] uses. Chosen once, never mixed.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum SchedulerKind {
    /// Fixed-duration timers.
    FixedDelay,
    /// Next frame tick; the requested duration is ignored.
    FrameSynced,
}

/// Handle to one scheduled callback, tagged with the family that created it.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct ScheduledTask {
    id: TaskId,
    kind: SchedulerKind,
}

#[derive(Clone)]
pub struct Scheduler {
    kind: SchedulerKind,
    event_loop: EventLoop,
}

impl Scheduler {
    pub fn new(event_loop: EventLoop, kind: SchedulerKind) -> Self {
        Self { kind, event_loop }
    }

    /// Frame-synced only when no delay was given at all and the loop has a
    /// frame source. An explicit zero stays on timers.
    pub fn select(event_loop: EventLoop, delay: Option<Duration>) -> Self {
        let kind = if delay.is_none() && event_loop.frames_available() {
            SchedulerKind::FrameSynced
        } else {
            SchedulerKind::FixedDelay
        };
        Self::new(event_loop, kind)
    }

    pub fn kind(&self) -> SchedulerKind {
        self.kind
    }

    pub fn event_loop(&self) -> &EventLoop {
        &self.event_loop
    }

    pub fn schedule_once(
        &self,
        callback: impl FnOnce() -> anyhow::Result<()> + 'static,
        delay: Duration,
    ) -> ScheduledTask {
        let id = match self.kind {
            SchedulerKind::FixedDelay => self.event_loop.set_timeout(callback, delay),
            SchedulerKind::FrameSynced => self.event_loop.request_frame(callback),
        };
        ScheduledTask {
            id,
            kind: self.kind,
        }
    }

    pub fn cancel(&self, task: ScheduledTask) {
        debug_assert_eq!(task.kind, self.kind);
        match task.kind {
            SchedulerKind::FixedDelay => self.event_loop.clear_timeout(task.id),
            SchedulerKind::FrameSynced => self.event_loop.cancel_frame(task.id),
        };
    }
}
