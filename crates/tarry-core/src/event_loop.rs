//! Single-threaded event loop with two scheduling primitives: fixed-duration
//! timers and frame callbacks.
//!
//! Nothing here runs on its own. A host drives the loop with [`EventLoop::run_due`]
//! / [`EventLoop::tick_frame`] from its own event pump, and tests drive it with
//! [`EventLoop::run_for`] on top of a [`ManualClock`].

use std::cell::{Cell, RefCell};
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::rc::Rc;
use std::sync::Arc;

use slotmap::{SlotMap, new_key_type};
use smallvec::SmallVec;
use web_time::{Duration, Instant};

use crate::clock::{Clock, ManualClock, SystemClock};

new_key_type! {
    /// Generational id of a scheduled timer or frame callback.
    pub struct TaskId;
}

pub type Callback = Box<dyn FnOnce() -> anyhow::Result<()>>;

// deadlines past what `Instant` can hold saturate here and never come due
const FAR_FUTURE: Duration = Duration::from_secs(60 * 60 * 24 * 365 * 30);

fn deadline_after(now: Instant, delay: Duration) -> Instant {
    now.checked_add(delay)
        .or_else(|| now.checked_add(FAR_FUTURE))
        .unwrap_or(now)
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum TaskKind {
    Timer,
    Frame,
}

struct Task {
    kind: TaskKind,
    callback: Callback,
}

struct LoopState {
    tasks: SlotMap<TaskId, Task>,
    // (deadline, insertion order, id); cancelled ids are dropped lazily
    timers: BinaryHeap<Reverse<(Instant, u64, TaskId)>>,
    frames: SmallVec<[TaskId; 4]>,
    next_seq: u64,
    last_frame: Instant,
    unhandled: Vec<anyhow::Error>,
}

impl LoopState {
    fn prune(&mut self) {
        while let Some(Reverse((_, _, id))) = self.timers.peek() {
            if self.tasks.contains_key(*id) {
                break;
            }
            self.timers.pop();
        }
    }
}

struct LoopInner {
    clock: Arc<dyn Clock>,
    frame_interval: Cell<Option<Duration>>,
    state: RefCell<LoopState>,
}

enum Due {
    Timer(Instant, Callback),
    Frame(Instant),
}

#[derive(Clone)]
pub struct EventLoop {
    inner: Rc<LoopInner>,
}

impl EventLoop {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        let now = clock.now();
        Self {
            inner: Rc::new(LoopInner {
                clock,
                frame_interval: Cell::new(None),
                state: RefCell::new(LoopState {
                    tasks: SlotMap::with_key(),
                    timers: BinaryHeap::new(),
                    frames: SmallVec::new(),
                    next_seq: 0,
                    last_frame: now,
                    unhandled: Vec::new(),
                }),
            }),
        }
    }

    /// Loop on a [`ManualClock`]; returns the clock so tests can read or move it.
    pub fn manual() -> (Self, ManualClock) {
        let clock = ManualClock::default();
        (Self::new(Arc::new(clock.clone())), clock)
    }

    /// Enables a frame source ticking every `interval`.
    pub fn with_frames(self, interval: Duration) -> Self {
        self.inner.frame_interval.set(Some(interval));
        self
    }

    /// Whether this loop ticks frames by itself while it runs.
    pub fn frames_available(&self) -> bool {
        self.inner.frame_interval.get().is_some()
    }

    pub fn now(&self) -> Instant {
        self.inner.clock.now()
    }

    pub fn set_timeout(
        &self,
        callback: impl FnOnce() -> anyhow::Result<()> + 'static,
        delay: Duration,
    ) -> TaskId {
        let deadline = deadline_after(self.now(), delay);
        let mut st = self.inner.state.borrow_mut();
        let id = st.tasks.insert(Task {
            kind: TaskKind::Timer,
            callback: Box::new(callback),
        });
        let seq = st.next_seq;
        st.next_seq += 1;
        st.timers.push(Reverse((deadline, seq, id)));
        log::trace!("timer {id:?} scheduled in {delay:?}");
        id
    }

    /// Returns false when the timer already fired or never existed.
    pub fn clear_timeout(&self, id: TaskId) -> bool {
        self.remove(id, TaskKind::Timer)
    }

    /// Queues `callback` for the next frame tick.
    ///
    /// Without a frame source the callback only runs when the host calls
    /// [`EventLoop::tick_frame`] itself.
    pub fn request_frame(&self, callback: impl FnOnce() -> anyhow::Result<()> + 'static) -> TaskId {
        let mut st = self.inner.state.borrow_mut();
        let id = st.tasks.insert(Task {
            kind: TaskKind::Frame,
            callback: Box::new(callback),
        });
        st.frames.push(id);
        log::trace!("frame callback {id:?} requested");
        id
    }

    pub fn cancel_frame(&self, id: TaskId) -> bool {
        let removed = self.remove(id, TaskKind::Frame);
        if removed {
            self.inner.state.borrow_mut().frames.retain(|f| *f != id);
        }
        removed
    }

    fn remove(&self, id: TaskId, kind: TaskKind) -> bool {
        let mut st = self.inner.state.borrow_mut();
        if !st.tasks.get(id).is_some_and(|task| task.kind == kind) {
            return false;
        }
        st.tasks.remove(id);
        log::trace!("{kind:?} {id:?} cancelled");
        true
    }

    /// Timers and frame callbacks still waiting to run.
    pub fn pending_tasks(&self) -> usize {
        self.inner.state.borrow().tasks.len()
    }

    fn frame_deadline(&self, st: &LoopState) -> Option<Instant> {
        let interval = self.inner.frame_interval.get()?;
        if st.frames.is_empty() {
            return None;
        }
        Some(deadline_after(st.last_frame, interval))
    }

    /// Earliest instant at which something is due.
    pub fn next_deadline(&self) -> Option<Instant> {
        let mut st = self.inner.state.borrow_mut();
        st.prune();
        let timer = st.timers.peek().map(|Reverse((at, _, _))| *at);
        let frame = self.frame_deadline(&st);
        match (timer, frame) {
            (Some(t), Some(f)) => Some(t.min(f)),
            (t, f) => t.or(f),
        }
    }

    fn next_due(&self, limit: Instant) -> Option<Due> {
        let mut st = self.inner.state.borrow_mut();
        st.prune();
        let timer = st.timers.peek().map(|Reverse((at, _, _))| *at);
        let frame = self.frame_deadline(&st);

        if let Some(at) = timer
            && at <= limit
            && frame.is_none_or(|f| at <= f)
        {
            let Reverse((_, _, id)) = st.timers.pop()?;
            let task = st.tasks.remove(id)?;
            return Some(Due::Timer(at, task.callback));
        }
        match frame {
            Some(at) if at <= limit => Some(Due::Frame(at)),
            _ => None,
        }
    }

    fn dispatch(&self, due: Due, wait: bool) -> usize {
        match due {
            Due::Timer(at, callback) => {
                if wait {
                    self.inner.clock.wait_until(at);
                }
                self.report(callback());
                1
            }
            Due::Frame(at) => {
                if wait {
                    self.inner.clock.wait_until(at);
                }
                self.tick_frame()
            }
        }
    }

    fn report(&self, result: anyhow::Result<()>) {
        if let Err(err) = result {
            log::error!("deferred callback failed: {err:#}");
            self.inner.state.borrow_mut().unhandled.push(err);
        }
    }

    /// Runs every callback queued before this tick. Returns how many ran.
    pub fn tick_frame(&self) -> usize {
        let batch = {
            let mut st = self.inner.state.borrow_mut();
            st.last_frame = self.inner.clock.now();
            std::mem::take(&mut st.frames)
        };
        let mut ran = 0;
        for id in batch {
            let task = self.inner.state.borrow_mut().tasks.remove(id);
            if let Some(task) = task {
                self.report((task.callback)());
                ran += 1;
            }
        }
        ran
    }

    /// Runs everything due at the current time, including zero-delay timers
    /// scheduled while doing so.
    pub fn run_due(&self) -> usize {
        let now = self.now();
        let mut ran = 0;
        while let Some(due) = self.next_due(now) {
            ran += self.dispatch(due, false);
        }
        ran
    }

    /// Waits through every event up to `now + duration`, then to the end of
    /// the window.
    pub fn run_for(&self, duration: Duration) -> usize {
        let limit = deadline_after(self.now(), duration);
        let mut ran = 0;
        while let Some(due) = self.next_due(limit) {
            ran += self.dispatch(due, true);
        }
        self.inner.clock.wait_until(limit);
        ran
    }

    /// Runs until nothing is scheduled. Frame callbacks only count when the
    /// loop has a frame source.
    pub fn run_until_idle(&self) -> usize {
        let mut ran = 0;
        while let Some(at) = self.next_deadline() {
            match self.next_due(at) {
                Some(due) => ran += self.dispatch(due, true),
                None => break,
            }
        }
        ran
    }

    /// Failures raised by deferred callbacks since the last call.
    pub fn take_unhandled(&self) -> Vec<anyhow::Error> {
        std::mem::take(&mut self.inner.state.borrow_mut().unhandled)
    }
}

impl Default for EventLoop {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}
