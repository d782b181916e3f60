use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

use tarry_core::{
    EventLoop, ScheduledTask, Scheduler, SchedulerKind, effect, on_unmount, remember,
};
use web_time::Duration;

use crate::hook_loop;

type Job = Box<dyn FnOnce() -> anyhow::Result<()>>;

struct QueueInner {
    jobs: RefCell<VecDeque<Job>>,
    pending: Cell<Option<ScheduledTask>>,
    scheduler: Scheduler,
    delay: Duration,
    live: Cell<bool>,
}

impl QueueInner {
    fn schedule_next(self: &Rc<Self>) {
        let weak = Rc::downgrade(self);
        let task = self.scheduler.schedule_once(
            move || match weak.upgrade() {
                Some(inner) => inner.run_next(),
                None => Ok(()),
            },
            self.delay,
        );
        self.pending.set(Some(task));
    }

    fn run_next(self: &Rc<Self>) -> anyhow::Result<()> {
        self.pending.set(None);
        if !self.live.get() {
            return Ok(());
        }
        let job = self.jobs.borrow_mut().pop_front();
        let Some(job) = job else {
            return Ok(());
        };
        let result = job();
        // a failed job does not hold up the ones behind it
        if self.live.get() && self.pending.get().is_none() && !self.jobs.borrow().is_empty() {
            self.schedule_next();
        }
        result
    }
}

/// Runs queued jobs one at a time, `delay` apart.
#[derive(Clone)]
pub struct DelayedQueue {
    inner: Rc<QueueInner>,
}

impl DelayedQueue {
    pub fn new(event_loop: &EventLoop, delay: Duration) -> Self {
        Self {
            inner: Rc::new(QueueInner {
                jobs: RefCell::new(VecDeque::new()),
                pending: Cell::new(None),
                scheduler: Scheduler::new(event_loop.clone(), SchedulerKind::FixedDelay),
                delay,
                live: Cell::new(true),
            }),
        }
    }

    /// Queues `job`. When idle it runs `delay` from now, otherwise `delay`
    /// after the job before it.
    pub fn enqueue(&self, job: impl FnOnce() -> anyhow::Result<()> + 'static) {
        if !self.inner.live.get() {
            log::debug!("job enqueued on a stopped queue; dropped");
            return;
        }
        self.inner.jobs.borrow_mut().push_back(Box::new(job));
        if self.inner.pending.get().is_none() {
            self.inner.schedule_next();
        }
    }

    pub fn len(&self) -> usize {
        self.inner.jobs.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.jobs.borrow().is_empty()
    }

    pub fn is_running(&self) -> bool {
        self.inner.pending.get().is_some()
    }

    /// Drops every job not yet run. Returns how many were dropped.
    pub fn clear(&self) -> usize {
        if let Some(task) = self.inner.pending.take() {
            self.inner.scheduler.cancel(task);
        }
        let dropped = self.inner.jobs.borrow().len();
        self.inner.jobs.borrow_mut().clear();
        dropped
    }

    /// Clears the queue and refuses new jobs.
    pub fn stop(&self) {
        self.inner.live.set(false);
        let dropped = self.clear();
        if dropped > 0 {
            log::debug!("queue stopped with {dropped} jobs left");
        }
    }
}

/// Remembered [`DelayedQueue`], stopped when the composition's scope goes away.
pub fn use_delayed_queue(delay: Duration) -> DelayedQueue {
    let queue = remember(|| {
        let queue = DelayedQueue::new(&hook_loop(), delay);
        let q = queue.clone();
        effect(move || on_unmount(move || q.stop()));
        queue
    });
    (*queue).clone()
}
