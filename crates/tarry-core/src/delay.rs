//! # Delay controller
//!
//! Wraps an operation so that calls to it are deferred and coalesced
//! according to a [`DelayPolicy`]: leading edge, trailing edge, and an
//! optional max wait that forces an invocation during a continuous stream of
//! calls.
//!
//! ```rust
//! use tarry_core::*;
//! use web_time::Duration;
//!
//! let (event_loop, _clock) = EventLoop::manual();
//! let save = DelayController::builder()
//!     .operation(|text: String| text.len())
//!     .policy(DelayPolicy::new().delay(Duration::from_millis(100)))
//!     .build(&event_loop)
//!     .unwrap();
//!
//! save.call("h".into()).unwrap();
//! save.call("hello".into()).unwrap();
//! assert!(save.is_pending());
//!
//! event_loop.run_for(Duration::from_millis(100));
//! assert_eq!(save.flush().unwrap(), Some(5));
//! ```
//!
//! Only the latest arguments survive between invocations. A controller built
//! inside a composition retires with its scope: timers that fire afterwards
//! do nothing.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use serde::Deserialize;
use web_time::{Duration, Instant};

use crate::clock::elapsed_between;
use crate::error::DelayError;
use crate::event_loop::EventLoop;
use crate::scheduler::{ScheduledTask, Scheduler, SchedulerKind};
use crate::scope::{DisposerId, WeakScope, current_scope};

pub type Operation<A, R> = Rc<dyn Fn(A) -> anyhow::Result<R>>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DelayPolicy {
    /// `None` means "unspecified" and selects frame-synced scheduling when
    /// the event loop has a frame source.
    pub delay: Option<Duration>,
    pub leading: bool,
    pub trailing: bool,
    pub max_wait: Option<Duration>,
}

impl Default for DelayPolicy {
    fn default() -> Self {
        Self {
            delay: None,
            leading: false,
            trailing: true,
            max_wait: None,
        }
    }
}

impl DelayPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn leading(mut self, leading: bool) -> Self {
        self.leading = leading;
        self
    }

    pub fn trailing(mut self, trailing: bool) -> Self {
        self.trailing = trailing;
        self
    }

    pub fn max_wait(mut self, max_wait: Duration) -> Self {
        self.max_wait = Some(max_wait);
        self
    }

    /// Quiet period before a trailing invocation.
    pub fn wait(&self) -> Duration {
        self.delay.unwrap_or(Duration::ZERO)
    }

    /// Max wait, never shorter than the delay.
    pub fn effective_max_wait(&self) -> Option<Duration> {
        self.max_wait.map(|max| max.max(self.wait()))
    }
}

/// Deserializable policy in milliseconds.
///
/// Negative values become zero. `NaN` counts as unspecified, so a `NaN`
/// delay behaves like an omitted one.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct DelayConfig {
    pub delay_ms: Option<f64>,
    pub leading: bool,
    pub trailing: bool,
    pub max_wait_ms: Option<f64>,
}

impl Default for DelayConfig {
    fn default() -> Self {
        Self {
            delay_ms: None,
            leading: false,
            trailing: true,
            max_wait_ms: None,
        }
    }
}

fn millis(value: Option<f64>) -> Option<Duration> {
    let ms = value.filter(|v| !v.is_nan())?;
    if ms <= 0.0 {
        return Some(Duration::ZERO);
    }
    Some(Duration::try_from_secs_f64(ms / 1000.0).unwrap_or(Duration::MAX))
}

impl From<DelayConfig> for DelayPolicy {
    fn from(cfg: DelayConfig) -> Self {
        Self {
            delay: millis(cfg.delay_ms),
            leading: cfg.leading,
            trailing: cfg.trailing,
            max_wait: millis(cfg.max_wait_ms),
        }
    }
}

struct TimingState<A, R> {
    last_args: Option<A>,
    last_call_time: Option<Instant>,
    // None stands for "never", i.e. infinitely long ago
    last_invoke_time: Option<Instant>,
    pending: Option<ScheduledTask>,
    last_result: Option<R>,
}

struct ControllerInner<A, R> {
    operation: RefCell<Operation<A, R>>,
    policy: DelayPolicy,
    scheduler: Scheduler,
    live: Cell<bool>,
    // owning scope's disposer, dropped again on `retire`
    registration: RefCell<Option<(WeakScope, DisposerId)>>,
    state: RefCell<TimingState<A, R>>,
}

impl<A: 'static, R: Clone + 'static> ControllerInner<A, R> {
    fn now(&self) -> Instant {
        self.scheduler.event_loop().now()
    }

    fn should_invoke(&self, st: &TimingState<A, R>, now: Instant) -> bool {
        if !self.live.get() {
            return false;
        }
        let Some(last_call) = st.last_call_time else {
            return true;
        };
        let Some(since_call) = elapsed_between(last_call, now) else {
            log::warn!("clock moved backwards since the last call; invoking");
            return true;
        };
        if since_call >= self.policy.wait() {
            return true;
        }
        match (self.policy.effective_max_wait(), st.last_invoke_time) {
            (None, _) => false,
            (Some(_), None) => true,
            (Some(max), Some(last_invoke)) => {
                elapsed_between(last_invoke, now).is_some_and(|since| since >= max)
            }
        }
    }

    fn remaining_wait(&self, st: &TimingState<A, R>, now: Instant) -> Duration {
        let since_call = st
            .last_call_time
            .and_then(|t| elapsed_between(t, now))
            .unwrap_or_default();
        let wait = self.policy.wait().saturating_sub(since_call);
        match self.policy.effective_max_wait() {
            Some(max) => {
                let since_invoke = st
                    .last_invoke_time
                    .and_then(|t| elapsed_between(t, now))
                    .unwrap_or_default();
                wait.min(max.saturating_sub(since_invoke))
            }
            None => wait,
        }
    }

    fn start_timer(self: &Rc<Self>, st: &mut TimingState<A, R>, wait: Duration) {
        if let Some(task) = st.pending.take() {
            self.scheduler.cancel(task);
        }
        let weak = Rc::downgrade(self);
        let task = self.scheduler.schedule_once(
            move || match weak.upgrade() {
                Some(inner) => inner.timer_expired().map_err(anyhow::Error::from),
                None => Ok(()),
            },
            wait,
        );
        st.pending = Some(task);
    }

    fn timer_expired(self: &Rc<Self>) -> Result<(), DelayError> {
        let now = self.now();
        let mut st = self.state.borrow_mut();
        if self.should_invoke(&st, now) {
            drop(st);
            return self.trailing_edge(now).map(|_| ());
        }
        if !self.live.get() {
            log::debug!("timer fired after retirement; ignoring");
            st.pending = None;
            return Ok(());
        }
        let wait = self.remaining_wait(&st, now);
        self.start_timer(&mut st, wait);
        Ok(())
    }

    fn invoke(&self, now: Instant) -> Result<Option<R>, DelayError> {
        let args = {
            let mut st = self.state.borrow_mut();
            if !self.live.get() {
                st.last_args = None;
                return Ok(st.last_result.clone());
            }
            st.last_invoke_time = Some(st.last_invoke_time.map_or(now, |t| t.max(now)));
            st.last_args.take()
        };
        let Some(args) = args else {
            return Ok(self.cached());
        };
        // the latest operation, whatever was current when the timer started
        let operation = self.operation.borrow().clone();
        let result = operation(args).map_err(DelayError::OperationFailure)?;
        self.state.borrow_mut().last_result = Some(result.clone());
        Ok(Some(result))
    }

    fn trailing_edge(&self, now: Instant) -> Result<Option<R>, DelayError> {
        let has_args = {
            let mut st = self.state.borrow_mut();
            st.pending = None;
            st.last_args.is_some()
        };
        if self.policy.trailing && has_args {
            return self.invoke(now);
        }
        let mut st = self.state.borrow_mut();
        st.last_args = None;
        Ok(st.last_result.clone())
    }

    fn cached(&self) -> Option<R> {
        self.state.borrow().last_result.clone()
    }
}

pub struct DelayController<A: 'static, R: 'static> {
    inner: Rc<ControllerInner<A, R>>,
}

impl<A: 'static, R: 'static> Clone for DelayController<A, R> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

pub struct DelayControllerBuilder<A, R> {
    operation: Option<Operation<A, R>>,
    policy: DelayPolicy,
}

impl<A: 'static, R: Clone + 'static> DelayControllerBuilder<A, R> {
    pub fn operation(mut self, f: impl Fn(A) -> R + 'static) -> Self {
        self.operation = Some(Rc::new(move |args| Ok(f(args))));
        self
    }

    pub fn try_operation(mut self, f: impl Fn(A) -> anyhow::Result<R> + 'static) -> Self {
        self.operation = Some(Rc::new(f));
        self
    }

    pub fn policy(mut self, policy: DelayPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Fails with [`DelayError::InvalidOperand`] when no operation was given.
    ///
    /// The scheduling family is picked here, once.
    pub fn build(self, event_loop: &EventLoop) -> Result<DelayController<A, R>, DelayError> {
        let operation = self.operation.ok_or(DelayError::InvalidOperand)?;
        Ok(DelayController::from_parts(operation, self.policy, event_loop))
    }
}

impl<A: 'static, R: Clone + 'static> DelayController<A, R> {
    fn from_parts(operation: Operation<A, R>, policy: DelayPolicy, event_loop: &EventLoop) -> Self {
        let scheduler = Scheduler::select(event_loop.clone(), policy.delay);
        log::debug!(
            "delay controller built: {:?}, {:?}",
            policy,
            scheduler.kind()
        );
        let inner = Rc::new(ControllerInner {
            operation: RefCell::new(operation),
            policy,
            scheduler,
            live: Cell::new(true),
            registration: RefCell::new(None),
            state: RefCell::new(TimingState {
                last_args: None,
                last_call_time: None,
                last_invoke_time: None,
                pending: None,
                last_result: None,
            }),
        });

        if let Some(scope) = current_scope() {
            let weak = Rc::downgrade(&inner);
            let id = scope.add_disposer(move || {
                if let Some(inner) = weak.upgrade() {
                    inner.live.set(false);
                }
            });
            *inner.registration.borrow_mut() = Some((scope.downgrade(), id));
        }

        DelayController { inner }
    }

    /// Infallible shorthand for the builder with an infallible operation.
    pub fn new(f: impl Fn(A) -> R + 'static, policy: DelayPolicy, event_loop: &EventLoop) -> Self {
        Self::from_parts(Rc::new(move |args| Ok(f(args))), policy, event_loop)
    }

    pub fn builder() -> DelayControllerBuilder<A, R> {
        DelayControllerBuilder {
            operation: None,
            policy: DelayPolicy::default(),
        }
    }

    /// Records a call and returns the last result without waiting for this
    /// one, unless this call runs the operation right away (leading edge or
    /// max wait exceeded).
    pub fn call(&self, args: A) -> Result<Option<R>, DelayError> {
        let inner = &self.inner;
        let now = inner.now();
        let mut st = inner.state.borrow_mut();
        let eligible = inner.should_invoke(&st, now);
        st.last_args = Some(args);
        st.last_call_time = Some(now);

        if eligible {
            if st.pending.is_none() && inner.live.get() {
                st.last_invoke_time = Some(st.last_invoke_time.map_or(now, |t| t.max(now)));
                inner.start_timer(&mut st, inner.policy.wait());
                drop(st);
                if inner.policy.leading {
                    return inner.invoke(now);
                }
                return Ok(inner.cached());
            }
            if inner.policy.max_wait.is_some() {
                log::trace!("max wait exceeded; invoking mid-stream");
                inner.start_timer(&mut st, inner.policy.wait());
                drop(st);
                return inner.invoke(now);
            }
        }
        if st.pending.is_none() && inner.live.get() {
            inner.start_timer(&mut st, inner.policy.wait());
        }
        Ok(st.last_result.clone())
    }

    /// Drops the pending call and the timing history. The last result stays.
    pub fn cancel(&self) {
        let mut st = self.inner.state.borrow_mut();
        if let Some(task) = st.pending.take() {
            self.inner.scheduler.cancel(task);
        }
        st.last_invoke_time = None;
        st.last_args = None;
        st.last_call_time = None;
    }

    /// Runs the trailing edge now if a timer is pending.
    pub fn flush(&self) -> Result<Option<R>, DelayError> {
        let pending = self.inner.state.borrow_mut().pending.take();
        match pending {
            None => Ok(self.inner.cached()),
            Some(task) => {
                self.inner.scheduler.cancel(task);
                self.inner.trailing_edge(self.inner.now())
            }
        }
    }

    pub fn is_pending(&self) -> bool {
        self.inner.state.borrow().pending.is_some()
    }

    /// Swaps the operation without touching timing state. A timer already in
    /// flight calls the new one.
    pub fn set_operation(&self, f: impl Fn(A) -> R + 'static) {
        *self.inner.operation.borrow_mut() = Rc::new(move |args| Ok(f(args)));
    }

    pub fn set_try_operation(&self, f: impl Fn(A) -> anyhow::Result<R> + 'static) {
        *self.inner.operation.borrow_mut() = Rc::new(f);
    }

    /// Marks the owner as gone. Nothing is invoked afterwards, even by timers
    /// that are already scheduled.
    pub fn retire(&self) {
        self.inner.live.set(false);
        let registration = self.inner.registration.borrow_mut().take();
        if let Some((scope, id)) = registration
            && let Some(scope) = scope.upgrade()
        {
            scope.remove_disposer(id);
        }
    }

    pub fn is_live(&self) -> bool {
        self.inner.live.get()
    }

    pub fn policy(&self) -> DelayPolicy {
        self.inner.policy
    }

    pub fn scheduler_kind(&self) -> SchedulerKind {
        self.inner.scheduler.kind()
    }
}
