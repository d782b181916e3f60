pub use crate::clock::{Clock, ManualClock, SystemClock};
pub use crate::delay::{DelayConfig, DelayController, DelayControllerBuilder, DelayPolicy};
pub use crate::effects::{Dispose, effect, on_unmount};
pub use crate::error::*;
pub use crate::event_loop::{EventLoop, TaskId};
pub use crate::runtime::{
    Composition, current_loop, remember, remember_state, remember_state_with_key,
    remember_with_key,
};
pub use crate::scheduler::{ScheduledTask, Scheduler, SchedulerKind};
pub use crate::scope::{DisposerId, Scope, WeakScope, current_scope, scoped_effect};
pub use crate::signal::{Signal, signal};
