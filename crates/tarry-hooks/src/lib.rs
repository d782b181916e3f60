//! Composition hooks built on `tarry-core`.
//!
//! Every hook here must be called inside `Composition::compose`, in the same
//! order on every pass (they are backed by slot-based `remember`). Timers use
//! the composition's event loop and stop mattering once its scope is
//! disposed.
//!
//! ```rust
//! use tarry_core::*;
//! use tarry_hooks::*;
//! use web_time::Duration;
//!
//! let (event_loop, _clock) = EventLoop::manual();
//! let ui = Composition::new(event_loop.clone());
//! let policy = DelayPolicy::new().delay(Duration::from_millis(300));
//!
//! let (shown, _) = ui.compose(|| use_debounced_value("he".to_string(), policy));
//! assert_eq!(shown, "he");
//!
//! let (shown, _) = ui.compose(|| use_debounced_value("hello".to_string(), policy));
//! assert_eq!(shown, "he");
//!
//! event_loop.run_for(Duration::from_millis(300));
//! let (shown, _) = ui.compose(|| use_debounced_value("hello".to_string(), policy));
//! assert_eq!(shown, "hello");
//! ```

pub mod batch;
pub mod debounce;
pub mod error;
pub mod previous;
pub mod queue;
pub mod storage;

pub use batch::*;
pub use debounce::*;
pub use error::*;
pub use previous::*;
pub use queue::*;
pub use storage::*;

use tarry_core::{EventLoop, current_loop};

pub(crate) fn hook_loop() -> EventLoop {
    current_loop().unwrap_or_else(|| {
        log::warn!("hook used outside of a composition; timers go to a detached loop");
        EventLoop::default()
    })
}
