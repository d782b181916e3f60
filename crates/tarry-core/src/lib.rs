//! # Timing, Scopes, and Delayed Calls
//!
//! Tarry is a small timing core for UI code: a single-threaded event loop, a
//! scheduler capability on top of it, and a delay controller that debounces
//! and throttles calls to an operation.
//!
//! - `EventLoop`: fixed-duration timers and frame callbacks, driven by the host.
//! - `Scheduler`: one primitive family (`FixedDelay` or `FrameSynced`), picked once.
//! - `DelayController`: leading/trailing/max-wait deferral of an operation.
//! - `Composition` / `remember*` / `Scope`: slot storage for hooks, with cleanup.
//!
//! ## Delaying calls
//!
//! ```rust
//! use tarry_core::*;
//! use web_time::Duration;
//!
//! let (event_loop, _clock) = EventLoop::manual();
//! let search = DelayController::builder()
//!     .operation(|query: String| format!("results for {query}"))
//!     .policy(DelayPolicy::new().delay(Duration::from_millis(250)))
//!     .build(&event_loop)
//!     .unwrap();
//!
//! search.call("r".into()).unwrap();
//! search.call("ru".into()).unwrap();
//! search.call("rust".into()).unwrap();
//!
//! event_loop.run_for(Duration::from_millis(250));
//! assert!(!search.is_pending());
//! assert_eq!(search.flush().unwrap().as_deref(), Some("results for rust"));
//! ```
//!
//! ## Frame-synced scheduling
//!
//! When the policy leaves the delay unspecified and the loop has a frame
//! source (`EventLoop::with_frames`), deferred calls run on the next frame
//! tick instead of a timer. An explicit zero delay always uses a timer.
//!
//! ## Scopes
//!
//! A controller built while a `Scope` is current (inside
//! `Composition::compose`) retires when the scope is disposed. Timers that
//! fire after that do nothing.

pub mod clock;
pub mod delay;
pub mod effects;
pub mod error;
pub mod event_loop;
pub mod prelude;
pub mod runtime;
pub mod scheduler;
pub mod scope;
pub mod signal;

pub use clock::*;
pub use delay::*;
pub use effects::*;
pub use error::*;
pub use event_loop::*;
pub use runtime::*;
pub use scheduler::*;
pub use scope::*;
pub use signal::*;
