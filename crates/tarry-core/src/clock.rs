use std::sync::Arc;

use parking_lot::Mutex;
use web_time::{Duration, Instant};

/// Time source for an event loop.
///
/// `wait_until` is how the loop gets from one deadline to the next: the system
/// clock sleeps, a manual clock simply jumps.
pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> Instant;

    fn wait_until(&self, deadline: Instant);
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn wait_until(&self, deadline: Instant) {
        let now = Instant::now();
        if deadline > now {
            std::thread::sleep(deadline - now);
        }
    }
}

/// A clock you can drive deterministically. Clones share the same time.
#[derive(Clone)]
pub struct ManualClock {
    t: Arc<Mutex<Instant>>,
}

impl ManualClock {
    pub fn new(start: Instant) -> Self {
        Self {
            t: Arc::new(Mutex::new(start)),
        }
    }

    /// Moves time to `t`, backwards included.
    pub fn set(&self, t: Instant) {
        *self.t.lock() = t;
    }

    pub fn advance(&self, by: Duration) {
        let mut t = self.t.lock();
        *t += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(Instant::now())
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *self.t.lock()
    }

    fn wait_until(&self, deadline: Instant) {
        let mut t = self.t.lock();
        if deadline > *t {
            *t = deadline;
        }
    }
}

/// Signed distance from `earlier` to `later`. `None` means the clock went
/// backwards between the two readings.
pub(crate) fn elapsed_between(earlier: Instant, later: Instant) -> Option<Duration> {
    later.checked_duration_since(earlier)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_waits_forward_only() {
        let t0 = Instant::now();
        let clock = ManualClock::new(t0);
        clock.wait_until(t0 + Duration::from_millis(40));
        assert_eq!(clock.now(), t0 + Duration::from_millis(40));

        clock.wait_until(t0);
        assert_eq!(clock.now(), t0 + Duration::from_millis(40));

        clock.set(t0);
        assert_eq!(clock.now(), t0);
    }

    #[test]
    fn backwards_reading_has_no_elapsed() {
        let t0 = Instant::now();
        let later = t0 + Duration::from_millis(5);
        assert_eq!(elapsed_between(t0, later), Some(Duration::from_millis(5)));
        assert_eq!(elapsed_between(later, t0), None);
    }
}
