//! Blocking delay module.

use std::fmt::Debug;
use std::thread;
use std::time::Duration;

/// Clock trait defines the blocking delay the LCD drivers use to satisfy controller timing.
///
/// A call must not return before `duration` has elapsed. There is no failure mode; a delay that
/// cannot be honoured is a bug in the implementation, not something the caller can recover from.
pub trait Clock: Debug {
    /// Blocks the current thread for at least `duration`.
    fn sleep(&self, duration: Duration);
}

/// Clock backed by [std::thread::sleep].
///
/// The OS scheduler may oversleep, which is harmless for the controller: all of its timing
/// requirements are minimums.
#[derive(Copy, Clone, Debug, Default)]
pub struct ThreadClock;

impl Clock for ThreadClock {
    fn sleep(&self, duration: Duration) {
        thread::sleep(duration);
    }
}
