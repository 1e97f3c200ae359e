//! Session-wide cancellation signal

use parking_lot::{Condvar, Mutex};
use std::time::{Duration, Instant};

/// A one-shot stop flag with an interruptible wait.
///
/// Once stopped it stays stopped for the rest of the session.
#[derive(Debug, Default)]
pub struct StopSignal {
    stopped: Mutex<bool>,
    cond: Condvar,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        let mut stopped = self.stopped.lock();
        if !*stopped {
            *stopped = true;
            self.cond.notify_all();
        }
    }

    pub fn is_stopped(&self) -> bool {
        *self.stopped.lock()
    }

    /// Sleep for up to `timeout`. Returns `true` if woken by [`stop`](Self::stop).
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut stopped = self.stopped.lock();
        while !*stopped {
            if self.cond.wait_until(&mut stopped, deadline).timed_out() {
                break;
            }
        }
        *stopped
    }
}
