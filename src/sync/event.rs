//! Manual-reset event

use parking_lot::{Condvar, Mutex};
use std::time::{Duration, Instant};

/// A flag threads can wait on.
///
/// Once [`set`](Event::set), every current and future waiter returns until
/// [`reset`](Event::reset) is called.
#[derive(Debug, Default)]
pub struct Event {
    signaled: Mutex<bool>,
    cond: Condvar,
}

impl Event {
    pub fn new() -> Self {
        Self::default()
    }

    /// Signal the event and wake all waiters.
    pub fn set(&self) {
        let mut signaled = self.signaled.lock();
        *signaled = true;
        self.cond.notify_all();
    }

    pub fn reset(&self) {
        *self.signaled.lock() = false;
    }

    pub fn is_set(&self) -> bool {
        *self.signaled.lock()
    }

    /// Block until the event is set.
    pub fn wait(&self) {
        let mut signaled = self.signaled.lock();
        while !*signaled {
            self.cond.wait(&mut signaled);
        }
    }

    /// Block until the event is set or `timeout` elapses.
    ///
    /// Returns true if the event was set.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut signaled = self.signaled.lock();
        while !*signaled {
            if self.cond.wait_until(&mut signaled, deadline).timed_out() {
                return *signaled;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn wait_returns_after_set_from_another_thread() {
        let event = Arc::new(Event::new());
        let setter = {
            let event = Arc::clone(&event);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                event.set();
            })
        };
        event.wait();
        assert!(event.is_set());
        setter.join().expect("setter panicked");
    }

    #[test]
    fn wait_timeout_expires_when_unset() {
        let event = Event::new();
        let start = Instant::now();
        assert!(!event.wait_timeout(Duration::from_millis(30)));
        assert!(start.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn reset_clears_the_signal() {
        let event = Event::new();
        event.set();
        assert!(event.wait_timeout(Duration::ZERO));
        event.reset();
        assert!(!event.is_set());
        assert!(!event.wait_timeout(Duration::from_millis(1)));
    }
}
