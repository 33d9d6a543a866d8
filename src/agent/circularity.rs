use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(2);

/// Reentrancy guard around transformation work
///
/// Applying a transformation can itself trigger class loading, and the host reports that
/// loading back to the same transformer. Without a guard that recursion has no floor. The
/// lock fails closed: whoever cannot take it must skip transforming rather than wait
/// inside the host's callback.
pub struct CircularityLock {
    held: AtomicBool,
}

impl CircularityLock {
    pub fn new() -> CircularityLock {
        CircularityLock {
            held: AtomicBool::new(false),
        }
    }

    /// Take the lock if it is free, without waiting
    pub fn acquire(&self) -> bool {
        self.held
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    /// Poll for the lock until a deadline passes
    ///
    /// Used outside host callbacks, where blocking briefly is acceptable.
    pub fn acquire_with_deadline(&self, deadline: Duration) -> bool {
        let give_up = Instant::now() + deadline;
        loop {
            if self.acquire() {
                return true;
            }
            if Instant::now() >= give_up {
                return false;
            }
            std::thread::sleep(POLL_INTERVAL);
        }
    }

    /// Release a previously acquired lock
    pub fn release(&self) {
        self.held.store(false, Ordering::Release);
    }
}

impl Default for CircularityLock {
    fn default() -> CircularityLock {
        CircularityLock::new()
    }
}
