use crossbeam_channel::{bounded, select, tick, Sender};
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

/// Whether failed work is retried later
pub enum ResubmissionPolicy {
    /// Failed classes stay in the queue but nothing drives it
    Disabled,

    /// A scheduler periodically re-drives the queue
    Enabled {
        scheduler: Arc<dyn ResubmissionScheduler>,
    },
}

/// Source of periodic execution
pub trait ResubmissionScheduler: Send + Sync {
    /// Run `job` repeatedly until the returned token is cancelled
    fn schedule(&self, job: Box<dyn Fn() + Send + Sync>) -> Box<dyn CancellationToken>;
}

/// Handle that stops a scheduled job
pub trait CancellationToken: Send + Sync {
    /// Stop the job; calling this more than once is harmless
    fn cancel(&self);
}

/// Scheduler driving jobs from a dedicated thread at a fixed interval
pub struct FixedRateScheduler {
    interval: Duration,
}

impl FixedRateScheduler {
    pub fn new(interval: Duration) -> FixedRateScheduler {
        FixedRateScheduler { interval }
    }
}

impl ResubmissionScheduler for FixedRateScheduler {
    fn schedule(&self, job: Box<dyn Fn() + Send + Sync>) -> Box<dyn CancellationToken> {
        let (stop_sender, stop_receiver) = bounded::<()>(1);
        let ticker = tick(self.interval);
        let handle = std::thread::spawn(move || loop {
            select! {
                recv(ticker) -> _ => job(),
                recv(stop_receiver) -> _ => return,
            }
        });
        Box::new(FixedRateCancellation {
            stop: stop_sender,
            handle: Mutex::new(Some(handle)),
        })
    }
}

struct FixedRateCancellation {
    stop: Sender<()>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl CancellationToken for FixedRateCancellation {
    fn cancel(&self) {
        // A second cancel finds the slot taken and nothing to join
        let _ = self.stop.try_send(());
        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            let _ = handle.join();
        }
    }
}
