use std::pin::pin;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Notify;

/// Why a run stopped before, or at, the end of its schedule.
#[derive(Debug, Clone, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum StopReason {
    /// The global timeout (total schedule duration) elapsed.
    DurationElapsed,
    /// A threshold marked `abort_on_fail` failed.
    #[strum(to_string = "threshold_abort")]
    ThresholdAbort { threshold: String },
    /// Stopped from outside the run (e.g. Ctrl-C).
    Interrupted,
}

/// One-shot, level-triggered stop flag. The first `stop` wins the reason.
#[derive(Debug, Default)]
pub struct StopSignal {
    stopped: AtomicBool,
    reason: OnceLock<StopReason>,
    notify: Notify,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` when the signal was already raised.
    pub fn stop(&self, reason: StopReason) -> bool {
        let first = self.reason.set(reason).is_ok();
        self.stopped.store(true, Ordering::Release);
        self.notify.notify_waiters();
        first
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    pub fn reason(&self) -> Option<&StopReason> {
        self.reason.get()
    }

    pub async fn wait(&self) {
        loop {
            let mut notified = pin!(self.notify.notified());
            // Register before checking the flag so a concurrent `stop` cannot be missed.
            notified.as_mut().enable();
            if self.is_stopped() {
                return;
            }
            notified.await;
        }
    }
}
