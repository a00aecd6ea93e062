//! Observer interface between the orchestrator and an optional UI

use std::time::{Duration, Instant};

/// Receives orchestrator notifications
///
/// Callbacks are invoked synchronously from the orchestrator's continuations.
pub trait UpdateObserver: Send + Sync {
    fn on_status(&self, text: &str);
    fn on_error(&self, text: &str);
    fn on_message(&self, text: &str);
    fn on_download_progress(&self, received: u64, total: u64);
}

/// Creates the observer window on demand
pub type WindowFactory = Box<dyn Fn() -> std::sync::Arc<dyn UpdateObserver> + Send + Sync>;

/// Minimum wall-clock spacing between progress updates
pub const PROGRESS_INTERVAL: Duration = Duration::from_secs(1);

/// Limits progress notifications to one per interval
///
/// The first and the final update (received == total) always pass.
#[derive(Debug)]
pub struct ProgressThrottle {
    interval: Duration,
    last: Option<Instant>,
}

impl ProgressThrottle {
    pub fn new(interval: Duration) -> Self {
        Self { interval, last: None }
    }

    pub fn should_emit(&mut self, received: u64, total: u64, now: Instant) -> bool {
        let finished = total > 0 && received >= total;
        let due = match self.last {
            None => true,
            Some(last) => now.saturating_duration_since(last) >= self.interval,
        };
        if due || finished {
            self.last = Some(now);
            true
        } else {
            false
        }
    }
}

impl Default for ProgressThrottle {
    fn default() -> Self {
        Self::new(PROGRESS_INTERVAL)
    }
}
