use std::pin::Pin;
use std::time::Duration;
use tokio::time::{Instant, Sleep, sleep};

/// A cancellable one-shot timer with a single slot.
///
/// Arming always replaces whatever was pending, so two firings can never be
/// outstanding at once.
#[derive(Debug, Default)]
pub struct PendingTimer {
    sleep: Option<Pin<Box<Sleep>>>,
}

impl PendingTimer {
    pub fn idle() -> Self {
        Self::default()
    }

    /// Cancels any pending firing, then schedules one `after` from now.
    /// Returns `true` if a pending firing was replaced.
    pub fn arm(&mut self, after: Duration) -> bool {
        let replaced = self.cancel();
        self.sleep = Some(Box::pin(sleep(after)));
        replaced
    }

    /// Returns `true` if a pending firing was cancelled.
    pub fn cancel(&mut self) -> bool {
        self.sleep.take().is_some()
    }

    pub fn is_pending(&self) -> bool {
        self.sleep.is_some()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.sleep.as_ref().map(|s| s.deadline())
    }

    /// Completes when the timer fires, leaving it idle. Never completes while idle.
    ///
    /// Cancel safe: dropping the future before it completes keeps the timer armed.
    pub async fn fired(&mut self) {
        match self.sleep.as_mut() {
            Some(sleep) => {
                sleep.as_mut().await;
                self.sleep = None;
            }
            None => std::future::pending().await,
        }
    }
}
