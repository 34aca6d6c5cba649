use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use tokio::time::{Instant, Sleep, sleep_until};

/// Hard upper bound on a capture run. Armed once, never cancelled.
///
/// Clones share the same instant, so one deadline can bound the whole process
/// and the controller inside it.
#[derive(Debug)]
pub struct DeadlineGuard {
    sleep: Pin<Box<Sleep>>,
    limit: Duration,
}

impl DeadlineGuard {
    pub fn start(limit: Duration) -> Self {
        Self {
            sleep: Box::pin(sleep_until(Instant::now() + limit)),
            limit,
        }
    }

    pub fn limit(&self) -> Duration {
        self.limit
    }

    pub fn instant(&self) -> Instant {
        self.sleep.deadline()
    }

    pub fn remaining(&self) -> Duration {
        self.instant().saturating_duration_since(Instant::now())
    }

    /// Completes once the limit has passed. Keeps completing if awaited again.
    pub async fn expired(&mut self) {
        self.sleep.as_mut().await
    }

    /// Runs `fut` unless the deadline passes first, in which case `fut` is
    /// dropped mid-flight and `None` is returned.
    pub async fn guard<F: Future>(&mut self, fut: F) -> Option<F::Output> {
        tokio::select! {
            biased;
            () = self.sleep.as_mut() => None,
            out = fut => Some(out),
        }
    }
}

impl Clone for DeadlineGuard {
    fn clone(&self) -> Self {
        Self {
            sleep: Box::pin(sleep_until(self.instant())),
            limit: self.limit,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn guard_passes_through_fast_work() {
        let mut deadline = DeadlineGuard::start(Duration::from_secs(15));
        let out = deadline
            .guard(async {
                tokio::time::sleep(Duration::from_secs(1)).await;
                7
            })
            .await;
        assert_eq!(out, Some(7));
        assert!(deadline.remaining() <= Duration::from_secs(14));
    }

    #[tokio::test(start_paused = true)]
    async fn guard_cuts_off_hung_work() {
        let mut deadline = DeadlineGuard::start(Duration::from_secs(15));
        let start = Instant::now();
        let out = deadline.guard(std::future::pending::<()>()).await;
        assert_eq!(out, None);
        assert!(start.elapsed() >= Duration::from_secs(15));
        assert_eq!(deadline.remaining(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn expiry_is_sticky() {
        let mut deadline = DeadlineGuard::start(Duration::from_millis(10));
        deadline.expired().await;
        deadline.expired().await;
        assert_eq!(deadline.guard(async { 1 }).await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn clones_expire_together() {
        let outer = DeadlineGuard::start(Duration::from_secs(3));
        tokio::time::advance(Duration::from_secs(1)).await;
        let mut inner = outer.clone();
        assert_eq!(inner.instant(), outer.instant());
        assert_eq!(inner.remaining(), Duration::from_secs(2));

        let start = Instant::now();
        inner.expired().await;
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(2) && elapsed < Duration::from_millis(2005));
    }
}
