use super::job::{CaptureJob, Phase};
use super::{CaptureOutcome, FailureReason};
use crate::config::RetryPolicy;
use crate::engine::Engine;
use log::{debug, info};

/// Outcome of one capture call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderResult {
    pub succeeded: bool,
    /// Page location when the capture was taken.
    pub url: String,
}

/// Runs capture attempts and decides what follows each one.
#[derive(Debug, Clone)]
pub struct RetryScheduler {
    policy: RetryPolicy,
}

impl RetryScheduler {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub async fn attempt_capture<E: Engine>(
        &self,
        engine: &mut E,
        job: &mut CaptureJob,
    ) -> RenderResult {
        job.phase = Phase::Capturing;
        job.attempts += 1;

        let url = engine
            .current_url()
            .await
            .unwrap_or_else(|| job.url().to_string());
        let succeeded = engine.capture(job.output()).await;

        let verdict = if succeeded { "success" } else { "failure" };
        info!("Rendering {verdict} for {url}");
        RenderResult { succeeded, url }
    }

    /// Returns the terminal outcome, or `None` after arming the next attempt.
    pub fn on_result(
        &self,
        job: &mut CaptureJob,
        result: &RenderResult,
    ) -> Option<CaptureOutcome> {
        if result.succeeded {
            job.disarm();
            return Some(CaptureOutcome::Success);
        }

        let max_attempts = self.policy.max_attempts();
        if job.attempts >= max_attempts {
            info!("Final rendering attempt failed.");
            job.disarm();
            return Some(CaptureOutcome::Failure(FailureReason::RetriesExhausted {
                attempts: job.attempts,
            }));
        }

        let delay = self.policy.retry_delay();
        job.render_timer.arm(delay);
        job.phase = Phase::Retrying;
        debug!("attempt {}/{max_attempts} failed, retrying in {delay:?}", job.attempts);

        if job.attempts == 1
            && let Some(grace) = self.policy.grace()
        {
            job.grace_clock.arm(grace);
            debug!("grace clock armed for {grace:?}");
        }
        None
    }
}
