//! The capture controller: decides when a page is ready to rasterize, how often
//! to retry, and when to give up.
//!
//! Everything runs on one task. The only concurrency is a `select!` between
//! engine events, the render timer, the grace clock and the run deadline, so
//! the job state needs no locking.

mod deadline;
mod job;
mod retry;
mod timer;
mod watcher;

pub use deadline::DeadlineGuard;
pub use job::{CaptureJob, Phase};
pub use retry::{RenderResult, RetryScheduler};
pub use timer::PendingTimer;
pub use watcher::LoadWatcher;

use crate::config::CaptureConfig;
use crate::engine::{Engine, EngineEvent};
use log::{debug, info, warn};
use std::fmt;

/// Why a run ended without a usable image.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FailureReason {
    #[error("all {attempts} rendering attempts failed")]
    RetriesExhausted { attempts: u32 },
    #[error("navigation failed: {0}")]
    NavigationFailed(String),
    #[error("engine error: {0}")]
    Engine(String),
}

/// The clock that ended a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Clock {
    /// The overall run deadline.
    Overall,
    /// The redirect grace clock of the bounded-count policy.
    Grace,
}

/// How a capture run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureOutcome {
    Success,
    Failure(FailureReason),
    TimedOut(Clock),
}

impl CaptureOutcome {
    /// Process exit status: 0 on success, 1 on failure, 124 on timeout.
    pub fn exit_code(&self) -> u8 {
        match self {
            CaptureOutcome::Success => 0,
            CaptureOutcome::Failure(_) => 1,
            CaptureOutcome::TimedOut(_) => 124,
        }
    }
}

impl fmt::Display for CaptureOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaptureOutcome::Success => f.write_str("success"),
            CaptureOutcome::Failure(reason) => write!(f, "failure: {reason}"),
            CaptureOutcome::TimedOut(Clock::Overall) => f.write_str("timed out"),
            CaptureOutcome::TimedOut(Clock::Grace) => f.write_str("redirect grace period expired"),
        }
    }
}

enum Step {
    Deadline,
    Grace,
    Render,
    Event(Option<EngineEvent>),
}

/// Drives one [`CaptureJob`] against an [`Engine`] until it reaches an outcome.
pub struct CaptureController<'a, E: Engine> {
    engine: &'a mut E,
    job: CaptureJob,
    watcher: LoadWatcher,
    scheduler: RetryScheduler,
    deadline: DeadlineGuard,
}

impl<'a, E: Engine> CaptureController<'a, E> {
    /// Builds the controller and starts the run deadline.
    pub fn new(engine: &'a mut E, job: CaptureJob, config: &CaptureConfig) -> Self {
        Self::with_deadline(engine, job, config, DeadlineGuard::start(config.overall_timeout))
    }

    /// Builds the controller under a deadline that is already running, e.g. one
    /// started before the browser was launched.
    pub fn with_deadline(
        engine: &'a mut E,
        job: CaptureJob,
        config: &CaptureConfig,
        deadline: DeadlineGuard,
    ) -> Self {
        Self {
            engine,
            job,
            watcher: LoadWatcher::new(config),
            scheduler: RetryScheduler::new(config.retry),
            deadline,
        }
    }

    pub fn job(&self) -> &CaptureJob {
        &self.job
    }

    /// Opens the job's URL and reacts to the page until success, failure or timeout.
    pub async fn run(&mut self) -> CaptureOutcome {
        let Some(mut events) = self.engine.take_events() else {
            return self.fail(FailureReason::Engine("event stream already taken".into()));
        };

        debug!(
            "rendering {} to {} at {} ({:?} of {:?} left, {:?})",
            self.job.url(),
            self.job.output().display(),
            self.job.viewport(),
            self.deadline.remaining(),
            self.deadline.limit(),
            self.scheduler.policy(),
        );

        let installed = self
            .deadline
            .guard(self.watcher.install_shims(&mut *self.engine))
            .await;
        if installed.is_none() {
            return self.timed_out(Clock::Overall);
        }

        self.job.phase = Phase::Navigating;
        let opened = self.deadline.guard(self.engine.open(self.job.url())).await;
        match opened {
            None => return self.timed_out(Clock::Overall),
            Some(Err(e)) => return self.fail(FailureReason::Engine(format!("{e:#}"))),
            Some(Ok(())) => {}
        }

        let mut events_open = true;
        loop {
            let step = tokio::select! {
                biased;
                () = self.deadline.expired() => Step::Deadline,
                () = self.job.grace_clock.fired() => Step::Grace,
                () = self.job.render_timer.fired() => Step::Render,
                event = events.recv(), if events_open => Step::Event(event),
            };

            let outcome = match step {
                Step::Deadline => Some(self.timed_out(Clock::Overall)),
                Step::Grace => Some(self.timed_out(Clock::Grace)),
                Step::Render => self.render().await,
                Step::Event(Some(event)) => self.handle_event(event).await,
                Step::Event(None) => {
                    warn!("browser event stream closed; waiting on pending timers");
                    events_open = false;
                    None
                }
            };
            if let Some(outcome) = outcome {
                debug!(
                    "run ended while {:?} after {} attempt(s): {outcome}",
                    self.job.phase(),
                    self.job.attempts()
                );
                return outcome;
            }
        }
    }

    async fn render(&mut self) -> Option<CaptureOutcome> {
        let attempt = self
            .scheduler
            .attempt_capture(&mut *self.engine, &mut self.job);
        let result = self.deadline.guard(attempt).await;
        match result {
            None => Some(self.timed_out(Clock::Overall)),
            Some(result) => self.scheduler.on_result(&mut self.job, &result),
        }
    }

    async fn handle_event(&mut self, event: EngineEvent) -> Option<CaptureOutcome> {
        match event {
            EngineEvent::NavigationStarted => {
                self.watcher.on_navigation_started(&mut self.job);
                None
            }
            EngineEvent::NavigationFinished(status) => {
                let finished =
                    self.watcher
                        .on_navigation_finished(&mut *self.engine, &mut self.job, status);
                let finished = self.deadline.guard(finished).await;
                match finished {
                    None => Some(self.timed_out(Clock::Overall)),
                    Some(outcome) => outcome,
                }
            }
            EngineEvent::ResourceError { url, error } => {
                self.watcher.on_resource_error(&url, &error);
                None
            }
            EngineEvent::ConsoleMessage(message) => {
                self.watcher.on_console_message(&message);
                None
            }
            EngineEvent::ResourceRequested { url } => {
                self.watcher.on_resource_requested(&mut *self.engine, &url);
                None
            }
        }
    }

    fn timed_out(&mut self, clock: Clock) -> CaptureOutcome {
        debug!("{clock:?} clock expired while {:?}", self.job.phase());
        match clock {
            Clock::Overall => info!("Timeout, giving up."),
            Clock::Grace => info!("Redirect grace period expired, giving up."),
        }
        self.job.disarm();
        CaptureOutcome::TimedOut(clock)
    }

    fn fail(&mut self, reason: FailureReason) -> CaptureOutcome {
        warn!("{reason}");
        self.job.disarm();
        CaptureOutcome::Failure(reason)
    }
}
