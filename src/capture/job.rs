use super::timer::PendingTimer;
use crate::types::Viewport;
use std::path::{Path, PathBuf};

/// Where a run currently stands. Terminal states are [`super::CaptureOutcome`]s.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Navigating,
    Settling,
    Capturing,
    Retrying,
}

/// The single unit of work of a run: one URL rendered to one file.
#[derive(Debug)]
pub struct CaptureJob {
    url: String,
    output: PathBuf,
    viewport: Viewport,
    pub(crate) attempts: u32,
    pub(crate) phase: Phase,
    /// The next render attempt, whether a settle wait or a retry wait.
    pub(crate) render_timer: PendingTimer,
    /// Redirect grace clock of the bounded-count policy.
    pub(crate) grace_clock: PendingTimer,
}

impl CaptureJob {
    pub fn new(url: impl Into<String>, output: impl Into<PathBuf>, viewport: Viewport) -> Self {
        Self {
            url: url.into(),
            output: output.into(),
            viewport,
            attempts: 0,
            phase: Phase::Idle,
            render_timer: PendingTimer::idle(),
            grace_clock: PendingTimer::idle(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn output(&self) -> &Path {
        &self.output
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    /// Capture calls made so far.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn render_pending(&self) -> bool {
        self.render_timer.is_pending()
    }

    pub fn grace_pending(&self) -> bool {
        self.grace_clock.is_pending()
    }

    /// Disarms everything but the run deadline, which the job does not own.
    pub(crate) fn disarm(&mut self) {
        self.render_timer.cancel();
        self.grace_clock.cancel();
    }
}
