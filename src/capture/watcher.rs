use super::job::{CaptureJob, Phase};
use super::{CaptureOutcome, FailureReason};
use crate::compat::{self, CompatShim};
use crate::config::{CaptureConfig, NavigationPolicy};
use crate::engine::{Engine, LoadStatus};
use log::{debug, info, warn};
use std::time::Duration;

/// Turns page lifecycle signals into (re)scheduled render attempts.
#[derive(Debug, Clone)]
pub struct LoadWatcher {
    settle_delay: Duration,
    navigation: NavigationPolicy,
    log_console: bool,
    log_resource_errors: bool,
    shims: Vec<CompatShim>,
}

impl LoadWatcher {
    pub fn new(config: &CaptureConfig) -> Self {
        Self {
            settle_delay: config.settle_delay,
            navigation: config.navigation,
            log_console: config.log_console,
            log_resource_errors: config.log_resource_errors,
            shims: config.compat_shims.clone(),
        }
    }

    /// A new navigation makes any scheduled render stale.
    pub fn on_navigation_started(&self, job: &mut CaptureJob) {
        if job.render_timer.cancel() {
            info!("Previous rendering schedule canceled.");
        }
        job.phase = Phase::Navigating;
    }

    /// Frames the page and schedules a render after the settle delay.
    ///
    /// Returns an outcome only when the strict policy rejects a failed load.
    pub async fn on_navigation_finished<E: Engine>(
        &self,
        engine: &mut E,
        job: &mut CaptureJob,
        status: LoadStatus,
    ) -> Option<CaptureOutcome> {
        debug!("load finished: {status}");
        if let LoadStatus::Failed(reason) = &status {
            match self.navigation {
                NavigationPolicy::Strict => {
                    info!("Unable to load {}: {reason}", job.url());
                    job.disarm();
                    return Some(CaptureOutcome::Failure(FailureReason::NavigationFailed(
                        reason.clone(),
                    )));
                }
                NavigationPolicy::Permissive => {
                    warn!("Load of {} reported {status}; rendering anyway", job.url());
                }
            }
        }

        if let Err(e) = engine.set_viewport(job.viewport()).await {
            warn!("could not set viewport {}: {e:#}", job.viewport());
        }

        job.render_timer.arm(self.settle_delay);
        job.phase = Phase::Settling;
        info!("Will render in {} secs", self.settle_delay.as_secs_f64());
        None
    }

    pub fn on_resource_error(&self, url: &str, error: &str) {
        if self.log_resource_errors {
            info!("Unable to load resource {url}: {error}");
        }
    }

    pub fn on_console_message(&self, message: &str) {
        if self.log_console {
            info!("Console Message: {message}");
        }
    }

    /// Registers the configured shims to run ahead of every document's own scripts.
    pub async fn install_shims<E: Engine>(&self, engine: &mut E) {
        if self.shims.is_empty() {
            return;
        }
        if !engine.install_compat(&self.shims).await {
            warn!("compatibility shims could not be preloaded; relying on per-script injection");
        }
    }

    /// Queues the configured shims ahead of an HTTP(S) script. Never waits on the page.
    pub fn on_resource_requested<E: Engine>(&self, engine: &mut E, url: &str) {
        if self.shims.is_empty() || !compat::is_script_request(url) {
            return;
        }
        for shim in &self.shims {
            if engine.inject_compat(*shim) {
                debug!("queued {shim} before {url}");
            }
        }
    }
}
