use crate::browser::BrowserOptions;
use crate::compat::CompatShim;
use crate::types::Viewport;
use anyhow::{Context, Result, bail};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

mod defaults {
    use std::time::Duration;

    pub(super) const OVERALL_TIMEOUT: Duration = Duration::from_secs(15);
    pub(super) const SETTLE_DELAY: Duration = Duration::from_secs(2);

    pub(super) fn max_attempts() -> u32 {
        5
    }

    pub(super) fn interval() -> Duration {
        Duration::from_millis(200)
    }

    pub(super) fn grace() -> Duration {
        Duration::from_secs(7)
    }

    pub(super) fn retry_delay() -> Duration {
        Duration::from_secs(2)
    }
}

/// How failed capture attempts are retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(tag = "policy", rename_all = "kebab-case")]
pub enum RetryPolicy {
    /// Up to `max_attempts` captures spaced by `interval`. A one-shot grace
    /// clock armed on the first retry ends the run if the page keeps moving.
    BoundedCount {
        #[serde(default = "defaults::max_attempts")]
        max_attempts: u32,
        #[serde(default = "defaults::interval", with = "humantime_serde")]
        interval: Duration,
        #[serde(default = "defaults::grace", with = "humantime_serde")]
        grace: Duration,
    },
    /// One retry after `retry_delay`, then stop whatever happens.
    BoundedDelay {
        #[serde(default = "defaults::retry_delay", with = "humantime_serde")]
        retry_delay: Duration,
    },
}

impl RetryPolicy {
    pub fn bounded_count() -> Self {
        RetryPolicy::BoundedCount {
            max_attempts: defaults::max_attempts(),
            interval: defaults::interval(),
            grace: defaults::grace(),
        }
    }

    pub fn bounded_delay() -> Self {
        RetryPolicy::BoundedDelay {
            retry_delay: defaults::retry_delay(),
        }
    }

    /// Total capture calls allowed, first attempt included.
    pub fn max_attempts(&self) -> u32 {
        match self {
            RetryPolicy::BoundedCount { max_attempts, .. } => *max_attempts,
            RetryPolicy::BoundedDelay { .. } => 2,
        }
    }

    /// Wait between a failed attempt and the next one.
    pub fn retry_delay(&self) -> Duration {
        match self {
            RetryPolicy::BoundedCount { interval, .. } => *interval,
            RetryPolicy::BoundedDelay { retry_delay } => *retry_delay,
        }
    }

    pub fn grace(&self) -> Option<Duration> {
        match self {
            RetryPolicy::BoundedCount { grace, .. } => Some(*grace),
            RetryPolicy::BoundedDelay { .. } => None,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::bounded_delay()
    }
}

/// What a failed navigation status means for the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum NavigationPolicy {
    /// Capture anyway; the result may be the browser's error page.
    #[default]
    Permissive,
    /// End the run without capturing.
    Strict,
}

/// Everything that shapes one capture run.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CaptureConfig {
    #[serde(with = "humantime_serde")]
    pub overall_timeout: Duration,
    #[serde(with = "humantime_serde")]
    pub settle_delay: Duration,
    pub viewport: Viewport,
    pub retry: RetryPolicy,
    pub navigation: NavigationPolicy,
    pub log_console: bool,
    pub log_resource_errors: bool,
    pub compat_shims: Vec<CompatShim>,
    pub browser: BrowserOptions,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            overall_timeout: defaults::OVERALL_TIMEOUT,
            settle_delay: defaults::SETTLE_DELAY,
            viewport: Viewport::default(),
            retry: RetryPolicy::default(),
            navigation: NavigationPolicy::default(),
            log_console: true,
            log_resource_errors: false,
            compat_shims: Vec::new(),
            browser: BrowserOptions::default(),
        }
    }
}

impl CaptureConfig {
    /// Reads a TOML file. Keys left out keep their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config = Self::from_toml(&text)
            .with_context(|| format!("Invalid config {}", path.display()))?;
        Ok(config)
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.overall_timeout.is_zero() {
            bail!("overall_timeout must be greater than zero");
        }
        if self.viewport.width == 0 || self.viewport.height == 0 {
            bail!("viewport must be at least 1x1, got {}", self.viewport);
        }
        if self.viewport.device_scale_factor <= 0.0 {
            bail!("viewport.device_scale_factor must be positive");
        }
        if let RetryPolicy::BoundedCount {
            max_attempts, grace, ..
        } = self.retry
        {
            if max_attempts == 0 {
                bail!("retry.max_attempts must be at least 1");
            }
            if grace.is_zero() {
                bail!("retry.grace must be greater than zero");
            }
        }
        Ok(())
    }
}
