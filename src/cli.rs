use crate::compat::CompatShim;
use crate::config::{CaptureConfig, NavigationPolicy, RetryPolicy};
use crate::types::Viewport;
use anyhow::{Result, bail};
use clap::{CommandFactory, Parser, ValueEnum};
use humantime_serde::re::humantime::parse_duration;
use log::LevelFilter;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PolicyKind {
    /// Retry once after --retry-delay
    BoundedDelay,
    /// Retry up to --max-attempts times, bounded by a redirect grace clock
    BoundedCount,
}

#[derive(Debug, Parser)]
#[command(name = "cdp-rasterize")]
#[command(
    version,
    about = "Render a web page to an image with headless Chrome",
    long_about = "Render a web page to an image with headless Chrome.\n\nThe page is captured a settle delay after it finishes loading; failed captures are retried per the retry policy, and the whole run is cut off at --timeout.\n\nExit status: 0 success, 1 failure, 2 usage error, 124 timed out, 130 interrupted."
)]
pub struct Cli {
    /// Page to load
    pub url: String,

    /// Image file to write (.png, .jpg or .webp)
    #[arg(default_value = "screenshot.png")]
    pub output: PathBuf,

    /// TOML config file; flags given here override it
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Output size
    #[arg(long, value_name = "WIDTHxHEIGHT")]
    pub viewport: Option<Viewport>,

    /// Hard limit on the whole run
    #[arg(long, value_name = "DURATION", value_parser = parse_duration)]
    pub timeout: Option<Duration>,

    /// Wait after a finished load before capturing
    #[arg(long, value_name = "DURATION", value_parser = parse_duration)]
    pub settle: Option<Duration>,

    /// How failed captures are retried
    #[arg(long, value_enum)]
    pub policy: Option<PolicyKind>,

    /// Capture attempts allowed by the bounded-count policy
    #[arg(long, value_name = "N")]
    pub max_attempts: Option<u32>,

    /// Wait between a failed capture and the next attempt
    #[arg(long, value_name = "DURATION", value_parser = parse_duration)]
    pub retry_delay: Option<Duration>,

    /// Redirect grace clock of the bounded-count policy
    #[arg(long, value_name = "DURATION", value_parser = parse_duration)]
    pub grace: Option<Duration>,

    /// Whether a failed load is still captured
    #[arg(long, value_enum)]
    pub navigation: Option<NavigationPolicy>,

    /// Inject a compatibility shim before HTTP(S) scripts (repeatable)
    #[arg(long = "shim", value_name = "NAME", value_parser = parse_shim)]
    pub shims: Vec<CompatShim>,

    /// Log failed sub-resource loads
    #[arg(long)]
    pub log_resource_errors: bool,

    /// Do not echo the page's console messages
    #[arg(long)]
    pub quiet_console: bool,

    /// Browser executable (defaults to $CHROME, then auto-detection)
    #[arg(long, value_name = "PATH")]
    pub chrome: Option<PathBuf>,

    /// Show the browser window
    #[arg(long)]
    pub headed: bool,

    /// Refuse pages with invalid TLS certificates
    #[arg(long)]
    pub strict_tls: bool,

    /// Log level; RUST_LOG overrides it
    #[arg(long, value_name = "LEVEL", default_value = "info")]
    pub log_level: LevelFilter,
}

fn parse_shim(name: &str) -> Result<CompatShim, String> {
    CompatShim::from_name(name).ok_or_else(|| {
        let known: Vec<_> = CompatShim::ALL.iter().map(|s| s.name()).collect();
        format!("unknown shim {name:?}, expected one of: {}", known.join(", "))
    })
}

/// The one-line usage string printed on argument errors.
pub fn usage() -> String {
    Cli::command().render_usage().to_string()
}

impl Cli {
    /// Merges the optional config file with the flags given on the command line.
    pub fn resolve_config(&self) -> Result<CaptureConfig> {
        let mut config = match &self.config {
            Some(path) => CaptureConfig::load(path)?,
            None => CaptureConfig::default(),
        };

        if let Some(viewport) = self.viewport {
            config.viewport = viewport;
        }
        if let Some(timeout) = self.timeout {
            config.overall_timeout = timeout;
        }
        if let Some(settle) = self.settle {
            config.settle_delay = settle;
        }
        if let Some(navigation) = self.navigation {
            config.navigation = navigation;
        }
        config.retry = self.resolve_retry(config.retry)?;

        for shim in &self.shims {
            if !config.compat_shims.contains(shim) {
                config.compat_shims.push(*shim);
            }
        }
        config.log_resource_errors |= self.log_resource_errors;
        if self.quiet_console {
            config.log_console = false;
        }

        if let Some(chrome) = &self.chrome {
            config.browser.chrome = Some(chrome.clone());
        }
        if self.headed {
            config.browser.headless = false;
        }
        if self.strict_tls {
            config.browser.ignore_certificate_errors = false;
        }

        config.validate()?;
        Ok(config)
    }

    fn resolve_retry(&self, base: RetryPolicy) -> Result<RetryPolicy> {
        let mut policy = match (self.policy, base) {
            (Some(PolicyKind::BoundedDelay), RetryPolicy::BoundedCount { .. }) => {
                RetryPolicy::bounded_delay()
            }
            (Some(PolicyKind::BoundedCount), RetryPolicy::BoundedDelay { .. }) => {
                RetryPolicy::bounded_count()
            }
            (_, base) => base,
        };

        match &mut policy {
            RetryPolicy::BoundedCount {
                max_attempts,
                interval,
                grace,
            } => {
                if let Some(n) = self.max_attempts {
                    *max_attempts = n;
                }
                if let Some(d) = self.retry_delay {
                    *interval = d;
                }
                if let Some(g) = self.grace {
                    *grace = g;
                }
            }
            RetryPolicy::BoundedDelay { retry_delay } => {
                if self.max_attempts.is_some() || self.grace.is_some() {
                    bail!("--max-attempts and --grace need --policy bounded-count");
                }
                if let Some(d) = self.retry_delay {
                    *retry_delay = d;
                }
            }
        }
        Ok(policy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::error::ErrorKind;

    fn parse(args: &[&str]) -> Result<Cli, clap::Error> {
        Cli::try_parse_from(std::iter::once("cdp-rasterize").chain(args.iter().copied()))
    }

    #[test]
    fn accepts_one_or_two_positionals() {
        let cli = parse(&["https://example.com"]).unwrap();
        assert_eq!(cli.output, PathBuf::from("screenshot.png"));

        let cli = parse(&["https://example.com", "out.png"]).unwrap();
        assert_eq!(cli.url, "https://example.com");
        assert_eq!(cli.output, PathBuf::from("out.png"));
    }

    #[test]
    fn rejects_argument_counts_outside_range() {
        assert_eq!(
            parse(&[]).unwrap_err().kind(),
            ErrorKind::MissingRequiredArgument
        );
        assert_eq!(
            parse(&["https://example.com", "out.png", "extra"]).unwrap_err().kind(),
            ErrorKind::UnknownArgument
        );
    }

    #[test]
    fn usage_names_both_positionals() {
        let usage = usage();
        assert!(usage.contains("<URL>"), "{usage}");
        assert!(usage.contains("[OUTPUT]"), "{usage}");
    }

    #[test]
    fn defaults_without_flags() {
        let config = parse(&["https://example.com"]).unwrap().resolve_config().unwrap();
        assert_eq!(config.retry, RetryPolicy::bounded_delay());
        assert_eq!(config.overall_timeout, Duration::from_secs(15));
        assert!(config.log_console);
        assert!(config.browser.headless);
    }

    #[test]
    fn flags_override_defaults() {
        let cli = parse(&[
            "https://example.com",
            "out.jpg",
            "--viewport",
            "800x600",
            "--timeout",
            "30s",
            "--settle",
            "200ms",
            "--policy",
            "bounded-count",
            "--max-attempts",
            "3",
            "--navigation",
            "strict",
            "--shim",
            "function-bind",
            "--quiet-console",
            "--headed",
        ])
        .unwrap();
        let config = cli.resolve_config().unwrap();

        assert_eq!(config.viewport, Viewport::new(800, 600));
        assert_eq!(config.overall_timeout, Duration::from_secs(30));
        assert_eq!(config.settle_delay, Duration::from_millis(200));
        assert_eq!(config.retry.max_attempts(), 3);
        assert_eq!(config.retry.retry_delay(), Duration::from_millis(200));
        assert_eq!(config.retry.grace(), Some(Duration::from_secs(7)));
        assert_eq!(config.navigation, NavigationPolicy::Strict);
        assert_eq!(config.compat_shims, vec![CompatShim::FunctionBind]);
        assert!(!config.log_console);
        assert!(!config.browser.headless);
    }

    #[test]
    fn count_only_flags_need_bounded_count() {
        let cli = parse(&["https://example.com", "--max-attempts", "4"]).unwrap();
        let err = cli.resolve_config().unwrap_err();
        assert!(err.to_string().contains("bounded-count"));
    }

    #[test]
    fn unknown_shim_is_a_parse_error() {
        let err = parse(&["https://example.com", "--shim", "array-flat"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ValueValidation);
    }

    #[test]
    fn flags_layer_over_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rasterize.toml");
        std::fs::write(
            &path,
            "settle_delay = \"1s\"\n[retry]\npolicy = \"bounded-count\"\nmax_attempts = 8\n",
        )
        .unwrap();

        let path_arg = path.to_string_lossy().into_owned();
        let cli = parse(&["https://example.com", "--config", &path_arg, "--grace", "3s"]).unwrap();
        let config = cli.resolve_config().unwrap();
        assert_eq!(config.settle_delay, Duration::from_secs(1));
        assert_eq!(config.retry.max_attempts(), 8);
        assert_eq!(config.retry.grace(), Some(Duration::from_secs(3)));
    }
}
