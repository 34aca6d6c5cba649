use anyhow::{Context, Result};
use cdp_rasterize::capture::DeadlineGuard;
use cdp_rasterize::cli::{self, Cli};
use cdp_rasterize::{
    Browser, CaptureConfig, CaptureController, CaptureJob, CaptureOutcome, CdpEngine, Clock,
};
use clap::Parser;
use clap::error::ErrorKind;
use log::{LevelFilter, debug, error, info, warn};
use std::process::ExitCode;

const EXIT_USAGE: u8 = 2;
const EXIT_INTERRUPTED: u8 = 130;

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            let _ = e.print();
            return ExitCode::SUCCESS;
        }
        Err(e) => {
            println!("{}", cli::usage());
            eprintln!("{}", e.render());
            return ExitCode::from(EXIT_USAGE);
        }
    };

    init_logging(cli.log_level);

    let config = match cli.resolve_config() {
        Ok(config) => config,
        Err(e) => {
            error!("{e:#}");
            return ExitCode::from(EXIT_USAGE);
        }
    };

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to start async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };
    let code = runtime.block_on(run(cli, config));
    // A browser that never became ready can leave its stderr reader blocked on
    // the pipe; do not wait for it.
    runtime.shutdown_background();
    code
}

fn init_logging(level: LevelFilter) {
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .target(env_logger::Target::Stdout)
        .format_timestamp_millis()
        .init();
}

/// Bounds everything from browser launch to teardown by `overall_timeout`.
async fn run(cli: Cli, config: CaptureConfig) -> ExitCode {
    let mut deadline = DeadlineGuard::start(config.overall_timeout);
    let job = CaptureJob::new(cli.url, cli.output, config.viewport);
    let rasterizing = rasterize(&config, job, deadline.clone());

    tokio::select! {
        result = deadline.guard(rasterizing) => match result {
            Some(Ok(outcome)) => ExitCode::from(outcome.exit_code()),
            Some(Err(e)) => {
                error!("{e:#}");
                ExitCode::FAILURE
            }
            None => {
                // Dropping the run future drops the browser, which kills it.
                info!("Timeout, giving up.");
                ExitCode::from(CaptureOutcome::TimedOut(Clock::Overall).exit_code())
            }
        },
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted.");
            ExitCode::from(EXIT_INTERRUPTED)
        }
    }
}

async fn rasterize(
    config: &CaptureConfig,
    job: CaptureJob,
    deadline: DeadlineGuard,
) -> Result<CaptureOutcome> {
    let browser = Browser::launch(&config.browser, config.viewport)
        .await
        .context("Failed to launch browser")?;
    match browser.version().await {
        Ok(version) => info!("Found browser version {version}"),
        Err(e) => warn!("Unable to read browser version: {e:#}"),
    }

    let tab = browser.new_tab().await.context("Failed to open tab")?;
    let mut engine = CdpEngine::new(tab).await?;

    let outcome = CaptureController::with_deadline(&mut engine, job, config, deadline)
        .run()
        .await;

    if let Err(e) = engine.close().await {
        debug!("closing tab: {e:#}");
    }
    if let Err(e) = browser.close_async().await {
        debug!("closing browser: {e:#}");
    }
    Ok(outcome)
}
