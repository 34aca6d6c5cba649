#![allow(dead_code)]

use anyhow::{Result, anyhow};
use cdp_rasterize::{CompatShim, Engine, EngineEvent, LoadStatus, Viewport};
use log::{Level, LevelFilter, Log, Metadata, Record};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;

/// Scripted engine: replays canned events on `open` and canned capture results.
pub struct MockEngine {
    tx: mpsc::UnboundedSender<EngineEvent>,
    rx: Option<mpsc::UnboundedReceiver<EngineEvent>>,
    on_open: Vec<EngineEvent>,
    results: VecDeque<bool>,
    hang_capture: bool,
    fail_open: bool,
    location: String,
    injection_delay: Duration,
    injected: Arc<Mutex<Vec<CompatShim>>>,
    pub opened: Vec<String>,
    pub captures: Vec<Instant>,
    pub outputs: Vec<PathBuf>,
    pub viewports: Vec<Viewport>,
    pub installed: Vec<CompatShim>,
}

impl MockEngine {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: Some(rx),
            on_open: Vec::new(),
            results: VecDeque::new(),
            hang_capture: false,
            fail_open: false,
            location: "https://example.com/".into(),
            injection_delay: Duration::ZERO,
            injected: Arc::default(),
            opened: Vec::new(),
            captures: Vec::new(),
            outputs: Vec::new(),
            viewports: Vec::new(),
            installed: Vec::new(),
        }
    }

    /// Navigation starts and finishes successfully as soon as the page is opened.
    pub fn loads_successfully(self) -> Self {
        self.on_open([
            EngineEvent::NavigationStarted,
            EngineEvent::NavigationFinished(LoadStatus::Success),
        ])
    }

    pub fn on_open(mut self, events: impl IntoIterator<Item = EngineEvent>) -> Self {
        self.on_open.extend(events);
        self
    }

    /// Results of successive captures. Captures past the end fail.
    pub fn capture_results(mut self, results: impl IntoIterator<Item = bool>) -> Self {
        self.results.extend(results);
        self
    }

    pub fn hanging_capture(mut self) -> Self {
        self.hang_capture = true;
        self
    }

    pub fn failing_open(mut self) -> Self {
        self.fail_open = true;
        self
    }

    /// Each queued shim lands in the page only after `delay`.
    pub fn slow_injection(mut self, delay: Duration) -> Self {
        self.injection_delay = delay;
        self
    }

    /// Shims that have landed in the page so far.
    pub fn injected(&self) -> Vec<CompatShim> {
        self.injected.lock().unwrap().clone()
    }

    pub fn located_at(mut self, url: &str) -> Self {
        self.location = url.into();
        self
    }

    /// Delivers `event` once `delay` has passed on the (paused) clock.
    pub fn send_after(&self, delay: Duration, event: EngineEvent) {
        let tx = self.tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(event);
        });
    }
}

impl Engine for MockEngine {
    fn take_events(&mut self) -> Option<mpsc::UnboundedReceiver<EngineEvent>> {
        self.rx.take()
    }

    async fn open(&mut self, url: &str) -> Result<()> {
        self.opened.push(url.to_string());
        if self.fail_open {
            return Err(anyhow!("Transport actor dropped"));
        }
        for event in self.on_open.drain(..) {
            let _ = self.tx.send(event);
        }
        Ok(())
    }

    async fn set_viewport(&mut self, viewport: Viewport) -> Result<()> {
        self.viewports.push(viewport);
        Ok(())
    }

    async fn capture(&mut self, output: &Path) -> bool {
        self.captures.push(Instant::now());
        self.outputs.push(output.to_path_buf());
        if self.hang_capture {
            std::future::pending::<()>().await;
        }
        self.results.pop_front().unwrap_or(false)
    }

    async fn current_url(&mut self) -> Option<String> {
        Some(self.location.clone())
    }

    async fn install_compat(&mut self, shims: &[CompatShim]) -> bool {
        self.installed.extend_from_slice(shims);
        true
    }

    fn inject_compat(&mut self, shim: CompatShim) -> bool {
        let injected = Arc::clone(&self.injected);
        let delay = self.injection_delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            injected.lock().unwrap().push(shim);
        });
        true
    }
}

/// Asserts `at` is `expected` after `start`, give or take timer granularity.
pub fn assert_at(start: Instant, at: Instant, expected: Duration) {
    let elapsed = at.duration_since(start);
    assert!(
        elapsed >= expected && elapsed < expected + Duration::from_millis(5),
        "event at {elapsed:?}, expected {expected:?}"
    );
}

thread_local! {
    static LINES: RefCell<Vec<String>> = const { RefCell::new(Vec::new()) };
}

struct ThreadLogger;

impl Log for ThreadLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= Level::Info
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) && record.target().starts_with("cdp_rasterize") {
            LINES.with(|lines| lines.borrow_mut().push(record.args().to_string()));
        }
    }

    fn flush(&self) {}
}

static LOGGER: ThreadLogger = ThreadLogger;

/// Starts collecting this thread's log lines. `#[tokio::test]` runs everything
/// on the test thread, so tests running in parallel do not see each other's lines.
pub fn capture_logs() {
    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(LevelFilter::Info);
    }
    LINES.with(|lines| lines.borrow_mut().clear());
}

pub fn logged() -> Vec<String> {
    LINES.with(|lines| lines.borrow().clone())
}

pub fn count_logged(needle: &str) -> usize {
    logged().iter().filter(|line| line.contains(needle)).count()
}
