//! The browser capabilities the capture controller depends on.
//!
//! [`CdpEngine`] drives a real browser tab. Tests substitute a scripted engine.

mod cdp;

pub use cdp::CdpEngine;

use crate::compat::CompatShim;
use crate::types::Viewport;
use anyhow::Result;
use std::fmt;
use std::path::Path;
use tokio::sync::mpsc;

/// Terminal state of a page load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadStatus {
    Success,
    Failed(String),
}

impl fmt::Display for LoadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadStatus::Success => f.write_str("success"),
            LoadStatus::Failed(reason) => write!(f, "fail ({reason})"),
        }
    }
}

/// Page lifecycle signals, whatever the engine's native notification style.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    NavigationStarted,
    NavigationFinished(LoadStatus),
    ResourceError { url: String, error: String },
    ConsoleMessage(String),
    ResourceRequested { url: String },
}

/// A page the controller can navigate and rasterize.
#[allow(async_fn_in_trait)]
pub trait Engine {
    /// Hands over the event stream. Returns `None` after the first call.
    fn take_events(&mut self) -> Option<mpsc::UnboundedReceiver<EngineEvent>>;

    /// Starts navigating to `url`. Completion is reported as an event.
    async fn open(&mut self, url: &str) -> Result<()>;

    /// Sets both the viewport and the clip rectangle used by [`Engine::capture`].
    async fn set_viewport(&mut self, viewport: Viewport) -> Result<()>;

    /// Renders the current page to `output`. `false` means nothing usable was written.
    async fn capture(&mut self, output: &Path) -> bool;

    /// The page's location at this moment, after any redirects.
    async fn current_url(&mut self) -> Option<String>;

    /// Registers shims to run before any script of every new document.
    async fn install_compat(&mut self, shims: &[CompatShim]) -> bool;

    /// Schedules a shim for evaluation in the current page and returns at once.
    /// `false` means it could not be scheduled.
    fn inject_compat(&mut self, shim: CompatShim) -> bool;
}
