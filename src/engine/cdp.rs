use super::{Engine, EngineEvent, LoadStatus};
use crate::compat::CompatShim;
use crate::tab::Tab;
use crate::transport::CdpEvent;
use crate::types::{ImageFormat, Viewport};
use anyhow::{Context, Result};
use base64::Engine as _;
use base64::prelude::BASE64_STANDARD;
use log::{debug, warn};
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc};
use tokio::task::{JoinHandle, JoinSet};

/// [`Engine`] backed by a CDP tab.
pub struct CdpEngine {
    tab: Tab,
    viewport: Option<Viewport>,
    events_tx: mpsc::UnboundedSender<EngineEvent>,
    events_rx: Option<mpsc::UnboundedReceiver<EngineEvent>>,
    pump: JoinHandle<()>,
    injections: JoinSet<()>,
}

impl CdpEngine {
    /// Wraps `tab`, subscribing to its events before enabling the domains that emit them.
    pub async fn new(tab: Tab) -> Result<Self> {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let translator = EventTranslator::new(tab.session_id(), tab.target_id());
        let pump = tokio::spawn(pump_events(tab.subscribe(), translator, events_tx.clone()));

        tab.enable_events()
            .await
            .context("Failed to enable page events")?;

        Ok(Self {
            tab,
            viewport: None,
            events_tx,
            events_rx: Some(events_rx),
            pump,
            injections: JoinSet::new(),
        })
    }

    /// Closes the underlying tab.
    pub async fn close(mut self) -> Result<()> {
        self.pump.abort();
        self.injections.abort_all();
        self.tab.close().await
    }

    async fn write_screenshot(&self, output: &Path) -> Result<()> {
        let format = ImageFormat::from_path(output);
        let clip = self.viewport.map(|vp| vp.clip());
        let data = self.tab.screenshot(format, clip).await?;
        let bytes = BASE64_STANDARD
            .decode(data)
            .context("Screenshot data is not valid base64")?;

        if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(output, bytes)
            .await
            .with_context(|| format!("Failed to write {}", output.display()))
    }
}

impl Drop for CdpEngine {
    fn drop(&mut self) {
        self.pump.abort();
    }
}

impl Engine for CdpEngine {
    fn take_events(&mut self) -> Option<mpsc::UnboundedReceiver<EngineEvent>> {
        self.events_rx.take()
    }

    async fn open(&mut self, url: &str) -> Result<()> {
        if let Some(error) = self.tab.navigate(url).await? {
            // Refused navigations never fire a load event; report the failure ourselves.
            let _ = self
                .events_tx
                .send(EngineEvent::NavigationFinished(LoadStatus::Failed(error)));
        }
        Ok(())
    }

    async fn set_viewport(&mut self, viewport: Viewport) -> Result<()> {
        self.tab.set_viewport(&viewport).await?;
        self.viewport = Some(viewport);
        Ok(())
    }

    async fn capture(&mut self, output: &Path) -> bool {
        match self.write_screenshot(output).await {
            Ok(()) => true,
            Err(e) => {
                warn!("capture to {} failed: {e:#}", output.display());
                false
            }
        }
    }

    async fn current_url(&mut self) -> Option<String> {
        match self.tab.url().await {
            Ok(url) => Some(url),
            Err(e) => {
                debug!("could not read location.href: {e:#}");
                None
            }
        }
    }

    async fn install_compat(&mut self, shims: &[CompatShim]) -> bool {
        let mut installed = true;
        for shim in shims {
            if let Err(e) = self.tab.add_init_script(shim.source()).await {
                warn!("preloading {shim} failed: {e:#}");
                installed = false;
            }
        }
        installed
    }

    fn inject_compat(&mut self, shim: CompatShim) -> bool {
        while self.injections.try_join_next().is_some() {}
        let tab = self.tab.clone();
        self.injections.spawn(async move {
            if let Err(e) = tab.evaluate(shim.source()).await {
                debug!("injecting {shim} failed: {e:#}");
            }
        });
        true
    }
}

async fn pump_events(
    mut rx: broadcast::Receiver<CdpEvent>,
    mut translator: EventTranslator,
    tx: mpsc::UnboundedSender<EngineEvent>,
) {
    loop {
        match rx.recv().await {
            Ok(event) => {
                if let Some(translated) = translator.translate(&event)
                    && tx.send(translated).is_err()
                {
                    break;
                }
            }
            Err(RecvError::Lagged(n)) => {
                // A lost load event would strand the run until the deadline.
                warn!("dropped {n} browser events; rescheduling render");
                if tx
                    .send(EngineEvent::NavigationFinished(LoadStatus::Success))
                    .is_err()
                {
                    break;
                }
            }
            Err(RecvError::Closed) => break,
        }
    }
}

/// Maps raw CDP notifications of one session onto [`EngineEvent`]s.
struct EventTranslator {
    session_id: String,
    main_frame: String,
    requests: HashMap<String, String>,
    /// Whether the current main-frame navigation has fired its load event.
    /// True while no navigation is in flight.
    loaded: bool,
}

impl EventTranslator {
    fn new(session_id: &str, main_frame: &str) -> Self {
        Self {
            session_id: session_id.to_string(),
            main_frame: main_frame.to_string(),
            requests: HashMap::new(),
            loaded: true,
        }
    }

    fn is_main_frame(&self, params: &Value) -> bool {
        params["frameId"].as_str() == Some(self.main_frame.as_str())
    }

    fn translate(&mut self, event: &CdpEvent) -> Option<EngineEvent> {
        if event.session_id != self.session_id {
            return None;
        }
        let params = &event.params;

        match event.method.as_str() {
            "Page.frameStartedLoading" if self.is_main_frame(params) => {
                self.loaded = false;
                Some(EngineEvent::NavigationStarted)
            }
            "Page.loadEventFired" => {
                self.loaded = true;
                Some(EngineEvent::NavigationFinished(LoadStatus::Success))
            }
            // Downloads, 204s and aborted navigations stop without a load event.
            "Page.frameStoppedLoading" if self.is_main_frame(params) && !self.loaded => {
                self.loaded = true;
                Some(EngineEvent::NavigationFinished(LoadStatus::Failed(
                    "stopped loading before the load event".into(),
                )))
            }
            "Network.requestWillBeSent" => {
                let url = params["request"]["url"].as_str()?.to_string();
                if let Some(id) = params["requestId"].as_str() {
                    self.requests.insert(id.to_string(), url.clone());
                }
                Some(EngineEvent::ResourceRequested { url })
            }
            "Network.loadingFinished" => {
                if let Some(id) = params["requestId"].as_str() {
                    self.requests.remove(id);
                }
                None
            }
            "Network.loadingFailed" => {
                let url = params["requestId"]
                    .as_str()
                    .and_then(|id| self.requests.remove(id))
                    .unwrap_or_default();
                if params["canceled"].as_bool() == Some(true) {
                    return None;
                }
                let error = params["errorText"].as_str().unwrap_or("unknown error").to_string();
                Some(EngineEvent::ResourceError { url, error })
            }
            "Runtime.consoleAPICalled" => {
                let text = params["args"]
                    .as_array()
                    .map(|args| args.iter().map(remote_object_text).collect::<Vec<_>>().join(" "))
                    .unwrap_or_default();
                Some(EngineEvent::ConsoleMessage(text))
            }
            _ => None,
        }
    }
}

fn remote_object_text(arg: &Value) -> String {
    match arg.get("value") {
        Some(Value::String(s)) => s.clone(),
        Some(v) => v.to_string(),
        None => arg["description"]
            .as_str()
            .or_else(|| arg["type"].as_str())
            .unwrap_or_default()
            .to_string(),
    }
}
