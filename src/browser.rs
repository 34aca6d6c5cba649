mod browser_config;
mod temp_dir;

use anyhow::{Context, Result, anyhow};
use log::{debug, warn};
use regex::Regex;
use serde_json::json;
use std::io::{BufRead, BufReader};
use std::process::{Child, Command, Stdio};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use temp_dir::CustomTempDir;

use crate::tab::Tab;
use crate::transport::{Transport, TransportResponse, next_id};
use crate::types::Viewport;

pub use browser_config::BrowserOptions;
use browser_config::BrowserConfig;

const LAUNCH_TIMEOUT: Duration = Duration::from_secs(20);

#[derive(Debug)]
struct Process {
    child: Child,
    _temp_dir: CustomTempDir,
}

impl Drop for Process {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
        // `_temp_dir` drops afterwards and removes the profile.
    }
}

/// A launched browser process and its DevTools connection.
#[derive(Debug)]
pub struct Browser {
    transport: Arc<Transport>,
    process: Mutex<Option<Process>>,
}

impl Browser {
    /// Launches a browser whose window matches `window`.
    pub async fn launch(options: &BrowserOptions, window: Viewport) -> Result<Self> {
        let config = BrowserConfig::new(options, window)?;
        debug!("launching {}", config.executable_path.display());

        #[cfg(windows)]
        let mut cmd = {
            use std::os::windows::process::CommandExt;
            let mut c = Command::new(&config.executable_path);
            c.creation_flags(0x08000000); // CREATE_NO_WINDOW
            c
        };
        #[cfg(not(windows))]
        let mut cmd = Command::new(&config.executable_path);

        let mut child = cmd
            .args(config.get_browser_args())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("Failed to spawn {}", config.executable_path.display()))?;
        let stderr = child
            .stderr
            .take()
            .context("Failed to get stderr from browser process")?;

        // Own the child before awaiting so a failed handshake still reaps it.
        let process = Process {
            child,
            _temp_dir: config.temp_dir,
        };

        let ws_url = tokio::time::timeout(LAUNCH_TIMEOUT, Self::wait_for_ws(stderr))
            .await
            .map_err(|_| anyhow!("Browser did not report a DevTools endpoint"))??;
        debug!("devtools endpoint {ws_url}");

        Ok(Self {
            transport: Arc::new(Transport::new(&ws_url).await?),
            process: Mutex::new(Some(process)),
        })
    }

    /// Reads browser stderr lines to extract the WebSocket debugging URL.
    async fn wait_for_ws(stderr: std::process::ChildStderr) -> Result<String> {
        let reader = BufReader::new(stderr);
        let re = Regex::new(r"listening on (.*/devtools/browser/.*)$")?;
        tokio::task::spawn_blocking(move || {
            for line in reader.lines() {
                let l = line?;
                if let Some(cap) = re.captures(&l) {
                    return Ok(cap[1].to_string());
                }
            }
            Err(anyhow!("WS URL not found in stderr"))
        })
        .await?
    }

    /// Opens a new blank tab.
    pub async fn new_tab(&self) -> Result<Tab> {
        Tab::new(self.transport.clone()).await
    }

    /// Returns the browser product string, e.g. `HeadlessChrome/126.0.6478.126`.
    pub async fn version(&self) -> Result<String> {
        let TransportResponse::Response(res) = self
            .transport
            .send(json!({ "id": next_id(), "method": "Browser.getVersion", "params": {} }))
            .await?
        else {
            return Err(anyhow!("Unexpected response type when getting version"));
        };
        res.result["product"]
            .as_str()
            .map(str::to_string)
            .context("No product in Browser.getVersion")
    }

    /// Shuts down the transport, then kills the process and removes its profile.
    pub async fn close_async(&self) -> Result<()> {
        self.transport.shutdown().await;
        let process = self
            .process
            .lock()
            .map_err(|_| anyhow!("Failed to lock browser process"))?
            .take();
        drop(process);
        Ok(())
    }
}

impl Drop for Browser {
    fn drop(&mut self) {
        match self.process.lock() {
            Ok(mut guard) => drop(guard.take()),
            Err(e) => warn!("Error closing browser in Drop: {e}"),
        }
    }
}
