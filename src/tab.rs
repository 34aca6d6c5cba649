use crate::transport::{CdpEvent, Transport, TransportResponse, next_id};
use crate::types::{ClipRegion, ImageFormat, Viewport};
use crate::utils::{self, send_and_get_msg};
use anyhow::{Context, Result, anyhow};
use serde_json::{Value, json};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Represents a CDP browser tab (target) session.
///
/// Clones address the same session.
#[derive(Clone)]
pub struct Tab {
    pub(crate) transport: Arc<Transport>,
    pub(crate) session_id: String,
    pub(crate) target_id: String,
}

impl Tab {
    /// Creates a new blank tab and attaches to it.
    pub(crate) async fn new(transport: Arc<Transport>) -> Result<Self> {
        let TransportResponse::Response(res_create) = transport
            .send(json!({ "id": next_id(), "method": "Target.createTarget", "params": { "url": "about:blank" } }))
            .await? else { return Err(anyhow!("Invalid response type")); };

        let target_id = res_create.result["targetId"]
            .as_str()
            .context("No targetId")?
            .to_string();

        let TransportResponse::Response(res_attach) = transport
            .send(json!({ "id": next_id(), "method": "Target.attachToTarget", "params": { "targetId": target_id } }))
            .await? else { return Err(anyhow!("Invalid response type")); };

        let session_id = res_attach.result["sessionId"]
            .as_str()
            .context("No sessionId")?
            .to_string();

        Ok(Self {
            transport,
            session_id,
            target_id,
        })
    }

    pub(crate) async fn send_cmd(&self, method: &str, params: Value) -> Result<Value> {
        let msg_id = next_id();
        let msg = json!({
            "id": msg_id,
            "method": method,
            "params": params
        })
        .to_string();
        let res = send_and_get_msg(self.transport.clone(), msg_id, &self.session_id, msg).await?;
        utils::serde_msg(&res)
    }

    /// Subscribes to protocol events. Filter on [`Tab::session_id`] to keep this tab's.
    pub(crate) fn subscribe(&self) -> broadcast::Receiver<CdpEvent> {
        self.transport.subscribe()
    }

    /// Turns on the lifecycle, network and console event domains.
    pub async fn enable_events(&self) -> Result<&Self> {
        for domain in ["Page.enable", "Network.enable", "Runtime.enable"] {
            self.send_cmd(domain, json!({}))
                .await
                .with_context(|| format!("{domain} failed"))?;
        }
        Ok(self)
    }

    /// Starts a navigation without waiting for the load event.
    ///
    /// Returns the browser's `errorText` when the navigation was refused outright
    /// (DNS failure, TLS error, aborted request).
    pub async fn navigate(&self, url: &str) -> Result<Option<String>> {
        let res = self.send_cmd("Page.navigate", json!({ "url": url })).await?;
        Ok(res["result"]["errorText"]
            .as_str()
            .filter(|s| !s.is_empty())
            .map(str::to_string))
    }

    pub async fn set_viewport(&self, viewport: &Viewport) -> Result<&Self> {
        self.send_cmd(
            "Emulation.setDeviceMetricsOverride",
            json!({
                "width": viewport.width,
                "height": viewport.height,
                "deviceScaleFactor": viewport.device_scale_factor,
                "mobile": false,
                "screenOrientation": {"type": "portraitPrimary", "angle": 0}
            }),
        )
        .await?;
        Ok(self)
    }

    /// Captures the page, returning base64 image data.
    pub async fn screenshot(
        &self,
        format: ImageFormat,
        clip: Option<ClipRegion>,
    ) -> Result<String> {
        let mut params = json!({
            "format": format.as_str(),
            "fromSurface": true,
        });
        if matches!(format, ImageFormat::Jpeg | ImageFormat::WebP) {
            params["quality"] = json!(90);
        }
        if let Some(clip) = clip {
            params["clip"] = json!({
                "x": clip.x,
                "y": clip.y,
                "width": clip.width,
                "height": clip.height,
                "scale": clip.scale
            });
        }

        self.activate().await?;
        let result = self.send_cmd("Page.captureScreenshot", params).await?;

        result["result"]["data"]
            .as_str()
            .map(|s| s.to_string())
            .context("No image data received")
    }

    pub async fn evaluate(&self, expression: &str) -> Result<Value> {
        let result = self
            .send_cmd(
                "Runtime.evaluate",
                json!({
                    "expression": expression,
                    "returnByValue": true,
                    "awaitPromise": true
                }),
            )
            .await?;
        if let Some(exc) = result["result"].get("exceptionDetails") {
            return Err(anyhow!("Script threw: {}", exc["text"]));
        }
        Ok(result["result"]["result"]["value"].clone())
    }

    /// Evaluates `source` in every document this tab loads from now on, before
    /// the document's own scripts.
    pub async fn add_init_script(&self, source: &str) -> Result<String> {
        let res = self
            .send_cmd("Page.addScriptToEvaluateOnNewDocument", json!({ "source": source }))
            .await?;
        res["result"]["identifier"]
            .as_str()
            .map(str::to_string)
            .context("No script identifier returned")
    }

    pub async fn url(&self) -> Result<String> {
        self.evaluate("window.location.href")
            .await?
            .as_str()
            .map(str::to_string)
            .context("location.href is not a string")
    }

    /// Activates the target tab to bring it to the foreground.
    pub async fn activate(&self) -> Result<&Self> {
        let msg_id = next_id();
        let msg = json!({ "id": msg_id, "method": "Target.activateTarget", "params": { "targetId": self.target_id } }).to_string();
        send_and_get_msg(self.transport.clone(), msg_id, &self.session_id, msg).await?;
        Ok(self)
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn target_id(&self) -> &str {
        &self.target_id
    }

    pub async fn close(&self) -> Result<()> {
        let msg_id = next_id();
        let msg = json!({ "id": msg_id, "method": "Target.closeTarget", "params": { "targetId": self.target_id } }).to_string();
        send_and_get_msg(self.transport.clone(), msg_id, &self.session_id, msg).await?;
        Ok(())
    }
}
