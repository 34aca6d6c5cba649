use anyhow::{Result, anyhow};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use log::debug;
use serde::Deserialize;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
/// Network events for every resource share this buffer with the load events.
const EVENT_CAPACITY: usize = 4096;

static GLOBAL_ID_COUNTER: AtomicUsize = AtomicUsize::new(0);

/// Returns a unique incremental ID for request messages.
pub(crate) fn next_id() -> usize {
    GLOBAL_ID_COUNTER.fetch_add(1, Ordering::SeqCst) + 1
}

#[derive(Debug)]
pub(crate) enum TransportMessage {
    Request(Value, oneshot::Sender<Result<TransportResponse>>),
    ListenTargetMessage(u64, oneshot::Sender<Result<TransportResponse>>),
    Shutdown,
}

#[derive(Debug)]
pub(crate) enum TransportResponse {
    Response(Response),
    Target(TargetMessage),
}

/// A browser-level CDP response.
#[derive(Debug, Deserialize)]
pub(crate) struct Response {
    pub(crate) id: u64,
    #[serde(default)]
    pub(crate) result: Value,
    #[serde(default)]
    pub(crate) error: Option<Value>,
}

/// A `Target.receivedMessageFromTarget` envelope.
#[derive(Debug, Deserialize)]
pub(crate) struct TargetMessage {
    pub(crate) params: Value,
}

/// A protocol event emitted by an attached target session.
#[derive(Debug, Clone)]
pub(crate) struct CdpEvent {
    pub(crate) session_id: String,
    pub(crate) method: String,
    pub(crate) params: Value,
}

struct TransportActor {
    pending_requests: HashMap<u64, oneshot::Sender<Result<TransportResponse>>>,
    ws_sink: SplitSink<WsStream, Message>,
    command_rx: mpsc::Receiver<TransportMessage>,
    events: broadcast::Sender<CdpEvent>,
}

impl TransportActor {
    async fn run(mut self, mut ws_stream: SplitStream<WsStream>) {
        loop {
            tokio::select! {
                Some(msg) = ws_stream.next() => {
                    match msg {
                        Ok(Message::Text(text)) => self.dispatch(&text),
                        Err(e) => {
                            debug!("websocket closed: {e}");
                            break;
                        }
                        _ => {}
                    }
                }
                Some(msg) = self.command_rx.recv() => {
                    match msg {
                        TransportMessage::Request(cmd, tx) => {
                            if let Some(id) = cmd["id"].as_u64()
                                && let Ok(text) = serde_json::to_string(&cmd)
                            {
                                if self.ws_sink.send(Message::Text(text)).await.is_ok() {
                                    self.pending_requests.insert(id, tx);
                                } else {
                                    let _ = tx.send(Err(anyhow!("WebSocket send failed")));
                                }
                            }
                        }
                        TransportMessage::ListenTargetMessage(id, tx) => {
                            self.pending_requests.insert(id, tx);
                        }
                        TransportMessage::Shutdown => {
                            let _ = self.ws_sink.send(Message::Text(json!({
                                "id": next_id(),
                                "method": "Browser.close",
                                "params": {}
                            }).to_string())).await;
                            let _ = self.ws_sink.close().await;
                            break;
                        }
                    }
                }
                else => break,
            }
        }
    }

    fn dispatch(&mut self, text: &str) {
        if let Ok(response) = serde_json::from_str::<Response>(text) {
            if let Some(sender) = self.pending_requests.remove(&response.id) {
                let reply = match response.error {
                    Some(ref err) => Err(anyhow!("CDP error: {err}")),
                    None => Ok(TransportResponse::Response(response)),
                };
                let _ = sender.send(reply);
            }
            return;
        }

        let Ok(target_msg) = serde_json::from_str::<TargetMessage>(text) else {
            return;
        };
        let Some(inner) = target_msg
            .params
            .get("message")
            .and_then(|v| v.as_str())
            .and_then(|s| serde_json::from_str::<Value>(s).ok())
        else {
            return;
        };

        if let Some(id) = inner.get("id").and_then(|i| i.as_u64()) {
            if let Some(sender) = self.pending_requests.remove(&id) {
                let _ = sender.send(Ok(TransportResponse::Target(target_msg)));
            }
        } else if let Some(method) = inner.get("method").and_then(|m| m.as_str()) {
            let session_id = target_msg.params["sessionId"]
                .as_str()
                .unwrap_or_default()
                .to_string();
            // No subscribers is not an error.
            let _ = self.events.send(CdpEvent {
                session_id,
                method: method.to_string(),
                params: inner.get("params").cloned().unwrap_or(Value::Null),
            });
        }
    }
}

/// Asynchronous transport to the Chrome DevTools Protocol over WebSocket.
#[derive(Debug)]
pub(crate) struct Transport {
    tx: mpsc::Sender<TransportMessage>,
    events: broadcast::Sender<CdpEvent>,
}

impl Transport {
    pub(crate) async fn new(ws_url: &str) -> Result<Self> {
        let (ws_stream, _) = connect_async(ws_url).await?;
        let (ws_sink, ws_stream) = ws_stream.split();
        let (tx, rx) = mpsc::channel(100);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        let actor = TransportActor {
            pending_requests: HashMap::new(),
            ws_sink,
            command_rx: rx,
            events: events.clone(),
        };
        tokio::spawn(actor.run(ws_stream));

        Ok(Self { tx, events })
    }

    /// Sends a command and awaits its response.
    pub(crate) async fn send(&self, command: Value) -> Result<TransportResponse> {
        let (tx, rx) = oneshot::channel();
        self.tx
            .send(TransportMessage::Request(command, tx))
            .await
            .map_err(|_| anyhow!("Transport actor dropped"))?;
        time::timeout(REQUEST_TIMEOUT, rx)
            .await
            .map_err(|_| anyhow!("Timeout waiting for response"))?
            .map_err(|_| anyhow!("Response channel closed"))?
    }

    /// Waits for a specific target message by ID.
    pub(crate) async fn get_target_msg(&self, msg_id: usize) -> Result<TransportResponse> {
        let (tx, rx) = oneshot::channel();
        self.tx
            .send(TransportMessage::ListenTargetMessage(msg_id as u64, tx))
            .await
            .map_err(|_| anyhow!("Transport actor dropped"))?;
        time::timeout(REQUEST_TIMEOUT, rx)
            .await
            .map_err(|_| anyhow!("Timeout waiting for target message"))?
            .map_err(|_| anyhow!("Response channel closed"))?
    }

    /// Subscribes to events from every attached session.
    pub(crate) fn subscribe(&self) -> broadcast::Receiver<CdpEvent> {
        self.events.subscribe()
    }

    pub(crate) async fn shutdown(&self) {
        let _ = self.tx.send(TransportMessage::Shutdown).await;
    }
}
