//! obs-websocket 4.x client: scene list queries, authentication and the
//! scene-graph notifications the tally loop reacts to.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tally_core::{
    FetchError, GraphEvent, GraphSource, ReconcileHandle, SceneGraph, SceneItem, SourceKind,
};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};
use url::Url;

const OUTBOUND_QUEUE: usize = 64;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const PING_INTERVAL: Duration = Duration::from_secs(5);

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug, Error)]
pub enum ObsError {
    #[error("websocket error: {0}")]
    Ws(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("invalid message: {0}")]
    Json(#[from] serde_json::Error),
    #[error("{request} failed: {message}")]
    Request { request: String, message: String },
    #[error("authentication failed: {0}")]
    Auth(String),
    #[error("connection closed")]
    Closed,
    #[error("{0} timed out")]
    Timeout(String),
}

impl From<ObsError> for FetchError {
    fn from(err: ObsError) -> Self {
        match err {
            ObsError::Closed => FetchError::Disconnected,
            ObsError::Json(err) => FetchError::Malformed(err.to_string()),
            ObsError::Request { request, message } => FetchError::Remote { request, message },
            ObsError::Ws(err) => FetchError::Remote {
                request: "websocket".to_string(),
                message: err.to_string(),
            },
            ObsError::Auth(message) => FetchError::Remote {
                request: "Authenticate".to_string(),
                message,
            },
            ObsError::Timeout(request) => FetchError::TimedOut(request),
        }
    }
}

#[derive(Debug, Deserialize)]
struct WireItem {
    name: String,
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default = "default_render")]
    render: bool,
    #[serde(rename = "groupChildren", default)]
    group_children: Vec<WireItem>,
}

fn default_render() -> bool {
    true
}

impl WireItem {
    fn into_item(self) -> SceneItem {
        let kind: SourceKind = self.kind.parse().unwrap_or(SourceKind::Unknown);
        match kind {
            SourceKind::Group => SceneItem::group(
                self.name,
                self.render,
                self.group_children
                    .into_iter()
                    .map(WireItem::into_item)
                    .collect(),
            ),
            SourceKind::Scene => SceneItem::scene(self.name, self.render),
            other => SceneItem::source(self.name, other, self.render),
        }
    }
}

fn into_items(items: Vec<WireItem>) -> Vec<SceneItem> {
    items.into_iter().map(WireItem::into_item).collect()
}

#[derive(Debug, Deserialize)]
struct WireScene {
    name: String,
    #[serde(default)]
    sources: Vec<WireItem>,
}

#[derive(Debug, Deserialize)]
struct SceneListResponse {
    #[serde(rename = "current-scene")]
    current_scene: String,
    scenes: Vec<WireScene>,
}

impl From<SceneListResponse> for SceneGraph {
    fn from(list: SceneListResponse) -> Self {
        let mut graph = SceneGraph::new(list.current_scene);
        for scene in list.scenes {
            graph.scenes.insert(scene.name, into_items(scene.sources));
        }
        graph
    }
}

#[derive(Debug, Deserialize)]
struct SwitchScenes {
    #[serde(rename = "scene-name")]
    scene_name: String,
    #[serde(default)]
    sources: Vec<WireItem>,
}

pub fn parse_scene_list(response: Value) -> Result<SceneGraph, FetchError> {
    serde_json::from_value::<SceneListResponse>(response)
        .map(SceneGraph::from)
        .map_err(|err| FetchError::Malformed(err.to_string()))
}

/// Map an `update-type` notification onto a graph event. Updates that
/// cannot change tally state yield `None`.
pub fn parse_event(update: &Value) -> Option<GraphEvent> {
    let kind = update.get("update-type")?.as_str()?;
    let event = match kind {
        "SwitchScenes" => {
            let switch: SwitchScenes = match serde_json::from_value(update.clone()) {
                Ok(switch) => switch,
                Err(err) => {
                    warn!(event = "obs_bad_event", kind, error = %err);
                    return None;
                }
            };
            GraphEvent::SceneSwitched {
                scene: switch.scene_name,
                items: into_items(switch.sources),
            }
        }
        "ScenesChanged" => GraphEvent::SceneListChanged,
        "SourceCreated" => GraphEvent::SourceCreated,
        "SourceDestroyed" => GraphEvent::SourceDestroyed,
        "SourceRenamed" => GraphEvent::SourceRenamed,
        "SceneItemAdded" => GraphEvent::SceneItemAdded,
        "SceneItemRemoved" => GraphEvent::SceneItemRemoved,
        "SceneItemVisibilityChanged" => GraphEvent::SceneItemVisibilityChanged,
        _ => return None,
    };
    Some(event)
}

/// `base64(sha256(base64(sha256(password + salt)) + challenge))`
pub fn auth_response(password: &str, salt: &str, challenge: &str) -> String {
    let secret = BASE64.encode(Sha256::digest(format!("{password}{salt}").as_bytes()));
    BASE64.encode(Sha256::digest(format!("{secret}{challenge}").as_bytes()))
}

fn build_request(request: &str, message_id: &str, fields: Value) -> String {
    let mut body = json!({
        "request-type": request,
        "message-id": message_id,
    });
    if let (Some(body), Value::Object(fields)) = (body.as_object_mut(), fields) {
        body.extend(fields);
    }
    body.to_string()
}

fn check_status(request: &str, response: Value) -> Result<Value, ObsError> {
    match response.get("status").and_then(Value::as_str) {
        Some("ok") => Ok(response),
        _ => Err(ObsError::Request {
            request: request.to_string(),
            message: response
                .get("error")
                .and_then(Value::as_str)
                .unwrap_or("unknown error")
                .to_string(),
        }),
    }
}

#[derive(Default)]
struct Inner {
    outbound: Mutex<Option<mpsc::Sender<String>>>,
    pending: Mutex<HashMap<String, oneshot::Sender<Value>>>,
    next_id: AtomicU64,
}

/// Shared client: the connection supervisor feeds it a live socket, the
/// reconciliation loop issues queries through it.
#[derive(Clone, Default)]
pub struct ObsClient {
    inner: Arc<Inner>,
}

impl ObsClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Send a request and wait for the response with the same message id.
    pub async fn call(&self, request: &str, fields: Value) -> Result<Value, ObsError> {
        self.call_within(REQUEST_TIMEOUT, request, fields).await
    }

    async fn call_within(
        &self,
        deadline: Duration,
        request: &str,
        fields: Value,
    ) -> Result<Value, ObsError> {
        let outbound = self.inner.outbound.lock().await.clone().ok_or(ObsError::Closed)?;
        let message_id = (self.inner.next_id.fetch_add(1, Ordering::Relaxed) + 1).to_string();
        let (tx, rx) = oneshot::channel();
        self.inner.pending.lock().await.insert(message_id.clone(), tx);
        if outbound
            .send(build_request(request, &message_id, fields))
            .await
            .is_err()
        {
            self.inner.pending.lock().await.remove(&message_id);
            return Err(ObsError::Closed);
        }
        let response = match tokio::time::timeout(deadline, rx).await {
            Ok(response) => response.map_err(|_| ObsError::Closed)?,
            Err(_) => {
                self.inner.pending.lock().await.remove(&message_id);
                warn!(event = "obs_request_timeout", request, message_id = %message_id);
                return Err(ObsError::Timeout(request.to_string()));
            }
        };
        check_status(request, response)
    }

    /// Keep a connection to `url` alive until the task is dropped,
    /// reconnecting with backoff and requesting a full refresh after every
    /// successful (re)connect.
    pub async fn run(self, url: Url, password: String, handle: ReconcileHandle) {
        let mut backoff = Duration::from_secs(1);
        loop {
            let ws = match connect_async(url.as_str()).await {
                Ok((ws, _)) => ws,
                Err(err) => {
                    warn!(event = "obs_connect_error", url = %url, error = %err);
                    tokio::time::sleep(backoff).await;
                    backoff = next_backoff(backoff);
                    continue;
                }
            };
            backoff = Duration::from_secs(1);
            info!(event = "obs_connected", url = %url);

            let result = self.session(ws, &password, &handle).await;
            self.disconnect().await;
            match result {
                Ok(()) => info!(event = "obs_disconnected"),
                Err(err) => warn!(event = "obs_disconnected", error = %err),
            }
            tokio::time::sleep(backoff).await;
        }
    }

    async fn session(
        &self,
        ws: WsStream,
        password: &str,
        handle: &ReconcileHandle,
    ) -> Result<(), ObsError> {
        let (tx, rx) = mpsc::channel(OUTBOUND_QUEUE);
        *self.inner.outbound.lock().await = Some(tx);

        let pump = self.pump(ws, rx, handle);
        tokio::pin!(pump);
        let auth = self.authenticate(password);
        tokio::pin!(auth);
        tokio::select! {
            result = &mut pump => result,
            auth_result = &mut auth => match auth_result {
                Ok(()) => {
                    handle.request_refresh().await;
                    pump.await
                }
                Err(err) => {
                    error!(event = "obs_auth_failed", error = %err);
                    Err(err)
                }
            },
        }
    }

    async fn pump(
        &self,
        mut ws: WsStream,
        mut rx: mpsc::Receiver<String>,
        handle: &ReconcileHandle,
    ) -> Result<(), ObsError> {
        let mut heartbeat = tokio::time::interval(PING_INTERVAL);
        // set when a ping went out and nothing has arrived since
        let mut awaiting_peer = false;
        loop {
            tokio::select! {
                msg = ws.next() => {
                    awaiting_peer = false;
                    match msg {
                        Some(Ok(Message::Text(text))) => self.route(&text, handle).await,
                        Some(Ok(Message::Close(_))) | None => return Ok(()),
                        Some(Ok(_)) => {}
                        Some(Err(err)) => return Err(err.into()),
                    }
                }
                Some(out) = rx.recv() => {
                    ws.send(Message::Text(out)).await?;
                }
                _ = heartbeat.tick() => {
                    if awaiting_peer {
                        return Err(ObsError::Timeout("ping".to_string()));
                    }
                    ws.send(Message::Ping(Vec::new())).await?;
                    awaiting_peer = true;
                }
            }
        }
    }

    async fn route(&self, text: &str, handle: &ReconcileHandle) {
        let value: Value = match serde_json::from_str(text) {
            Ok(value) => value,
            Err(err) => {
                debug!(event = "obs_bad_message", error = %err);
                return;
            }
        };
        if let Some(message_id) = value.get("message-id").and_then(Value::as_str) {
            let waiter = self.inner.pending.lock().await.remove(message_id);
            match waiter {
                Some(tx) => {
                    let _ = tx.send(value);
                }
                None => debug!(event = "obs_unexpected_response"),
            }
            return;
        }
        if let Some(event) = parse_event(&value) {
            handle.dispatch(event).await;
        }
    }

    async fn authenticate(&self, password: &str) -> Result<(), ObsError> {
        let required = self.call("GetAuthRequired", Value::Null).await?;
        if !required
            .get("authRequired")
            .and_then(Value::as_bool)
            .unwrap_or(false)
        {
            debug!(event = "obs_auth_not_required");
            return Ok(());
        }
        let field = |name: &str| {
            required
                .get(name)
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or_else(|| ObsError::Auth(format!("missing {name}")))
        };
        let challenge = field("challenge")?;
        let salt = field("salt")?;
        let auth = auth_response(password, &salt, &challenge);
        self.call("Authenticate", json!({ "auth": auth }))
            .await
            .map_err(|err| ObsError::Auth(err.to_string()))?;
        info!(event = "obs_authenticated");
        Ok(())
    }

    async fn disconnect(&self) {
        self.inner.outbound.lock().await.take();
        // dropping the senders fails every in-flight call
        self.inner.pending.lock().await.clear();
    }
}

impl GraphSource for ObsClient {
    async fn fetch_graph(&self) -> Result<SceneGraph, FetchError> {
        let response = self.call("GetSceneList", Value::Null).await?;
        parse_scene_list(response)
    }
}

fn next_backoff(current: Duration) -> Duration {
    let next = current + current;
    if next > Duration::from_secs(10) {
        Duration::from_secs(10)
    } else {
        next
    }
}
