//! Per-map-client WebSocket fan-out (spec §4.9, §5). Grounded on the
//! teacher's `api/ws.rs` broadcast handler, simplified to this system's
//! single "latest encoded pair, versioned by client" model instead of
//! per-client subscription diffing — the original Python
//! `GtfsServer._notify_clients`/`handle_websocket`
//! (`original_source/zet/webserver/webserver.py`) uses the same
//! snapshot-then-send-then-prune shape.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use futures::{SinkExt, StreamExt};
use tokio::sync::{mpsc, Mutex};

use crate::encode::EncodedPair;

struct Client {
    id: u64,
    version: u8,
    tx: mpsc::UnboundedSender<String>,
}

struct Inner {
    clients: Mutex<Vec<Client>>,
    latest: Mutex<Option<EncodedPair>>,
    next_id: AtomicU64,
}

#[derive(Clone)]
pub struct ClientHub {
    inner: Arc<Inner>,
}

impl ClientHub {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                clients: Mutex::new(Vec::new()),
                latest: Mutex::new(None),
                next_id: AtomicU64::new(0),
            }),
        }
    }

    /// Replace the latest encoded pair and push the version-appropriate
    /// string to every connected client in a single pass. A send failure
    /// marks that client for pruning after the pass (spec §4.9, §5).
    pub async fn broadcast(&self, pair: EncodedPair) {
        *self.inner.latest.lock().await = Some(pair.clone());

        let clients: Vec<(u64, u8, mpsc::UnboundedSender<String>)> = {
            let clients = self.inner.clients.lock().await;
            clients.iter().map(|c| (c.id, c.version, c.tx.clone())).collect()
        };

        let start = Instant::now();
        let mut dead = Vec::new();
        for (id, version, tx) in &clients {
            let frame = pair.for_version(*version).to_string();
            if tx.send(frame).is_err() {
                dead.push(*id);
            }
        }
        let elapsed = start.elapsed();
        tracing::debug!(clients = clients.len(), send_time_ms = elapsed.as_millis(), "broadcast to map clients");

        if !dead.is_empty() {
            let mut clients = self.inner.clients.lock().await;
            clients.retain(|c| !dead.contains(&c.id));
        }
    }

    async fn register(&self, version: u8) -> (u64, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();

        if let Some(pair) = self.inner.latest.lock().await.as_ref() {
            let _ = tx.send(pair.for_version(version).to_string());
        }

        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let mut clients = self.inner.clients.lock().await;
        clients.push(Client { id, version, tx });
        tracing::info!(client = id, version, total = clients.len(), "map client connected");

        (id, rx)
    }

    async fn unregister(&self, id: u64) {
        let mut clients = self.inner.clients.lock().await;
        clients.retain(|c| c.id != id);
        tracing::info!(client = id, total = clients.len(), "map client disconnected");
    }

    pub fn router(self) -> Router {
        Router::new()
            .route("/ws", get(handle_upgrade_v0))
            .route("/ws-v1", get(handle_upgrade_v1))
            .with_state(self)
    }
}

impl Default for ClientHub {
    fn default() -> Self {
        Self::new()
    }
}

async fn handle_upgrade_v0(ws: WebSocketUpgrade, State(hub): State<ClientHub>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, hub, 0))
}

async fn handle_upgrade_v1(ws: WebSocketUpgrade, State(hub): State<ClientHub>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, hub, 1))
}

async fn handle_socket(socket: WebSocket, hub: ClientHub, version: u8) {
    let (mut sender, mut receiver) = socket.split();
    let (id, mut rx) = hub.register(version).await;

    let forward = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if sender.send(Message::Text(frame.into())).await.is_err() {
                break;
            }
        }
    });

    // Per spec §4.9: any further frames from the client are discarded
    // (keepalive only) until it disconnects.
    while let Some(msg) = receiver.next().await {
        if matches!(msg, Ok(Message::Close(_)) | Err(_)) {
            break;
        }
    }

    forward.abort();
    hub.unregister(id).await;
}
