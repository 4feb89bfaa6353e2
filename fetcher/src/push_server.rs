//! Framed push server (spec §4.1): a localhost-only server that accepts
//! many concurrent subscribers and pushes text frames. Topics are
//! configured as an ordered list at construction; each carries a bounded
//! replay history. Reimplements, over an axum WebSocket handler and
//! `tokio::sync` locks, the ordering and locking discipline of the
//! original `WebSocketServer` (`original_source/zet/utils/websocket_server.py`):
//! a newly connected subscriber is sent a full history snapshot, topic by
//! topic in configured order, before it is added to the broadcast set.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use futures::{SinkExt, StreamExt};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};

use crate::error::FetcherError;

struct Subscriber {
    id: u64,
    tx: mpsc::UnboundedSender<String>,
}

struct Inner {
    topics: Vec<String>,
    /// Guards the per-topic replay histories.
    histories: Mutex<HashMap<String, VecDeque<String>>>,
    /// Guards the set of connected subscribers. Acquire order: this lock
    /// before the histories lock, never the reverse (spec §5).
    subscribers: Mutex<Vec<Subscriber>>,
    next_id: AtomicU64,
}

#[derive(Clone)]
pub struct PushServer {
    inner: Arc<Inner>,
}

impl PushServer {
    pub fn new(topics: impl IntoIterator<Item = impl Into<String>>) -> Self {
        let topics: Vec<String> = topics.into_iter().map(Into::into).collect();
        let histories = topics
            .iter()
            .map(|t| (t.clone(), VecDeque::new()))
            .collect();
        Self {
            inner: Arc::new(Inner {
                topics,
                histories: Mutex::new(histories),
                subscribers: Mutex::new(Vec::new()),
                next_id: AtomicU64::new(0),
            }),
        }
    }

    /// Append `frame` to `topic`'s history (evicting the oldest entry past
    /// `max_history`), then push it to every currently-connected
    /// subscriber. A send error to any one subscriber is logged and that
    /// subscriber is dropped; it never blocks on a dead subscriber.
    pub async fn publish(
        &self,
        topic: &str,
        frame: String,
        max_history: usize,
    ) -> Result<(), FetcherError> {
        if !self.inner.topics.iter().any(|t| t == topic) {
            return Err(FetcherError::UnknownTopic(topic.to_string()));
        }

        let live: Vec<(u64, mpsc::UnboundedSender<String>)> = {
            let subs = self.inner.subscribers.lock().await;
            subs.iter().map(|s| (s.id, s.tx.clone())).collect()
        };

        {
            let mut histories = self.inner.histories.lock().await;
            let buf = histories.entry(topic.to_string()).or_default();
            buf.push_back(frame.clone());
            while buf.len() > max_history {
                buf.pop_front();
            }
        }

        let mut dead = Vec::new();
        for (id, tx) in &live {
            if tx.send(frame.clone()).is_err() {
                tracing::warn!(subscriber = id, "push send failed, dropping subscriber");
                dead.push(*id);
            }
        }
        if !dead.is_empty() {
            let mut subs = self.inner.subscribers.lock().await;
            subs.retain(|s| !dead.contains(&s.id));
        }

        Ok(())
    }

    /// Register a new subscriber, sending the full replay history — in
    /// topic-declared order, then insertion order within each topic — to
    /// its private channel before it is added to the broadcast set.
    pub async fn subscribe(&self) -> (u64, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();

        let replay: Vec<String> = {
            let histories = self.inner.histories.lock().await;
            let mut frames = Vec::new();
            for topic in &self.inner.topics {
                if let Some(buf) = histories.get(topic) {
                    frames.extend(buf.iter().cloned());
                }
            }
            frames
        };
        for frame in replay {
            // The channel was just created; this cannot fail.
            let _ = tx.send(frame);
        }

        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let mut subs = self.inner.subscribers.lock().await;
        subs.push(Subscriber { id, tx });
        tracing::info!(subscriber = id, total = subs.len(), "subscriber connected");

        (id, rx)
    }

    async fn unsubscribe(&self, id: u64) {
        let mut subs = self.inner.subscribers.lock().await;
        subs.retain(|s| s.id != id);
        tracing::info!(subscriber = id, total = subs.len(), "subscriber disconnected");
    }

    pub fn router(self) -> Router {
        Router::new().route("/", get(handle_upgrade)).with_state(self)
    }
}

async fn handle_upgrade(ws: WebSocketUpgrade, State(server): State<PushServer>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, server))
}

async fn handle_socket(socket: WebSocket, server: PushServer) {
    let (mut sender, mut receiver) = socket.split();
    let (id, mut rx) = server.subscribe().await;

    let forward = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if sender.send(Message::Text(frame.into())).await.is_err() {
                break;
            }
        }
    });

    // Subscribers don't send anything meaningful; just drain until close.
    while let Some(msg) = receiver.next().await {
        if matches!(msg, Ok(Message::Close(_)) | Err(_)) {
            break;
        }
    }

    forward.abort();
    server.unsubscribe(id).await;
}
