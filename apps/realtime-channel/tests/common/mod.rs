//! Shared helpers for integration tests: a scripted realtime endpoint.

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;

use realtime_channel::{ChannelConfig, SessionToken, WebSocketSettings};

/// Token the mock server accepts.
pub const VALID_TOKEN: &str = "good-token";

/// How long helpers wait for a condition before failing.
pub const WAIT: Duration = Duration::from_secs(5);

enum ServerAction {
    Send(String),
    Close,
}

struct Shared {
    received: Mutex<Vec<Value>>,
    current: Mutex<Option<mpsc::UnboundedSender<ServerAction>>>,
    connections: AtomicUsize,
}

/// In-process realtime endpoint.
///
/// Greets every connection with `connected`, answers `authenticate` with
/// `authenticated` or `auth_error`, and acknowledges subscriptions.
pub struct MockServer {
    addr: SocketAddr,
    shared: Arc<Shared>,
    task: JoinHandle<()>,
}

impl MockServer {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let shared = Arc::new(Shared {
            received: Mutex::new(Vec::new()),
            current: Mutex::new(None),
            connections: AtomicUsize::new(0),
        });

        let accept_shared = Arc::clone(&shared);
        let task = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                tokio::spawn(handle_connection(stream, Arc::clone(&accept_shared)));
            }
        });

        Self { addr, shared, task }
    }

    pub fn url(&self) -> String {
        format!("ws://{}/ws", self.addr)
    }

    /// Send a JSON frame on the current connection.
    pub fn send(&self, frame: &Value) {
        self.send_raw(frame.to_string());
    }

    /// Send an arbitrary text frame on the current connection.
    pub fn send_raw(&self, text: impl Into<String>) {
        let current = self.shared.current.lock();
        let tx = current.as_ref().expect("no client connected");
        tx.send(ServerAction::Send(text.into())).unwrap();
    }

    /// Close the current connection from the server side.
    pub fn close_connection(&self) {
        if let Some(tx) = self.shared.current.lock().take() {
            let _ = tx.send(ServerAction::Close);
        }
    }

    /// Every frame received from clients, in arrival order.
    pub fn received(&self) -> Vec<Value> {
        self.shared.received.lock().clone()
    }

    /// Received frames of one `type`.
    pub fn received_of_type(&self, kind: &str) -> Vec<Value> {
        self.received()
            .into_iter()
            .filter(|frame| frame["type"] == kind)
            .collect()
    }

    /// Number of `kind` frames whose symbol list contains `symbol`.
    pub fn requests_for(&self, kind: &str, symbol: &str) -> usize {
        self.received_of_type(kind)
            .iter()
            .filter(|frame| {
                frame["data"]["symbols"]
                    .as_array()
                    .is_some_and(|symbols| symbols.iter().any(|s| s == symbol))
            })
            .count()
    }

    pub fn connection_count(&self) -> usize {
        self.shared.connections.load(Ordering::SeqCst)
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn handle_connection(stream: TcpStream, shared: Arc<Shared>) {
    let Ok(ws) = accept_async(stream).await else {
        return;
    };
    let (mut write, mut read) = ws.split();
    let (tx, mut rx) = mpsc::unbounded_channel();
    *shared.current.lock() = Some(tx);
    shared.connections.fetch_add(1, Ordering::SeqCst);

    let greeting = json!({"type": "connected", "data": {"message": "welcome"}});
    if write
        .send(Message::Text(greeting.to_string().into()))
        .await
        .is_err()
    {
        return;
    }

    loop {
        tokio::select! {
            action = rx.recv() => match action {
                Some(ServerAction::Send(text)) => {
                    if write.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                Some(ServerAction::Close) | None => {
                    let _ = write.send(Message::Close(None)).await;
                    break;
                }
            },
            frame = read.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    let Ok(value) = serde_json::from_str::<Value>(&text) else {
                        continue;
                    };
                    let reply = reply_to(&value);
                    shared.received.lock().push(value);
                    if let Some(reply) = reply
                        && write.send(Message::Text(reply.to_string().into())).await.is_err()
                    {
                        break;
                    }
                }
                Some(Ok(Message::Close(_)) | Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }
}

fn reply_to(request: &Value) -> Option<Value> {
    match request["type"].as_str()? {
        "authenticate" => {
            if request["data"]["token"] == VALID_TOKEN {
                Some(json!({"type": "authenticated", "data": {"user_id": 42}}))
            } else {
                Some(json!({"type": "auth_error", "data": {"message": "Invalid token"}}))
            }
        }
        "subscribe_prices" => Some(json!({
            "type": "subscribed",
            "data": {"symbols": request["data"]["symbols"].clone()}
        })),
        _ => None,
    }
}

/// Transport settings with short delays so reconnect tests run quickly.
pub fn fast_settings() -> WebSocketSettings {
    WebSocketSettings {
        connect_timeout: Duration::from_secs(2),
        reconnect_delay_initial: Duration::from_millis(50),
        reconnect_delay_max: Duration::from_millis(200),
        max_reconnect_attempts: 3,
        ..WebSocketSettings::default()
    }
}

/// Config pointing at `server` with a token the server accepts.
pub fn config_for(server: &MockServer) -> ChannelConfig {
    ChannelConfig::new(server.url())
        .with_auth_token(SessionToken::new(VALID_TOKEN).unwrap())
        .with_websocket(fast_settings())
}

/// Poll `condition` until it holds or `WAIT` elapses.
pub async fn wait_until<F>(mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    tokio::time::timeout(WAIT, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .is_ok()
}
