//! Tiller Delivery - the relay between clients.
//!
//! The relay stores nothing and reads nothing. A client POSTs an opaque
//! frame to a recipient's id; if that recipient currently holds a delivery
//! socket the frame is forwarded, otherwise the post is rejected. Each
//! client id has at most one socket: connecting again replaces the previous
//! one, which closes it.

use axum::{
    body::Bytes,
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tower_http::cors::{Any, CorsLayer};
use tracing::{debug, info, warn};

/// In-flight frames buffered per socket before backpressure kicks in.
const SUBSCRIBER_BUFFER: usize = 8;

struct Subscriber {
    /// Distinguishes a socket from its replacement, so a stale socket's
    /// cleanup never evicts the one that replaced it.
    conn_id: u64,
    sender: mpsc::Sender<Vec<u8>>,
}

/// Where frames for each connected client go.
#[derive(Clone, Default)]
pub struct Switchboard {
    channels: Arc<Mutex<HashMap<Arc<str>, Subscriber>>>,
    next_conn: Arc<AtomicU64>,
}

impl Switchboard {
    pub fn new() -> Self {
        Default::default()
    }

    /// Hand a frame to `client_id`'s socket. `false` means nobody is
    /// subscribed under that id.
    async fn deliver(&self, client_id: &str, frame: Vec<u8>) -> bool {
        let channels = self.channels.lock().await;
        let Some(subscriber) = channels.get(client_id) else {
            return false;
        };

        if let Err(err) = subscriber.sender.send(frame).await {
            // Subscribed but its socket task is gone; the entry will be
            // cleaned up when that task finishes.
            warn!("Dropping frame for {}: {}", client_id, err);
        }
        true
    }

    /// Register a socket's sender, replacing (and thereby closing) any
    /// previous one for the same id. Returns this connection's id.
    async fn subscribe(&self, client_id: Arc<str>, sender: mpsc::Sender<Vec<u8>>) -> u64 {
        let conn_id = self.next_conn.fetch_add(1, Ordering::Relaxed);
        let previous = self
            .channels
            .lock()
            .await
            .insert(client_id.clone(), Subscriber { conn_id, sender });
        if previous.is_some() {
            warn!("Replacing previous subscriber for client {}", client_id);
        }
        conn_id
    }

    async fn unsubscribe(&self, client_id: &str, conn_id: u64) {
        let mut channels = self.channels.lock().await;
        if channels
            .get(client_id)
            .is_some_and(|subscriber| subscriber.conn_id == conn_id)
        {
            channels.remove(client_id);
        }
    }
}

pub fn router(switchboard: Switchboard) -> Router {
    // Clients are browsers and local tools; the relay carries only opaque
    // frames, so wide-open CORS is fine.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/messages/:to", post(create_message).get(subscribe_messages))
        .layer(cors)
        .with_state(switchboard)
}

async fn handle_health() -> impl IntoResponse {
    Json(json!({"status": "ok"}))
}

/// Receives a frame sent by one client for delivery to another.
async fn create_message(
    State(switchboard): State<Switchboard>,
    Path(to): Path<String>,
    body: Bytes,
) -> StatusCode {
    if switchboard.deliver(&to, body.to_vec()).await {
        StatusCode::CREATED
    } else {
        StatusCode::NOT_FOUND
    }
}

/// Upgrades to the per-client delivery socket.
async fn subscribe_messages(
    State(switchboard): State<Switchboard>,
    Path(client_id): Path<String>,
    upgrade: WebSocketUpgrade,
) -> impl IntoResponse {
    let client_id: Arc<str> = client_id.into();
    upgrade.on_upgrade(move |socket| serve_socket(switchboard, client_id, socket))
}

async fn serve_socket(switchboard: Switchboard, client_id: Arc<str>, mut socket: WebSocket) {
    let (sender, mut frames) = mpsc::channel::<Vec<u8>>(SUBSCRIBER_BUFFER);
    let conn_id = switchboard.subscribe(client_id.clone(), sender).await;
    debug!("Client {} opened socket {}", client_id, conn_id);

    loop {
        tokio::select! {
            frame = frames.recv() => match frame {
                Some(frame) => {
                    if let Err(err) = socket.send(Message::Binary(frame)).await {
                        debug!("Socket {} for {} send failed: {}", conn_id, client_id, err);
                        break;
                    }
                }
                None => {
                    // Our sender was replaced; dropping the socket closes it
                    // under the old holder.
                    debug!("Socket {} for {} was replaced", conn_id, client_id);
                    break;
                }
            },
            message = socket.recv() => match message {
                Some(Ok(Message::Close(_))) | None => {
                    debug!("Socket {} for {} closed", conn_id, client_id);
                    break;
                }
                Some(Ok(other)) => {
                    debug!("Socket {} for {}: unexpected message {:?}", conn_id, client_id, other);
                }
                Some(Err(err)) => {
                    debug!("Socket {} for {} errored: {}", conn_id, client_id, err);
                    break;
                }
            },
        }
    }

    switchboard.unsubscribe(&client_id, conn_id).await;
}

/// Start the relay.
///
/// Returns the actual address the server is bound to (useful when port=0).
pub async fn start_server(host: &str, port: u16) -> anyhow::Result<SocketAddr> {
    let app = router(Switchboard::new());

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let actual_addr = listener.local_addr()?;

    info!("Delivery relay listening on {}", actual_addr);

    tokio::spawn(async move {
        axum::serve(listener, app)
            .await
            .expect("Server error");
    });

    Ok(actual_addr)
}
