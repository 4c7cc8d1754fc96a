use anyhow::{Context, Result};
use axum::Router;
use axum::extract::ws::{CloseFrame, Message, WebSocket};
use axum::extract::{Path, State, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::routing::get;
use futures::{SinkExt, StreamExt};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Most participants a room accepts.
const ROOM_CAPACITY: usize = 2;

struct Member {
    id: u64,
    user_id: Option<String>,
    tx: mpsc::UnboundedSender<Message>,
}

#[derive(Default)]
struct RelayState {
    rooms: Mutex<HashMap<String, Vec<Member>>>,
    received: Mutex<Vec<(String, Value)>>,
    next_id: AtomicU64,
}

/// In-process room relay speaking the same JSON envelopes as production:
/// `join_room`/`leave_room` become `user_joined`/`user_left` for the other
/// member, `rtc_signal` is forwarded as is, a third joiner gets `error`.
pub struct TestRelay {
    addr: SocketAddr,
    state: Arc<RelayState>,
    task: JoinHandle<()>,
}

impl TestRelay {
    pub async fn start() -> Result<Self> {
        let state = Arc::new(RelayState::default());
        let app = Router::new()
            .route("/ws/rtc/{room_id}/", get(ws_handler))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .context("Failed to bind test relay")?;
        let addr = listener.local_addr()?;

        let task = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                warn!("[TestRelay] server stopped: {}", e);
            }
        });

        info!("[TestRelay] listening on {}", addr);
        Ok(Self { addr, state, task })
    }

    /// Base URL to put into `CallConfig::relay_url`.
    pub fn url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    /// Members that sent `join_room` and have not left.
    pub async fn joined_count(&self, room: &str) -> usize {
        self.state
            .rooms
            .lock()
            .await
            .get(room)
            .map(|members| members.iter().filter(|m| m.user_id.is_some()).count())
            .unwrap_or(0)
    }

    pub async fn wait_for_joined(&self, room: &str, count: usize, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        while tokio::time::Instant::now() < deadline {
            if self.joined_count(room).await == count {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        false
    }

    /// Number of frames of the given `type` the relay received for `room`.
    pub async fn received_count(&self, room: &str, kind: &str) -> usize {
        self.state
            .received
            .lock()
            .await
            .iter()
            .filter(|(r, frame)| r == room && frame["type"] == kind)
            .count()
    }

    /// Number of `rtc_signal` frames with the given `signal_type`.
    pub async fn signal_count(&self, room: &str, signal_type: &str) -> usize {
        self.state
            .received
            .lock()
            .await
            .iter()
            .filter(|(r, frame)| {
                r == room && frame["type"] == "rtc_signal" && frame["signal_type"] == signal_type
            })
            .count()
    }

    /// Pushes a raw text frame to every connection in `room`.
    pub async fn inject(&self, room: &str, text: &str) {
        if let Some(members) = self.state.rooms.lock().await.get(room) {
            for member in members {
                let _ = member.tx.send(Message::Text(text.into()));
            }
        }
    }

    /// Pushes a raw text frame to the member of `room` that joined as
    /// `user_id`.
    pub async fn inject_to(&self, room: &str, user_id: &str, text: &str) {
        if let Some(members) = self.state.rooms.lock().await.get(room) {
            for member in members.iter().filter(|m| m.user_id.as_deref() == Some(user_id)) {
                let _ = member.tx.send(Message::Text(text.into()));
            }
        }
    }

    /// Closes every connection in `room` with an internal-error status.
    pub async fn fail_room(&self, room: &str) {
        let Some(members) = self.state.rooms.lock().await.remove(room) else {
            return;
        };
        for member in members {
            let _ = member.tx.send(Message::Close(Some(CloseFrame {
                code: 1011,
                reason: "relay failure".into(),
            })));
        }
    }
}

impl Drop for TestRelay {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    Path(room_id): Path<String>,
    State(state): State<Arc<RelayState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, room_id, state))
}

async fn handle_socket(socket: WebSocket, room: String, state: Arc<RelayState>) {
    let id = state.next_id.fetch_add(1, Ordering::Relaxed);
    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();

    state
        .rooms
        .lock()
        .await
        .entry(room.clone())
        .or_default()
        .push(Member {
            id,
            user_id: None,
            tx: tx.clone(),
        });
    debug!("[TestRelay] connection {} opened in room {}", id, room);

    let mut send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let closing = matches!(msg, Message::Close(_));
            if sender.send(msg).await.is_err() || closing {
                break;
            }
        }
    });

    let mut recv_task = tokio::spawn({
        let state = state.clone();
        let room = room.clone();
        async move {
            while let Some(Ok(msg)) = receiver.next().await {
                match msg {
                    Message::Text(text) => on_text(&state, &room, id, text.as_str()).await,
                    Message::Close(_) => break,
                    _ => {}
                }
            }
        }
    });

    tokio::select! {
        _ = (&mut send_task) => recv_task.abort(),
        _ = (&mut recv_task) => send_task.abort(),
    };

    let departed = remove_member(&state, &room, id).await;
    if let Some(user_id) = departed {
        broadcast(&state, &room, id, user_left(&user_id)).await;
    }
    debug!("[TestRelay] connection {} closed", id);
}

async fn on_text(state: &RelayState, room: &str, id: u64, text: &str) {
    let Ok(frame) = serde_json::from_str::<Value>(text) else {
        warn!("[TestRelay] non-JSON frame from {}: {}", id, text);
        return;
    };
    state
        .received
        .lock()
        .await
        .push((room.to_owned(), frame.clone()));

    match frame["type"].as_str() {
        Some("join_room") => {
            let user_id = frame["user_id"].as_str().unwrap_or_default().to_owned();
            let mut rooms = state.rooms.lock().await;
            let members = rooms.entry(room.to_owned()).or_default();
            let joined = members.iter().filter(|m| m.user_id.is_some()).count();
            let Some(member) = members.iter_mut().find(|m| m.id == id) else {
                return;
            };
            if joined >= ROOM_CAPACITY {
                let full = json!({ "type": "error", "message": "room is full" });
                let _ = member.tx.send(Message::Text(full.to_string().into()));
                return;
            }
            member.user_id = Some(user_id.clone());
            drop(rooms);

            let notice = json!({
                "type": "user_joined",
                "user_id": user_id,
                "message": format!("{user_id} joined"),
            });
            broadcast(state, room, id, notice).await;
        }
        Some("leave_room") => {
            if let Some(user_id) = remove_member(state, room, id).await {
                broadcast(state, room, id, user_left(&user_id)).await;
            }
        }
        Some("rtc_signal") => {
            broadcast(state, room, id, frame).await;
        }
        other => warn!("[TestRelay] unexpected frame type {:?}", other),
    }
}

/// Drops the member; returns its user id if it had joined.
async fn remove_member(state: &RelayState, room: &str, id: u64) -> Option<String> {
    let mut rooms = state.rooms.lock().await;
    let members = rooms.get_mut(room)?;
    let index = members.iter().position(|m| m.id == id)?;
    members.remove(index).user_id
}

async fn broadcast(state: &RelayState, room: &str, from: u64, frame: Value) {
    let text = frame.to_string();
    if let Some(members) = state.rooms.lock().await.get(room) {
        for member in members.iter().filter(|m| m.id != from && m.user_id.is_some()) {
            let _ = member.tx.send(Message::Text(text.clone().into()));
        }
    }
}

fn user_left(user_id: &str) -> Value {
    json!({
        "type": "user_left",
        "user_id": user_id,
        "message": format!("{user_id} left"),
    })
}
