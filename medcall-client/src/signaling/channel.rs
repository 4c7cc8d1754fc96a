use futures::{SinkExt, StreamExt};
use medcall_core::{Participant, ProtocolError, RoomId, SignalingMessage};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tracing::{debug, error, info, warn};

use crate::config::CallConfig;
use crate::error::{CallError, Result};
use crate::signaling::channel_event::{ChannelEvent, ConnectionId};

/// How long `close()` waits for the writer to flush the leave notice.
const CLOSE_GRACE: Duration = Duration::from_secs(2);

struct Link {
    connection: ConnectionId,
    participant: Participant,
    outbound: mpsc::UnboundedSender<Message>,
    writer: JoinHandle<()>,
    reader: JoinHandle<()>,
}

/// Ordered WebSocket link to the room relay.
///
/// Inbound traffic is delivered through the receiver returned by
/// [`SignalingChannel::new`]: one [`ChannelEvent`] per frame, in the order the
/// transport received them.
pub struct SignalingChannel {
    config: CallConfig,
    event_tx: mpsc::Sender<ChannelEvent>,
    link: Option<Link>,
    next_connection: ConnectionId,
}

impl SignalingChannel {
    pub fn new(config: CallConfig) -> (Self, mpsc::Receiver<ChannelEvent>) {
        let (event_tx, event_rx) = mpsc::channel(config.queue_capacity);
        let channel = Self {
            config,
            event_tx,
            link: None,
            next_connection: 0,
        };
        (channel, event_rx)
    }

    pub fn is_open(&self) -> bool {
        self.link.is_some()
    }

    /// True when `connection` is the transport currently open.
    pub fn is_current(&self, connection: ConnectionId) -> bool {
        self.link
            .as_ref()
            .is_some_and(|link| link.connection == connection)
    }

    /// Opens the transport and announces `participant`. No-op while open.
    pub async fn connect(&mut self, room: &RoomId, participant: &Participant) -> Result<()> {
        if self.link.is_some() {
            debug!("Signaling channel already open for room {}", room);
            return Ok(());
        }

        let url = self.config.room_url(room);
        info!("Connecting to signaling relay: {}", url);

        let (socket, _) = connect_async(url.as_str())
            .await
            .map_err(|e| CallError::Transport(format!("failed to open {url}: {e}")))?;
        let (mut sink, mut stream) = socket.split();
        let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<Message>();

        self.next_connection += 1;
        let connection = self.next_connection;

        let writer = tokio::spawn(async move {
            while let Some(msg) = outbound_rx.recv().await {
                if let Err(e) = sink.send(msg).await {
                    warn!("Signaling write failed: {}", e);
                    return;
                }
            }
            let farewell = Message::Close(Some(CloseFrame {
                code: CloseCode::Normal,
                reason: "leave".into(),
            }));
            let _ = sink.send(farewell).await;
            let _ = sink.close().await;
        });

        let event_tx = self.event_tx.clone();
        let reader = tokio::spawn(async move {
            if event_tx.send(ChannelEvent::Connected(connection)).await.is_err() {
                return;
            }

            let closing = loop {
                let Some(frame) = stream.next().await else {
                    break ChannelEvent::TransportError(
                        connection,
                        "connection dropped without close frame".to_owned(),
                    );
                };
                match frame {
                    Ok(Message::Text(text)) => {
                        let Some(event) = inbound_event(connection, text.as_str()) else {
                            continue;
                        };
                        if event_tx.send(event).await.is_err() {
                            return;
                        }
                    }
                    Ok(Message::Close(frame)) => {
                        break match frame {
                            Some(f) if f.code == CloseCode::Normal => {
                                ChannelEvent::Disconnected(connection)
                            }
                            Some(f) => ChannelEvent::TransportError(
                                connection,
                                format!(
                                    "relay closed connection: {} {}",
                                    u16::from(f.code),
                                    f.reason.as_str()
                                ),
                            ),
                            None => ChannelEvent::TransportError(
                                connection,
                                "relay closed connection without status".to_owned(),
                            ),
                        };
                    }
                    Ok(Message::Binary(_)) => debug!("Ignoring binary signaling frame"),
                    Ok(_) => {}
                    Err(e) => break ChannelEvent::TransportError(connection, e.to_string()),
                }
            };
            let _ = event_tx.send(closing).await;
        });

        self.link = Some(Link {
            connection,
            participant: participant.clone(),
            outbound,
            writer,
            reader,
        });

        self.send(SignalingMessage::join(participant));
        info!("Signaling channel open for {} in room {}", participant, room);
        Ok(())
    }

    /// Queues `msg` for the relay. Messages sent while the channel is not
    /// open are dropped and logged.
    pub fn send(&self, msg: SignalingMessage) {
        let Some(link) = &self.link else {
            warn!(
                "Dropping {} message: signaling channel is not open",
                msg.kind_name()
            );
            return;
        };

        let kind = msg.kind_name();
        match msg.encode() {
            Ok(json) => {
                debug!("WS OUT: {}", kind);
                if link.outbound.send(Message::text(json)).is_err() {
                    warn!("Dropping {} message: writer has stopped", kind);
                }
            }
            Err(e) => error!("Failed to encode {} message: {}", kind, e),
        }
    }

    /// Sends a leave notice and tears the transport down. Safe to call
    /// repeatedly; only the first call on an open channel has any effect.
    pub async fn close(&mut self) {
        let Some(link) = self.link.take() else {
            return;
        };

        match SignalingMessage::leave(&link.participant).encode() {
            Ok(json) => {
                let _ = link.outbound.send(Message::text(json));
            }
            Err(e) => error!("Failed to encode leave notice: {}", e),
        }

        link.reader.abort();
        drop(link.outbound);
        if tokio::time::timeout(CLOSE_GRACE, link.writer).await.is_err() {
            warn!("Signaling writer did not finish within {:?}", CLOSE_GRACE);
        }
        info!("Signaling channel closed");
    }

    /// Forgets a transport the relay already closed. No leave notice is sent.
    pub fn mark_lost(&mut self, connection: ConnectionId) {
        if !self.is_current(connection) {
            return;
        }
        if let Some(link) = self.link.take() {
            link.reader.abort();
            link.writer.abort();
        }
    }
}

impl Drop for SignalingChannel {
    fn drop(&mut self) {
        if let Some(link) = self.link.take() {
            link.reader.abort();
            link.writer.abort();
        }
    }
}

fn inbound_event(connection: ConnectionId, text: &str) -> Option<ChannelEvent> {
    debug!("WS IN: {}", text);
    match SignalingMessage::decode(text) {
        Ok(SignalingMessage::Join(notice)) => Some(ChannelEvent::PeerJoined(connection, notice)),
        Ok(SignalingMessage::Leave(notice)) => Some(ChannelEvent::PeerLeft(connection, notice)),
        Ok(msg) => Some(ChannelEvent::Message(connection, msg)),
        Err(ProtocolError::NotJson(_)) => {
            Some(ChannelEvent::Diagnostic(connection, text.to_owned()))
        }
        Err(e) => {
            warn!("Rejected signaling frame: {}", e);
            None
        }
    }
}
