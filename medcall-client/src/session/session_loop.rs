use medcall_core::{Participant, PeerNotice, RoomId, SignalingMessage};
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::error::CallError;
use crate::media::MediaCaptureController;
use crate::negotiation::{CallState, EngineEvent, NegotiationEngine, StallWatchdog};
use crate::session::session_command::SessionCommand;
use crate::session::session_snapshot::SessionSnapshot;
use crate::signaling::{ChannelEvent, SignalingChannel};

/// Single task that owns the channel, the engine and the capture controller
/// for one room. Commands, channel events and engine events are handled one
/// at a time, so the peer session is never touched concurrently.
pub(crate) struct SessionLoop {
    pub(crate) room: RoomId,
    pub(crate) participant: Participant,
    pub(crate) channel: SignalingChannel,
    pub(crate) channel_rx: mpsc::Receiver<ChannelEvent>,
    pub(crate) engine: NegotiationEngine,
    pub(crate) engine_rx: mpsc::Receiver<EngineEvent>,
    pub(crate) capture: MediaCaptureController,
    pub(crate) command_rx: mpsc::Receiver<SessionCommand>,
    pub(crate) state_tx: watch::Sender<SessionSnapshot>,
    pub(crate) watchdog: StallWatchdog,
    /// User id of the other participant, once a `user_joined` named it.
    pub(crate) peer: Option<String>,
    pub(crate) call_active: bool,
    pub(crate) last_error: Option<CallError>,
}

impl SessionLoop {
    pub(crate) async fn run(mut self) {
        info!(
            "Session loop started for {} in room {}",
            self.participant, self.room
        );

        loop {
            let deadline = self.watchdog.deadline();
            let stall = async move {
                match deadline {
                    Some(d) => tokio::time::sleep_until(d).await,
                    None => std::future::pending::<()>().await,
                }
            };

            tokio::select! {
                cmd = self.command_rx.recv() => {
                    match cmd {
                        Some(SessionCommand::Shutdown { done }) => {
                            self.end_call().await;
                            self.publish();
                            let _ = done.send(());
                            break;
                        }
                        Some(c) => self.handle_command(c).await,
                        None => {
                            info!("Session handle dropped. Ending call.");
                            self.end_call().await;
                            self.publish();
                            break;
                        }
                    }
                }

                Some(evt) = self.channel_rx.recv() => {
                    self.handle_channel_event(evt).await;
                    self.publish();
                }

                Some(evt) = self.engine_rx.recv() => {
                    self.handle_engine_event(evt);
                    self.publish();
                }

                _ = stall => {
                    self.on_stall();
                    self.publish();
                }
            }
        }

        info!("Session loop finished for room {}", self.room);
    }

    async fn handle_command(&mut self, cmd: SessionCommand) {
        match cmd {
            SessionCommand::Join { done } => {
                self.join().await;
                self.publish();
                let _ = done.send(());
            }
            SessionCommand::AcquireMedia { done } => {
                if let Err(e) = self.capture.acquire().await {
                    self.report(e.into());
                }
                self.publish();
                let _ = done.send(());
            }
            SessionCommand::ReleaseMedia { done } => {
                let released = self.capture.release();
                self.publish();
                let _ = done.send(released);
            }
            SessionCommand::StartCall { done } => {
                self.start_call().await;
                self.publish();
                let _ = done.send(());
            }
            SessionCommand::EndCall { done } => {
                self.end_call().await;
                self.publish();
                let _ = done.send(());
            }
            SessionCommand::ToggleMute { done } => {
                let enabled = self.capture.toggle_audio();
                debug!("Audio enabled: {:?}", enabled);
                self.publish();
                let _ = done.send(enabled);
            }
            SessionCommand::ToggleVideo { done } => {
                let enabled = self.capture.toggle_video();
                debug!("Video enabled: {:?}", enabled);
                self.publish();
                let _ = done.send(enabled);
            }
            SessionCommand::ClearError { done } => {
                self.last_error = None;
                self.publish();
                let _ = done.send(());
            }
            SessionCommand::Shutdown { done } => {
                // Handled by the run loop.
                let _ = done.send(());
            }
        }
    }

    async fn join(&mut self) {
        if let Err(e) = self.channel.connect(&self.room, &self.participant).await {
            self.report(e);
            return;
        }
        self.peer = None;
        self.last_error = None;
        if let Err(e) = self.engine.ensure_session().await {
            self.report(e);
        }
    }

    async fn start_call(&mut self) {
        if !self.channel.is_open() {
            self.report(CallError::NotConnected);
            return;
        }
        if self.engine.awaiting_answer() {
            info!("Offer already pending; ignoring start call");
            return;
        }
        if self.engine.exchanges() > 0
            || matches!(
                self.engine.state(),
                CallState::Connected | CallState::Disconnected
            )
        {
            info!("Call already negotiated; ignoring start call");
            return;
        }

        let stream = match self.capture.acquire().await {
            Ok(stream) => stream,
            Err(e) => {
                self.report(e.into());
                return;
            }
        };

        if let Err(e) = self.engine.attach_local_stream(&stream).await {
            self.report(e);
            return;
        }

        match self.engine.create_offer().await {
            Ok(offer) => self.channel.send(offer),
            Err(e) => self.report(e),
        }
    }

    /// Releases media, closes the peer session, closes the channel. Each
    /// step runs regardless of the previous one.
    async fn end_call(&mut self) {
        info!("Ending call in room {}", self.room);
        self.capture.release();
        self.engine.close().await;
        self.channel.close().await;
        self.call_active = false;
        self.watchdog.disarm();
    }

    async fn handle_channel_event(&mut self, evt: ChannelEvent) {
        if !self.channel.is_current(evt.connection()) {
            debug!("Dropping event from closed connection {}", evt.connection());
            return;
        }

        match evt {
            ChannelEvent::Connected(_) => info!("Signaling relay connected"),

            ChannelEvent::PeerJoined(_, notice) => {
                info!(
                    "Peer joined room {}: {}",
                    self.room,
                    notice.message.as_deref().unwrap_or("-")
                );
                if let Some(user_id) = notice.user_id
                    && user_id != self.participant.user_id
                    && self.peer.is_none()
                {
                    self.peer = Some(user_id);
                }
            }

            ChannelEvent::PeerLeft(_, notice) => {
                if !self.is_from_peer(&notice) {
                    debug!("Ignoring departure of {:?}: not our peer", notice.user_id);
                    return;
                }
                info!(
                    "Peer left room {}: {}",
                    self.room,
                    notice.message.as_deref().unwrap_or("-")
                );
                self.peer = None;
                self.call_active = false;
                self.engine.reset().await;
                if let Err(e) = self.engine.ensure_session().await {
                    self.report(e);
                }
            }

            ChannelEvent::Message(_, SignalingMessage::Error { reason }) => {
                self.report(CallError::Transport(reason));
            }

            ChannelEvent::Message(_, msg) => {
                let local = self.capture.stream().cloned();
                match self.engine.handle_signal(msg, local.as_ref()).await {
                    Ok(Some(reply)) => self.channel.send(reply),
                    Ok(None) => {}
                    Err(e) => self.report(e),
                }
            }

            ChannelEvent::Diagnostic(_, text) => {
                warn!("Unstructured message from relay: {}", text);
            }

            ChannelEvent::Disconnected(connection) => {
                info!("Signaling relay closed the connection");
                self.channel.mark_lost(connection);
            }

            ChannelEvent::TransportError(connection, reason) => {
                self.channel.mark_lost(connection);
                self.report(CallError::Transport(reason));
            }
        }
    }

    /// Notices without a user id are trusted; relays that omit ids only
    /// ever report the other participant.
    fn is_from_peer(&self, notice: &PeerNotice) -> bool {
        let Some(user_id) = notice.user_id.as_deref() else {
            return true;
        };
        if user_id == self.participant.user_id {
            return false;
        }
        self.peer.as_deref().is_none_or(|peer| peer == user_id)
    }

    fn handle_engine_event(&mut self, evt: EngineEvent) {
        if let Some(msg) = self.engine.handle_event(evt) {
            self.channel.send(msg);
        }
    }

    fn on_stall(&mut self) {
        let state = self.engine.state();
        if !self.watchdog.expired(Instant::now()) || !state.can_stall() {
            self.watchdog.disarm();
            return;
        }
        self.watchdog.disarm();
        self.engine.mark_failed();
        self.call_active = false;
        self.report(CallError::Negotiation(format!(
            "call made no progress while {state}"
        )));
    }

    fn report(&mut self, err: CallError) {
        if err.is_media() {
            warn!("Media error: {}", err);
        } else {
            error!("Call error: {}", err);
        }
        self.last_error = Some(err);
    }

    /// Recomputes derived state and pushes a snapshot to observers.
    fn publish(&mut self) {
        let state = self.engine.state();
        match state {
            CallState::Connected => self.call_active = true,
            CallState::Disconnected | CallState::Failed | CallState::Closed => {
                self.call_active = false
            }
            _ => {}
        }
        self.watchdog.observe(state, Instant::now());

        self.state_tx.send_replace(SessionSnapshot {
            is_connected: self.channel.is_open(),
            is_call_active: self.call_active,
            connection_state: state,
            last_error: self.last_error.clone(),
            local_stream: self.capture.stream().cloned(),
            remote_stream: self.engine.remote_stream().cloned(),
        });
    }
}
