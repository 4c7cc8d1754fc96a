use medcall_core::{Participant, RoomId};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::CallConfig;
use crate::error::{CallError, Result};
use crate::media::{LocalStream, MediaCaptureController, MediaDevices, RemoteStream};
use crate::negotiation::{CallState, NegotiationEngine, StallWatchdog};
use crate::session::session_command::SessionCommand;
use crate::session::session_context::SessionContext;
use crate::session::session_loop::SessionLoop;
use crate::session::session_snapshot::SessionSnapshot;
use crate::signaling::SignalingChannel;

/// Handle to one participant's call in one room.
///
/// Every operation is queued to the session loop and resolves once the loop
/// has applied it, so the snapshot read right after an `await` already
/// reflects the operation. Operations never fail: problems end up in
/// [`CallSession::last_error`].
pub struct CallSession {
    participant: Participant,
    room: RoomId,
    command_tx: mpsc::Sender<SessionCommand>,
    state_rx: watch::Receiver<SessionSnapshot>,
    task: Option<JoinHandle<()>>,
}

impl CallSession {
    /// Starts the session loop for the identity held by `ctx`. Nothing is
    /// sent to the relay until [`CallSession::join`].
    pub fn spawn(
        ctx: &SessionContext,
        room: impl Into<RoomId>,
        config: CallConfig,
        devices: Arc<dyn MediaDevices>,
    ) -> Result<Self> {
        let participant = ctx.participant().cloned().ok_or(CallError::Unauthenticated)?;
        let room = room.into();

        if !config.has_turn() {
            warn!("No TURN server configured; peers behind symmetric NATs will not connect");
        }

        let (command_tx, command_rx) = mpsc::channel(config.queue_capacity);
        let (state_tx, state_rx) = watch::channel(SessionSnapshot::default());
        let (channel, channel_rx) = SignalingChannel::new(config.clone());
        let watchdog = StallWatchdog::new(config.stall_timeout());
        let (engine, engine_rx) = NegotiationEngine::new(participant.role, config);

        let session_loop = SessionLoop {
            room: room.clone(),
            participant: participant.clone(),
            channel,
            channel_rx,
            engine,
            engine_rx,
            capture: MediaCaptureController::new(devices),
            command_rx,
            state_tx,
            watchdog,
            peer: None,
            call_active: false,
            last_error: None,
        };

        info!("Spawning call session for {} in room {}", participant, room);
        let task = tokio::spawn(session_loop.run());

        Ok(Self {
            participant,
            room,
            command_tx,
            state_rx,
            task: Some(task),
        })
    }

    pub fn participant(&self) -> &Participant {
        &self.participant
    }

    pub fn room(&self) -> &RoomId {
        &self.room
    }

    /// Opens the signaling channel and announces this participant.
    pub async fn join(&self) {
        self.request(|done| SessionCommand::Join { done }).await;
    }

    /// Acquires local media without offering. Used by the answering side so
    /// its tracks are attached when the offer arrives.
    pub async fn acquire_media(&self) {
        self.request(|done| SessionCommand::AcquireMedia { done }).await;
    }

    /// Stops and drops the local stream while keeping the channel and the
    /// peer session. Returns false when no media was held.
    pub async fn release_media(&self) -> bool {
        self.request(|done| SessionCommand::ReleaseMedia { done })
            .await
            .unwrap_or(false)
    }

    /// Acquires media if needed, then sends an offer.
    pub async fn start_call(&self) {
        self.request(|done| SessionCommand::StartCall { done }).await;
    }

    /// Releases media, closes the peer session and the channel. Safe in
    /// every state and safe to repeat.
    pub async fn end_call(&self) {
        self.request(|done| SessionCommand::EndCall { done }).await;
    }

    /// Flips the audio track. Returns the new enabled flag, or `None`
    /// without local media.
    pub async fn toggle_mute(&self) -> Option<bool> {
        self.request(|done| SessionCommand::ToggleMute { done })
            .await
            .flatten()
    }

    pub async fn toggle_video(&self) -> Option<bool> {
        self.request(|done| SessionCommand::ToggleVideo { done })
            .await
            .flatten()
    }

    pub async fn clear_error(&self) {
        self.request(|done| SessionCommand::ClearError { done }).await;
    }

    /// Ends the call and stops the session loop.
    pub async fn shutdown(mut self) {
        self.request(|done| SessionCommand::Shutdown { done }).await;
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!("Session loop ended abnormally: {}", e);
            }
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.state_rx.borrow().clone()
    }

    pub fn is_connected(&self) -> bool {
        self.state_rx.borrow().is_connected
    }

    pub fn is_call_active(&self) -> bool {
        self.state_rx.borrow().is_call_active
    }

    pub fn connection_state(&self) -> CallState {
        self.state_rx.borrow().connection_state
    }

    pub fn last_error(&self) -> Option<CallError> {
        self.state_rx.borrow().last_error.clone()
    }

    pub fn local_stream(&self) -> Option<LocalStream> {
        self.state_rx.borrow().local_stream.clone()
    }

    pub fn remote_stream(&self) -> Option<RemoteStream> {
        self.state_rx.borrow().remote_stream.clone()
    }

    /// Receiver that sees every published snapshot.
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.state_rx.clone()
    }

    /// Waits until `pred` holds for the current snapshot. Returns false on
    /// timeout or when the loop has stopped.
    pub async fn wait_until<F>(&self, pred: F, timeout: Duration) -> bool
    where
        F: FnMut(&SessionSnapshot) -> bool,
    {
        let mut rx = self.state_rx.clone();
        matches!(
            tokio::time::timeout(timeout, rx.wait_for(pred)).await,
            Ok(Ok(_))
        )
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> SessionCommand,
    ) -> Option<T> {
        let (done_tx, done_rx) = oneshot::channel();
        if self.command_tx.send(make(done_tx)).await.is_err() {
            warn!("Session loop for room {} is gone", self.room);
            return None;
        }
        done_rx.await.ok()
    }
}
