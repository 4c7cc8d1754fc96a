use medcall_core::{IceCandidate, Role, SessionDescription, SignalingMessage};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::config::CallConfig;
use crate::error::{CallError, Result};
use crate::media::{LocalStream, RemoteStream};
use crate::negotiation::call_state::CallState;
use crate::negotiation::candidate_buffer::CandidateBuffer;
use crate::negotiation::engine_event::{EngineEvent, SessionGeneration};
use crate::negotiation::peer_session::PeerSession;

/// On an offer collision the patient drops its own offer and answers; the
/// doctor keeps its offer and ignores the incoming one.
pub fn yields_on_glare(role: Role) -> bool {
    matches!(role, Role::Patient)
}

/// Drives the offer/answer handshake for one peer session at a time.
pub struct NegotiationEngine {
    role: Role,
    config: CallConfig,
    event_tx: mpsc::Sender<EngineEvent>,
    session: Option<PeerSession>,
    generation: SessionGeneration,
    state: CallState,
    pending_candidates: CandidateBuffer,
    awaiting_answer: bool,
    remote_description_set: bool,
    exchanges: u32,
    local_stream_attached: bool,
    remote_stream: Option<RemoteStream>,
}

impl NegotiationEngine {
    pub fn new(role: Role, config: CallConfig) -> (Self, mpsc::Receiver<EngineEvent>) {
        let (event_tx, event_rx) = mpsc::channel(config.queue_capacity);
        let engine = Self {
            role,
            config,
            event_tx,
            session: None,
            generation: 0,
            state: CallState::New,
            pending_candidates: CandidateBuffer::default(),
            awaiting_answer: false,
            remote_description_set: false,
            exchanges: 0,
            local_stream_attached: false,
            remote_stream: None,
        };
        (engine, event_rx)
    }

    pub fn state(&self) -> CallState {
        self.state
    }

    pub fn has_session(&self) -> bool {
        self.session.is_some()
    }

    /// True while a local offer has been sent and no answer applied.
    pub fn awaiting_answer(&self) -> bool {
        self.awaiting_answer
    }

    /// Completed offer/answer pairs on the current session.
    pub fn exchanges(&self) -> u32 {
        self.exchanges
    }

    pub fn buffered_candidates(&self) -> usize {
        self.pending_candidates.len()
    }

    pub fn remote_stream(&self) -> Option<&RemoteStream> {
        self.remote_stream.as_ref()
    }

    /// Creates the peer session if there is none.
    pub async fn ensure_session(&mut self) -> Result<()> {
        if self.session.is_some() {
            return Ok(());
        }
        self.generation += 1;
        let session = PeerSession::new(self.generation, &self.config, self.event_tx.clone()).await?;
        info!("Peer session {} created", self.generation);
        self.session = Some(session);
        self.state = CallState::New;
        Ok(())
    }

    /// Adds the local tracks to the current session, once per session.
    pub async fn attach_local_stream(&mut self, stream: &LocalStream) -> Result<()> {
        self.ensure_session().await?;
        if self.local_stream_attached {
            return Ok(());
        }
        let session = self.session()?;
        session.add_local_stream(stream).await?;
        self.local_stream_attached = true;
        debug!("Local stream {} attached", stream.id());
        Ok(())
    }

    /// Creates the initial offer. Only the side that starts the call does
    /// this.
    pub async fn create_offer(&mut self) -> Result<SignalingMessage> {
        let result = self.offer().await;
        self.fail_on_error(result)
    }

    async fn offer(&mut self) -> Result<SignalingMessage> {
        self.ensure_session().await?;
        let offer = self.session()?.create_offer().await?;
        self.awaiting_answer = true;
        self.state = CallState::Negotiating;
        info!("Local offer created");
        Ok(SignalingMessage::Offer(offer))
    }

    /// Applies an inbound negotiation message. Returns the reply to send, if
    /// any. `local` is attached before answering an offer.
    pub async fn handle_signal(
        &mut self,
        msg: SignalingMessage,
        local: Option<&LocalStream>,
    ) -> Result<Option<SignalingMessage>> {
        let result = match msg {
            SignalingMessage::Offer(desc) => self.on_offer(desc, local).await,
            SignalingMessage::Answer(desc) => self.on_answer(desc).await.map(|_| None),
            SignalingMessage::IceCandidate(candidate) => {
                self.on_candidate(candidate).await.map(|_| None)
            }
            other => {
                debug!("Engine ignores {} message", other.kind_name());
                Ok(None)
            }
        };
        self.fail_on_error(result)
    }

    async fn on_offer(
        &mut self,
        desc: SessionDescription,
        local: Option<&LocalStream>,
    ) -> Result<Option<SignalingMessage>> {
        if self.awaiting_answer {
            if !yields_on_glare(self.role) {
                warn!("Offer collision: keeping our offer as {}", self.role);
                return Ok(None);
            }
            info!("Offer collision: {} yields, restarting session", self.role);
            self.reset().await;
        } else if self.remote_description_set || self.exchanges > 0 {
            warn!("Rejecting offer: this room already has a negotiated call");
            return Ok(None);
        }

        self.ensure_session().await?;
        if let Some(stream) = local {
            self.attach_local_stream(stream).await?;
        }

        self.state = CallState::Negotiating;
        self.session()?.set_remote_description(desc).await?;
        self.remote_description_set = true;
        self.flush_candidates().await?;

        let answer = self.session()?.create_answer().await?;
        self.exchanges += 1;
        info!("Answer created for remote offer");
        Ok(Some(SignalingMessage::Answer(answer)))
    }

    async fn on_answer(&mut self, desc: SessionDescription) -> Result<()> {
        if !self.awaiting_answer {
            warn!("Ignoring answer: no local offer is pending");
            return Ok(());
        }
        self.session()?.set_remote_description(desc).await?;
        self.awaiting_answer = false;
        self.remote_description_set = true;
        self.exchanges += 1;
        info!("Remote answer applied");
        self.flush_candidates().await
    }

    async fn on_candidate(&mut self, candidate: IceCandidate) -> Result<()> {
        if self.session.is_none() || !self.remote_description_set {
            self.pending_candidates.push(candidate);
            debug!(
                "Buffered early ICE candidate ({} pending)",
                self.pending_candidates.len()
            );
            return Ok(());
        }
        self.session()?.add_ice_candidate(candidate).await
    }

    async fn flush_candidates(&mut self) -> Result<()> {
        let pending = self.pending_candidates.take_all();
        if pending.is_empty() {
            return Ok(());
        }
        debug!("Applying {} buffered ICE candidates", pending.len());
        for candidate in pending {
            self.session()?.add_ice_candidate(candidate).await?;
        }
        Ok(())
    }

    /// Applies an event raised by a peer session. Events from sessions that
    /// were already replaced are dropped.
    pub fn handle_event(&mut self, event: EngineEvent) -> Option<SignalingMessage> {
        if self.session.is_none() || event.generation() != self.generation {
            debug!("Dropping event from stale session {}", event.generation());
            return None;
        }

        match event {
            EngineEvent::CandidateGenerated(_, candidate) => {
                Some(SignalingMessage::IceCandidate(candidate))
            }
            EngineEvent::StateChanged(_, state) => {
                self.apply_state(CallState::from(state));
                None
            }
            EngineEvent::RemoteTrack(_, track) => {
                self.remote_stream
                    .get_or_insert_with(RemoteStream::default)
                    .push(track);
                None
            }
        }
    }

    fn apply_state(&mut self, next: CallState) {
        if self.state.is_terminal() {
            debug!("Ignoring {} report: call is already {}", next, self.state);
            return;
        }
        match next {
            CallState::Connected if self.exchanges == 0 => {
                warn!("Peer reported connected before any offer/answer; ignoring");
            }
            CallState::New => {}
            next => {
                if next != self.state {
                    info!("Call state {} -> {}", self.state, next);
                }
                self.state = next;
            }
        }
    }

    /// Marks the session failed, e.g. after the stall watchdog fired.
    pub fn mark_failed(&mut self) {
        if !self.state.is_terminal() {
            self.state = CallState::Failed;
        }
    }

    /// Closes the current session and starts over in `New`. Used when the
    /// peer leaves so it can negotiate again after rejoining.
    pub async fn reset(&mut self) {
        self.teardown().await;
        self.state = CallState::New;
    }

    /// Closes the peer session. Idempotent.
    pub async fn close(&mut self) {
        self.teardown().await;
        self.state = CallState::Closed;
    }

    async fn teardown(&mut self) {
        if let Some(session) = self.session.take() {
            if let Err(e) = session.close().await {
                warn!("Error closing peer session {}: {}", session.generation(), e);
            }
            info!("Peer session {} closed", session.generation());
        }
        self.pending_candidates.clear();
        self.awaiting_answer = false;
        self.remote_description_set = false;
        self.exchanges = 0;
        self.local_stream_attached = false;
        self.remote_stream = None;
    }

    fn session(&self) -> Result<&PeerSession> {
        self.session
            .as_ref()
            .ok_or_else(|| CallError::Negotiation("no peer session".to_owned()))
    }

    fn fail_on_error<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            error!("Negotiation error: {}", e);
            self.state = CallState::Failed;
        }
        result
    }
}
