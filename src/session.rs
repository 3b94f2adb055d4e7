//! Session lifecycle state machine
//!
//! One [`Session`] coordinates a single remote endpoint: it drives the
//! offer/answer/candidate exchange through the transport primitive, shapes
//! locally generated descriptions before they leave, dispatches inbound
//! signaling envelopes, multiplexes data channels, and surfaces everything
//! the host needs to know as [`SessionEvent`]s.
//!
//! All state transitions happen on the session's event pump task or inside
//! [`Session::handle_message`]; nothing blocks the caller. Overlapping
//! negotiation rounds (a renegotiation while an exchange is in flight) are
//! an accepted race, serialized only as far as the transport itself does.

use crate::channels::ChannelRegistry;
use crate::config::{BitrateLimit, MediaKind, SessionConfig, SessionKind};
use crate::events::{SessionEvent, SessionEvents};
use crate::sdp;
use crate::signaling::{DescriptionPayload, SignalPayload, SignalingEnvelope};
use crate::transfer::{
    FilePayload, OutgoingTransfer, TransferBackend, TransferStatus, INBAND_FILETRANSFER_V1,
};
use crate::transport::{
    ChannelInit, ChannelSignal, ChannelState, DataChannel, DescriptionKind, IceConnectionState,
    LocalStream, PeerTransport, RemoteStream, SessionDescription, TransportEvent,
};
use crate::{Error, Result};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Lifecycle state of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Created, no negotiation started yet
    New,
    /// First offer/answer exchange in flight
    Negotiating,
    /// Media/data flowing
    Connected,
    /// A further offer/answer round over an established connection
    Renegotiating,
    /// Ended; the session is inert
    Closed,
}

/// Milliseconds since the epoch, used for session-id and transfer labels
fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// One peer-to-peer session
///
/// Created with [`Session::connect`]; destroyed by [`Session::end`], by all
/// remote tracks ending, or by the transport reporting stream removal.
pub struct Session {
    config: SessionConfig,
    sid: String,
    transport: Arc<dyn PeerTransport>,
    backend: Arc<dyn TransferBackend>,
    registry: ChannelRegistry,
    state: RwLock<SessionState>,
    ice_state: RwLock<IceConnectionState>,
    remote_nick: RwLock<Option<String>>,
    remote_prefix: RwLock<Option<String>>,
    remote_stream: RwLock<Option<Arc<dyn RemoteStream>>>,
    closed: Arc<AtomicBool>,
    events: mpsc::UnboundedSender<SessionEvent>,
}

impl Session {
    /// Create a session over the given transport
    ///
    /// Validates the configuration, attaches local media (screen sessions
    /// attach only the shared screen, and only when configured to), and
    /// spawns the event pump. The returned [`SessionEvents`] stream is the
    /// only way the session talks back to the host.
    pub async fn connect(
        config: SessionConfig,
        transport: Arc<dyn PeerTransport>,
        backend: Arc<dyn TransferBackend>,
        local_streams: Vec<Arc<dyn LocalStream>>,
    ) -> Result<(Arc<Self>, SessionEvents)> {
        config.validate()?;

        let sid = config
            .sid
            .clone()
            .unwrap_or_else(|| now_millis().to_string());
        info!("Creating session for peer {} (sid {})", config.peer_id, sid);

        match config.kind {
            SessionKind::Screen => {
                if config.share_my_screen {
                    if let Some(screen) = local_streams.first() {
                        debug!("Attaching local screen stream {}", screen.id());
                        transport.add_local_stream(Arc::clone(screen)).await?;
                    }
                }
            }
            _ => {
                for stream in &local_streams {
                    transport.add_local_stream(Arc::clone(stream)).await?;
                }
            }
        }

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let closed = Arc::new(AtomicBool::new(false));
        let registry = ChannelRegistry::new(
            Arc::clone(&transport),
            Arc::clone(&backend),
            events_tx.clone(),
            Arc::clone(&closed),
        );

        let transport_events = transport.events();
        let session = Arc::new(Self {
            config,
            sid,
            transport,
            backend,
            registry,
            state: RwLock::new(SessionState::New),
            ice_state: RwLock::new(IceConnectionState::New),
            remote_nick: RwLock::new(None),
            remote_prefix: RwLock::new(None),
            remote_stream: RwLock::new(None),
            closed,
            events: events_tx,
        });

        tokio::spawn(Self::run_event_pump(
            Arc::clone(&session),
            transport_events,
        ));

        Ok((session, SessionEvents::new(events_rx)))
    }

    /// Remote endpoint id this session talks to
    pub fn peer_id(&self) -> &str {
        &self.config.peer_id
    }

    /// Session-id token correlating negotiation rounds
    pub fn sid(&self) -> &str {
        &self.sid
    }

    /// Session kind
    pub fn kind(&self) -> &SessionKind {
        &self.config.kind
    }

    /// Current lifecycle state
    pub fn state(&self) -> SessionState {
        *self.state.read()
    }

    /// Mirrored ICE connection state
    pub fn ice_connection_state(&self) -> IceConnectionState {
        *self.ice_state.read()
    }

    /// Whether the session has ended
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Display name the remote side announced, once known
    pub fn remote_nick(&self) -> Option<String> {
        self.remote_nick.read().clone()
    }

    /// Vendor prefix tag the remote side last announced
    pub fn remote_prefix(&self) -> Option<String> {
        self.remote_prefix.read().clone()
    }

    /// The accepted remote stream, once one arrived
    pub fn remote_stream(&self) -> Option<Arc<dyn RemoteStream>> {
        self.remote_stream.read().clone()
    }

    /// Begin (or re-run) the offer/answer exchange
    ///
    /// Ensures the default data channel exists first when configured: the
    /// transport needs a channel in place before the first offer to
    /// negotiate its data section. Renegotiation re-enters here with the
    /// channel already registered. A missing data-channel capability aborts
    /// only the channel, not the offer.
    pub async fn start(&self) -> Result<()> {
        if self.is_closed() {
            return Ok(());
        }

        if self.config.enable_data_channels {
            if let Err(e) = self
                .registry
                .get_or_create(&self.config.default_channel_label, ChannelInit::default())
                .await
            {
                warn!(
                    "Default data channel unavailable for peer {}: {}",
                    self.config.peer_id, e
                );
            }
        }

        self.enter_negotiation();
        self.transport.create_offer(self.config.receive).await
    }

    /// Request a fresh offer with an ICE restart
    ///
    /// The restart constraints are derived per call; the configured
    /// constraints are never mutated.
    pub async fn ice_restart(&self) -> Result<()> {
        if self.is_closed() {
            return Ok(());
        }
        info!("Requesting ICE restart for peer {}", self.config.peer_id);
        self.enter_negotiation();
        self.transport
            .create_offer(self.config.receive.with_ice_restart())
            .await
    }

    /// Dispatch one inbound signaling envelope
    ///
    /// Envelopes carrying a stale session-id and unknown message types are
    /// ignored without touching session state. Failures to apply a remote
    /// description abandon that round silently.
    pub async fn handle_message(&self, envelope: SignalingEnvelope) -> Result<()> {
        if self.is_closed() {
            return Ok(());
        }

        debug!(
            "Handling '{}' from peer {}",
            envelope.payload.message_type(),
            self.config.peer_id
        );

        if !envelope.accepts(&self.sid) {
            debug!(
                "Dropping envelope with sid {} (session sid {})",
                envelope.sid, self.sid
            );
            return Ok(());
        }

        if let Some(prefix) = &envelope.prefix {
            *self.remote_prefix.write() = Some(prefix.clone());
        }

        let from = envelope.from;
        match envelope.payload {
            SignalPayload::Offer(payload) => {
                self.remember_nick(payload.nick.as_deref());
                self.enter_negotiation();
                match self
                    .transport
                    .apply_remote_offer(SessionDescription::offer(payload.sdp))
                    .await
                {
                    Ok(()) => {
                        // auto-accept; the generated answer arrives as a
                        // transport event and is dispatched from the pump
                        if let Err(e) = self.transport.create_answer().await {
                            warn!(
                                "Failed to answer offer from peer {}: {}",
                                self.config.peer_id, e
                            );
                        }
                    }
                    Err(e) => {
                        warn!(
                            "Abandoning offer round from peer {}: {}",
                            self.config.peer_id, e
                        );
                    }
                }
            }
            SignalPayload::Answer(payload) => {
                self.remember_nick(payload.nick.as_deref());
                if let Err(e) = self
                    .transport
                    .apply_remote_answer(SessionDescription::answer(payload.sdp))
                    .await
                {
                    warn!(
                        "Abandoning answer round from peer {}: {}",
                        self.config.peer_id, e
                    );
                }
            }
            SignalPayload::Candidate(candidate) => {
                if let Err(e) = self.transport.add_remote_candidate(Some(candidate)).await {
                    warn!(
                        "Failed to apply candidate from peer {}: {}",
                        self.config.peer_id, e
                    );
                }
            }
            SignalPayload::EndOfCandidates => {
                if let Err(e) = self.transport.add_remote_candidate(None).await {
                    warn!(
                        "Failed to signal end of candidates for peer {}: {}",
                        self.config.peer_id, e
                    );
                }
            }
            SignalPayload::ConnectivityError => {
                let _ = self.events.send(SessionEvent::ConnectivityError);
            }
            SignalPayload::Mute(info) => {
                let _ = self.events.send(SessionEvent::Mute {
                    peer_id: from.unwrap_or_else(|| self.config.peer_id.clone()),
                    name: info.name,
                });
            }
            SignalPayload::Unmute(info) => {
                let _ = self.events.send(SessionEvent::Unmute {
                    peer_id: from.unwrap_or_else(|| self.config.peer_id.clone()),
                    name: info.name,
                });
            }
            SignalPayload::Other => {
                debug!(
                    "Ignoring unknown signaling message for peer {}",
                    self.config.peer_id
                );
            }
        }

        Ok(())
    }

    /// End the session
    ///
    /// Idempotent: the first call closes the transport, marks the session
    /// closed and emits `PeerStreamRemoved`; later calls are no-ops.
    pub async fn end(&self) -> Result<()> {
        if self.is_closed() {
            return Ok(());
        }
        info!("Ending session with peer {}", self.config.peer_id);
        if let Err(e) = self.transport.close().await {
            warn!(
                "Error closing transport for peer {}: {}",
                self.config.peer_id, e
            );
        }
        self.handle_stream_removed();
        Ok(())
    }

    /// Cap (or uncap) the outbound video bitrate
    ///
    /// Outgoing direction only; the incoming limit is the remote side's
    /// business. Screen sessions are exempt. The video sender is located by
    /// inspecting track kinds because the transport guarantees no sender
    /// order. Parameter failures are logged, never escalated.
    pub async fn set_video_bitrate_limit(&self, limit: BitrateLimit) -> Result<()> {
        if self.config.kind == SessionKind::Screen || self.is_closed() {
            return Ok(());
        }

        let sender = self
            .transport
            .senders()
            .into_iter()
            .find(|s| s.track_kind() == Some(MediaKind::Video));
        let sender = match sender {
            Some(sender) => sender,
            None => {
                warn!("No outbound video sender for peer {}", self.config.peer_id);
                return Ok(());
            }
        };

        let mut parameters = sender.parameters();
        if parameters.encodings.is_empty() {
            parameters.encodings.push(Default::default());
        }
        parameters.encodings[0].max_bitrate_bps = match limit {
            BitrateLimit::Unlimited => None,
            // encoding parameters are measured in bits
            BitrateLimit::Kbps(kbps) => Some(kbps as u64 * 1000),
        };

        match sender.set_parameters(parameters).await {
            Ok(()) => debug!(
                "Applied bitrate limit {:?} for peer {}",
                limit, self.config.peer_id
            ),
            Err(e) => warn!(
                "Failed to apply bitrate limit for peer {}: {}",
                self.config.peer_id, e
            ),
        }
        Ok(())
    }

    /// Fetch or create a data channel by label
    pub async fn open_data_channel(
        &self,
        label: &str,
        init: ChannelInit,
    ) -> Result<Arc<dyn DataChannel>> {
        self.registry.get_or_create(label, init).await
    }

    /// Send a structured message over a named data channel
    ///
    /// Fails when the channel does not exist or is not open yet.
    pub async fn send_directly(
        &self,
        label: &str,
        message_type: &str,
        payload: serde_json::Value,
    ) -> Result<()> {
        let channel = self
            .registry
            .get(label)
            .ok_or_else(|| Error::DataChannel(format!("No data channel '{}'", label)))?;
        if channel.ready_state() != ChannelState::Open {
            return Err(Error::ChannelNotOpen(label.to_string()));
        }

        let message = serde_json::json!({ "type": message_type, "payload": payload });
        debug!("Sending '{}' via data channel '{}'", message_type, label);
        channel.send_text(&message.to_string()).await
    }

    /// Send a file inband over a dedicated data channel
    ///
    /// Opens a transfer channel named after the current timestamp, sends
    /// the metadata header once the channel opens, then hands the bytes to
    /// the transfer backend. The receiver closing the channel is the only
    /// acknowledgment; the returned handle resolves when it happens.
    pub async fn send_file(&self, file: FilePayload) -> Result<OutgoingTransfer> {
        if self.is_closed() {
            return Err(Error::SessionClosed);
        }

        let label = format!("filetransfer-{}", now_millis());
        let init = ChannelInit {
            protocol: Some(INBAND_FILETRANSFER_V1.to_string()),
            ..Default::default()
        };
        let channel = self.registry.get_or_create(&label, init).await?;

        let metadata = file.metadata();
        let (transfer, state) = OutgoingTransfer::new(metadata.clone());
        let mut signals = channel.signals();
        let backend = Arc::clone(&self.backend);

        tokio::spawn(async move {
            let label = channel.label().to_string();
            let mut header_sent = false;
            while let Some(signal) = signals.recv().await {
                match signal {
                    ChannelSignal::Open => {
                        let header = match metadata.to_json() {
                            Ok(header) => header,
                            Err(e) => {
                                warn!("Failed to encode transfer header: {}", e);
                                state.set_status(TransferStatus::Aborted);
                                break;
                            }
                        };
                        if let Err(e) = channel.send_text(&header).await {
                            warn!("Failed to send transfer header on '{}': {}", label, e);
                            state.set_status(TransferStatus::Aborted);
                            break;
                        }
                        match backend.send(file.clone(), Arc::clone(&channel)).await {
                            Ok(mut backend_rx) => {
                                // drain; completion is signaled by the
                                // receiver closing the channel, not by Sent
                                tokio::spawn(async move {
                                    while backend_rx.recv().await.is_some() {}
                                });
                                header_sent = true;
                            }
                            Err(e) => {
                                warn!("Transfer backend failed on '{}': {}", label, e);
                                state.set_status(TransferStatus::Aborted);
                                let _ = channel.close().await;
                                break;
                            }
                        }
                    }
                    ChannelSignal::Closed => {
                        if header_sent {
                            debug!("Transfer on '{}' acknowledged by receiver", label);
                            state.set_status(TransferStatus::Complete);
                        } else {
                            warn!("Transfer channel '{}' closed before the header went out", label);
                            state.set_status(TransferStatus::Aborted);
                        }
                        break;
                    }
                    ChannelSignal::Error(message) => {
                        warn!("Transfer channel '{}' error: {}", label, message);
                    }
                    ChannelSignal::Message(_) => {}
                }
            }
            // signal stream gone without a close: no acknowledgment
            state.set_status(TransferStatus::Aborted);
        });

        Ok(transfer)
    }

    // ------------------------------------------------------------------
    // Event pump
    // ------------------------------------------------------------------

    async fn run_event_pump(
        session: Arc<Session>,
        mut events: mpsc::UnboundedReceiver<TransportEvent>,
    ) {
        while let Some(event) = events.recv().await {
            debug!(
                "Transport event '{}' for peer {}",
                event.name(),
                session.config.peer_id
            );
            session.handle_transport_event(event).await;
            if session.is_closed() {
                break;
            }
        }
        debug!(
            "Transport event stream ended for peer {}",
            session.config.peer_id
        );
    }

    async fn handle_transport_event(&self, event: TransportEvent) {
        if self.is_closed() {
            return;
        }

        match event {
            TransportEvent::OfferReady(description)
            | TransportEvent::AnswerReady(description) => {
                self.dispatch_description(description);
            }
            TransportEvent::IceCandidate(candidate) => {
                self.send_signal(SignalPayload::Candidate(candidate));
            }
            TransportEvent::EndOfCandidates => {
                self.send_signal(SignalPayload::EndOfCandidates);
            }
            TransportEvent::RemoteStreamAdded(stream) => {
                self.handle_remote_stream_added(stream);
            }
            TransportEvent::RemoteStreamRemoved { stream_id } => {
                debug!(
                    "Remote stream {} removed for peer {}",
                    stream_id, self.config.peer_id
                );
                self.handle_stream_removed();
            }
            TransportEvent::RemoteTrackEnded { track_id } => {
                debug!(
                    "Remote track {} ended for peer {}",
                    track_id, self.config.peer_id
                );
                if self.all_remote_tracks_ended() {
                    if let Err(e) = self.end().await {
                        warn!("Auto-close failed for peer {}: {}", self.config.peer_id, e);
                    }
                }
            }
            TransportEvent::DataChannelAdded(channel) => {
                self.registry.adopt(channel);
            }
            TransportEvent::IceConnectionStateChange(state) => {
                self.handle_ice_state(state);
            }
            TransportEvent::SignalingStateChange(state) => {
                let _ = self.events.send(SessionEvent::SignalingStateChange(state));
            }
            TransportEvent::NegotiationNeeded => {
                if let Err(e) = self.start().await {
                    warn!(
                        "Renegotiation failed for peer {}: {}",
                        self.config.peer_id, e
                    );
                }
            }
        }
    }

    /// Shape and dispatch a locally generated description
    fn dispatch_description(&self, description: SessionDescription) {
        let kind = description.kind;
        let shaped = self.shape_description(description);
        let payload = DescriptionPayload {
            kind: match kind {
                DescriptionKind::Offer => "offer".to_string(),
                DescriptionKind::Answer => "answer".to_string(),
            },
            sdp: shaped.sdp,
            nick: self.config.nick.clone(),
        };
        let payload = match kind {
            DescriptionKind::Offer => SignalPayload::Offer(payload),
            DescriptionKind::Answer => SignalPayload::Answer(payload),
        };
        self.send_signal(payload);
    }

    /// Apply codec preference then bandwidth caps to an outbound description
    fn shape_description(&self, mut description: SessionDescription) -> SessionDescription {
        if let Some(codec) = &self.config.video_codec {
            description.sdp = sdp::prefer_codec(&description.sdp, MediaKind::Video, codec);
        }
        if let Some(codec) = &self.config.audio_codec {
            description.sdp = sdp::prefer_codec(&description.sdp, MediaKind::Audio, codec);
        }
        if let Some(kbps) = self.config.video_bitrate_kbps {
            description.sdp = sdp::set_bitrate(&description.sdp, MediaKind::Video, kbps);
        }
        if let Some(kbps) = self.config.audio_bitrate_kbps {
            description.sdp = sdp::set_bitrate(&description.sdp, MediaKind::Audio, kbps);
        }
        description
    }

    fn handle_remote_stream_added(&self, stream: Arc<dyn RemoteStream>) {
        {
            let mut slot = self.remote_stream.write();
            if slot.is_some() {
                warn!(
                    "Already have a remote stream for peer {}, dropping stream {}",
                    self.config.peer_id,
                    stream.id()
                );
                return;
            }
            *slot = Some(Arc::clone(&stream));
        }
        let _ = self.events.send(SessionEvent::PeerStreamAdded { stream });
    }

    fn all_remote_tracks_ended(&self) -> bool {
        match self.remote_stream.read().as_ref() {
            Some(stream) => stream.tracks().iter().all(|track| track.is_ended()),
            None => false,
        }
    }

    fn handle_ice_state(&self, state: IceConnectionState) {
        *self.ice_state.write() = state;
        let _ = self
            .events
            .send(SessionEvent::IceConnectionStateChange(state));

        match state {
            IceConnectionState::Connected | IceConnectionState::Completed => {
                let mut lifecycle = self.state.write();
                if matches!(
                    *lifecycle,
                    SessionState::Negotiating | SessionState::Renegotiating
                ) {
                    *lifecycle = SessionState::Connected;
                }
            }
            IceConnectionState::Failed => {
                // only the offer side observes the failure; the answer side
                // learns about it from the connectivityError envelope
                let is_offerer = matches!(
                    self.transport.local_description(),
                    Some(description) if description.kind == DescriptionKind::Offer
                );
                if is_offerer {
                    let _ = self.events.send(SessionEvent::IceFailed);
                    self.send_signal(SignalPayload::ConnectivityError);
                }
            }
            _ => {}
        }
    }

    /// Stream-removed cleanup; runs at most once per session
    fn handle_stream_removed(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        *self.state.write() = SessionState::Closed;
        let _ = self.events.send(SessionEvent::PeerStreamRemoved);
    }

    fn enter_negotiation(&self) {
        let mut state = self.state.write();
        *state = match *state {
            SessionState::Connected | SessionState::Renegotiating => SessionState::Renegotiating,
            _ => SessionState::Negotiating,
        };
    }

    fn remember_nick(&self, nick: Option<&str>) {
        if let Some(nick) = nick {
            let mut slot = self.remote_nick.write();
            if slot.is_none() {
                *slot = Some(nick.to_string());
            }
        }
    }

    fn send_signal(&self, payload: SignalPayload) {
        debug!(
            "Sending '{}' to peer {}",
            payload.message_type(),
            self.config.peer_id
        );
        let envelope = SignalingEnvelope {
            to: self.config.peer_id.clone(),
            from: None,
            sid: self.sid.clone(),
            room_type: self.config.kind.clone(),
            broadcaster: self.config.broadcaster.clone(),
            prefix: self.config.prefix.clone(),
            payload,
        };
        let _ = self.events.send(SessionEvent::Signal(envelope));
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("peer_id", &self.config.peer_id)
            .field("sid", &self.sid)
            .field("state", &*self.state.read())
            .field("closed", &self.is_closed())
            .finish()
    }
}
