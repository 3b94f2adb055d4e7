//! Session test harness
//!
//! Mock implementations of the three collaborator seams (transport
//! primitive, data channels, and the file-transfer byte mover) plus small
//! helpers for driving and asserting on the event stream. Tests act as the
//! transport: they push [`TransportEvent`]s and channel signals to simulate
//! the remote side.

#![allow(dead_code)]

use bytes::Bytes;
use parking_lot::Mutex;
use peerlink::config::{MediaKind, ReceiveConstraints};
use peerlink::transfer::{FilePayload, FileTransferMetadata, TransferBackend, TransferSignal};
use peerlink::transport::{
    ChannelInit, ChannelSignal, ChannelState, EncodingParameters, IceCandidate, LocalStream,
    MediaSender, PeerTransport, RemoteTrack, SenderParameters, SessionDescription, TransportEvent,
};

// re-exported so test files get the trait methods through `use harness::*`
pub use peerlink::transport::{DataChannel, RemoteStream};
use peerlink::{Error, Result, SessionEvent, SessionEvents};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Default SDP used for generated offers/answers
pub const OFFER_SDP: &str = "v=0\r\n\
    o=- 4611731400430051336 2 IN IP4 127.0.0.1\r\n\
    s=-\r\n\
    t=0 0\r\n\
    m=audio 9 UDP/TLS/RTP/SAVPF 111 103\r\n\
    c=IN IP4 0.0.0.0\r\n\
    a=rtpmap:111 opus/48000/2\r\n\
    a=rtpmap:103 ISAC/16000\r\n\
    m=video 1 UDP/TLS/RTP/SAVPF 100 101 96\r\n\
    c=IN IP4 0.0.0.0\r\n\
    a=rtpmap:100 VP8/90000\r\n\
    a=rtpmap:101 H264/90000\r\n\
    a=rtpmap:96 VP9/90000\r\n";

pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("peerlink=debug")
        .with_test_writer()
        .try_init();
}

// ----------------------------------------------------------------------
// Mock data channel
// ----------------------------------------------------------------------

/// A data channel the test controls from the "remote" side
#[derive(Debug)]
pub struct MockChannel {
    label: String,
    protocol: Option<String>,
    state: Mutex<ChannelState>,
    subscribers: Mutex<Vec<mpsc::UnboundedSender<ChannelSignal>>>,
    /// Everything the session sent on this channel
    pub sent: Mutex<Vec<Bytes>>,
}

impl MockChannel {
    pub fn new(label: &str, protocol: Option<&str>) -> Arc<Self> {
        Arc::new(Self {
            label: label.to_string(),
            protocol: protocol.map(str::to_string),
            state: Mutex::new(ChannelState::Connecting),
            subscribers: Mutex::new(Vec::new()),
            sent: Mutex::new(Vec::new()),
        })
    }

    fn broadcast(&self, signal: ChannelSignal) {
        self.subscribers
            .lock()
            .retain(|tx| tx.send(signal.clone()).is_ok());
    }

    /// Simulate the channel becoming open
    pub fn open(&self) {
        *self.state.lock() = ChannelState::Open;
        self.broadcast(ChannelSignal::Open);
    }

    /// Simulate an inbound message
    pub fn deliver(&self, data: impl Into<Bytes>) {
        self.broadcast(ChannelSignal::Message(data.into()));
    }

    /// Simulate a channel error
    pub fn fail(&self, message: &str) {
        self.broadcast(ChannelSignal::Error(message.to_string()));
    }

    /// First sent payload decoded as UTF-8
    pub fn first_sent_text(&self) -> Option<String> {
        self.sent
            .lock()
            .first()
            .map(|b| String::from_utf8_lossy(b).to_string())
    }
}

#[async_trait::async_trait]
impl DataChannel for MockChannel {
    fn label(&self) -> &str {
        &self.label
    }

    fn protocol(&self) -> Option<&str> {
        self.protocol.as_deref()
    }

    fn ready_state(&self) -> ChannelState {
        *self.state.lock()
    }

    fn signals(&self) -> mpsc::UnboundedReceiver<ChannelSignal> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.lock().push(tx);
        rx
    }

    async fn send(&self, data: Bytes) -> Result<()> {
        self.sent.lock().push(data);
        Ok(())
    }

    async fn send_text(&self, text: &str) -> Result<()> {
        self.sent.lock().push(Bytes::from(text.to_string()));
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        *self.state.lock() = ChannelState::Closed;
        self.broadcast(ChannelSignal::Closed);
        Ok(())
    }
}

// ----------------------------------------------------------------------
// Mock media handles
// ----------------------------------------------------------------------

#[derive(Debug)]
pub struct MockTrack {
    id: String,
    kind: MediaKind,
    ended: AtomicBool,
}

impl MockTrack {
    pub fn new(id: &str, kind: MediaKind) -> Arc<Self> {
        Arc::new(Self {
            id: id.to_string(),
            kind,
            ended: AtomicBool::new(false),
        })
    }

    pub fn end(&self) {
        self.ended.store(true, Ordering::SeqCst);
    }
}

impl RemoteTrack for MockTrack {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> MediaKind {
        self.kind
    }

    fn is_ended(&self) -> bool {
        self.ended.load(Ordering::SeqCst)
    }
}

#[derive(Debug)]
pub struct MockStream {
    id: String,
    tracks: Vec<Arc<MockTrack>>,
}

impl MockStream {
    pub fn new(id: &str, tracks: Vec<Arc<MockTrack>>) -> Arc<Self> {
        Arc::new(Self {
            id: id.to_string(),
            tracks,
        })
    }
}

impl RemoteStream for MockStream {
    fn id(&self) -> &str {
        &self.id
    }

    fn tracks(&self) -> Vec<Arc<dyn RemoteTrack>> {
        self.tracks
            .iter()
            .map(|t| Arc::clone(t) as Arc<dyn RemoteTrack>)
            .collect()
    }
}

#[derive(Debug)]
pub struct MockLocalStream {
    id: String,
}

impl MockLocalStream {
    pub fn new(id: &str) -> Arc<Self> {
        Arc::new(Self { id: id.to_string() })
    }
}

impl LocalStream for MockLocalStream {
    fn id(&self) -> &str {
        &self.id
    }
}

#[derive(Debug)]
pub struct MockSender {
    kind: Option<MediaKind>,
    parameters: Mutex<SenderParameters>,
    fail_set: AtomicBool,
    pub set_calls: Mutex<Vec<SenderParameters>>,
}

impl MockSender {
    pub fn new(kind: Option<MediaKind>) -> Arc<Self> {
        Arc::new(Self {
            kind,
            parameters: Mutex::new(SenderParameters::default()),
            fail_set: AtomicBool::new(false),
            set_calls: Mutex::new(Vec::new()),
        })
    }

    pub fn with_encodings(kind: Option<MediaKind>, encodings: Vec<EncodingParameters>) -> Arc<Self> {
        let sender = Self::new(kind);
        sender.parameters.lock().encodings = encodings;
        sender
    }

    pub fn fail_next_set(&self) {
        self.fail_set.store(true, Ordering::SeqCst);
    }

    pub fn current_parameters(&self) -> SenderParameters {
        self.parameters.lock().clone()
    }
}

#[async_trait::async_trait]
impl MediaSender for MockSender {
    fn track_kind(&self) -> Option<MediaKind> {
        self.kind
    }

    fn parameters(&self) -> SenderParameters {
        self.parameters.lock().clone()
    }

    async fn set_parameters(&self, parameters: SenderParameters) -> Result<()> {
        if self.fail_set.swap(false, Ordering::SeqCst) {
            return Err(Error::Sender("parameter rejection".to_string()));
        }
        self.set_calls.lock().push(parameters.clone());
        *self.parameters.lock() = parameters;
        Ok(())
    }
}

// ----------------------------------------------------------------------
// Mock transport
// ----------------------------------------------------------------------

/// Transport double recording every operation the session performs
#[derive(Default)]
pub struct MockTransport {
    event_tx: Mutex<Option<mpsc::UnboundedSender<TransportEvent>>>,
    /// Offer constraints, one entry per create_offer call
    pub offers_requested: Mutex<Vec<ReceiveConstraints>>,
    pub answers_requested: Mutex<Vec<()>>,
    pub remote_offers: Mutex<Vec<SessionDescription>>,
    pub remote_answers: Mutex<Vec<SessionDescription>>,
    /// `None` entries are the end-of-candidates sentinel
    pub remote_candidates: Mutex<Vec<Option<IceCandidate>>>,
    pub local_streams: Mutex<Vec<String>>,
    pub channels: Mutex<Vec<Arc<MockChannel>>>,
    pub closed: AtomicBool,
    local_description: Mutex<Option<SessionDescription>>,
    senders: Mutex<Vec<Arc<MockSender>>>,
    deny_data_channels: AtomicBool,
    fail_remote_offer: AtomicBool,
    fail_remote_answer: AtomicBool,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Push a transport event to the session under test
    pub fn emit(&self, event: TransportEvent) {
        let guard = self.event_tx.lock();
        let tx = guard.as_ref().expect("session not subscribed yet");
        tx.send(event).expect("session event pump gone");
    }

    pub fn set_senders(&self, senders: Vec<Arc<MockSender>>) {
        *self.senders.lock() = senders;
    }

    pub fn set_local_description(&self, description: Option<SessionDescription>) {
        *self.local_description.lock() = description;
    }

    pub fn deny_data_channels(&self) {
        self.deny_data_channels.store(true, Ordering::SeqCst);
    }

    pub fn fail_next_remote_offer(&self) {
        self.fail_remote_offer.store(true, Ordering::SeqCst);
    }

    pub fn fail_next_remote_answer(&self) {
        self.fail_remote_answer.store(true, Ordering::SeqCst);
    }

    /// The single channel created so far, when exactly one exists
    pub fn only_channel(&self) -> Arc<MockChannel> {
        let channels = self.channels.lock();
        assert_eq!(channels.len(), 1, "expected exactly one channel");
        Arc::clone(&channels[0])
    }
}

#[async_trait::async_trait]
impl PeerTransport for MockTransport {
    fn events(&self) -> mpsc::UnboundedReceiver<TransportEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        *self.event_tx.lock() = Some(tx);
        rx
    }

    async fn create_offer(&self, constraints: ReceiveConstraints) -> Result<()> {
        self.offers_requested.lock().push(constraints);
        let description = SessionDescription::offer(OFFER_SDP);
        *self.local_description.lock() = Some(description.clone());
        self.emit(TransportEvent::OfferReady(description));
        Ok(())
    }

    async fn create_answer(&self) -> Result<()> {
        self.answers_requested.lock().push(());
        let description = SessionDescription::answer(OFFER_SDP);
        *self.local_description.lock() = Some(description.clone());
        self.emit(TransportEvent::AnswerReady(description));
        Ok(())
    }

    async fn apply_remote_offer(&self, description: SessionDescription) -> Result<()> {
        if self.fail_remote_offer.swap(false, Ordering::SeqCst) {
            return Err(Error::Negotiation("remote offer rejected".to_string()));
        }
        self.remote_offers.lock().push(description);
        Ok(())
    }

    async fn apply_remote_answer(&self, description: SessionDescription) -> Result<()> {
        if self.fail_remote_answer.swap(false, Ordering::SeqCst) {
            return Err(Error::Negotiation("remote answer rejected".to_string()));
        }
        self.remote_answers.lock().push(description);
        Ok(())
    }

    async fn add_remote_candidate(&self, candidate: Option<IceCandidate>) -> Result<()> {
        self.remote_candidates.lock().push(candidate);
        Ok(())
    }

    async fn create_data_channel(
        &self,
        label: &str,
        init: ChannelInit,
    ) -> Result<Arc<dyn DataChannel>> {
        if self.deny_data_channels.load(Ordering::SeqCst) {
            return Err(Error::Unsupported(
                "data channels not supported".to_string(),
            ));
        }
        let channel = MockChannel::new(label, init.protocol.as_deref());
        self.channels.lock().push(Arc::clone(&channel));
        Ok(channel)
    }

    async fn add_local_stream(&self, stream: Arc<dyn LocalStream>) -> Result<()> {
        self.local_streams.lock().push(stream.id().to_string());
        Ok(())
    }

    fn senders(&self) -> Vec<Arc<dyn MediaSender>> {
        self.senders
            .lock()
            .iter()
            .map(|s| Arc::clone(s) as Arc<dyn MediaSender>)
            .collect()
    }

    fn local_description(&self) -> Option<SessionDescription> {
        self.local_description.lock().clone()
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

// ----------------------------------------------------------------------
// Mock transfer backend
// ----------------------------------------------------------------------

/// Byte-mover double; the test drives completion through the stored senders
#[derive(Default)]
pub struct MockBackend {
    pub sends: Mutex<Vec<(FilePayload, String)>>,
    pub receives: Mutex<Vec<FileTransferMetadata>>,
    send_tx: Mutex<Vec<mpsc::UnboundedSender<TransferSignal>>>,
    receive_tx: Mutex<Vec<mpsc::UnboundedSender<TransferSignal>>>,
}

impl MockBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Report the most recent receive as fully reassembled
    pub fn complete_receive(&self, file: FilePayload) {
        let metadata = file.metadata();
        let guard = self.receive_tx.lock();
        let tx = guard.last().expect("no receive in flight");
        tx.send(TransferSignal::Received { file, metadata })
            .expect("receive task gone");
    }

    /// Report the most recent send as fully streamed
    pub fn complete_send(&self) {
        let guard = self.send_tx.lock();
        let tx = guard.last().expect("no send in flight");
        let _ = tx.send(TransferSignal::Sent);
    }
}

#[async_trait::async_trait]
impl TransferBackend for MockBackend {
    async fn send(
        &self,
        file: FilePayload,
        channel: Arc<dyn DataChannel>,
    ) -> Result<mpsc::UnboundedReceiver<TransferSignal>> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.sends.lock().push((file, channel.label().to_string()));
        self.send_tx.lock().push(tx);
        Ok(rx)
    }

    async fn receive(
        &self,
        metadata: FileTransferMetadata,
        _channel: Arc<dyn DataChannel>,
    ) -> Result<mpsc::UnboundedReceiver<TransferSignal>> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.receives.lock().push(metadata);
        self.receive_tx.lock().push(tx);
        Ok(rx)
    }
}

// ----------------------------------------------------------------------
// Event helpers
// ----------------------------------------------------------------------

/// Wait for the next event matching the predicate, skipping others
pub async fn wait_for<F>(events: &mut SessionEvents, mut matches: F) -> SessionEvent
where
    F: FnMut(&SessionEvent) -> bool,
{
    loop {
        let event = tokio::time::timeout(Duration::from_secs(2), events.recv())
            .await
            .expect("timed out waiting for session event")
            .expect("event stream ended");
        if matches(&event) {
            return event;
        }
    }
}

/// Assert that no event matching the predicate is already queued
pub fn assert_no_queued<F>(events: &mut SessionEvents, mut matches: F)
where
    F: FnMut(&SessionEvent) -> bool,
{
    while let Some(event) = events.try_recv() {
        assert!(
            !matches(&event),
            "unexpected queued event: {}",
            event.name()
        );
    }
}

/// Yield until spawned session tasks have had a chance to run
pub async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}
