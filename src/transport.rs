//! Interfaces to the host-provided transport primitive
//!
//! The actual media/data engine (ICE gathering, DTLS, RTP/SCTP) lives
//! outside this crate. The host hands a [`PeerTransport`] implementation to
//! each session; the session drives it through the async operations below
//! and reacts to the [`TransportEvent`] stream it emits. All handle types
//! (channels, streams, senders) are trait objects owned by the transport.

use crate::config::{MediaKind, ReceiveConstraints};
use crate::Result;
use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Kind of a session description
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DescriptionKind {
    /// Locally or remotely generated offer
    Offer,
    /// Answer to a received offer
    Answer,
}

/// A session description exchanged during negotiation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    /// Offer or answer
    #[serde(rename = "type")]
    pub kind: DescriptionKind,

    /// Description text, CRLF line-separated
    pub sdp: String,
}

impl SessionDescription {
    /// Create an offer description
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            kind: DescriptionKind::Offer,
            sdp: sdp.into(),
        }
    }

    /// Create an answer description
    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            kind: DescriptionKind::Answer,
            sdp: sdp.into(),
        }
    }
}

/// ICE candidate attributes relayed through signaling
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceCandidate {
    /// Candidate attribute line
    pub candidate: String,

    /// Media-description identification tag
    #[serde(rename = "sdpMid", skip_serializing_if = "Option::is_none")]
    pub sdp_mid: Option<String>,

    /// Media-description line index
    #[serde(rename = "sdpMLineIndex", skip_serializing_if = "Option::is_none")]
    pub sdp_mline_index: Option<u16>,
}

/// ICE connection state mirrored from the transport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IceConnectionState {
    New,
    Checking,
    Connected,
    Completed,
    Disconnected,
    Failed,
    Closed,
}

/// Signaling state mirrored from the transport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SignalingState {
    Stable,
    HaveLocalOffer,
    HaveRemoteOffer,
    HaveLocalPranswer,
    HaveRemotePranswer,
    Closed,
}

/// Options for creating a data channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelInit {
    /// Ordered delivery (default: true)
    pub ordered: bool,

    /// Retransmit limit; `None` means unlimited
    pub max_retransmits: Option<u16>,

    /// Subprotocol tag announced to the remote side
    pub protocol: Option<String>,
}

impl Default for ChannelInit {
    fn default() -> Self {
        Self {
            ordered: true,
            max_retransmits: None,
            protocol: None,
        }
    }
}

/// Data channel readiness state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    /// Channel is being negotiated
    Connecting,
    /// Channel is open and ready for messages
    Open,
    /// Channel is closing
    Closing,
    /// Channel is closed
    Closed,
}

/// Lifecycle signal emitted by one data channel
#[derive(Debug, Clone)]
pub enum ChannelSignal {
    /// Channel became open
    Open,
    /// A message arrived
    Message(Bytes),
    /// Channel-level error
    Error(String),
    /// Channel closed
    Closed,
}

/// One data channel owned by the transport
///
/// `signals()` may be called more than once; each subscription observes the
/// signals emitted from that point on.
#[async_trait]
pub trait DataChannel: Send + Sync + std::fmt::Debug {
    /// Channel label, unique within its session
    fn label(&self) -> &str;

    /// Subprotocol tag the channel was created or announced with
    fn protocol(&self) -> Option<&str>;

    /// Current readiness state
    fn ready_state(&self) -> ChannelState;

    /// Subscribe to lifecycle and message signals
    fn signals(&self) -> mpsc::UnboundedReceiver<ChannelSignal>;

    /// Send a binary payload
    async fn send(&self, data: Bytes) -> Result<()>;

    /// Send a text payload
    async fn send_text(&self, text: &str) -> Result<()>;

    /// Close the channel
    async fn close(&self) -> Result<()>;
}

/// One remote media track
pub trait RemoteTrack: Send + Sync + std::fmt::Debug {
    /// Track identifier
    fn id(&self) -> &str;

    /// Audio or video
    fn kind(&self) -> MediaKind;

    /// Whether the track has reached its ended state
    fn is_ended(&self) -> bool;
}

/// One remote media stream, a bundle of tracks
pub trait RemoteStream: Send + Sync + std::fmt::Debug {
    /// Stream identifier
    fn id(&self) -> &str;

    /// Tracks currently carried by the stream
    fn tracks(&self) -> Vec<Arc<dyn RemoteTrack>>;
}

/// One local media stream handed to the transport for sending
pub trait LocalStream: Send + Sync + std::fmt::Debug {
    /// Stream identifier
    fn id(&self) -> &str;
}

/// Encoding parameters of one outbound media sender
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SenderParameters {
    /// Per-encoding parameters; the first entry is the primary encoding
    pub encodings: Vec<EncodingParameters>,
}

/// Parameters of a single encoding
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EncodingParameters {
    /// Maximum bitrate in bits per second; `None` removes the cap
    pub max_bitrate_bps: Option<u64>,
}

/// One outbound media sender owned by the transport
///
/// The transport guarantees nothing about sender ordering; callers locate
/// a sender by inspecting its track kind, never by position.
#[async_trait]
pub trait MediaSender: Send + Sync + std::fmt::Debug {
    /// Kind of the attached track, if any
    fn track_kind(&self) -> Option<MediaKind>;

    /// Current encoding parameters
    fn parameters(&self) -> SenderParameters;

    /// Replace the encoding parameters
    async fn set_parameters(&self, parameters: SenderParameters) -> Result<()>;
}

/// Event emitted by the transport primitive
#[derive(Debug)]
pub enum TransportEvent {
    /// A locally requested offer finished generating
    OfferReady(SessionDescription),
    /// A locally requested answer finished generating
    AnswerReady(SessionDescription),
    /// A local ICE candidate was discovered
    IceCandidate(IceCandidate),
    /// Local candidate gathering finished
    EndOfCandidates,
    /// The remote side added a media stream
    RemoteStreamAdded(Arc<dyn RemoteStream>),
    /// The remote side removed its media stream
    RemoteStreamRemoved {
        /// Identifier of the removed stream
        stream_id: String,
    },
    /// A track of the remote stream reached its ended state
    RemoteTrackEnded {
        /// Identifier of the ended track
        track_id: String,
    },
    /// The remote side announced a data channel
    DataChannelAdded(Arc<dyn DataChannel>),
    /// ICE connection state changed
    IceConnectionStateChange(IceConnectionState),
    /// Signaling state changed
    SignalingStateChange(SignalingState),
    /// The transport requires a new offer/answer round
    NegotiationNeeded,
}

impl TransportEvent {
    /// Get the event name for logging/debugging
    pub fn name(&self) -> &'static str {
        match self {
            Self::OfferReady(_) => "offer_ready",
            Self::AnswerReady(_) => "answer_ready",
            Self::IceCandidate(_) => "ice_candidate",
            Self::EndOfCandidates => "end_of_candidates",
            Self::RemoteStreamAdded(_) => "remote_stream_added",
            Self::RemoteStreamRemoved { .. } => "remote_stream_removed",
            Self::RemoteTrackEnded { .. } => "remote_track_ended",
            Self::DataChannelAdded(_) => "data_channel_added",
            Self::IceConnectionStateChange(_) => "ice_connection_state_change",
            Self::SignalingStateChange(_) => "signaling_state_change",
            Self::NegotiationNeeded => "negotiation_needed",
        }
    }
}

/// The transport primitive consumed by a session
///
/// Offer/answer generation is asynchronous in two steps: the operation
/// returns once the request is accepted and the resulting description
/// arrives later as [`TransportEvent::OfferReady`] /
/// [`TransportEvent::AnswerReady`].
#[async_trait]
pub trait PeerTransport: Send + Sync {
    /// Subscribe to the transport's event stream
    ///
    /// A session subscribes exactly once, at construction.
    fn events(&self) -> mpsc::UnboundedReceiver<TransportEvent>;

    /// Request generation of a local offer
    async fn create_offer(&self, constraints: ReceiveConstraints) -> Result<()>;

    /// Request generation of a local answer to the applied remote offer
    async fn create_answer(&self) -> Result<()>;

    /// Apply a remote offer
    async fn apply_remote_offer(&self, description: SessionDescription) -> Result<()>;

    /// Apply a remote answer
    async fn apply_remote_answer(&self, description: SessionDescription) -> Result<()>;

    /// Apply a remote ICE candidate; `None` signals end of remote candidates
    async fn add_remote_candidate(&self, candidate: Option<IceCandidate>) -> Result<()>;

    /// Create a data channel
    ///
    /// Returns [`Error::Unsupported`](crate::Error::Unsupported) when the
    /// transport has no data channel capability.
    async fn create_data_channel(
        &self,
        label: &str,
        init: ChannelInit,
    ) -> Result<Arc<dyn DataChannel>>;

    /// Attach a local media stream for sending
    async fn add_local_stream(&self, stream: Arc<dyn LocalStream>) -> Result<()>;

    /// Enumerate the outbound media senders
    fn senders(&self) -> Vec<Arc<dyn MediaSender>>;

    /// The currently applied local description, if any
    fn local_description(&self) -> Option<SessionDescription>;

    /// Close the connection
    async fn close(&self) -> Result<()>;
}
