//! Host-facing session events
//!
//! A session never calls back into the host; everything it wants the host
//! to know (including envelopes destined for the signaling relay) flows
//! through one event stream. The stream has a single consumer: an
//! application either reads it directly or an owning collection subscribes
//! to every session and re-dispatches.

use crate::signaling::SignalingEnvelope;
use crate::transfer::{FileTransferMetadata, IncomingTransfer};
use crate::transport::{IceConnectionState, RemoteStream, SignalingState};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Event emitted by a [`Session`](crate::Session)
#[derive(Debug)]
pub enum SessionEvent {
    /// An envelope to hand to the signaling relay
    Signal(SignalingEnvelope),

    /// The remote stream was accepted and stored
    PeerStreamAdded {
        /// The accepted stream
        stream: Arc<dyn RemoteStream>,
    },

    /// The session ended and its stream is gone; emitted exactly once
    PeerStreamRemoved,

    /// Mirrored ICE connection state change
    IceConnectionStateChange(IceConnectionState),

    /// Mirrored signaling state change
    SignalingStateChange(SignalingState),

    /// ICE failed on the offer side of the connection
    IceFailed,

    /// The remote side reported an ICE failure
    ConnectivityError,

    /// The remote side muted a track
    Mute {
        /// Remote endpoint id
        peer_id: String,
        /// Which media kind, when announced
        name: Option<String>,
    },

    /// The remote side unmuted a track
    Unmute {
        /// Remote endpoint id
        peer_id: String,
        /// Which media kind, when announced
        name: Option<String>,
    },

    /// A data channel became open
    ChannelOpen {
        /// Channel label
        label: String,
    },

    /// A data channel closed
    ChannelClose {
        /// Channel label
        label: String,
    },

    /// A data channel reported an error
    ChannelError {
        /// Channel label
        label: String,
        /// Error description
        message: String,
    },

    /// A structured message arrived on a data channel
    ChannelMessage {
        /// Channel label
        label: String,
        /// Parsed message document
        message: serde_json::Value,
    },

    /// An inband file transfer was announced by the remote side
    FileTransfer {
        /// Metadata from the transfer header
        metadata: FileTransferMetadata,
        /// Handle tracking the receive
        transfer: Arc<IncomingTransfer>,
    },

    /// A local, recoverable error (e.g. a missing transport capability)
    Error(String),
}

impl SessionEvent {
    /// Get the event name for logging/debugging
    pub fn name(&self) -> &'static str {
        match self {
            Self::Signal(_) => "signal",
            Self::PeerStreamAdded { .. } => "peer_stream_added",
            Self::PeerStreamRemoved => "peer_stream_removed",
            Self::IceConnectionStateChange(_) => "ice_connection_state_change",
            Self::SignalingStateChange(_) => "signaling_state_change",
            Self::IceFailed => "ice_failed",
            Self::ConnectivityError => "connectivity_error",
            Self::Mute { .. } => "mute",
            Self::Unmute { .. } => "unmute",
            Self::ChannelOpen { .. } => "channel_open",
            Self::ChannelClose { .. } => "channel_close",
            Self::ChannelError { .. } => "channel_error",
            Self::ChannelMessage { .. } => "channel_message",
            Self::FileTransfer { .. } => "file_transfer",
            Self::Error(_) => "error",
        }
    }
}

/// Single-consumer stream of [`SessionEvent`]s
///
/// Returned alongside the session at construction. Dropping it does not
/// stop the session; events emitted afterwards are discarded.
#[derive(Debug)]
pub struct SessionEvents {
    rx: mpsc::UnboundedReceiver<SessionEvent>,
}

impl SessionEvents {
    pub(crate) fn new(rx: mpsc::UnboundedReceiver<SessionEvent>) -> Self {
        Self { rx }
    }

    /// Receive the next event; `None` once the session is gone
    pub async fn recv(&mut self) -> Option<SessionEvent> {
        self.rx.recv().await
    }

    /// Receive without waiting
    pub fn try_recv(&mut self) -> Option<SessionEvent> {
        self.rx.try_recv().ok()
    }
}
