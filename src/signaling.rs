//! Signaling envelope format
//!
//! One envelope is the unit exchanged with the external relay. The relay
//! treats it as opaque JSON; both sides of a session agree on the field
//! layout below. The payload is a closed tagged union, one variant per
//! message type, so the dispatch in
//! [`Session::handle_message`](crate::Session::handle_message) can match it
//! exhaustively. Unknown inbound types collapse into
//! [`SignalPayload::Other`] and are ignored.

use crate::config::SessionKind;
use crate::transport::IceCandidate;
use serde::{Deserialize, Serialize};

/// Session description payload carried on offer/answer envelopes
///
/// The sender's display name rides along with the first description it
/// sends and is stripped before the text is handed to the transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DescriptionPayload {
    /// "offer" or "answer", mirroring the description kind
    #[serde(rename = "type")]
    pub kind: String,

    /// Description text
    pub sdp: String,

    /// Sender display name, present on the first exchange
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nick: Option<String>,
}

/// Payload of a mute/unmute notification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MuteInfo {
    /// Which media kind was muted, when the sender says
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Typed payload union of a signaling envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "camelCase")]
pub enum SignalPayload {
    /// Remote or local offer
    Offer(DescriptionPayload),
    /// Remote or local answer
    Answer(DescriptionPayload),
    /// One ICE candidate
    Candidate(IceCandidate),
    /// No further candidates will follow
    EndOfCandidates,
    /// The sender's ICE layer reported an unrecoverable failure
    ConnectivityError,
    /// The sender muted a local track
    Mute(MuteInfo),
    /// The sender unmuted a local track
    Unmute(MuteInfo),
    /// Unrecognized message type; ignored by the dispatch table
    #[serde(other)]
    Other,
}

impl SignalPayload {
    /// Wire type tag, for logging
    pub fn message_type(&self) -> &'static str {
        match self {
            Self::Offer(_) => "offer",
            Self::Answer(_) => "answer",
            Self::Candidate(_) => "candidate",
            Self::EndOfCandidates => "endOfCandidates",
            Self::ConnectivityError => "connectivityError",
            Self::Mute(_) => "mute",
            Self::Unmute(_) => "unmute",
            Self::Other => "other",
        }
    }
}

/// One message exchanged with the signaling relay
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalingEnvelope {
    /// Destination endpoint id
    pub to: String,

    /// Sender endpoint id, stamped by the relay on inbound envelopes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,

    /// Session-id token correlating negotiation rounds
    pub sid: String,

    /// Room/media type of the session
    pub room_type: SessionKind,

    /// Broadcast origin, present on screen-share sessions
    #[serde(skip_serializing_if = "Option::is_none")]
    pub broadcaster: Option<String>,

    /// Vendor/browser prefix tag of the sender
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,

    /// Typed payload
    #[serde(flatten)]
    pub payload: SignalPayload,
}

impl SignalingEnvelope {
    /// Whether this envelope belongs to the negotiation identified by `sid`
    ///
    /// Envelopes carrying a different session-id are from a stale or
    /// foreign round and must not mutate the session.
    pub fn accepts(&self, sid: &str) -> bool {
        self.sid == sid
    }

    /// Convert the envelope to a JSON string
    pub fn to_json(&self) -> crate::Result<String> {
        serde_json::to_string(self).map_err(|e| {
            crate::Error::Serialization(format!("Failed to serialize signaling envelope: {}", e))
        })
    }

    /// Parse an envelope from a JSON string
    pub fn from_json(json: &str) -> crate::Result<Self> {
        serde_json::from_str(json).map_err(|e| {
            crate::Error::Serialization(format!("Failed to deserialize signaling envelope: {}", e))
        })
    }
}
