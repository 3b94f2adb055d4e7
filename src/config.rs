//! Configuration types for peer sessions

use serde::{Deserialize, Serialize};

/// Kind of session negotiated with the remote endpoint
///
/// Carried on every signaling envelope as the room/media type tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum SessionKind {
    /// Regular audio/video call (default)
    Video,
    /// Screen-sharing session
    Screen,
    /// Application-defined session type
    Custom(String),
}

impl SessionKind {
    /// Wire representation of this kind
    pub fn as_str(&self) -> &str {
        match self {
            SessionKind::Video => "video",
            SessionKind::Screen => "screen",
            SessionKind::Custom(s) => s.as_str(),
        }
    }
}

impl From<String> for SessionKind {
    fn from(s: String) -> Self {
        match s.as_str() {
            "video" => SessionKind::Video,
            "screen" => SessionKind::Screen,
            _ => SessionKind::Custom(s),
        }
    }
}

impl From<SessionKind> for String {
    fn from(kind: SessionKind) -> Self {
        kind.as_str().to_string()
    }
}

/// Media kind of a track or SDP media section
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    /// Audio track / `m=audio` section
    Audio,
    /// Video track / `m=video` section
    Video,
}

impl MediaKind {
    /// SDP media-line name for this kind
    pub fn as_str(&self) -> &str {
        match self {
            MediaKind::Audio => "audio",
            MediaKind::Video => "video",
        }
    }
}

/// Receive-media constraints for one negotiation round
///
/// Immutable per round: deriving a variant (e.g. for an ICE restart) copies
/// the value instead of mutating shared state between rounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiveConstraints {
    /// Offer to receive remote audio
    pub offer_to_receive_audio: bool,

    /// Offer to receive remote video
    pub offer_to_receive_video: bool,

    /// Force an ICE restart for this round
    pub ice_restart: bool,
}

impl Default for ReceiveConstraints {
    fn default() -> Self {
        Self {
            offer_to_receive_audio: true,
            offer_to_receive_video: true,
            ice_restart: false,
        }
    }
}

impl ReceiveConstraints {
    /// Derive the constraints for an ICE-restart round
    pub fn with_ice_restart(&self) -> Self {
        Self {
            ice_restart: true,
            ..*self
        }
    }
}

/// Outbound video bitrate limit applied via sender encoding parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BitrateLimit {
    /// Remove any previously applied limit
    Unlimited,
    /// Cap the first encoding at the given kilobits per second
    Kbps(u32),
}

/// Configuration for one [`Session`](crate::Session)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Remote endpoint identifier (signaling destination)
    pub peer_id: String,

    /// Session kind (default: video)
    pub kind: SessionKind,

    /// One-way session: media flows only from the remote side
    pub oneway: bool,

    /// For screen sessions, attach the local screen stream to the transport
    pub share_my_screen: bool,

    /// Broadcast origin id for screen-share sessions
    pub broadcaster: Option<String>,

    /// Local display name included on outbound offers/answers
    pub nick: Option<String>,

    /// Vendor/browser prefix tag carried on outbound envelopes
    pub prefix: Option<String>,

    /// Open the default data channel before the first offer (default: true)
    pub enable_data_channels: bool,

    /// Label of the default data channel
    pub default_channel_label: String,

    /// Preferred audio codec name, as it appears in codec-mapping lines
    pub audio_codec: Option<String>,

    /// Preferred video codec name, as it appears in codec-mapping lines
    pub video_codec: Option<String>,

    /// Audio bandwidth cap injected into outbound descriptions, in kbps
    pub audio_bitrate_kbps: Option<u32>,

    /// Video bandwidth cap injected into outbound descriptions, in kbps
    pub video_bitrate_kbps: Option<u32>,

    /// Receive-media constraints used for locally generated offers
    pub receive: ReceiveConstraints,

    /// Session-id token to adopt instead of generating one
    ///
    /// The offering side generates its own token; the answering side is
    /// created from an inbound offer and adopts the token it carried so
    /// both ends correlate the same negotiation.
    pub sid: Option<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            peer_id: String::new(),
            kind: SessionKind::Video,
            oneway: false,
            share_my_screen: false,
            broadcaster: None,
            nick: None,
            prefix: None,
            enable_data_channels: true,
            default_channel_label: "peerlink".to_string(),
            audio_codec: None,
            video_codec: None,
            audio_bitrate_kbps: None,
            video_bitrate_kbps: None,
            receive: ReceiveConstraints::default(),
            sid: None,
        }
    }
}

impl SessionConfig {
    /// Create a configuration targeting the given remote endpoint
    pub fn new(peer_id: impl Into<String>) -> Self {
        Self {
            peer_id: peer_id.into(),
            ..Default::default()
        }
    }

    /// Validate configuration parameters
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - `peer_id` is empty
    /// - `default_channel_label` is empty while data channels are enabled
    /// - a codec preference or bitrate cap is present but empty/zero
    /// - `broadcaster` is set on a non-screen session
    pub fn validate(&self) -> crate::Result<()> {
        use crate::Error;

        if self.peer_id.is_empty() {
            return Err(Error::InvalidConfig("peer_id must not be empty".to_string()));
        }

        if self.enable_data_channels && self.default_channel_label.is_empty() {
            return Err(Error::InvalidConfig(
                "default_channel_label must not be empty when data channels are enabled"
                    .to_string(),
            ));
        }

        for codec in [&self.audio_codec, &self.video_codec].into_iter().flatten() {
            if codec.is_empty() {
                return Err(Error::InvalidConfig(
                    "codec preference must not be an empty string".to_string(),
                ));
            }
        }

        for cap in [self.audio_bitrate_kbps, self.video_bitrate_kbps]
            .into_iter()
            .flatten()
        {
            if cap == 0 {
                return Err(Error::InvalidConfig(format!(
                    "bitrate cap must be positive, got {}",
                    cap
                )));
            }
        }

        if self.broadcaster.is_some() && self.kind != SessionKind::Screen {
            return Err(Error::InvalidConfig(format!(
                "broadcaster is only valid for screen sessions, kind is {}",
                self.kind.as_str()
            )));
        }

        Ok(())
    }

    /// Set the session kind
    ///
    /// Useful for chaining with [`SessionConfig::new`].
    pub fn with_kind(mut self, kind: SessionKind) -> Self {
        self.kind = kind;
        self
    }

    /// Set the local display name
    pub fn with_nick(mut self, nick: &str) -> Self {
        self.nick = Some(nick.to_string());
        self
    }

    /// Set the preferred video codec
    pub fn with_video_codec(mut self, codec: &str) -> Self {
        self.video_codec = Some(codec.to_string());
        self
    }

    /// Set the preferred audio codec
    pub fn with_audio_codec(mut self, codec: &str) -> Self {
        self.audio_codec = Some(codec.to_string());
        self
    }
}
