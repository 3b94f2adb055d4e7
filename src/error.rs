//! Error types for session coordination

/// Result type alias using the peerlink Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while coordinating a peer session
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid configuration parameter
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The host transport lacks a required capability (e.g. data channels)
    #[error("Unsupported by transport: {0}")]
    Unsupported(String),

    /// Applying a remote offer/answer failed; the round is abandoned
    #[error("Negotiation error: {0}")]
    Negotiation(String),

    /// ICE candidate could not be applied
    #[error("ICE candidate error: {0}")]
    IceCandidate(String),

    /// Data channel creation or send failure
    #[error("Data channel error: {0}")]
    DataChannel(String),

    /// Data channel exists but is not open yet
    #[error("Data channel '{0}' is not open")]
    ChannelNotOpen(String),

    /// File transfer framing or delegation failure
    #[error("File transfer error: {0}")]
    Transfer(String),

    /// Outbound media sender lookup/parameter failure
    #[error("Media sender error: {0}")]
    Sender(String),

    /// The session has already been ended
    #[error("Session is closed")]
    SessionClosed,

    /// Underlying transport reported a failure
    #[error("Transport error: {0}")]
    Transport(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Any other error
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// Check if this error means the transport lacks a capability
    pub fn is_capability_error(&self) -> bool {
        matches!(self, Error::Unsupported(_))
    }

    /// Check if this error belongs to a single negotiation round
    ///
    /// Round-scoped failures are abandoned silently rather than escalated.
    pub fn is_negotiation_error(&self) -> bool {
        matches!(self, Error::Negotiation(_) | Error::IceCandidate(_))
    }

    /// Check if this error is a configuration error
    pub fn is_config_error(&self) -> bool {
        matches!(self, Error::InvalidConfig(_))
    }
}
