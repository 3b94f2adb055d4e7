//! Peer-to-peer session coordination
//!
//! This crate drives one real-time media/data session between two endpoints
//! that exchange control messages through an external signaling relay and
//! media through a host-provided transport primitive.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │  Host application                                    │
//! │  ├─ signaling relay loop (opaque JSON envelopes)     │
//! │  │    ↓ handle_message()        ↑ SessionEvent::Signal
//! │  Session (lifecycle state machine)                   │
//! │  ├─ sdp transforms (codec preference, bitrate caps)  │
//! │  ├─ ChannelRegistry (named data channels)            │
//! │  ├─ inband file transfer (metadata header + bytes)   │
//! │  │    ↓ PeerTransport trait                          │
//! │  └─ transport primitive (ICE/DTLS/RTP/SCTP engine)   │
//! └──────────────────────────────────────────────────────┘
//! ```
//!
//! The transport engine, the relay, and the file-transfer byte mover are
//! collaborators behind traits; this crate owns the negotiation flow, the
//! description shaping, the channel multiplexing, and the wire rules of the
//! inband transfer protocol.
//!
//! # Example
//!
//! ```no_run
//! use peerlink::{Session, SessionConfig, SessionEvent};
//! # use std::sync::Arc;
//! # async fn example(
//! #     transport: Arc<dyn peerlink::transport::PeerTransport>,
//! #     backend: Arc<dyn peerlink::transfer::TransferBackend>,
//! # ) -> peerlink::Result<()> {
//! let config = SessionConfig::new("peer-remote").with_nick("alice");
//! let (session, mut events) = Session::connect(config, transport, backend, vec![]).await?;
//!
//! // become the offering side
//! session.start().await?;
//!
//! while let Some(event) = events.recv().await {
//!     match event {
//!         SessionEvent::Signal(envelope) => { /* hand to the relay */ }
//!         SessionEvent::PeerStreamAdded { .. } => { /* render remote media */ }
//!         _ => {}
//!     }
//! }
//! # Ok(())
//! # }
//! ```

#![warn(clippy::all)]

// Public modules
pub mod config;
pub mod error;
pub mod events;
pub mod sdp;
pub mod signaling;
pub mod transfer;
pub mod transport;

// Internal modules
mod channels;
mod session;

// Re-exports for public API
pub use config::{
    BitrateLimit, MediaKind, ReceiveConstraints, SessionConfig, SessionKind,
};
pub use error::{Error, Result};
pub use events::{SessionEvent, SessionEvents};
pub use session::{Session, SessionState};
pub use signaling::{SignalPayload, SignalingEnvelope};
pub use transfer::{
    FilePayload, FileTransferMetadata, IncomingTransfer, OutgoingTransfer, TransferStatus,
    INBAND_FILETRANSFER_V1,
};
pub use transport::{
    ChannelInit, ChannelState, DataChannel, IceCandidate, IceConnectionState, PeerTransport,
    SessionDescription,
};

/// Get the version of this crate
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        let ver = version();
        assert!(!ver.is_empty());
    }
}
