//! Inband file transfer over a dedicated data channel
//!
//! The inband-v1 protocol sends a serialized metadata header as the first
//! message on a channel created with the protocol tag, followed by the raw
//! payload bytes. The receiver closes the channel once its backend reports
//! the file fully reassembled; that closure is the only acknowledgment the
//! sender gets. A transfer channel is used for exactly one transfer and
//! never reused.
//!
//! Byte chunking and flow control are delegated to a [`TransferBackend`]
//! collaborator; this module owns the framing and the completion rules.

use crate::transport::DataChannel;
use crate::Result;
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};

/// Protocol tag announced on file-transfer data channels
pub const INBAND_FILETRANSFER_V1: &str =
    "https://simplewebrtc.com/protocol/filetransfer#inband-v1";

/// Metadata header preceding the payload bytes of a transfer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileTransferMetadata {
    /// Payload size in bytes
    pub size: u64,

    /// File name as presented to the receiving application
    pub name: String,
}

impl FileTransferMetadata {
    /// Serialize the header for the first channel message
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| {
            crate::Error::Serialization(format!("Failed to serialize transfer metadata: {}", e))
        })
    }

    /// Parse the header from the first channel message
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| {
            crate::Error::Serialization(format!("Failed to parse transfer metadata: {}", e))
        })
    }
}

/// An in-memory file handed to or produced by a transfer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilePayload {
    /// File name
    pub name: String,

    /// File contents
    pub contents: Bytes,
}

impl FilePayload {
    /// Create a payload from a name and raw bytes
    pub fn new(name: impl Into<String>, contents: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            contents: contents.into(),
        }
    }

    /// Metadata header describing this payload
    pub fn metadata(&self) -> FileTransferMetadata {
        FileTransferMetadata {
            size: self.contents.len() as u64,
            name: self.name.clone(),
        }
    }
}

/// Signal emitted by a transfer backend task
#[derive(Debug, Clone)]
pub enum TransferSignal {
    /// All payload bytes were handed to the channel (sender side)
    Sent,
    /// The file was fully reassembled (receiver side)
    Received {
        /// Reassembled file
        file: FilePayload,
        /// Metadata the receive was started with
        metadata: FileTransferMetadata,
    },
}

/// Byte-moving collaborator for file transfers
///
/// Implementations own chunking and flow control. Each operation returns a
/// signal stream that ends after the terminal [`TransferSignal`].
#[async_trait]
pub trait TransferBackend: Send + Sync {
    /// Stream a file's bytes over the given channel
    async fn send(
        &self,
        file: FilePayload,
        channel: Arc<dyn DataChannel>,
    ) -> Result<mpsc::UnboundedReceiver<TransferSignal>>;

    /// Reassemble a file of the given metadata from the channel
    async fn receive(
        &self,
        metadata: FileTransferMetadata,
        channel: Arc<dyn DataChannel>,
    ) -> Result<mpsc::UnboundedReceiver<TransferSignal>>;
}

/// Outcome-bearing status of one transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferStatus {
    /// Transfer still running
    InProgress,
    /// Channel closed after a completed exchange
    Complete,
    /// Channel closed before the exchange completed
    Aborted,
}

/// Shared mutable side of a transfer handle
pub(crate) struct TransferState {
    status_tx: watch::Sender<TransferStatus>,
    received: Mutex<Option<FilePayload>>,
}

impl TransferState {
    pub(crate) fn set_status(&self, status: TransferStatus) {
        // keep the first terminal outcome; a late Closed signal must not
        // flip Complete into Aborted
        if *self.status_tx.borrow() == TransferStatus::InProgress {
            let _ = self.status_tx.send(status);
        }
    }

    pub(crate) fn store_file(&self, file: FilePayload) {
        *self.received.lock() = Some(file);
    }
}

async fn wait_finished(rx: &watch::Receiver<TransferStatus>) -> TransferStatus {
    let mut rx = rx.clone();
    loop {
        let status = *rx.borrow();
        if status != TransferStatus::InProgress {
            return status;
        }
        if rx.changed().await.is_err() {
            // state owner dropped mid-flight
            let status = *rx.borrow();
            return if status == TransferStatus::InProgress {
                TransferStatus::Aborted
            } else {
                status
            };
        }
    }
}

/// Sender-side handle for one outgoing transfer
///
/// Channel closure by the receiver is the completion acknowledgment; the
/// handle resolves to [`TransferStatus::Complete`] when the channel closed
/// after the header and payload went out, [`TransferStatus::Aborted`] when
/// it closed earlier.
#[derive(Debug)]
pub struct OutgoingTransfer {
    metadata: FileTransferMetadata,
    status_rx: watch::Receiver<TransferStatus>,
}

impl OutgoingTransfer {
    pub(crate) fn new(metadata: FileTransferMetadata) -> (Self, Arc<TransferState>) {
        let (status_tx, status_rx) = watch::channel(TransferStatus::InProgress);
        let state = Arc::new(TransferState {
            status_tx,
            received: Mutex::new(None),
        });
        (
            Self {
                metadata,
                status_rx,
            },
            state,
        )
    }

    /// Metadata of the file being sent
    pub fn metadata(&self) -> &FileTransferMetadata {
        &self.metadata
    }

    /// Current status
    pub fn status(&self) -> TransferStatus {
        *self.status_rx.borrow()
    }

    /// Wait for the transfer to reach a terminal status
    pub async fn finished(&self) -> TransferStatus {
        wait_finished(&self.status_rx).await
    }
}

/// Receiver-side handle for one incoming transfer
///
/// Surfaced to the host through the
/// [`FileTransfer`](crate::SessionEvent::FileTransfer) event once the
/// metadata header arrived.
#[derive(Debug)]
pub struct IncomingTransfer {
    metadata: FileTransferMetadata,
    status_rx: watch::Receiver<TransferStatus>,
    state: Arc<TransferState>,
}

impl IncomingTransfer {
    pub(crate) fn new(metadata: FileTransferMetadata) -> (Arc<Self>, Arc<TransferState>) {
        let (status_tx, status_rx) = watch::channel(TransferStatus::InProgress);
        let state = Arc::new(TransferState {
            status_tx,
            received: Mutex::new(None),
        });
        (
            Arc::new(Self {
                metadata,
                status_rx,
                state: Arc::clone(&state),
            }),
            state,
        )
    }

    /// Metadata announced by the sender
    pub fn metadata(&self) -> &FileTransferMetadata {
        &self.metadata
    }

    /// Current status
    pub fn status(&self) -> TransferStatus {
        *self.status_rx.borrow()
    }

    /// Wait for the transfer to reach a terminal status
    pub async fn finished(&self) -> TransferStatus {
        wait_finished(&self.status_rx).await
    }

    /// The reassembled file, once the transfer completed
    pub fn file(&self) -> Option<FilePayload> {
        self.state.received.lock().clone()
    }
}

impl std::fmt::Debug for TransferState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransferState")
            .field("status", &*self.status_tx.borrow())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metadata_roundtrip() {
        let metadata = FileTransferMetadata {
            size: 4096,
            name: "notes.txt".to_string(),
        };
        let json = metadata.to_json().unwrap();
        assert_eq!(FileTransferMetadata::from_json(&json).unwrap(), metadata);
    }

    #[test]
    fn test_metadata_rejects_garbage() {
        assert!(FileTransferMetadata::from_json("not json").is_err());
        assert!(FileTransferMetadata::from_json("{\"name\":\"x\"}").is_err());
    }

    #[test]
    fn test_payload_metadata() {
        let file = FilePayload::new("photo.jpg", vec![0u8; 1024]);
        let metadata = file.metadata();
        assert_eq!(metadata.size, 1024);
        assert_eq!(metadata.name, "photo.jpg");
    }

    #[tokio::test]
    async fn test_outgoing_transfer_status_flow() {
        let (transfer, state) = OutgoingTransfer::new(FileTransferMetadata {
            size: 1,
            name: "a".to_string(),
        });
        assert_eq!(transfer.status(), TransferStatus::InProgress);

        state.set_status(TransferStatus::Complete);
        assert_eq!(transfer.finished().await, TransferStatus::Complete);
    }

    #[tokio::test]
    async fn test_terminal_status_is_sticky() {
        let (transfer, state) = OutgoingTransfer::new(FileTransferMetadata {
            size: 1,
            name: "a".to_string(),
        });
        state.set_status(TransferStatus::Complete);
        state.set_status(TransferStatus::Aborted);
        assert_eq!(transfer.status(), TransferStatus::Complete);
    }

    #[tokio::test]
    async fn test_incoming_transfer_exposes_file() {
        let (transfer, state) = IncomingTransfer::new(FileTransferMetadata {
            size: 3,
            name: "b".to_string(),
        });
        assert!(transfer.file().is_none());

        state.store_file(FilePayload::new("b", vec![1, 2, 3]));
        state.set_status(TransferStatus::Complete);
        assert_eq!(transfer.finished().await, TransferStatus::Complete);
        assert_eq!(transfer.file().unwrap().contents.len(), 3);
    }

    #[tokio::test]
    async fn test_dropped_state_reads_as_aborted() {
        let (transfer, state) = OutgoingTransfer::new(FileTransferMetadata {
            size: 1,
            name: "c".to_string(),
        });
        drop(state);
        assert_eq!(transfer.finished().await, TransferStatus::Aborted);
    }
}
