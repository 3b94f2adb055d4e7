//! Data channel registry
//!
//! Owns the label → channel mapping for one session, wires lifecycle
//! observers, and re-emits channel signals as session events. Channels are
//! registered once, either created locally or adopted when the remote side
//! announces them, and stay registered for the session's lifetime.

use crate::events::SessionEvent;
use crate::transfer::{
    FileTransferMetadata, IncomingTransfer, TransferBackend, TransferSignal, TransferStatus,
    INBAND_FILETRANSFER_V1,
};
use crate::transport::{ChannelInit, ChannelSignal, DataChannel, PeerTransport};
use crate::{Error, Result};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// How a channel entered the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChannelRole {
    /// Created locally via the transport
    Local,
    /// Announced by the remote side
    Adopted,
}

pub(crate) struct ChannelRegistry {
    transport: Arc<dyn PeerTransport>,
    backend: Arc<dyn TransferBackend>,
    events: mpsc::UnboundedSender<SessionEvent>,
    closed: Arc<AtomicBool>,
    channels: Mutex<HashMap<String, Arc<dyn DataChannel>>>,
}

impl ChannelRegistry {
    pub(crate) fn new(
        transport: Arc<dyn PeerTransport>,
        backend: Arc<dyn TransferBackend>,
        events: mpsc::UnboundedSender<SessionEvent>,
        closed: Arc<AtomicBool>,
    ) -> Self {
        Self {
            transport,
            backend,
            events,
            closed,
            channels: Mutex::new(HashMap::new()),
        }
    }

    /// Fetch an already registered channel by label
    pub(crate) fn get(&self, label: &str) -> Option<Arc<dyn DataChannel>> {
        self.channels.lock().get(label).cloned()
    }

    /// Fetch or create a channel by label
    ///
    /// A transport without data channel support makes this fail with a
    /// capability error; creation is often attempted opportunistically, so
    /// the failure is also surfaced as a session error event rather than
    /// only bubbling up to the caller.
    pub(crate) async fn get_or_create(
        &self,
        label: &str,
        init: ChannelInit,
    ) -> Result<Arc<dyn DataChannel>> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::SessionClosed);
        }

        if let Some(existing) = self.get(label) {
            return Ok(existing);
        }

        match self.transport.create_data_channel(label, init).await {
            Ok(channel) => {
                self.channels
                    .lock()
                    .insert(label.to_string(), Arc::clone(&channel));
                self.observe(channel.clone(), ChannelRole::Local);
                debug!("Created data channel '{}'", label);
                Ok(channel)
            }
            Err(err) => {
                if err.is_capability_error() {
                    let _ = self.events.send(SessionEvent::Error(err.to_string()));
                }
                Err(err)
            }
        }
    }

    /// Register a channel announced by the remote side
    pub(crate) fn adopt(&self, channel: Arc<dyn DataChannel>) {
        debug!("Adopting remote data channel '{}'", channel.label());
        self.channels
            .lock()
            .insert(channel.label().to_string(), Arc::clone(&channel));
        self.observe(channel, ChannelRole::Adopted);
    }

    /// Wire channel signals into session events
    ///
    /// An adopted channel carrying the inband file-transfer tag gets the
    /// receive flow instead of plain message proxying; a locally created
    /// transfer channel keeps its lifecycle events but its traffic belongs
    /// to the sending task.
    fn observe(&self, channel: Arc<dyn DataChannel>, role: ChannelRole) {
        let signals = channel.signals();
        let is_transfer = channel.protocol() == Some(INBAND_FILETRANSFER_V1);

        if is_transfer && role == ChannelRole::Adopted {
            tokio::spawn(run_inband_receive(
                Arc::clone(&self.backend),
                self.events.clone(),
                channel,
                signals,
            ));
            return;
        }

        let events = self.events.clone();
        tokio::spawn(async move {
            let mut signals = signals;
            let label = channel.label().to_string();
            while let Some(signal) = signals.recv().await {
                match signal {
                    ChannelSignal::Open => {
                        let _ = events.send(SessionEvent::ChannelOpen {
                            label: label.clone(),
                        });
                    }
                    ChannelSignal::Message(data) => {
                        if is_transfer {
                            // payload bytes of an outgoing transfer; not ours
                            continue;
                        }
                        match serde_json::from_slice::<serde_json::Value>(&data) {
                            Ok(message) => {
                                let _ = events.send(SessionEvent::ChannelMessage {
                                    label: label.clone(),
                                    message,
                                });
                            }
                            Err(e) => {
                                warn!("Malformed message on channel '{}': {}", label, e);
                            }
                        }
                    }
                    ChannelSignal::Error(message) => {
                        let _ = events.send(SessionEvent::ChannelError {
                            label: label.clone(),
                            message,
                        });
                    }
                    ChannelSignal::Closed => {
                        let _ = events.send(SessionEvent::ChannelClose {
                            label: label.clone(),
                        });
                        break;
                    }
                }
            }
        });
    }
}

/// Receive flow for one adopted inband transfer channel
///
/// The first message is the metadata header; everything after it is payload
/// for the backend. The channel is closed from here once the backend
/// reports the file reassembled, which doubles as the acknowledgment the
/// sender is waiting for.
async fn run_inband_receive(
    backend: Arc<dyn TransferBackend>,
    events: mpsc::UnboundedSender<SessionEvent>,
    channel: Arc<dyn DataChannel>,
    mut signals: mpsc::UnboundedReceiver<ChannelSignal>,
) {
    let label = channel.label().to_string();
    let mut header_seen = false;
    let mut state = None;

    while let Some(signal) = signals.recv().await {
        match signal {
            ChannelSignal::Open => {
                let _ = events.send(SessionEvent::ChannelOpen {
                    label: label.clone(),
                });
            }
            ChannelSignal::Message(data) if !header_seen => {
                header_seen = true;
                let header = match std::str::from_utf8(&data) {
                    Ok(text) => FileTransferMetadata::from_json(text),
                    Err(e) => {
                        warn!("Transfer header on '{}' is not text: {}", label, e);
                        continue;
                    }
                };
                let metadata = match header {
                    Ok(metadata) => metadata,
                    Err(e) => {
                        warn!("Invalid transfer header on '{}': {}", label, e);
                        continue;
                    }
                };

                let mut backend_rx =
                    match backend.receive(metadata.clone(), Arc::clone(&channel)).await {
                        Ok(rx) => rx,
                        Err(e) => {
                            warn!("Failed to start receive on '{}': {}", label, e);
                            continue;
                        }
                    };

                let (transfer, transfer_state) = IncomingTransfer::new(metadata.clone());
                state = Some(Arc::clone(&transfer_state));
                let _ = events.send(SessionEvent::FileTransfer { metadata, transfer });

                let channel = Arc::clone(&channel);
                let transfer_label = label.clone();
                tokio::spawn(async move {
                    while let Some(signal) = backend_rx.recv().await {
                        if let TransferSignal::Received { file, .. } = signal {
                            transfer_state.store_file(file);
                            transfer_state.set_status(TransferStatus::Complete);
                            debug!("Transfer on '{}' reassembled, closing channel", transfer_label);
                            if let Err(e) = channel.close().await {
                                warn!(
                                    "Failed to close transfer channel '{}': {}",
                                    transfer_label, e
                                );
                            }
                            break;
                        }
                    }
                });
            }
            ChannelSignal::Message(_) => {
                // payload bytes; the backend has its own subscription
            }
            ChannelSignal::Error(message) => {
                let _ = events.send(SessionEvent::ChannelError {
                    label: label.clone(),
                    message,
                });
            }
            ChannelSignal::Closed => {
                match &state {
                    // sticky status: a close after completion stays Complete
                    Some(transfer_state) => transfer_state.set_status(TransferStatus::Aborted),
                    None => {
                        warn!("Transfer channel '{}' closed before a header arrived", label);
                    }
                }
                let _ = events.send(SessionEvent::ChannelClose {
                    label: label.clone(),
                });
                break;
            }
        }
    }
}
