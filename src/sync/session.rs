//! Per-connection sync session
//!
//! Drives one device through `Connecting -> Active -> Closed`. Messages from
//! the device are handled strictly one at a time in arrival order. There is
//! no resume: a reconnecting device gets a fresh session and catches up with
//! `sync_request` plus its offline queue.

use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use chrono::Utc;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use super::events::RecordChange;
use super::protocol::{ClientMessage, QueuedOperation, ServerEvent};
use super::replay::OfflineReplay;
use crate::devices::{BroadcastHub, DeviceHandle, UNKNOWN_DEVICE_TYPE};
use crate::error::{AppError, Result};
use crate::records::RecordStore;

/// How long a closing session waits for queued frames to flush
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Active,
    Closed,
}

/// Protocol state machine for one connected device
pub struct SyncSession {
    device_id: String,
    handle: DeviceHandle,
    store: RecordStore,
    hub: BroadcastHub,
    state: SessionState,
}

impl SyncSession {
    pub fn new(
        device_id: impl Into<String>,
        handle: DeviceHandle,
        store: RecordStore,
        hub: BroadcastHub,
    ) -> Self {
        Self {
            device_id: device_id.into(),
            handle,
            store,
            hub,
            state: SessionState::Connecting,
        }
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Register with the hub, announcing the device to everyone
    pub async fn open(&mut self) -> Result<()> {
        if self.state != SessionState::Connecting {
            return Ok(());
        }
        self.hub
            .register(&self.device_id, self.handle.clone())
            .await?;
        self.state = SessionState::Active;
        Ok(())
    }

    /// Handle one text frame.
    ///
    /// Malformed frames are answered with an `error` event; only a failure to
    /// reach this device is returned as an error.
    pub async fn handle_text(&mut self, text: &str) -> Result<()> {
        match ClientMessage::parse(text) {
            Ok(message) => self.handle_message(message).await,
            Err(e) => {
                tracing::warn!(device_id = %self.device_id, "Rejected message: {}", e);
                self.reply(&ServerEvent::error(&e)).await
            }
        }
    }

    pub async fn handle_message(&mut self, message: ClientMessage) -> Result<()> {
        if self.state != SessionState::Active {
            return Err(AppError::TransportFailure(format!(
                "session for {} is not active",
                self.device_id
            )));
        }

        match message {
            ClientMessage::RegisterDevice { device_type } => {
                let device_type = device_type.as_deref().unwrap_or(UNKNOWN_DEVICE_TYPE);
                self.hub.set_device_type(&self.device_id, device_type).await;
                tracing::info!(device_id = %self.device_id, device_type, "Device registered");
                Ok(())
            }
            ClientMessage::SyncRequest => self.full_sync().await,
            ClientMessage::SyncOfflineQueue { operations } => {
                self.replay(operations).await;
                Ok(())
            }
            ClientMessage::ComputeRequest { record_id } => {
                self.compute(&record_id).await;
                Ok(())
            }
        }
    }

    /// Leave the hub and tell the remaining devices. Idempotent.
    pub async fn close(&mut self) {
        if self.state == SessionState::Closed {
            return;
        }
        let was_active = self.state == SessionState::Active;
        self.state = SessionState::Closed;

        if !was_active {
            return;
        }

        self.hub
            .unregister(&self.device_id, self.handle.connection_id())
            .await;
        if let Err(e) = self.hub.broadcast_status().await {
            tracing::warn!(device_id = %self.device_id, "Failed to announce disconnect: {}", e);
        }
    }

    /// Run the session over an upgraded WebSocket until either side closes
    pub async fn run(mut self, socket: WebSocket, mut outbound: mpsc::Receiver<String>) {
        let (mut sink, mut stream) = socket.split();

        let writer = tokio::spawn(async move {
            while let Some(frame) = outbound.recv().await {
                if sink.send(Message::Text(frame)).await.is_err() {
                    return;
                }
            }
            let _ = sink.send(Message::Close(None)).await;
        });

        if let Err(e) = self.open().await {
            tracing::error!(device_id = %self.device_id, "Failed to open session: {}", e);
        }

        while self.state == SessionState::Active {
            tokio::select! {
                _ = self.handle.closed() => {
                    tracing::info!(device_id = %self.device_id, "Session closed by hub");
                    break;
                }
                frame = stream.next() => {
                    let outcome = match frame {
                        Some(Ok(Message::Text(text))) => self.handle_text(&text).await,
                        Some(Ok(Message::Binary(_))) => {
                            let err = AppError::InvalidMessage("binary frames are not supported".to_string());
                            self.reply(&ServerEvent::error(&err)).await
                        }
                        Some(Ok(Message::Close(_))) | None => break,
                        Some(Ok(_)) => Ok(()),
                        Some(Err(e)) => Err(AppError::TransportFailure(e.to_string())),
                    };
                    if let Err(e) = outcome {
                        tracing::warn!(device_id = %self.device_id, "Dropping connection: {}", e);
                        break;
                    }
                }
            }
        }

        self.close().await;

        // Dropping our handle lets the writer drain and exit
        drop(self);
        if tokio::time::timeout(WRITER_DRAIN_TIMEOUT, writer).await.is_err() {
            tracing::debug!("Writer still busy after close, abandoning it");
        }
    }

    /// Unicast to this connection only.
    ///
    /// Goes through our own handle rather than the hub so a session that has
    /// been replaced under the same device id never writes to its successor.
    /// A failure ends this session; the run loop tears it down.
    async fn reply(&self, event: &ServerEvent) -> Result<()> {
        let frame = event.encode()?;
        self.handle.deliver(frame, self.hub.send_timeout()).await
    }

    async fn full_sync(&mut self) -> Result<()> {
        let event = match self.store.list_all().await {
            Ok(records) => ServerEvent::SyncResponse {
                records,
                server_time: Utc::now(),
            },
            Err(e) => {
                tracing::error!(device_id = %self.device_id, "Full sync failed: {}", e);
                ServerEvent::error(&e)
            }
        };

        self.hub.touch(&self.device_id).await;
        self.reply(&event).await
    }

    async fn replay(&mut self, operations: Vec<QueuedOperation>) {
        tracing::info!(
            device_id = %self.device_id,
            count = operations.len(),
            "Replaying offline queue"
        );

        let report = OfflineReplay::new(&self.store, &self.hub, &self.device_id)
            .run(operations)
            .await;
        self.hub.touch(&self.device_id).await;

        // Per-item outcomes stay server-side; the device is not told about skips
        tracing::info!(
            device_id = %self.device_id,
            applied = report.applied(),
            skipped = report.skipped(),
            failed = report.failed(),
            "Offline queue replayed"
        );
    }

    async fn compute(&mut self, record_id: &str) {
        match self.store.compute(record_id).await {
            Ok(record) => {
                let event = RecordChange::Computed(record).to_event();
                if let Err(e) = self.hub.broadcast(&event, Some(&self.device_id)).await {
                    tracing::warn!(record_id = %record_id, "Failed to broadcast compute result: {}", e);
                }
            }
            Err(AppError::NotFound(_)) => {
                tracing::debug!(device_id = %self.device_id, record_id = %record_id, "Compute target missing");
            }
            Err(e) => {
                tracing::warn!(record_id = %record_id, "Compute failed: {}", e);
            }
        }
    }
}
