//! Live broadcast hub
//!
//! Owns one outbound handle per connected device and fans events out to
//! them. A handle is the sending half of a bounded channel drained by the
//! connection's writer task, so a send fails once that task is gone and
//! times out when the peer stops draining.
//!
//! Any failed delivery counts as an implicit disconnect: the device is
//! pruned from the hub and the registry, and its session is told to close.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::future::join_all;
use tokio::sync::{mpsc, Notify, RwLock};
use uuid::Uuid;

use super::registry::{DeviceInfo, DeviceRegistry};
use crate::error::{AppError, Result};
use crate::sync::ServerEvent;

/// Sending side of one device connection
#[derive(Clone, Debug)]
pub struct DeviceHandle {
    connection_id: Uuid,
    tx: mpsc::Sender<String>,
    shutdown: Arc<Notify>,
}

impl DeviceHandle {
    /// Create a handle plus the receiver its writer task drains
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let handle = Self {
            connection_id: Uuid::new_v4(),
            tx,
            shutdown: Arc::new(Notify::new()),
        };
        (handle, rx)
    }

    pub fn connection_id(&self) -> Uuid {
        self.connection_id
    }

    /// Resolves once the hub wants this connection gone
    pub async fn closed(&self) {
        self.shutdown.notified().await;
    }

    /// Ask the owning session to shut down
    pub fn close(&self) {
        self.shutdown.notify_one();
    }

    pub(crate) async fn deliver(&self, frame: String, timeout: Duration) -> Result<()> {
        match tokio::time::timeout(timeout, self.tx.send(frame)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(AppError::TransportFailure(
                "connection writer has stopped".to_string(),
            )),
            Err(_) => Err(AppError::TransportFailure(format!(
                "send timed out after {:?}",
                timeout
            ))),
        }
    }
}

/// Shared handle to the broadcast hub
#[derive(Clone)]
pub struct BroadcastHub {
    inner: Arc<HubInner>,
}

struct HubInner {
    state: RwLock<HubState>,
    send_timeout: Duration,
}

#[derive(Default)]
struct HubState {
    handles: HashMap<String, DeviceHandle>,
    registry: DeviceRegistry,
}

impl BroadcastHub {
    pub fn new(send_timeout: Duration) -> Self {
        Self {
            inner: Arc::new(HubInner {
                state: RwLock::new(HubState::default()),
                send_timeout,
            }),
        }
    }

    /// Add a device and announce the new membership to everyone.
    ///
    /// A live connection already using `device_id` is replaced and told to
    /// close; the newest connection wins.
    pub async fn register(&self, device_id: &str, handle: DeviceHandle) -> Result<usize> {
        {
            let mut state = self.inner.state.write().await;
            if let Some(previous) = state.handles.insert(device_id.to_string(), handle) {
                tracing::warn!(
                    device_id = %device_id,
                    connection_id = %previous.connection_id,
                    "Device id reused, closing previous connection"
                );
                previous.close();
            }
            state.registry.add(device_id);
        }

        tracing::info!(device_id = %device_id, "Device connected");
        self.broadcast_status().await
    }

    /// Remove a device if `connection_id` still owns its slot.
    ///
    /// Does not announce the change; callers follow up with
    /// [`broadcast_status`](Self::broadcast_status).
    pub async fn unregister(&self, device_id: &str, connection_id: Uuid) -> bool {
        let mut state = self.inner.state.write().await;
        let removed = state.remove_if_current(device_id, connection_id);
        if removed {
            tracing::info!(device_id = %device_id, "Device disconnected");
        }
        removed
    }

    /// Deliver one event to exactly one device
    pub async fn send_to(&self, device_id: &str, event: &ServerEvent) -> Result<()> {
        let handle = self
            .inner
            .state
            .read()
            .await
            .handles
            .get(device_id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("Device not connected: {}", device_id)))?;

        let frame = event.encode()?;
        if let Err(e) = handle.deliver(frame, self.inner.send_timeout).await {
            tracing::warn!(device_id = %device_id, event = event.kind(), "Delivery failed: {}", e);
            self.prune(&[(device_id.to_string(), handle)]).await;
            return Err(e);
        }
        Ok(())
    }

    /// Deliver to every registered device except `exclude`.
    ///
    /// Sends go to a snapshot of the membership taken at call start; devices
    /// whose delivery fails are pruned after the sweep. Returns how many
    /// deliveries succeeded.
    pub async fn broadcast(&self, event: &ServerEvent, exclude: Option<&str>) -> Result<usize> {
        let frame = event.encode()?;

        let targets: Vec<(String, DeviceHandle)> = {
            let state = self.inner.state.read().await;
            state
                .handles
                .iter()
                .filter(|(id, _)| Some(id.as_str()) != exclude)
                .map(|(id, handle)| (id.clone(), handle.clone()))
                .collect()
        };

        let timeout = self.inner.send_timeout;
        let outcomes = join_all(
            targets
                .iter()
                .map(|(_, handle)| handle.deliver(frame.clone(), timeout)),
        )
        .await;

        let attempted = targets.len();
        let mut failed = Vec::new();
        for ((device_id, handle), outcome) in targets.into_iter().zip(outcomes) {
            if let Err(e) = outcome {
                tracing::warn!(
                    device_id = %device_id,
                    event = event.kind(),
                    "Broadcast delivery failed: {}",
                    e
                );
                failed.push((device_id, handle));
            }
        }

        self.prune(&failed).await;
        Ok(attempted - failed.len())
    }

    /// Announce the current membership to every device
    pub async fn broadcast_status(&self) -> Result<usize> {
        let event = ServerEvent::DeviceStatus {
            connected_devices: self.connected_ids().await,
            timestamp: Utc::now(),
        };
        self.broadcast(&event, None).await
    }

    /// Per-send deadline applied to every delivery
    pub fn send_timeout(&self) -> Duration {
        self.inner.send_timeout
    }

    pub async fn set_device_type(&self, device_id: &str, device_type: &str) -> bool {
        self.inner
            .state
            .write()
            .await
            .registry
            .set_type(device_id, device_type)
    }

    pub async fn touch(&self, device_id: &str) -> bool {
        self.inner.state.write().await.registry.touch(device_id)
    }

    pub async fn connected_ids(&self) -> Vec<String> {
        self.inner.state.read().await.registry.list_ids()
    }

    pub async fn device_count(&self) -> usize {
        self.inner.state.read().await.registry.len()
    }

    pub async fn device_info(&self, device_id: &str) -> Option<DeviceInfo> {
        self.inner
            .state
            .read()
            .await
            .registry
            .get(device_id)
            .cloned()
    }

    async fn prune(&self, failed: &[(String, DeviceHandle)]) {
        if failed.is_empty() {
            return;
        }

        let mut state = self.inner.state.write().await;
        for (device_id, handle) in failed {
            if state.remove_if_current(device_id, handle.connection_id) {
                tracing::info!(device_id = %device_id, "Pruned unreachable device");
                handle.close();
            }
        }
    }
}

impl HubState {
    fn remove_if_current(&mut self, device_id: &str, connection_id: Uuid) -> bool {
        let current = self
            .handles
            .get(device_id)
            .is_some_and(|h| h.connection_id == connection_id);
        if current {
            self.handles.remove(device_id);
            self.registry.remove(device_id);
        }
        current
    }
}
