//! Per-coordinator broker connection with a Last-Will armed.
//!
//! A [`CoordinatorLink`] is a dedicated transport for one coordinator. On
//! every connect it registers a retained `disconnected` status as its will,
//! then publishes a retained `connected` status. [`force_disconnect`]
//! drops the socket without the clean-shutdown handshake, so the broker
//! itself publishes the `disconnected` notice once it notices the loss.
//!
//! Links share no mutable state with each other; hundreds can be connected,
//! torn down and reconnected independently.
//!
//! [`force_disconnect`]: CoordinatorLink::force_disconnect

use hydro_core::Coordinator;
use hydro_env::{Message, SimClock, Transport, TransportError, TransportFactory};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::payload::{topics, ConnectionStatus, EVENT_CONNECTED};

/// Client id of the dedicated link for `coord_id`.
pub fn link_client_id(coord_id: &str) -> String {
    format!("sim-coord-{coord_id}")
}

/// Dedicated Last-Will connection for one coordinator.
pub struct CoordinatorLink {
    coord_id: String,
    farm_id: String,
    transport: Arc<dyn Transport>,
    clock: Arc<dyn SimClock>,
    timeout: Duration,
}

impl CoordinatorLink {
    /// Creates a (not yet connected) link through `factory`.
    pub fn new(
        coordinator: &Coordinator,
        factory: &dyn TransportFactory,
        clock: Arc<dyn SimClock>,
        timeout: Duration,
    ) -> Self {
        Self {
            coord_id: coordinator.coord_id.clone(),
            farm_id: coordinator.farm_id.clone(),
            transport: factory.create(&link_client_id(&coordinator.coord_id)),
            clock,
            timeout,
        }
    }

    pub fn coord_id(&self) -> &str {
        &self.coord_id
    }

    pub fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }

    fn status_topic(&self) -> String {
        topics::connection_status(&self.farm_id, &self.coord_id)
    }

    fn will(&self) -> Result<Message, TransportError> {
        let payload = serde_json::to_vec(&ConnectionStatus::last_will(&self.coord_id, &self.farm_id))
            .map_err(|e| TransportError::Serialization(e.to_string()))?;
        Ok(Message::retained(self.status_topic(), payload))
    }

    fn publish_connected(&self, coordinator: &Coordinator) -> Result<(), TransportError> {
        let status =
            ConnectionStatus::snapshot(coordinator, EVENT_CONNECTED, true, self.clock.unix_secs());
        let payload =
            serde_json::to_vec(&status).map_err(|e| TransportError::Serialization(e.to_string()))?;
        self.transport
            .publish(Message::retained(self.status_topic(), payload))
    }

    async fn arm(&self, coordinator: &Coordinator) -> Result<(), TransportError> {
        let will = self.will()?;
        self.transport.connect(Some(will), self.timeout).await?;
        self.publish_connected(coordinator)
    }

    /// Connects with a fresh will and publishes a retained `connected`
    /// status. Blocks until acknowledged or the timeout elapses.
    pub async fn connect(&self, coordinator: &Coordinator) -> Result<(), TransportError> {
        debug!("Connecting coordinator link {} ...", self.coord_id);
        match self.arm(coordinator).await {
            Ok(()) => {
                info!("Coordinator link {} connected (LWT armed)", self.coord_id);
                Ok(())
            }
            Err(e) => {
                error!("Coordinator link {} failed to connect: {}", self.coord_id, e);
                Err(e)
            }
        }
    }

    /// Closes the socket without DISCONNECT; the broker fires the will.
    pub fn force_disconnect(&self) {
        self.transport.force_disconnect();
        warn!(
            "FORCE DISCONNECT: {} (LWT will fire after keep-alive expiry)",
            self.coord_id
        );
    }

    /// Re-arms a fresh will and publishes `connected` again.
    pub async fn reconnect(&self, coordinator: &Coordinator) -> Result<(), TransportError> {
        debug!("Reconnecting coordinator link {} ...", self.coord_id);
        match self.arm(coordinator).await {
            Ok(()) => {
                info!("Coordinator link {} reconnected", self.coord_id);
                Ok(())
            }
            Err(e) => {
                error!("Coordinator link {} failed to reconnect: {}", self.coord_id, e);
                Err(e)
            }
        }
    }

    /// Clean shutdown. Best-effort: failures are logged, not returned.
    pub async fn cleanup(&self) {
        if let Err(e) = self.transport.disconnect().await {
            debug!("Cleanup of link {} failed: {}", self.coord_id, e);
        }
    }
}
