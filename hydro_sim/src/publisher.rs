//! Telemetry publisher over the main broker connection.

use hydro_core::{Coordinator, Reservoir, Tower};
use hydro_env::{Message, SimClock, Transport, TransportError};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::payload::{
    topics, ConnectionStatus, CoordinatorAnnounce, PairingComplete, PairingRequest,
    ReservoirTelemetry, TowerTelemetry,
};

/// Sends structured telemetry and counts the outcome of every publish.
///
/// Publish failures are never propagated: they bump [`errors`](Self::errors)
/// and get logged, so telemetry loss cannot stop the simulation. Both
/// counters only ever increase.
pub struct TelemetryPublisher {
    transport: Arc<dyn Transport>,
    clock: Arc<dyn SimClock>,
    published: AtomicU64,
    errors: AtomicU64,
}

impl TelemetryPublisher {
    pub fn new(transport: Arc<dyn Transport>, clock: Arc<dyn SimClock>) -> Self {
        Self {
            transport,
            clock,
            published: AtomicU64::new(0),
            errors: AtomicU64::new(0),
        }
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// Connects the main connection (no Last-Will).
    pub async fn connect(&self, timeout: Duration) -> Result<(), TransportError> {
        info!("Connecting telemetry client {} ...", self.transport.client_id());
        self.transport.connect(None, timeout).await?;
        info!("Telemetry client connected");
        Ok(())
    }

    /// Cleanly disconnects, logging the final counters.
    pub async fn disconnect(&self) {
        if let Err(e) = self.transport.disconnect().await {
            warn!("Telemetry disconnect failed: {}", e);
        }
        info!(
            "Telemetry client disconnected. Total messages: {}, errors: {}",
            self.messages_published(),
            self.errors()
        );
    }

    /// Messages accepted by the transport so far.
    pub fn messages_published(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }

    /// Publishes that failed so far.
    pub fn errors(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }

    /// Serialises `payload` as JSON and publishes it on `topic`.
    ///
    /// Returns whether the transport accepted the message.
    pub fn publish<P: Serialize + ?Sized>(&self, topic: impl Into<String>, payload: &P) -> bool {
        self.send(topic.into(), payload, false)
    }

    /// Same as [`publish`](Self::publish) with the retain flag set.
    pub fn publish_retained<P: Serialize + ?Sized>(&self, topic: impl Into<String>, payload: &P) -> bool {
        self.send(topic.into(), payload, true)
    }

    fn send<P: Serialize + ?Sized>(&self, topic: String, payload: &P, retain: bool) -> bool {
        let body = match serde_json::to_vec(payload) {
            Ok(body) => body,
            Err(e) => {
                self.errors.fetch_add(1, Ordering::Relaxed);
                warn!("Payload encoding failed on {}: {}", topic, e);
                return false;
            }
        };
        let message = Message {
            topic,
            payload: body,
            retain,
        };
        let topic_for_log = message.topic.clone();
        match self.transport.publish(message) {
            Ok(()) => {
                self.published.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(e) => {
                self.errors.fetch_add(1, Ordering::Relaxed);
                warn!("Publish failed on {}: {}", topic_for_log, e);
                false
            }
        }
    }

    // -------------------------------------------------------------------
    // Telemetry
    // -------------------------------------------------------------------

    pub fn publish_tower_telemetry(&self, tower: &Tower) -> bool {
        self.publish(
            topics::tower_telemetry(&tower.farm_id, &tower.coord_id, &tower.tower_id),
            &TowerTelemetry::from(tower),
        )
    }

    pub fn publish_reservoir_telemetry(
        &self,
        coordinator: &Coordinator,
        reservoir: &Reservoir,
        towers_online: usize,
    ) -> bool {
        self.publish(
            topics::reservoir_telemetry(&coordinator.farm_id, &coordinator.coord_id),
            &ReservoirTelemetry::new(coordinator, reservoir, towers_online),
        )
    }

    /// Retained connection status for `coordinator` carrying `event`.
    pub fn publish_connection_status(&self, coordinator: &Coordinator, event: &str) -> bool {
        self.publish_retained(
            topics::connection_status(&coordinator.farm_id, &coordinator.coord_id),
            &ConnectionStatus::snapshot(coordinator, event, coordinator.online, self.clock.unix_secs()),
        )
    }

    /// Announces a coordinator so the backend creates a pending registration.
    pub fn announce_coordinator(&self, coordinator: &Coordinator) -> bool {
        self.publish(
            topics::coordinator_announce(&coordinator.coord_id),
            &CoordinatorAnnounce::from(coordinator),
        )
    }

    pub fn publish_pairing_request(&self, coordinator: &Coordinator, tower: &Tower) -> bool {
        self.publish(
            topics::pairing_request(&coordinator.farm_id, &coordinator.coord_id),
            &PairingRequest::from(tower),
        )
    }

    pub fn publish_pairing_complete(&self, coordinator: &Coordinator, tower: &Tower) -> bool {
        self.publish(
            topics::pairing_complete(&coordinator.farm_id, &coordinator.coord_id),
            &PairingComplete {
                tower_id: &tower.tower_id,
                status: "paired",
                coord_id: &coordinator.coord_id,
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::LocalBroker;
    use crate::clock::VirtualClock;
    use hydro_core::CropType;
    use serde_json::Value;

    async fn connected(broker: &LocalBroker) -> TelemetryPublisher {
        let publisher = TelemetryPublisher::new(broker.transport("sim"), VirtualClock::shared());
        publisher.connect(Duration::from_secs(1)).await.unwrap();
        publisher
    }

    #[tokio::test]
    async fn test_counts_successes() {
        let broker = LocalBroker::new();
        let publisher = connected(&broker).await;
        let tower = Tower::new("T", "C", "farm-001", CropType::Lettuce);

        assert!(publisher.publish_tower_telemetry(&tower));
        assert!(publisher.publish_tower_telemetry(&tower));
        assert_eq!(publisher.messages_published(), 2);
        assert_eq!(publisher.errors(), 0);
        assert_eq!(broker.history("farm/+/coord/+/tower/+/telemetry").len(), 2);
    }

    #[tokio::test]
    async fn test_failures_counted_not_raised() {
        let broker = LocalBroker::new();
        let publisher = connected(&broker).await;
        let coordinator = Coordinator::new("C", "farm-001", "Coordinator 1-1");

        broker.set_fail_publishes(true);
        assert!(!publisher.announce_coordinator(&coordinator));
        assert!(!publisher.announce_coordinator(&coordinator));
        broker.set_fail_publishes(false);
        assert!(publisher.announce_coordinator(&coordinator));

        assert_eq!(publisher.errors(), 2);
        assert_eq!(publisher.messages_published(), 1);
    }

    #[tokio::test]
    async fn test_unconnected_transport_counts_errors() {
        let broker = LocalBroker::new();
        let publisher = TelemetryPublisher::new(broker.transport("sim"), VirtualClock::shared());
        let tower = Tower::new("T", "C", "farm-001", CropType::Lettuce);
        assert!(!publisher.publish_tower_telemetry(&tower));
        assert_eq!(publisher.errors(), 1);
    }

    #[tokio::test]
    async fn test_connection_status_is_retained() {
        let broker = LocalBroker::new();
        let publisher = connected(&broker).await;
        let coordinator = Coordinator::new("C", "farm-001", "Coordinator 1-1");

        publisher.publish_connection_status(&coordinator, "mqtt_connected");

        let retained = broker
            .retained("farm/farm-001/coord/C/status/connection")
            .unwrap();
        let value: Value = serde_json::from_slice(&retained.payload).unwrap();
        assert_eq!(value["event"], "mqtt_connected");
        assert_eq!(value["mqtt_connected"], true);
        assert_eq!(value["ts"], 1_704_067_200u64);
    }
}
