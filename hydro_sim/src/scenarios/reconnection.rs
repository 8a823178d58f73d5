//! Coordinators drop off the network and come back.
//!
//! Half the coordinators (at least one) go offline at 2 simulated minutes
//! and reconnect at 7. Status changes are announced manually on the main
//! connection; compare [`LwtDisconnect`](super::LwtDisconnect), where the
//! broker announces the drop itself.

use async_trait::async_trait;
use hydro_core::{Noise, Topology};
use rand::seq::SliceRandom;
use tracing::{info, warn};

use super::{Latch, Scenario, ScenarioKind, TickEnv};
use crate::payload::{EVENT_MQTT_CONNECTED, EVENT_MQTT_DISCONNECTED};

/// Simulated hour of the drop (2 min).
pub const DISCONNECT_H: f64 = 2.0 / 60.0;

/// Simulated hour of the return (7 min).
pub const RECONNECT_H: f64 = 7.0 / 60.0;

/// Picks `max(1, n / 2)` coordinators with the run's seeded RNG.
pub(crate) fn pick_half(topology: &Topology, noise: &mut Noise) -> Vec<String> {
    let all = topology.coordinator_ids();
    if all.is_empty() {
        return Vec::new();
    }
    let n = (all.len() / 2).max(1);
    all.choose_multiple(noise.rng(), n).cloned().collect()
}

#[derive(Debug, Default)]
pub struct Reconnection {
    targets: Vec<String>,
    disconnected: Latch,
    reconnected: Latch,
}

impl Reconnection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Coordinators that will go offline.
    pub fn targets(&self) -> &[String] {
        &self.targets
    }

    fn flip(&self, env: &TickEnv<'_>, topology: &mut Topology, online: bool) {
        let event = if online { EVENT_MQTT_CONNECTED } else { EVENT_MQTT_DISCONNECTED };
        for coord_id in &self.targets {
            if topology.set_coordinator_online(coord_id, online).is_err() {
                continue;
            }
            let Some(coordinator) = topology.coordinator(coord_id) else {
                continue;
            };
            env.ctx.publisher.publish_connection_status(coordinator, event);
            if online {
                info!("RECONNECT: {} ({}) back online", coordinator.name, coord_id);
            } else {
                warn!("DISCONNECT: {} ({}) went offline", coordinator.name, coord_id);
            }
        }
    }
}

#[async_trait]
impl Scenario for Reconnection {
    fn kind(&self) -> ScenarioKind {
        ScenarioKind::Reconnection
    }

    fn configure_topology(&mut self, topology: &mut Topology, noise: &mut Noise) {
        self.targets = pick_half(topology, noise);
        info!(
            "Reconnection: {} of {} coordinators will disconnect",
            self.targets.len(),
            topology.stats().coordinators
        );
    }

    async fn on_tick(&mut self, env: &mut TickEnv<'_>, topology: &mut Topology) {
        if env.sim_time_h >= DISCONNECT_H && self.disconnected.fire() {
            self.flip(env, topology, false);
        }
        if env.sim_time_h >= RECONNECT_H && self.disconnected.is_set() && self.reconnected.fire() {
            self.flip(env, topology, true);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenarios::baseline::tests::{env, test_context};
    use hydro_core::{build_topology, TopologyConfig};

    #[tokio::test]
    async fn test_offline_window() {
        let ctx = test_context();
        let mut noise = Noise::new(42);
        let mut topology = build_topology(&TopologyConfig::default().with_farms(2).with_coordinators_per_farm(3));
        let mut scenario = Reconnection::new();
        scenario.configure_topology(&mut topology, &mut noise);
        assert_eq!(scenario.targets().len(), 3);

        let total = topology.stats().coordinators;
        scenario.on_tick(&mut env(&mut noise, &ctx, 1.0 / 60.0, 0.01), &mut topology).await;
        assert_eq!(topology.online_coordinator_count(), total);

        scenario.on_tick(&mut env(&mut noise, &ctx, 2.0 / 60.0, 0.01), &mut topology).await;
        assert_eq!(topology.online_coordinator_count(), total - 3);
        for id in scenario.targets() {
            assert!(topology.towers_of(id).iter().all(|t| !t.is_connected()));
        }

        scenario.on_tick(&mut env(&mut noise, &ctx, 7.0 / 60.0, 0.01), &mut topology).await;
        assert_eq!(topology.online_coordinator_count(), total);
    }

    #[test]
    fn test_single_coordinator_is_still_targeted() {
        let topology = build_topology(&TopologyConfig::default().with_farms(1).with_coordinators_per_farm(1));
        assert_eq!(pick_half(&topology, &mut Noise::new(1)).len(), 1);
    }
}
