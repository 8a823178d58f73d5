//! Dynamic onboarding: towers pair one at a time.
//!
//! Every tower is detached into a shuffled pending queue before the run.
//! Each pairing interval (30 simulated seconds by default) the next pending
//! tower goes through the request/complete handshake and is attached to
//! its coordinator, after which its telemetry starts flowing.

use async_trait::async_trait;
use hydro_core::{Noise, Topology};
use rand::seq::SliceRandom;
use std::collections::VecDeque;
use tracing::{info, warn};

use super::{tower_ids_of, Scenario, ScenarioKind, TickEnv};

/// Default simulated seconds between pairings.
pub const DEFAULT_PAIR_INTERVAL_SECS: f64 = 30.0;

/// Absorbs float error when comparing accumulated sim seconds.
const DUE_EPSILON_SECS: f64 = 1e-6;

#[derive(Debug)]
pub struct TowerPairing {
    /// `(coord_id, tower_id)` waiting to pair
    pending: VecDeque<(String, String)>,
    interval_secs: f64,
    paired: usize,
}

impl Default for TowerPairing {
    fn default() -> Self {
        Self {
            pending: VecDeque::new(),
            interval_secs: DEFAULT_PAIR_INTERVAL_SECS,
            paired: 0,
        }
    }
}

impl TowerPairing {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the simulated seconds between pairings (non-positive falls back
    /// to the default).
    pub fn with_interval_secs(mut self, secs: f64) -> Self {
        self.interval_secs = if secs.is_finite() && secs > 0.0 {
            secs
        } else {
            DEFAULT_PAIR_INTERVAL_SECS
        };
        self
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    pub fn paired(&self) -> usize {
        self.paired
    }

    /// Sim second at which the next pairing is due.
    fn next_due_secs(&self) -> f64 {
        (self.paired + 1) as f64 * self.interval_secs
    }
}

#[async_trait]
impl Scenario for TowerPairing {
    fn kind(&self) -> ScenarioKind {
        ScenarioKind::TowerPairing
    }

    fn configure_topology(&mut self, topology: &mut Topology, noise: &mut Noise) {
        let mut queue = Vec::new();
        for coord_id in topology.coordinator_ids() {
            for tower_id in tower_ids_of(topology, &coord_id) {
                if topology.detach_tower(&tower_id).is_ok() {
                    queue.push((coord_id.clone(), tower_id));
                }
            }
        }
        queue.shuffle(noise.rng());
        self.pending = queue.into();
        self.paired = 0;
        info!("Tower pairing: {} towers queued for pairing", self.pending.len());
    }

    async fn on_tick(&mut self, env: &mut TickEnv<'_>, topology: &mut Topology) {
        let now_secs = env.sim_time_h * 3600.0;

        while now_secs + DUE_EPSILON_SECS >= self.next_due_secs() {
            let Some((coord_id, tower_id)) = self.pending.pop_front() else {
                break;
            };
            self.paired += 1;

            if let Err(e) = topology.attach_tower(&tower_id, &coord_id) {
                warn!("PAIRING failed for {} -> {}: {}", tower_id, coord_id, e);
                continue;
            }
            let (Some(coordinator), Some(tower)) = (topology.coordinator(&coord_id), topology.tower(&tower_id)) else {
                continue;
            };

            info!("PAIRING: tower {} -> coord {} (crop={})", tower_id, coord_id, tower.crop);
            env.ctx.publisher.publish_pairing_request(coordinator, tower);
            env.ctx.publisher.publish_pairing_complete(coordinator, tower);
            info!("  Paired: {} total, {} remaining", self.paired, self.pending.len());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenarios::baseline::tests::{env, test_context};
    use hydro_core::{build_topology, TopologyConfig};

    fn five_towers() -> Topology {
        build_topology(
            &TopologyConfig::default()
                .with_farms(1)
                .with_coordinators_per_farm(1)
                .with_towers_per_coordinator(5),
        )
    }

    #[test]
    fn test_configure_detaches_everything() {
        let mut topology = five_towers();
        let mut scenario = TowerPairing::new();
        scenario.configure_topology(&mut topology, &mut Noise::new(7));

        assert_eq!(scenario.pending(), 5);
        assert_eq!(topology.online_tower_count(), 0);
        assert_eq!(topology.stats().towers, 5);
    }

    #[tokio::test]
    async fn test_pairs_on_schedule() {
        let ctx = test_context();
        let mut noise = Noise::new(7);
        let mut topology = five_towers();
        let mut scenario = TowerPairing::new();
        scenario.configure_topology(&mut topology, &mut noise);

        let mut seconds = 0.0;
        while seconds < 25.0 {
            seconds += 5.0;
            scenario.on_tick(&mut env(&mut noise, &ctx, seconds / 3600.0, 5.0 / 3600.0), &mut topology).await;
        }
        assert_eq!(topology.online_tower_count(), 0);

        while seconds < 150.0 {
            seconds += 5.0;
            scenario.on_tick(&mut env(&mut noise, &ctx, seconds / 3600.0, 5.0 / 3600.0), &mut topology).await;
        }
        assert_eq!(topology.online_tower_count(), 5);
        assert_eq!(scenario.paired(), 5);
        assert_eq!(scenario.pending(), 0);
    }

    #[tokio::test]
    async fn test_large_step_pairs_every_due_tower() {
        let ctx = test_context();
        let mut noise = Noise::new(7);
        let mut topology = five_towers();
        let mut scenario = TowerPairing::new().with_interval_secs(10.0);
        scenario.configure_topology(&mut topology, &mut noise);

        scenario.on_tick(&mut env(&mut noise, &ctx, 35.0 / 3600.0, 35.0 / 3600.0), &mut topology).await;
        assert_eq!(scenario.paired(), 3);
    }
}
