//! Time-lapsed growth from freshly planted towers.
//!
//! Designed for 1440× (one simulated day per real minute), so thirty days
//! pass in half an hour.

use async_trait::async_trait;
use hydro_core::physics::{round_to, growth_sigmoid};
use hydro_core::{Coordinator, Noise, Topology, Tower};
use tracing::info;

use super::baseline::tower_physics;
use super::{Scenario, ScenarioKind, TickEnv};

#[derive(Debug, Default)]
pub struct GrowthCycle {
    last_logged_day: Option<u64>,
}

impl GrowthCycle {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Scenario for GrowthCycle {
    fn kind(&self) -> ScenarioKind {
        ScenarioKind::GrowthCycle
    }

    fn configure_topology(&mut self, topology: &mut Topology, _noise: &mut Noise) {
        for tower in topology.towers_mut() {
            tower.planting_offset_days = 0.0;
            tower.height_cm = 0.0;
        }
    }

    async fn on_tick(&mut self, env: &mut TickEnv<'_>, topology: &mut Topology) {
        let day = (env.sim_time_h / 24.0).floor() as u64;
        if self.last_logged_day.is_some_and(|d| d >= day) {
            return;
        }
        self.last_logged_day = Some(day);

        let sample = topology
            .coordinators()
            .next()
            .and_then(|c| c.tower_ids.first())
            .and_then(|id| topology.tower(id));
        if let Some(tower) = sample {
            let max = tower.crop.profile().max_height_cm;
            info!(
                "Day {}: {} height={:.1} cm ({:.0}% of max {:.0} cm)",
                day,
                tower.crop,
                tower.height_cm,
                tower.height_cm / max * 100.0,
                max
            );
        }
    }

    fn update_tower(&mut self, env: &mut TickEnv<'_>, _coordinator: &Coordinator, tower: &mut Tower) {
        tower_physics(env, tower);

        // Clean curve from day 0, light measurement noise
        let profile = tower.crop.profile();
        let height = growth_sigmoid(env.sim_time_h / 24.0, profile.max_height_cm, profile.harvest_days);
        tower.height_cm = round_to(env.noise.jitter(height, 0.1).max(0.0), 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenarios::baseline::tests::{env, test_context};
    use hydro_core::CropType;

    #[test]
    fn test_height_tracks_curve_from_day_zero() {
        let ctx = test_context();
        let mut noise = Noise::silent(1);
        let mut scenario = GrowthCycle::new();
        let coordinator = Coordinator::new("C", "farm-001", "Coordinator 1-1");
        let mut tower = Tower::new("T", "C", "farm-001", CropType::Mint);
        tower.planting_offset_days = 12.0;

        let mut last = 0.0;
        for day in [1.0, 10.0, 20.0, 30.0] {
            scenario.update_tower(&mut env(&mut noise, &ctx, day * 24.0, 1.0), &coordinator, &mut tower);
            assert!(tower.height_cm >= last);
            last = tower.height_cm;
        }
        // Planting offset is ignored; harvest day reaches close to max
        assert!(last > 30.0 * 0.95);
    }
}
