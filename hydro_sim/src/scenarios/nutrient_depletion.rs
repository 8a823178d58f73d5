//! Fast nutrient drain by heavy-feeding crops.
//!
//! 60 % of each coordinator's towers grow tomato, pepper or kale. Uptake
//! runs at twice the catalogue rate (water at 1.5×), so EC falls from 1.5
//! below 0.7 mS/cm within about half a simulated day.

use hydro_core::physics::{ambient_temp, DEFAULT_PH_DRIFT_RATE, DEFAULT_THERMAL_LAG};
use hydro_core::{Coordinator, CropType, Demand, Noise, Reservoir, Topology};
use rand::seq::SliceRandom;
use tracing::warn;

use super::baseline::{
    apply_coordinator_climate, apply_ec, apply_ph, apply_water_level, apply_water_temp,
    WATER_BELOW_AIR_C, WATER_LEVEL_STD,
};
use super::{tower_ids_of, Latch, Scenario, ScenarioKind, TickEnv};

pub const HEAVY_FEEDERS: [CropType; 3] = [CropType::Tomato, CropType::Pepper, CropType::Kale];
pub const LIGHT_FEEDERS: [CropType; 3] = [CropType::Lettuce, CropType::Mint, CropType::Cilantro];

const EC_BOOST: f64 = 2.0;
const WATER_BOOST: f64 = 1.5;

/// EC below which a top-up is due.
pub const LOW_EC_MS_CM: f64 = 0.7;

#[derive(Debug, Default)]
pub struct NutrientDepletion {
    low_ec: Latch,
}

impl NutrientDepletion {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Scenario for NutrientDepletion {
    fn kind(&self) -> ScenarioKind {
        ScenarioKind::NutrientDepletion
    }

    fn configure_topology(&mut self, topology: &mut Topology, noise: &mut Noise) {
        for coord_id in topology.coordinator_ids() {
            if let Some(reservoir) = topology.reservoir_of_mut(&coord_id) {
                reservoir.ec_ms_cm = 1.5;
                reservoir.ph = 6.0;
            }
            let ids = tower_ids_of(topology, &coord_id);
            // First 60 % of slots, rounded up
            let heavy = (ids.len() * 3).div_ceil(5);
            for (slot, tower_id) in ids.iter().enumerate() {
                let pool = if slot < heavy { &HEAVY_FEEDERS } else { &LIGHT_FEEDERS };
                let crop = *pool.choose(noise.rng()).unwrap_or(&pool[0]);
                if let Some(tower) = topology.tower_mut(tower_id) {
                    tower.crop = crop;
                }
            }
        }
    }

    fn update_reservoir(
        &mut self,
        env: &mut TickEnv<'_>,
        coordinator: &mut Coordinator,
        reservoir: &mut Reservoir,
        demand: &Demand,
    ) {
        if demand.online_towers == 0 {
            return;
        }
        apply_ph(env, reservoir, DEFAULT_PH_DRIFT_RATE);
        apply_ec(env, reservoir, demand.ec_rate * EC_BOOST);

        if reservoir.ec_ms_cm < LOW_EC_MS_CM && self.low_ec.fire() {
            warn!(
                "LOW EC: {:.2} mS/cm on {} at sim={:.1}h -- nutrient top-up needed",
                reservoir.ec_ms_cm, coordinator.coord_id, env.sim_time_h
            );
        }

        apply_water_level(
            env,
            reservoir,
            demand.online_towers,
            demand.water_rate_per_tower() * WATER_BOOST,
            WATER_LEVEL_STD,
        );
        let air = ambient_temp(env.sim_time_h);
        apply_water_temp(env, reservoir, air - WATER_BELOW_AIR_C, DEFAULT_THERMAL_LAG);
        apply_coordinator_climate(env, coordinator, air);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenarios::baseline::tests::{env, test_context};
    use hydro_core::{build_topology, TopologyConfig};

    #[test]
    fn test_heavy_feeders_dominate() {
        let config = TopologyConfig::default()
            .with_farms(1)
            .with_coordinators_per_farm(1)
            .with_towers_per_coordinator(10);
        let mut topology = build_topology(&config);
        NutrientDepletion::new().configure_topology(&mut topology, &mut Noise::new(3));

        let coord_id = topology.coordinator_ids()[0].clone();
        let towers = topology.towers_of(&coord_id);
        assert!(towers[..6].iter().all(|t| HEAVY_FEEDERS.contains(&t.crop)));
        assert!(towers[6..].iter().all(|t| LIGHT_FEEDERS.contains(&t.crop)));
        assert_eq!(topology.reservoir_of(&coord_id).unwrap().ec_ms_cm, 1.5);
    }

    #[test]
    fn test_ec_falls_below_threshold() {
        let ctx = test_context();
        let mut noise = Noise::silent(1);
        let mut scenario = NutrientDepletion::new();
        let mut coordinator = Coordinator::new("C", "farm-001", "Coordinator 1-1");
        let mut reservoir = Reservoir::new("C", "farm-001");
        reservoir.ec_ms_cm = 1.5;
        let towers: Vec<_> = (0..10)
            .map(|i| hydro_core::Tower::new(format!("T{i}"), "C", "farm-001", CropType::Tomato))
            .collect();
        let demand = Demand::of(&towers);

        for step in 1..=24 {
            let h = step as f64 * 0.5;
            scenario.update_reservoir(&mut env(&mut noise, &ctx, h, 0.5), &mut coordinator, &mut reservoir, &demand);
        }
        assert!(reservoir.ec_ms_cm < LOW_EC_MS_CM);
        assert!(scenario.low_ec.is_set());
    }
}
