//! Water level emergency.
//!
//! Level starts at 80 % and drains at the crops' normal consumption for
//! four simulated hours, then three times faster (leak / pump cavitation)
//! until hour 7, after which the pump has stopped and the drain falls to a
//! fifth. Below 20 % the low-water alert fires and the main pump is cut;
//! below 25 % pH and EC become erratic as the remaining volume concentrates.

use hydro_core::physics::{
    ambient_temp, clamp, tds_from_ec, DEFAULT_PH_DRIFT_RATE, DEFAULT_TDS_FACTOR,
    DEFAULT_THERMAL_LAG, EC_BOUNDS, PH_BOUNDS,
};
use hydro_core::model::LOW_WATER_THRESHOLD_PCT;
use hydro_core::{Coordinator, Demand, Noise, Reservoir, Topology};
use tracing::warn;

use super::baseline::{
    apply_coordinator_climate, apply_ec, apply_ph, apply_water_level, apply_water_temp,
    WATER_BELOW_AIR_C,
};
use super::{Latch, Scenario, ScenarioKind, TickEnv};

/// Level below which readings turn erratic.
const ERRATIC_BELOW_PCT: f64 = 25.0;

/// Multiplier on crop water consumption in effect at `sim_time_h`.
pub fn drain_multiplier(sim_time_h: f64) -> f64 {
    if sim_time_h < 4.0 {
        1.0
    } else if sim_time_h < 7.0 {
        3.0
    } else {
        0.2
    }
}

#[derive(Debug, Default)]
pub struct WaterEmergency {
    low_water: Latch,
}

impl WaterEmergency {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Scenario for WaterEmergency {
    fn kind(&self) -> ScenarioKind {
        ScenarioKind::WaterEmergency
    }

    fn configure_topology(&mut self, topology: &mut Topology, _noise: &mut Noise) {
        for reservoir in topology.reservoirs_mut() {
            reservoir.set_water_level(80.0);
            reservoir.ph = 6.0;
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
        let per_tower = demand.water_rate_per_tower() * drain_multiplier(env.sim_time_h);
        apply_water_level(env, reservoir, demand.online_towers, per_tower, 0.3);

        if reservoir.water_level_pct < LOW_WATER_THRESHOLD_PCT {
            // Auto-stop to prevent a dry run
            reservoir.main_pump_on = false;
            if self.low_water.fire() {
                warn!(
                    "LOW WATER ALERT on {} at sim={:.1}h ({:.1}%)",
                    coordinator.coord_id, env.sim_time_h, reservoir.water_level_pct
                );
            }
        }

        if reservoir.water_level_pct < ERRATIC_BELOW_PCT {
            let ec_step = env.noise.jitter(0.02, 0.15) * env.dt_h;
            let ph_step = env.noise.jitter(-0.02, 0.08) * env.dt_h;
            reservoir.ec_ms_cm = clamp(reservoir.ec_ms_cm + ec_step, EC_BOUNDS.0, EC_BOUNDS.1);
            reservoir.ph = clamp(reservoir.ph + ph_step, PH_BOUNDS.0, PH_BOUNDS.1);
            reservoir.tds_ppm = tds_from_ec(reservoir.ec_ms_cm, DEFAULT_TDS_FACTOR);
        } else {
            apply_ph(env, reservoir, DEFAULT_PH_DRIFT_RATE);
            apply_ec(env, reservoir, demand.ec_rate);
        }

        let air = ambient_temp(env.sim_time_h);
        apply_water_temp(env, reservoir, air - WATER_BELOW_AIR_C, DEFAULT_THERMAL_LAG);
        apply_coordinator_climate(env, coordinator, air);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use crate::scenarios::baseline::tests::{env, test_context};
    use hydro_core::{CropType, Tower};

    fn tomatoes(n: usize) -> Vec<Tower> {
        (0..n)
            .map(|i| Tower::new(format!("T{i}"), "C", "farm-001", CropType::Tomato))
            .collect()
    }

    /// Level drop over one simulated hour starting at `h`.
    fn hourly_drop(h: f64, demand: &Demand) -> f64 {
        let ctx = test_context();
        let mut noise = Noise::silent(1);
        let mut coordinator = Coordinator::new("C", "farm-001", "Coordinator 1-1");
        let mut reservoir = Reservoir::new("C", "farm-001");
        reservoir.set_water_level(80.0);
        WaterEmergency::new().update_reservoir(
            &mut env(&mut noise, &ctx, h, 1.0),
            &mut coordinator,
            &mut reservoir,
            demand,
        );
        80.0 - reservoir.water_level_pct
    }

    #[test]
    fn test_leak_phase_triples_crop_demand() {
        let demand = Demand::of(&tomatoes(10));
        let normal = hourly_drop(1.0, &demand);
        assert_abs_diff_eq!(normal, demand.water_rate, epsilon = 1e-9);
        assert_abs_diff_eq!(hourly_drop(5.0, &demand), 3.0 * normal, epsilon = 1e-9);
        assert_abs_diff_eq!(hourly_drop(8.0, &demand), 0.2 * normal, epsilon = 1e-9);
    }

    #[test]
    fn test_drain_follows_crop_mix() {
        let tomato = Demand::of(&tomatoes(4));
        let lettuce: Vec<Tower> = (0..4)
            .map(|i| Tower::new(format!("L{i}"), "C", "farm-001", CropType::Lettuce))
            .collect();
        let lettuce = Demand::of(&lettuce);
        assert!(hourly_drop(5.0, &tomato) > hourly_drop(5.0, &lettuce));
    }

    #[test]
    fn test_level_crosses_alert_and_stops_pump() {
        let ctx = test_context();
        let mut noise = Noise::silent(1);
        let mut scenario = WaterEmergency::new();
        let mut coordinator = Coordinator::new("C", "farm-001", "Coordinator 1-1");
        let mut reservoir = Reservoir::new("C", "farm-001");
        reservoir.set_water_level(21.0);
        let demand = Demand::of(&tomatoes(10));

        let mut previous = reservoir.water_level_pct;
        for step in 1..=8 {
            let h = 4.0 + step as f64 * 0.25;
            scenario.update_reservoir(&mut env(&mut noise, &ctx, h, 0.25), &mut coordinator, &mut reservoir, &demand);
            assert!(reservoir.water_level_pct <= previous);
            previous = reservoir.water_level_pct;
        }

        assert!(reservoir.water_level_pct < LOW_WATER_THRESHOLD_PCT);
        assert!(reservoir.low_water_alert);
        assert!(!reservoir.main_pump_on);
        assert!(scenario.low_water.is_set());
    }
}
