//! HVAC failure: air temperature ramps from 24 to 38 °C and back.
//!
//! The ramp starts at sim hour 1, peaks at hour 3 and is over by hour 5.
//! While it lasts humidity drops harder, the reservoir warms faster and
//! growth above 32 °C is penalised.

use async_trait::async_trait;
use hydro_core::physics::{ambient_temp, round_to, DEFAULT_PH_DRIFT_RATE, DEFAULT_THERMAL_LAG};
use hydro_core::{Coordinator, Demand, Reservoir, Topology, Tower};
use tracing::{info, warn};

use super::baseline::{
    apply_climate, apply_coordinator_climate, apply_ec, apply_light, apply_ph, apply_water_level,
    apply_water_temp, grown_height, HumidityModel, AIR_TEMP_STD, WATER_LEVEL_STD,
};
use super::{Latch, Scenario, ScenarioKind, TickEnv};

const STRESS_START_H: f64 = 1.0;
const STRESS_PEAK_H: f64 = 3.0;
const STRESS_END_H: f64 = 5.0;
const NORMAL_TEMP_C: f64 = 24.0;
const PEAK_TEMP_C: f64 = 38.0;

/// Growth slows above this air temperature.
const GROWTH_PENALTY_ABOVE_C: f64 = 32.0;

/// Water temperature that is logged as a warning.
pub const HIGH_WATER_TEMP_C: f64 = 28.0;

/// Air temperature forced by the failure, `None` outside it.
pub fn temp_override(sim_time_h: f64) -> Option<f64> {
    if sim_time_h < STRESS_START_H {
        None
    } else if sim_time_h < STRESS_PEAK_H {
        let progress = (sim_time_h - STRESS_START_H) / (STRESS_PEAK_H - STRESS_START_H);
        Some(NORMAL_TEMP_C + progress * (PEAK_TEMP_C - NORMAL_TEMP_C))
    } else if sim_time_h < STRESS_END_H {
        let progress = (sim_time_h - STRESS_PEAK_H) / (STRESS_END_H - STRESS_PEAK_H);
        Some(PEAK_TEMP_C - progress * (PEAK_TEMP_C - NORMAL_TEMP_C))
    } else {
        None
    }
}

/// Fraction of normal growth kept at `temp_c`, never below 0.3.
pub fn growth_factor(temp_c: f64) -> f64 {
    if temp_c > GROWTH_PENALTY_ABOVE_C {
        (1.0 - (temp_c - GROWTH_PENALTY_ABOVE_C) / 20.0).max(0.3)
    } else {
        1.0
    }
}

#[derive(Debug, Default)]
pub struct HeatStress {
    started: Latch,
    peaked: Latch,
    recovered: Latch,
    hot_water: Latch,
}

impl HeatStress {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Scenario for HeatStress {
    fn kind(&self) -> ScenarioKind {
        ScenarioKind::HeatStress
    }

    async fn on_tick(&mut self, env: &mut TickEnv<'_>, _topology: &mut Topology) {
        let h = env.sim_time_h;
        if h >= STRESS_START_H && self.started.fire() {
            warn!("HVAC FAILURE at sim={:.1}h: air temperature climbing", h);
        }
        if h >= STRESS_PEAK_H && self.peaked.fire() {
            warn!("Heat stress peak ({:.0} C) at sim={:.1}h", PEAK_TEMP_C, h);
        }
        if h >= STRESS_END_H && self.recovered.fire() {
            info!("HVAC restored at sim={:.1}h", h);
        }
    }

    fn update_tower(&mut self, env: &mut TickEnv<'_>, _coordinator: &Coordinator, tower: &mut Tower) {
        let forced = temp_override(env.sim_time_h);
        match forced {
            Some(temp) => apply_climate(env, tower, temp, 0.3, &HumidityModel::HEAT),
            None => {
                let air = ambient_temp(env.sim_time_h);
                apply_climate(env, tower, air, AIR_TEMP_STD, &HumidityModel::NORMAL);
            }
        }
        apply_light(env, tower);

        let factor = forced.map_or(1.0, growth_factor);
        tower.height_cm = round_to(grown_height(env, tower) * factor, 1);
        tower.uptime_s = env.uptime_s();
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
        let forced = temp_override(env.sim_time_h);
        let air = forced.unwrap_or_else(|| ambient_temp(env.sim_time_h));
        let lag = if forced.is_some_and(|t| t > 30.0) { 0.25 } else { DEFAULT_THERMAL_LAG };

        apply_water_temp(env, reservoir, air - 2.0, lag);
        if reservoir.water_temp_c > HIGH_WATER_TEMP_C && self.hot_water.fire() {
            warn!(
                "HIGH WATER TEMP: {:.1} C on {} at sim={:.1}h",
                reservoir.water_temp_c, coordinator.coord_id, env.sim_time_h
            );
        }

        apply_ph(env, reservoir, DEFAULT_PH_DRIFT_RATE);
        apply_ec(env, reservoir, demand.ec_rate);
        apply_water_level(
            env,
            reservoir,
            demand.online_towers,
            demand.water_rate_per_tower(),
            WATER_LEVEL_STD,
        );
        apply_coordinator_climate(env, coordinator, air);
    }
}
