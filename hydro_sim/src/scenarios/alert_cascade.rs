//! Overlapping alerts across farms, then recovery.
//!
//! Timeline (simulated minutes):
//!
//! | window | what                           | target                  |
//! |--------|--------------------------------|-------------------------|
//! | 1 – 6  | pH crashes towards 4.0         | first farm reservoirs   |
//! | 2 – 6  | air temperature spikes to 38 °C | second farm towers      |
//! | 3 – 6  | water level plummets to 5 %    | first farm reservoirs   |
//! | 4 – 6  | main pump fails                | third farm reservoirs   |
//! | 6 +    | everything recovers            | all of the above        |
//! | 8 +    | steady state                   |                         |
//!
//! With fewer than three farms the targets wrap around so every alert type
//! still fires.

use async_trait::async_trait;
use hydro_core::{Coordinator, Demand, Noise, Reservoir, Topology, Tower};
use tracing::{info, warn};

use super::baseline::{apply_climate, reservoir_physics, tower_physics, HumidityModel};
use super::{Latch, Scenario, ScenarioKind, TickEnv};

const PH_DRIFT_START_H: f64 = 1.0 / 60.0;
const TEMP_SPIKE_START_H: f64 = 2.0 / 60.0;
const WATER_DROP_START_H: f64 = 3.0 / 60.0;
const PUMP_FAIL_START_H: f64 = 4.0 / 60.0;
const RECOVERY_START_H: f64 = 6.0 / 60.0;
const STEADY_STATE_START_H: f64 = 8.0 / 60.0;

/// Per-minute rates of the forced changes.
const PH_CRASH_PER_MIN: f64 = 0.5;
const PH_RECOVER_PER_MIN: f64 = 0.3;
const LEVEL_DROP_PER_MIN: f64 = 3.0;
const LEVEL_RECOVER_PER_MIN: f64 = 2.0;

#[derive(Debug, Default)]
pub struct AlertCascade {
    /// Farms hit by `[pH + water, heat, pump]`
    targets: Option<[String; 3]>,
    ph_started: Latch,
    temp_started: Latch,
    water_started: Latch,
    pump_started: Latch,
    recovery_started: Latch,
    steady_started: Latch,
}

impl AlertCascade {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn targets(&self) -> Option<&[String; 3]> {
        self.targets.as_ref()
    }

    fn is_target(&self, slot: usize, farm_id: &str) -> bool {
        self.targets.as_ref().is_some_and(|t| t[slot] == farm_id)
    }
}

#[async_trait]
impl Scenario for AlertCascade {
    fn kind(&self) -> ScenarioKind {
        ScenarioKind::AlertCascade
    }

    fn configure_topology(&mut self, topology: &mut Topology, _noise: &mut Noise) {
        let ids: Vec<&str> = topology.farms().iter().map(|f| f.farm_id.as_str()).collect();
        self.targets = match ids.as_slice() {
            [] => None,
            [a] => Some([a.to_string(), a.to_string(), a.to_string()]),
            [a, b] => Some([a.to_string(), b.to_string(), a.to_string()]),
            [a, b, c, ..] => Some([a.to_string(), b.to_string(), c.to_string()]),
        };
        if let Some([chem, heat, pump]) = &self.targets {
            info!("Alert cascade targets: pH/water={}  temp={}  pump={}", chem, heat, pump);
        }
    }

    async fn on_tick(&mut self, env: &mut TickEnv<'_>, _topology: &mut Topology) {
        let Some([chem, heat, pump]) = self.targets.as_ref() else {
            return;
        };
        let h = env.sim_time_h;
        if h >= PH_DRIFT_START_H && self.ph_started.fire() {
            warn!("ALERT CASCADE: pH drift started on {}", chem);
        }
        if h >= TEMP_SPIKE_START_H && self.temp_started.fire() {
            warn!("ALERT CASCADE: temperature spike started on {}", heat);
        }
        if h >= WATER_DROP_START_H && self.water_started.fire() {
            warn!("ALERT CASCADE: water level drop started on {}", chem);
        }
        if h >= PUMP_FAIL_START_H && self.pump_started.fire() {
            warn!("ALERT CASCADE: pump failure started on {}", pump);
        }
        if h >= RECOVERY_START_H && self.recovery_started.fire() {
            info!("ALERT CASCADE: recovery phase -- all values returning to normal");
        }
        if h >= STEADY_STATE_START_H && self.steady_started.fire() {
            info!("ALERT CASCADE: steady state -- all alerts should be resolved");
        }
    }

    fn update_tower(&mut self, env: &mut TickEnv<'_>, coordinator: &Coordinator, tower: &mut Tower) {
        tower_physics(env, tower);
        if !self.is_target(1, &coordinator.farm_id) {
            return;
        }
        let h = env.sim_time_h;
        if (TEMP_SPIKE_START_H..RECOVERY_START_H).contains(&h) {
            apply_climate(env, tower, 38.0, 1.0, &HumidityModel::HEAT);
        } else if h >= RECOVERY_START_H {
            apply_climate(env, tower, 22.0, 0.5, &HumidityModel::NORMAL);
        }
    }

    fn update_reservoir(
        &mut self,
        env: &mut TickEnv<'_>,
        coordinator: &mut Coordinator,
        reservoir: &mut Reservoir,
        demand: &Demand,
    ) {
        reservoir_physics(env, coordinator, reservoir, demand);
        let h = env.sim_time_h;
        let minutes = env.dt_h * 60.0;

        if self.is_target(0, &coordinator.farm_id) {
            if (PH_DRIFT_START_H..RECOVERY_START_H).contains(&h) {
                reservoir.ph = (reservoir.ph - PH_CRASH_PER_MIN * minutes).max(4.0);
            }
            if (WATER_DROP_START_H..RECOVERY_START_H).contains(&h) {
                reservoir.set_water_level((reservoir.water_level_pct - LEVEL_DROP_PER_MIN * minutes).max(5.0));
                reservoir.low_water_alert = true;
            }
            if h >= RECOVERY_START_H {
                reservoir.ph = (reservoir.ph + PH_RECOVER_PER_MIN * minutes).min(6.2);
                reservoir.set_water_level((reservoir.water_level_pct + LEVEL_RECOVER_PER_MIN * minutes).min(80.0));
            }
        }

        if self.is_target(2, &coordinator.farm_id) {
            if (PUMP_FAIL_START_H..RECOVERY_START_H).contains(&h) {
                reservoir.main_pump_on = false;
            } else if h >= RECOVERY_START_H {
                reservoir.main_pump_on = true;
            }
        }
    }
}
