//! pH crisis: acidification that accelerates in three phases.
//!
//! | sim hours | drift (pH/h) |
//! |-----------|--------------|
//! | 0 – 3     | -0.10        |
//! | 3 – 5     | -0.25        |
//! | 5 +       | -0.50        |
//!
//! Starting from 6.0 the reservoir crosses 5.0 during the crisis phase and
//! is below it by hour 6. Everything besides pH is baseline.

use hydro_core::physics::{ambient_temp, DEFAULT_THERMAL_LAG};
use hydro_core::{Coordinator, Demand, Noise, Reservoir, Topology};
use tracing::{info, warn};

use super::baseline::{
    apply_coordinator_climate, apply_ec, apply_ph, apply_water_level, apply_water_temp,
    WATER_BELOW_AIR_C, WATER_LEVEL_STD,
};
use super::{Latch, Scenario, ScenarioKind, TickEnv};

/// pH every reservoir starts from.
pub const START_PH: f64 = 6.0;

/// pH below which the reservoir is in crisis.
pub const CRISIS_PH: f64 = 5.0;

#[derive(Debug, Default)]
pub struct PhDrift {
    crisis: Latch,
    accelerating: Latch,
    critical: Latch,
}

impl PhDrift {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drift rate (pH/h) in effect at `sim_time_h`.
    pub fn rate_at(sim_time_h: f64) -> f64 {
        if sim_time_h < 3.0 {
            -0.10
        } else if sim_time_h < 5.0 {
            -0.25
        } else {
            -0.50
        }
    }
}

impl Scenario for PhDrift {
    fn kind(&self) -> ScenarioKind {
        ScenarioKind::PhDrift
    }

    fn configure_topology(&mut self, topology: &mut Topology, _noise: &mut Noise) {
        for reservoir in topology.reservoirs_mut() {
            reservoir.ph = START_PH;
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

        let h = env.sim_time_h;
        if h >= 3.0 && self.accelerating.fire() {
            info!("pH drift accelerating at sim={:.1}h", h);
        }
        if h >= 5.0 && self.critical.fire() {
            info!("pH drift entering crisis phase at sim={:.1}h", h);
        }

        apply_ph(env, reservoir, Self::rate_at(h));
        if reservoir.ph < CRISIS_PH && self.crisis.fire() {
            warn!(
                "CRISIS: pH below {:.1} on {} at sim={:.1}h",
                CRISIS_PH, coordinator.coord_id, h
            );
        }

        apply_ec(env, reservoir, demand.ec_rate);
        apply_water_level(
            env,
            reservoir,
            demand.online_towers,
            demand.water_rate_per_tower(),
            WATER_LEVEL_STD,
        );
        let air = ambient_temp(h);
        apply_water_temp(env, reservoir, air - WATER_BELOW_AIR_C, DEFAULT_THERMAL_LAG);
        apply_coordinator_climate(env, coordinator, air);
    }
}
