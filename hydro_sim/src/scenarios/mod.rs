//! Scenario variants for the tick engine.
//!
//! A scenario is the baseline behaviour with any of the engine's hooks
//! overridden. Baseline physics lives in [`baseline`] as plain functions;
//! variants call into them explicitly for whatever they do not change, so
//! composition ("baseline, then adjust") is visible in each override.
//!
//! Phase boundaries are expressed in simulated hours, never wall-clock
//! time, so every variant behaves the same under any `speed`.

pub mod alert_cascade;
pub mod baseline;
pub mod crop_conflict;
pub mod full_demo;
pub mod growth_cycle;
pub mod heat_stress;
pub mod lwt_disconnect;
pub mod nutrient_depletion;
pub mod ph_drift;
pub mod reconnection;
pub mod steady_state;
pub mod tower_pairing;
pub mod water_emergency;

use async_trait::async_trait;
use hydro_core::{Coordinator, Demand, Noise, Reservoir, Topology, Tower};
use hydro_env::{SimClock, TransportFactory};
use std::sync::Arc;
use std::time::Duration;

use crate::error::SimError;
use crate::publisher::TelemetryPublisher;

pub use alert_cascade::AlertCascade;
pub use crop_conflict::CropConflict;
pub use full_demo::FullDemo;
pub use growth_cycle::GrowthCycle;
pub use heat_stress::HeatStress;
pub use lwt_disconnect::LwtDisconnect;
pub use nutrient_depletion::NutrientDepletion;
pub use ph_drift::PhDrift;
pub use reconnection::Reconnection;
pub use scale_test::ScaleTest;
pub use steady_state::SteadyState;
pub use tower_pairing::TowerPairing;
pub use water_emergency::WaterEmergency;

/// Read-only collaborators shared by the engine and scenario hooks.
pub struct RunContext {
    /// Main telemetry connection
    pub publisher: Arc<TelemetryPublisher>,

    /// Source of dedicated per-coordinator connections
    pub links: Arc<dyn TransportFactory>,

    pub clock: Arc<dyn SimClock>,

    /// Budget for every connect/reconnect acknowledgement
    pub connect_timeout: Duration,
}

/// Per-tick view handed to every hook.
pub struct TickEnv<'a> {
    /// One-based tick number
    pub tick: u64,

    /// Simulated hours since start (already advanced for this tick)
    pub sim_time_h: f64,

    /// Simulated hours covered by this tick
    pub dt_h: f64,

    /// The run's only randomness source
    pub noise: &'a mut Noise,

    pub ctx: &'a RunContext,
}

impl TickEnv<'_> {
    /// Simulated minutes since start.
    pub fn sim_minutes(&self) -> f64 {
        self.sim_time_h * 60.0
    }

    /// Whole simulated seconds since start.
    pub fn uptime_s(&self) -> u64 {
        (self.sim_time_h * 3600.0).max(0.0) as u64
    }
}

/// What happened during one tick.
#[derive(Debug, Clone, PartialEq)]
pub struct TickReport {
    pub tick: u64,
    pub sim_time_h: f64,

    /// Messages accepted during this tick
    pub messages: u64,

    /// Publish errors during this tick
    pub errors: u64,

    pub coordinators_online: usize,
    pub towers_online: usize,

    /// Real time spent on physics and publishing
    pub duration: Duration,
}

/// Extension points of the tick engine.
///
/// Hooks run on the engine's task, one at a time; none may spawn work that
/// mutates entities in the background.
#[async_trait]
pub trait Scenario: Send {
    fn kind(&self) -> ScenarioKind;

    /// Runs once before the loop. May reshuffle crops, detach towers or
    /// pre-select targets.
    fn configure_topology(&mut self, _topology: &mut Topology, _noise: &mut Noise) {}

    /// Runs once after bootstrap, before the first tick.
    async fn on_start(&mut self, _topology: &mut Topology, _ctx: &RunContext) -> Result<(), SimError> {
        Ok(())
    }

    /// Phase transitions and state flips; not physics.
    async fn on_tick(&mut self, _env: &mut TickEnv<'_>, _topology: &mut Topology) {}

    /// Updates one connected tower of an online coordinator.
    fn update_tower(&mut self, env: &mut TickEnv<'_>, _coordinator: &Coordinator, tower: &mut Tower) {
        baseline::tower_physics(env, tower);
    }

    /// Updates the reservoir of an online coordinator. Runs before its towers.
    fn update_reservoir(
        &mut self,
        env: &mut TickEnv<'_>,
        coordinator: &mut Coordinator,
        reservoir: &mut Reservoir,
        demand: &Demand,
    ) {
        baseline::reservoir_physics(env, coordinator, reservoir, demand);
    }

    /// Observes the finished tick.
    fn on_tick_complete(&mut self, _report: &TickReport) {}

    /// Runs once after the loop stopped. Releases scenario-owned resources.
    async fn on_finish(&mut self, _topology: &mut Topology, _ctx: &RunContext) {}
}

/// One-shot flag for "log this transition once".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Latch(bool);

impl Latch {
    /// Returns true the first time it is called.
    pub fn fire(&mut self) -> bool {
        !std::mem::replace(&mut self.0, true)
    }

    pub fn is_set(&self) -> bool {
        self.0
    }
}

/// Tower ids owned by `coord_id`, in slot order.
pub(crate) fn tower_ids_of(topology: &Topology, coord_id: &str) -> Vec<String> {
    topology
        .coordinator(coord_id)
        .map(|c| c.tower_ids.clone())
        .unwrap_or_default()
}

/// Registered scenario variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScenarioKind {
    SteadyState,
    PhDrift,
    NutrientDepletion,
    HeatStress,
    WaterEmergency,
    TowerPairing,
    CropConflict,
    GrowthCycle,
    Reconnection,
    FullDemo,
    ScaleTest,
    LwtDisconnect,
    AlertCascade,
}

impl ScenarioKind {
    /// Returns every scenario, in catalogue order.
    pub fn all() -> Vec<ScenarioKind> {
        vec![
            ScenarioKind::SteadyState,
            ScenarioKind::PhDrift,
            ScenarioKind::NutrientDepletion,
            ScenarioKind::HeatStress,
            ScenarioKind::WaterEmergency,
            ScenarioKind::TowerPairing,
            ScenarioKind::CropConflict,
            ScenarioKind::GrowthCycle,
            ScenarioKind::Reconnection,
            ScenarioKind::FullDemo,
            ScenarioKind::ScaleTest,
            ScenarioKind::LwtDisconnect,
            ScenarioKind::AlertCascade,
        ]
    }

    /// Returns the CLI name.
    pub fn name(&self) -> &'static str {
        match self {
            ScenarioKind::SteadyState => "steady-state",
            ScenarioKind::PhDrift => "ph-drift",
            ScenarioKind::NutrientDepletion => "nutrient-depletion",
            ScenarioKind::HeatStress => "heat-stress",
            ScenarioKind::WaterEmergency => "water-emergency",
            ScenarioKind::TowerPairing => "tower-pairing",
            ScenarioKind::CropConflict => "crop-conflict",
            ScenarioKind::GrowthCycle => "growth-cycle",
            ScenarioKind::Reconnection => "reconnection",
            ScenarioKind::FullDemo => "full-demo",
            ScenarioKind::ScaleTest => "scale-test",
            ScenarioKind::LwtDisconnect => "lwt-disconnect",
            ScenarioKind::AlertCascade => "alert-cascade",
        }
    }

    /// Returns a one-line description.
    pub fn description(&self) -> &'static str {
        match self {
            ScenarioKind::SteadyState => "Normal operation: day/night cycle, gradual drift, steady growth",
            ScenarioKind::PhDrift => "Reservoir acidifies in three accelerating phases, pH below 5.0 by hour 6",
            ScenarioKind::NutrientDepletion => "Heavy feeders drain EC from 1.5 to below 0.7 mS/cm",
            ScenarioKind::HeatStress => "HVAC failure: air ramps 24 -> 38 C and back, humidity drops, growth slows",
            ScenarioKind::WaterEmergency => "Leak then pump stop: water level 80% -> <20%, erratic pH/EC",
            ScenarioKind::TowerPairing => "Towers pair one by one every 30 sim-seconds via request/complete handshake",
            ScenarioKind::CropConflict => "Incompatible crops share reservoirs (lettuce, tomato, mint, cilantro)",
            ScenarioKind::GrowthCycle => "30 days of growth in 30 minutes from freshly planted towers",
            ScenarioKind::Reconnection => "Half the coordinators go offline at 2 min and return at 7 min",
            ScenarioKind::FullDemo => "15-minute scripted tour of every fault on different farms",
            ScenarioKind::ScaleTest => "Throughput test with per-tick timing and message statistics",
            ScenarioKind::LwtDisconnect => "Coordinators drop their sockets; the broker publishes their Last-Will",
            ScenarioKind::AlertCascade => "Overlapping pH, heat, water and pump alerts across farms, then recovery",
        }
    }

    /// Speed multiplier this scenario is designed for, if not the default.
    pub fn default_speed(&self) -> Option<f64> {
        match self {
            ScenarioKind::GrowthCycle => Some(1440.0),
            _ => None,
        }
    }

    /// Tick interval (real seconds) this scenario is designed for.
    pub fn default_interval_secs(&self) -> Option<f64> {
        match self {
            ScenarioKind::ScaleTest => Some(1.0),
            _ => None,
        }
    }

    /// Run duration (real seconds) this scenario is designed for.
    pub fn default_duration_secs(&self) -> Option<f64> {
        match self {
            ScenarioKind::GrowthCycle => Some(1800.0),
            ScenarioKind::FullDemo => Some(900.0),
            ScenarioKind::ScaleTest => Some(300.0),
            _ => None,
        }
    }

    /// Builds a fresh instance of this scenario.
    pub fn create(&self) -> Box<dyn Scenario> {
        match self {
            ScenarioKind::SteadyState => Box::new(SteadyState),
            ScenarioKind::PhDrift => Box::new(PhDrift::new()),
            ScenarioKind::NutrientDepletion => Box::new(NutrientDepletion::new()),
            ScenarioKind::HeatStress => Box::new(HeatStress::new()),
            ScenarioKind::WaterEmergency => Box::new(WaterEmergency::new()),
            ScenarioKind::TowerPairing => Box::new(TowerPairing::new()),
            ScenarioKind::CropConflict => Box::new(CropConflict),
            ScenarioKind::GrowthCycle => Box::new(GrowthCycle::new()),
            ScenarioKind::Reconnection => Box::new(Reconnection::new()),
            ScenarioKind::FullDemo => Box::new(FullDemo::new()),
            ScenarioKind::ScaleTest => Box::new(ScaleTest::new()),
            ScenarioKind::LwtDisconnect => Box::new(LwtDisconnect::new()),
            ScenarioKind::AlertCascade => Box::new(AlertCascade::new()),
        }
    }
}

impl std::fmt::Display for ScenarioKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for ScenarioKind {
    type Err = SimError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase().replace('_', "-");
        ScenarioKind::all()
            .into_iter()
            .find(|k| k.name() == wanted)
            .ok_or_else(|| SimError::UnknownScenario(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_round_trip() {
        for kind in ScenarioKind::all() {
            assert_eq!(kind.name().parse::<ScenarioKind>().unwrap(), kind);
            assert_eq!(kind.create().kind(), kind);
        }
        assert_eq!("PH_DRIFT".parse::<ScenarioKind>().unwrap(), ScenarioKind::PhDrift);
        assert!("chaos".parse::<ScenarioKind>().is_err());
    }

    #[test]
    fn test_catalogue_is_complete() {
        assert_eq!(ScenarioKind::all().len(), 13);
        for kind in ScenarioKind::all() {
            assert!(!kind.description().is_empty());
        }
    }

    #[test]
    fn test_latch_fires_once() {
        let mut latch = Latch::default();
        assert!(latch.fire());
        assert!(!latch.fire());
        assert!(latch.is_set());
    }
}
