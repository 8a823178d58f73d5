//! Scripted fifteen-minute demo.
//!
//! Cycles through the individual faults, each confined to one farm while
//! the rest of the fleet runs normally:
//!
//! ```text
//!  0:00 -  1:30  warmup
//!  1:30 -  4:00  pH drift           farm 1
//!  4:00 -  6:00  heat stress        farm 2
//!  6:00 -  8:00  water emergency    farm 3
//!  8:00 - 10:00  recovery           (everything back online)
//! 10:00 - 12:00  nutrient depletion farm 4
//! 12:00 - 14:00  reconnection       farm 5 offline
//! 14:00 -        final steady state (everything back online)
//! ```
//!
//! Farms that do not exist are skipped; their phase only logs.

use async_trait::async_trait;
use hydro_core::model::LOW_WATER_THRESHOLD_PCT;
use hydro_core::physics::{ambient_temp, round_to, DEFAULT_PH_DRIFT_RATE, DEFAULT_THERMAL_LAG};
use hydro_core::{Coordinator, Demand, Noise, Reservoir, Topology, Tower};
use std::fmt;
use tracing::info;

use super::baseline::{
    apply_climate, apply_coordinator_climate, apply_ec, apply_light, apply_ph, apply_water_level,
    apply_water_temp, grown_height, reservoir_physics, tower_physics, HumidityModel,
    WATER_BELOW_AIR_C, WATER_LEVEL_STD,
};
use super::{Scenario, ScenarioKind, TickEnv};

/// pH drift during the demo (pH/h).
const DEMO_PH_RATE: f64 = -0.12;

/// Water loss per online tower during the demo (%/h).
const DEMO_DRAIN_PER_TOWER: f64 = 0.8;

/// EC consumption multiplier during the demo.
const DEMO_EC_MULTIPLIER: f64 = 3.0;

/// Air temperature forced on the heat-stress farm.
const DEMO_HEAT_C: f64 = 36.0;

/// Demo phase, in timeline order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum DemoPhase {
    Warmup,
    PhDrift,
    HeatStress,
    WaterEmergency,
    Recovery,
    NutrientDepletion,
    Reconnection,
    Final,
}

impl DemoPhase {
    /// Phase active at `sim_minutes` into the run.
    pub fn at(sim_minutes: f64) -> Self {
        match sim_minutes {
            m if m < 1.5 => Self::Warmup,
            m if m < 4.0 => Self::PhDrift,
            m if m < 6.0 => Self::HeatStress,
            m if m < 8.0 => Self::WaterEmergency,
            m if m < 10.0 => Self::Recovery,
            m if m < 12.0 => Self::NutrientDepletion,
            m if m < 14.0 => Self::Reconnection,
            _ => Self::Final,
        }
    }

    /// Zero-based index of the farm this phase targets.
    pub fn target_farm(&self) -> Option<usize> {
        match self {
            Self::PhDrift => Some(0),
            Self::HeatStress => Some(1),
            Self::WaterEmergency => Some(2),
            Self::NutrientDepletion => Some(3),
            Self::Reconnection => Some(4),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Warmup => "warmup",
            Self::PhDrift => "ph-drift",
            Self::HeatStress => "heat-stress",
            Self::WaterEmergency => "water-emergency",
            Self::Recovery => "recovery",
            Self::NutrientDepletion => "nutrient-depletion",
            Self::Reconnection => "reconnection",
            Self::Final => "final steady-state",
        }
    }
}

impl fmt::Display for DemoPhase {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[derive(Debug, Default)]
pub struct FullDemo {
    /// Farm ids in topology order
    farm_ids: Vec<String>,
    phase: Option<DemoPhase>,
}

impl FullDemo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Phase entered most recently, `None` before the first tick.
    pub fn phase(&self) -> Option<DemoPhase> {
        self.phase
    }

    /// Whether `farm_id` is under `phase`'s fault right now.
    fn targets(&self, phase: DemoPhase, farm_id: &str) -> bool {
        phase
            .target_farm()
            .and_then(|i| self.farm_ids.get(i))
            .is_some_and(|id| id == farm_id)
    }

    fn set_farm_online(topology: &mut Topology, farm_id: Option<&str>, online: bool) -> usize {
        let ids: Vec<String> = topology
            .coordinators()
            .filter(|c| farm_id.map_or(true, |f| c.farm_id == f))
            .map(|c| c.coord_id.clone())
            .collect();
        ids.iter()
            .filter(|id| topology.set_coordinator_online(id, online).is_ok())
            .count()
    }

    fn enter(&mut self, phase: DemoPhase, topology: &mut Topology) {
        let target = phase.target_farm().and_then(|i| self.farm_ids.get(i)).cloned();
        match &target {
            Some(farm) => info!("=== DEMO PHASE: {} ({}) ===", phase, farm),
            None => info!("=== DEMO PHASE: {} ===", phase),
        }

        match phase {
            DemoPhase::Recovery | DemoPhase::Final => {
                let n = Self::set_farm_online(topology, None, true);
                info!("  {} coordinators online", n);
            }
            DemoPhase::Reconnection => {
                if let Some(farm) = target.as_deref() {
                    let n = Self::set_farm_online(topology, Some(farm), false);
                    info!("  {} coordinators on {} offline", n, farm);
                }
            }
            _ => {}
        }
        self.phase = Some(phase);
    }
}

/// Water temperature and coordinator climate; no demo fault touches these.
fn standard_rest(env: &mut TickEnv<'_>, coordinator: &mut Coordinator, reservoir: &mut Reservoir) {
    let air = ambient_temp(env.sim_time_h);
    apply_water_temp(env, reservoir, air - WATER_BELOW_AIR_C, DEFAULT_THERMAL_LAG);
    apply_coordinator_climate(env, coordinator, air);
}

#[async_trait]
impl Scenario for FullDemo {
    fn kind(&self) -> ScenarioKind {
        ScenarioKind::FullDemo
    }

    fn configure_topology(&mut self, topology: &mut Topology, _noise: &mut Noise) {
        self.farm_ids = topology.farms().iter().map(|f| f.farm_id.clone()).collect();
        if self.farm_ids.len() < 5 {
            info!(
                "Full demo with {} farms: phases without a target farm only log",
                self.farm_ids.len()
            );
        }
    }

    async fn on_tick(&mut self, env: &mut TickEnv<'_>, topology: &mut Topology) {
        let phase = DemoPhase::at(env.sim_minutes());
        if self.phase != Some(phase) {
            self.enter(phase, topology);
        }
    }

    fn update_tower(&mut self, env: &mut TickEnv<'_>, coordinator: &Coordinator, tower: &mut Tower) {
        let phase = DemoPhase::at(env.sim_minutes());
        if phase != DemoPhase::HeatStress || !self.targets(phase, &coordinator.farm_id) {
            tower_physics(env, tower);
            return;
        }
        apply_climate(env, tower, DEMO_HEAT_C, 0.5, &HumidityModel::HEAT);
        apply_light(env, tower);
        tower.height_cm = round_to(grown_height(env, tower), 1);
        tower.uptime_s = env.uptime_s();
    }

    fn update_reservoir(
        &mut self,
        env: &mut TickEnv<'_>,
        coordinator: &mut Coordinator,
        reservoir: &mut Reservoir,
        demand: &Demand,
    ) {
        let phase = DemoPhase::at(env.sim_minutes());
        if !self.targets(phase, &coordinator.farm_id) {
            reservoir_physics(env, coordinator, reservoir, demand);
            return;
        }

        if demand.online_towers == 0 {
            return;
        }

        // One quantity is faulted per phase; the others follow baseline
        let ph_rate = if phase == DemoPhase::PhDrift { DEMO_PH_RATE } else { DEFAULT_PH_DRIFT_RATE };
        apply_ph(env, reservoir, ph_rate);

        let ec_rate = if phase == DemoPhase::NutrientDepletion {
            demand.ec_rate * DEMO_EC_MULTIPLIER
        } else {
            demand.ec_rate
        };
        apply_ec(env, reservoir, ec_rate);

        if phase == DemoPhase::WaterEmergency {
            let drained = reservoir.water_level_pct
                - DEMO_DRAIN_PER_TOWER * demand.online_towers as f64 * env.dt_h;
            reservoir.set_water_level(drained);
            if reservoir.water_level_pct < LOW_WATER_THRESHOLD_PCT {
                reservoir.main_pump_on = false;
            }
        } else {
            apply_water_level(
                env,
                reservoir,
                demand.online_towers,
                demand.water_rate_per_tower(),
                WATER_LEVEL_STD,
            );
        }

        standard_rest(env, coordinator, reservoir);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use crate::scenarios::baseline::tests::{env, test_context};
    use hydro_core::{build_topology, CropType, TopologyConfig};

    fn demo_topology() -> Topology {
        build_topology(
            &TopologyConfig::default()
                .with_farms(5)
                .with_coordinators_per_farm(2)
                .with_towers_per_coordinator(2),
        )
    }

    #[test]
    fn test_phase_boundaries() {
        assert_eq!(DemoPhase::at(0.0), DemoPhase::Warmup);
        assert_eq!(DemoPhase::at(1.5), DemoPhase::PhDrift);
        assert_eq!(DemoPhase::at(5.9), DemoPhase::HeatStress);
        assert_eq!(DemoPhase::at(6.0), DemoPhase::WaterEmergency);
        assert_eq!(DemoPhase::at(9.0), DemoPhase::Recovery);
        assert_eq!(DemoPhase::at(11.0), DemoPhase::NutrientDepletion);
        assert_eq!(DemoPhase::at(13.0), DemoPhase::Reconnection);
        assert_eq!(DemoPhase::at(14.0), DemoPhase::Final);
        assert_eq!(DemoPhase::Reconnection.target_farm(), Some(4));
        assert_eq!(DemoPhase::Recovery.target_farm(), None);
    }

    #[tokio::test]
    async fn test_reconnection_phase_takes_last_farm_offline() {
        let ctx = test_context();
        let mut noise = Noise::new(1);
        let mut topology = demo_topology();
        let mut scenario = FullDemo::new();
        scenario.configure_topology(&mut topology, &mut noise);

        scenario.on_tick(&mut env(&mut noise, &ctx, 12.5 / 60.0, 0.001), &mut topology).await;
        assert_eq!(scenario.phase(), Some(DemoPhase::Reconnection));
        assert_eq!(topology.online_coordinator_count(), 8);
        assert!(topology
            .coordinators()
            .filter(|c| c.farm_id == "farm-005")
            .all(|c| !c.online));

        scenario.on_tick(&mut env(&mut noise, &ctx, 14.5 / 60.0, 0.001), &mut topology).await;
        assert_eq!(scenario.phase(), Some(DemoPhase::Final));
        assert_eq!(topology.online_coordinator_count(), 10);
        assert_eq!(topology.online_tower_count(), 20);
    }

    #[tokio::test]
    async fn test_small_fleet_only_logs_missing_targets() {
        let ctx = test_context();
        let mut noise = Noise::new(1);
        let mut topology = build_topology(&TopologyConfig::default().with_farms(2).with_coordinators_per_farm(1));
        let mut scenario = FullDemo::new();
        scenario.configure_topology(&mut topology, &mut noise);

        scenario.on_tick(&mut env(&mut noise, &ctx, 13.0 / 60.0, 0.001), &mut topology).await;
        assert_eq!(topology.online_coordinator_count(), 2);
    }

    #[test]
    fn test_faults_stay_on_target_farm() {
        let ctx = test_context();
        let mut noise = Noise::silent(1);
        let mut topology = demo_topology();
        let mut scenario = FullDemo::new();
        scenario.configure_topology(&mut topology, &mut noise);
        let towers = vec![Tower::new("T", "C", "farm-003", CropType::Tomato)];
        let demand = Demand::of(&towers);
        let h = 7.0 / 60.0;

        let mut hit = Reservoir::new("C", "farm-003");
        hit.set_water_level(20.001);
        let mut coordinator = Coordinator::new("C", "farm-003", "Coordinator 3-1");
        scenario.update_reservoir(&mut env(&mut noise, &ctx, h, 0.01), &mut coordinator, &mut hit, &demand);
        assert!(hit.water_level_pct < LOW_WATER_THRESHOLD_PCT);
        assert!(!hit.main_pump_on);

        let mut spared = Reservoir::new("C", "farm-001");
        spared.set_water_level(20.001);
        let mut coordinator = Coordinator::new("C", "farm-001", "Coordinator 1-1");
        scenario.update_reservoir(&mut env(&mut noise, &ctx, h, 0.01), &mut coordinator, &mut spared, &demand);
        assert!(spared.main_pump_on);
    }

    #[test]
    fn test_faulted_farm_keeps_baseline_for_other_readings() {
        let ctx = test_context();
        let mut noise = Noise::silent(1);
        let mut scenario = FullDemo::new();
        let mut topology = demo_topology();
        scenario.configure_topology(&mut topology, &mut noise);
        let towers = vec![Tower::new("T", "C", "farm-001", CropType::Tomato)];
        let demand = Demand::of(&towers);

        // pH drift on farm 1: EC and level still deplete
        let mut reservoir = Reservoir::new("C", "farm-001");
        let mut coordinator = Coordinator::new("C", "farm-001", "Coordinator 1-1");
        let (ph, ec, level) = (reservoir.ph, reservoir.ec_ms_cm, reservoir.water_level_pct);
        scenario.update_reservoir(&mut env(&mut noise, &ctx, 2.0 / 60.0, 1.0), &mut coordinator, &mut reservoir, &demand);
        assert_abs_diff_eq!(reservoir.ph, ph + DEMO_PH_RATE, epsilon = 1e-9);
        assert!(reservoir.ec_ms_cm < ec);
        assert!(reservoir.water_level_pct < level);

        // Water emergency on farm 3: pH still drifts at the baseline rate
        let mut reservoir = Reservoir::new("C", "farm-003");
        let mut coordinator = Coordinator::new("C", "farm-003", "Coordinator 3-1");
        let (ph, ec) = (reservoir.ph, reservoir.ec_ms_cm);
        scenario.update_reservoir(&mut env(&mut noise, &ctx, 7.0 / 60.0, 1.0), &mut coordinator, &mut reservoir, &demand);
        assert_abs_diff_eq!(reservoir.ph, ph + DEFAULT_PH_DRIFT_RATE, epsilon = 1e-9);
        assert!(reservoir.ec_ms_cm < ec);
    }
}
