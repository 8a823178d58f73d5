//! Entity model: farms, coordinators, towers and reservoirs.
//!
//! Entities are plain records with no behaviour. They live in an arena
//! ([`Topology`]) keyed by stable string ids; children point at their
//! parents by id and parents list their children's ids in order. Ownership
//! is exclusive: a tower or reservoir belongs to exactly one coordinator,
//! and a coordinator to exactly one farm.

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;

use crate::crops::CropType;
use crate::error::CoreError;
use crate::physics::{clamp, round_to, WATER_LEVEL_BOUNDS};
use crate::topology::TopologyStats;

/// Water level (%) below which a reservoir raises its low-water alert.
pub const LOW_WATER_THRESHOLD_PCT: f64 = 20.0;

/// Reported depth (cm) per percent of water level.
pub const LEVEL_CM_PER_PCT: f64 = 0.4;

/// A farm groups coordinators.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Farm {
    pub farm_id: String,
    pub name: String,
    /// Owned coordinators, in build order
    pub coordinator_ids: Vec<String>,
}

impl Farm {
    pub fn new(farm_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            farm_id: farm_id.into(),
            name: name.into(),
            coordinator_ids: Vec::new(),
        }
    }
}

/// A network hub managing one reservoir and a set of towers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Coordinator {
    /// MAC-style identity
    pub coord_id: String,
    pub farm_id: String,
    pub name: String,

    /// Owned reservoir, if created
    pub reservoir_id: Option<String>,

    /// Owned (attached) towers, in attach order
    pub tower_ids: Vec<String>,

    // System telemetry
    pub fw_version: String,
    pub wifi_rssi: i32,
    /// Ambient temperature near the reservoir (°C)
    pub temp_c: f64,
    pub uptime_s: u64,
    pub status_mode: String,
    pub ip: String,
    pub free_heap: u32,

    /// Reachable over the transport
    pub online: bool,
}

impl Coordinator {
    pub fn new(
        coord_id: impl Into<String>,
        farm_id: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            coord_id: coord_id.into(),
            farm_id: farm_id.into(),
            name: name.into(),
            reservoir_id: None,
            tower_ids: Vec::new(),
            fw_version: "2.1.0".to_string(),
            wifi_rssi: -45,
            temp_c: 22.0,
            uptime_s: 0,
            status_mode: "operational".to_string(),
            ip: "192.168.1.10".to_string(),
            free_heap: 200_000,
            online: true,
        }
    }
}

/// A single plant-growing unit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Tower {
    /// MAC-style identity
    pub tower_id: String,
    /// Current (or last) owning coordinator
    pub coord_id: String,
    pub farm_id: String,

    pub crop: CropType,
    /// Crop age (days) at simulated time zero
    pub planting_offset_days: f64,

    // Sensors
    pub air_temp_c: f64,
    pub humidity_pct: f64,
    pub light_lux: f64,
    pub light_on: bool,
    pub pump_on: bool,
    /// PWM level 0..=255
    pub light_brightness: u8,
    pub height_cm: f64,

    // Device
    pub vbat_mv: u32,
    pub fw_version: String,
    pub uptime_s: u64,
    pub signal_quality: i32,
    pub status_mode: String,

    /// Present on the network; independent of any reported status
    #[serde(skip)]
    connected: bool,
}

impl Tower {
    pub fn new(
        tower_id: impl Into<String>,
        coord_id: impl Into<String>,
        farm_id: impl Into<String>,
        crop: CropType,
    ) -> Self {
        Self {
            tower_id: tower_id.into(),
            coord_id: coord_id.into(),
            farm_id: farm_id.into(),
            crop,
            planting_offset_days: 0.0,
            air_temp_c: 22.0,
            humidity_pct: 65.0,
            light_lux: 0.0,
            light_on: false,
            pump_on: true,
            light_brightness: 200,
            height_cm: 0.0,
            vbat_mv: 3700,
            fw_version: "1.2.0".to_string(),
            uptime_s: 0,
            signal_quality: -40,
            status_mode: "operational".to_string(),
            connected: true,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn set_connected(&mut self, connected: bool) {
        self.connected = connected;
    }
}

/// The shared nutrient-water tank of a coordinator.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reservoir {
    /// `{coord_id}:RES`
    pub reservoir_id: String,
    pub coord_id: String,
    pub farm_id: String,

    // Water chemistry
    pub ph: f64,
    pub ec_ms_cm: f64,
    pub tds_ppm: f64,
    pub water_temp_c: f64,
    pub water_level_pct: f64,
    pub water_level_cm: f64,

    // Actuators
    pub main_pump_on: bool,
    pub dosing_pump_ph_on: bool,
    pub dosing_pump_nutrient_on: bool,

    pub low_water_alert: bool,
}

impl Reservoir {
    pub fn new(coord_id: impl Into<String>, farm_id: impl Into<String>) -> Self {
        let coord_id = coord_id.into();
        let mut reservoir = Self {
            reservoir_id: format!("{coord_id}:RES"),
            coord_id,
            farm_id: farm_id.into(),
            ph: 6.0,
            ec_ms_cm: 1.5,
            tds_ppm: 750.0,
            water_temp_c: 20.0,
            water_level_pct: 0.0,
            water_level_cm: 0.0,
            main_pump_on: true,
            dosing_pump_ph_on: false,
            dosing_pump_nutrient_on: false,
            low_water_alert: false,
        };
        reservoir.set_water_level(85.0);
        reservoir
    }

    /// Sets the level (clamped to 0..=100 %) and keeps depth and the
    /// low-water flag in sync.
    pub fn set_water_level(&mut self, pct: f64) {
        self.water_level_pct = clamp(pct, WATER_LEVEL_BOUNDS.0, WATER_LEVEL_BOUNDS.1);
        self.water_level_cm = round_to(self.water_level_pct * LEVEL_CM_PER_PCT, 1);
        self.low_water_alert = self.water_level_pct < LOW_WATER_THRESHOLD_PCT;
    }
}

/// Aggregate resource demand of the online towers sharing one reservoir.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Demand {
    pub online_towers: usize,
    /// Summed EC consumption (mS/cm/h)
    pub ec_rate: f64,
    /// Summed water consumption (%/h)
    pub water_rate: f64,
}

impl Demand {
    /// Sums crop consumption over the connected towers in `towers`.
    pub fn of<'a>(towers: impl IntoIterator<Item = &'a Tower>) -> Self {
        towers
            .into_iter()
            .filter(|t| t.is_connected())
            .fold(Demand::default(), |mut d, t| {
                let profile = t.crop.profile();
                d.online_towers += 1;
                d.ec_rate += profile.ec_consumption;
                d.water_rate += profile.water_consumption;
                d
            })
    }

    /// Mean water consumption per online tower, 0 with no towers online.
    pub fn water_rate_per_tower(&self) -> f64 {
        if self.online_towers == 0 {
            0.0
        } else {
            self.water_rate / self.online_towers as f64
        }
    }
}

/// Simultaneous mutable access to one coordinator and everything it owns.
#[derive(Debug)]
pub struct CoordinatorParts<'a> {
    pub coordinator: &'a mut Coordinator,
    pub reservoir: Option<&'a mut Reservoir>,
    /// Attached towers, in the coordinator's order
    pub towers: Vec<&'a mut Tower>,
}

/// Arena holding the whole farm graph.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Topology {
    farms: Vec<Farm>,
    coordinators: BTreeMap<String, Coordinator>,
    towers: BTreeMap<String, Tower>,
    reservoirs: BTreeMap<String, Reservoir>,
}

impl Topology {
    pub fn new() -> Self {
        Self::default()
    }

    // ---------------------------------------------------------------------
    // Construction
    // ---------------------------------------------------------------------

    pub fn add_farm(&mut self, farm: Farm) {
        self.farms.push(farm);
    }

    /// Adds a coordinator under its `farm_id`.
    pub fn add_coordinator(&mut self, coordinator: Coordinator) -> Result<(), CoreError> {
        let farm = self
            .farms
            .iter_mut()
            .find(|f| f.farm_id == coordinator.farm_id)
            .ok_or_else(|| CoreError::UnknownEntity(coordinator.farm_id.clone()))?;
        farm.coordinator_ids.push(coordinator.coord_id.clone());
        self.coordinators
            .insert(coordinator.coord_id.clone(), coordinator);
        Ok(())
    }

    /// Installs `reservoir` as the single reservoir of its coordinator,
    /// replacing any previous one.
    pub fn set_reservoir(&mut self, reservoir: Reservoir) -> Result<(), CoreError> {
        let coordinator = self
            .coordinators
            .get_mut(&reservoir.coord_id)
            .ok_or_else(|| CoreError::UnknownEntity(reservoir.coord_id.clone()))?;
        if let Some(old) = coordinator.reservoir_id.replace(reservoir.reservoir_id.clone()) {
            self.reservoirs.remove(&old);
        }
        self.reservoirs
            .insert(reservoir.reservoir_id.clone(), reservoir);
        Ok(())
    }

    /// Adds a tower attached to its `coord_id`.
    pub fn add_tower(&mut self, tower: Tower) -> Result<(), CoreError> {
        let coordinator = self
            .coordinators
            .get_mut(&tower.coord_id)
            .ok_or_else(|| CoreError::UnknownEntity(tower.coord_id.clone()))?;
        coordinator.tower_ids.push(tower.tower_id.clone());
        self.towers.insert(tower.tower_id.clone(), tower);
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Queries
    // ---------------------------------------------------------------------

    pub fn farms(&self) -> &[Farm] {
        &self.farms
    }

    pub fn farm(&self, farm_id: &str) -> Option<&Farm> {
        self.farms.iter().find(|f| f.farm_id == farm_id)
    }

    pub fn coordinator(&self, coord_id: &str) -> Option<&Coordinator> {
        self.coordinators.get(coord_id)
    }

    pub fn coordinator_mut(&mut self, coord_id: &str) -> Option<&mut Coordinator> {
        self.coordinators.get_mut(coord_id)
    }

    pub fn tower(&self, tower_id: &str) -> Option<&Tower> {
        self.towers.get(tower_id)
    }

    pub fn tower_mut(&mut self, tower_id: &str) -> Option<&mut Tower> {
        self.towers.get_mut(tower_id)
    }

    pub fn reservoir(&self, reservoir_id: &str) -> Option<&Reservoir> {
        self.reservoirs.get(reservoir_id)
    }

    /// Reservoir owned by `coord_id`.
    pub fn reservoir_of(&self, coord_id: &str) -> Option<&Reservoir> {
        self.coordinators
            .get(coord_id)
            .and_then(|c| c.reservoir_id.as_deref())
            .and_then(|rid| self.reservoirs.get(rid))
    }

    pub fn reservoir_of_mut(&mut self, coord_id: &str) -> Option<&mut Reservoir> {
        let rid = self.coordinators.get(coord_id)?.reservoir_id.as_deref()?;
        self.reservoirs.get_mut(rid)
    }

    /// All coordinator ids, farm by farm in build order.
    pub fn coordinator_ids(&self) -> Vec<String> {
        self.farms
            .iter()
            .flat_map(|f| f.coordinator_ids.iter().cloned())
            .collect()
    }

    pub fn coordinators(&self) -> impl Iterator<Item = &Coordinator> {
        self.farms
            .iter()
            .flat_map(|f| f.coordinator_ids.iter())
            .filter_map(|id| self.coordinators.get(id))
    }

    /// Every tower record, attached or not.
    pub fn towers(&self) -> impl Iterator<Item = &Tower> {
        self.towers.values()
    }

    pub fn towers_mut(&mut self) -> impl Iterator<Item = &mut Tower> {
        self.towers.values_mut()
    }

    pub fn reservoirs_mut(&mut self) -> impl Iterator<Item = &mut Reservoir> {
        self.reservoirs.values_mut()
    }

    /// Attached towers of `coord_id`, in attach order.
    pub fn towers_of(&self, coord_id: &str) -> Vec<&Tower> {
        self.coordinators
            .get(coord_id)
            .map(|c| {
                c.tower_ids
                    .iter()
                    .filter_map(|id| self.towers.get(id))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Borrows a coordinator, its reservoir and its attached towers mutably
    /// at the same time.
    pub fn coordinator_parts_mut(&mut self, coord_id: &str) -> Option<CoordinatorParts<'_>> {
        let coordinator = self.coordinators.get_mut(coord_id)?;

        let mut by_id: HashMap<&str, &mut Tower> = self
            .towers
            .iter_mut()
            .filter(|(_, t)| t.coord_id == coord_id)
            .map(|(id, t)| (id.as_str(), t))
            .collect();
        let towers = coordinator
            .tower_ids
            .iter()
            .filter_map(|id| by_id.remove(id.as_str()))
            .collect();

        let reservoir = match coordinator.reservoir_id.as_deref() {
            Some(rid) => self.reservoirs.get_mut(rid),
            None => None,
        };

        Some(CoordinatorParts {
            coordinator,
            reservoir,
            towers,
        })
    }

    pub fn stats(&self) -> TopologyStats {
        TopologyStats {
            farms: self.farms.len(),
            coordinators: self.coordinators.len(),
            reservoirs: self.reservoirs.len(),
            towers: self.towers.len(),
        }
    }

    /// Number of towers currently attached and connected.
    pub fn online_tower_count(&self) -> usize {
        self.coordinators
            .values()
            .filter(|c| c.online)
            .flat_map(|c| c.tower_ids.iter())
            .filter_map(|id| self.towers.get(id))
            .filter(|t| t.is_connected())
            .count()
    }

    pub fn online_coordinator_count(&self) -> usize {
        self.coordinators.values().filter(|c| c.online).count()
    }

    // ---------------------------------------------------------------------
    // Ownership changes
    // ---------------------------------------------------------------------

    /// Removes a tower from its coordinator's list and marks it
    /// disconnected. The record stays in the arena.
    pub fn detach_tower(&mut self, tower_id: &str) -> Result<(), CoreError> {
        let tower = self
            .towers
            .get_mut(tower_id)
            .ok_or_else(|| CoreError::UnknownEntity(tower_id.to_string()))?;
        tower.set_connected(false);
        if let Some(coordinator) = self.coordinators.get_mut(&tower.coord_id) {
            coordinator.tower_ids.retain(|id| id != tower_id);
        }
        Ok(())
    }

    /// Attaches a tower to `coord_id` and marks it connected. A tower that
    /// is still attached elsewhere is moved, never duplicated.
    pub fn attach_tower(&mut self, tower_id: &str, coord_id: &str) -> Result<(), CoreError> {
        if !self.towers.contains_key(tower_id) {
            return Err(CoreError::UnknownEntity(tower_id.to_string()));
        }
        let farm_id = self
            .coordinators
            .get(coord_id)
            .map(|c| c.farm_id.clone())
            .ok_or_else(|| CoreError::UnknownEntity(coord_id.to_string()))?;

        self.detach_tower(tower_id)?;

        if let Some(tower) = self.towers.get_mut(tower_id) {
            tower.coord_id = coord_id.to_string();
            tower.farm_id = farm_id;
            tower.set_connected(true);
        }
        if let Some(coordinator) = self.coordinators.get_mut(coord_id) {
            coordinator.tower_ids.push(tower_id.to_string());
        }
        Ok(())
    }

    /// Toggles a coordinator's online flag; its attached towers follow.
    pub fn set_coordinator_online(&mut self, coord_id: &str, online: bool) -> Result<(), CoreError> {
        let coordinator = self
            .coordinators
            .get_mut(coord_id)
            .ok_or_else(|| CoreError::UnknownEntity(coord_id.to_string()))?;
        coordinator.online = online;
        for id in &coordinator.tower_ids {
            if let Some(tower) = self.towers.get_mut(id) {
                tower.set_connected(online);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small() -> Topology {
        let mut topo = Topology::new();
        topo.add_farm(Farm::new("farm-001", "Hydro Farm 1"));
        topo.add_coordinator(Coordinator::new("C1", "farm-001", "Coordinator 1-1"))
            .unwrap();
        topo.add_coordinator(Coordinator::new("C2", "farm-001", "Coordinator 1-2"))
            .unwrap();
        topo.set_reservoir(Reservoir::new("C1", "farm-001")).unwrap();
        for id in ["T1", "T2", "T3"] {
            topo.add_tower(Tower::new(id, "C1", "farm-001", CropType::Lettuce))
                .unwrap();
        }
        topo
    }

    #[test]
    fn test_unknown_parent_rejected() {
        let mut topo = small();
        let err = topo
            .add_tower(Tower::new("T9", "nope", "farm-001", CropType::Basil))
            .unwrap_err();
        assert_eq!(err, CoreError::UnknownEntity("nope".to_string()));
        assert!(topo.add_coordinator(Coordinator::new("C9", "farm-999", "x")).is_err());
    }

    #[test]
    fn test_parts_preserve_tower_order() {
        let mut topo = small();
        let parts = topo.coordinator_parts_mut("C1").unwrap();
        let ids: Vec<_> = parts.towers.iter().map(|t| t.tower_id.as_str()).collect();
        assert_eq!(ids, ["T1", "T2", "T3"]);
        assert!(parts.reservoir.is_some());

        let parts = topo.coordinator_parts_mut("C2").unwrap();
        assert!(parts.towers.is_empty());
        assert!(parts.reservoir.is_none());
    }

    #[test]
    fn test_detach_then_attach_moves_ownership() {
        let mut topo = small();
        topo.detach_tower("T2").unwrap();
        assert_eq!(topo.coordinator("C1").unwrap().tower_ids, ["T1", "T3"]);
        assert!(!topo.tower("T2").unwrap().is_connected());

        topo.attach_tower("T2", "C2").unwrap();
        assert_eq!(topo.coordinator("C2").unwrap().tower_ids, ["T2"]);
        assert_eq!(topo.tower("T2").unwrap().coord_id, "C2");
        assert!(topo.tower("T2").unwrap().is_connected());

        // Attaching an attached tower moves it rather than duplicating it
        topo.attach_tower("T1", "C2").unwrap();
        assert_eq!(topo.coordinator("C1").unwrap().tower_ids, ["T3"]);
        assert_eq!(topo.coordinator("C2").unwrap().tower_ids, ["T2", "T1"]);
        assert_eq!(topo.stats().towers, 3);
    }

    #[test]
    fn test_coordinator_offline_disconnects_towers() {
        let mut topo = small();
        assert_eq!(topo.online_tower_count(), 3);
        topo.set_coordinator_online("C1", false).unwrap();
        assert_eq!(topo.online_tower_count(), 0);
        assert!(topo.towers_of("C1").iter().all(|t| !t.is_connected()));
        topo.set_coordinator_online("C1", true).unwrap();
        assert_eq!(topo.online_tower_count(), 3);
    }

    #[test]
    fn test_demand_sums_connected_towers() {
        let mut topo = small();
        topo.tower_mut("T3").unwrap().set_connected(false);
        let demand = Demand::of(topo.towers_of("C1"));
        assert_eq!(demand.online_towers, 2);
        assert!((demand.ec_rate - 0.04).abs() < 1e-12);
        assert!((demand.water_rate_per_tower() - 0.04).abs() < 1e-12);
        assert_eq!(Demand::default().water_rate_per_tower(), 0.0);
    }

    #[test]
    fn test_reservoir_level_helpers() {
        let mut res = Reservoir::new("C1", "farm-001");
        assert_eq!(res.reservoir_id, "C1:RES");
        assert_eq!(res.water_level_cm, 34.0);
        res.set_water_level(-5.0);
        assert_eq!(res.water_level_pct, 0.0);
        assert!(res.low_water_alert);
        res.set_water_level(150.0);
        assert_eq!(res.water_level_pct, 100.0);
        assert!(!res.low_water_alert);
    }
}
