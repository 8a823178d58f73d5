//! Topology builder: seeded construction of a farm graph from counts.
//!
//! Identifiers are derived from indices (MAC-style, one byte per level) so
//! they are stable across seeds; crop mix and initial sensor readings come
//! from a ChaCha8 stream seeded by [`TopologyConfig::seed`].

use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::crops::CropType;
use crate::model::{Coordinator, Farm, Reservoir, Topology, Tower};
use crate::physics::{growth_sigmoid, round_to, tds_from_ec, DEFAULT_TDS_FACTOR};

/// MAC prefix for coordinators.
pub const COORDINATOR_MAC_PREFIX: u16 = 0xAABB;

/// MAC prefix for towers.
pub const TOWER_MAC_PREFIX: u16 = 0xCCDD;

/// Upper bound of any per-level count (ids carry one byte per level).
pub const MAX_PER_LEVEL: usize = 255;

/// Farm cap used when back-computing from a total tower count.
pub const MAX_FARMS_FOR_SCALE: usize = 10;

/// Sizing and seeding of a generated topology.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopologyConfig {
    /// Number of farms
    pub farms: usize,

    /// Coordinators per farm
    pub coordinators_per_farm: usize,

    /// Towers per coordinator
    pub towers_per_coordinator: usize,

    /// Draw crops at random instead of cycling through the catalogue
    pub randomize_crops: bool,

    /// Seed for crop mix and initial readings
    pub seed: u64,
}

impl Default for TopologyConfig {
    fn default() -> Self {
        Self {
            farms: 5,
            coordinators_per_farm: 5,
            towers_per_coordinator: 10,
            randomize_crops: true,
            seed: 42,
        }
    }
}

impl TopologyConfig {
    /// Back-computes farm and coordinator counts that approximate `total`
    /// towers at `towers_per_coordinator` each, spreading coordinators over
    /// at most ten farms.
    pub fn for_total_towers(total: usize, towers_per_coordinator: usize, seed: u64) -> Self {
        let per_coord = towers_per_coordinator.clamp(1, MAX_PER_LEVEL);
        let n_coords = (total / per_coord).max(1);
        let farms = n_coords.min(MAX_FARMS_FOR_SCALE);
        let coordinators_per_farm = (n_coords / farms).max(1);
        Self {
            farms,
            coordinators_per_farm,
            towers_per_coordinator: per_coord,
            seed,
            ..Self::default()
        }
    }

    pub fn with_farms(mut self, farms: usize) -> Self {
        self.farms = farms;
        self
    }

    pub fn with_coordinators_per_farm(mut self, n: usize) -> Self {
        self.coordinators_per_farm = n;
        self
    }

    pub fn with_towers_per_coordinator(mut self, n: usize) -> Self {
        self.towers_per_coordinator = n;
        self
    }

    pub fn with_randomize_crops(mut self, randomize: bool) -> Self {
        self.randomize_crops = randomize;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Same configuration with every count pulled into `1..=255`.
    pub fn clamped(&self) -> Self {
        Self {
            farms: self.farms.clamp(1, MAX_PER_LEVEL),
            coordinators_per_farm: self.coordinators_per_farm.clamp(1, MAX_PER_LEVEL),
            towers_per_coordinator: self.towers_per_coordinator.clamp(1, MAX_PER_LEVEL),
            ..self.clone()
        }
    }
}

/// Entity counts of a topology.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TopologyStats {
    pub farms: usize,
    pub coordinators: usize,
    pub reservoirs: usize,
    pub towers: usize,
}

/// Formats a MAC-style id `PP:PP:FF:CC:TT:01`.
pub fn mac_id(prefix: u16, farm: usize, coord: usize, tower: usize) -> String {
    format!(
        "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:01",
        (prefix >> 8) & 0xFF,
        prefix & 0xFF,
        farm & 0xFF,
        coord & 0xFF,
        tower & 0xFF
    )
}

/// Builds the full hierarchy described by `config`.
///
/// Out-of-range counts degrade to the nearest valid topology rather than
/// failing.
pub fn build_topology(config: &TopologyConfig) -> Topology {
    let config = config.clamped();
    let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
    let mut topology = Topology::new();

    for fi in 1..=config.farms {
        let farm_id = format!("farm-{fi:03}");
        topology.add_farm(Farm::new(&farm_id, format!("Hydro Farm {fi}")));

        for ci in 1..=config.coordinators_per_farm {
            let coord_id = mac_id(COORDINATOR_MAC_PREFIX, fi, ci, 0);
            let mut coordinator =
                Coordinator::new(&coord_id, &farm_id, format!("Coordinator {fi}-{ci}"));
            coordinator.ip = format!("192.168.{fi}.{}", ci + 10);

            let mut reservoir = Reservoir::new(&coord_id, &farm_id);
            reservoir.ph = round_to(rng.gen_range(5.8..6.3), 2);
            reservoir.ec_ms_cm = round_to(rng.gen_range(1.2..2.0), 2);
            reservoir.water_temp_c = round_to(rng.gen_range(19.0..21.0), 1);
            reservoir.set_water_level(round_to(rng.gen_range(75.0..95.0), 1));
            reservoir.tds_ppm = tds_from_ec(reservoir.ec_ms_cm, DEFAULT_TDS_FACTOR).round();

            let mut towers = Vec::with_capacity(config.towers_per_coordinator);
            for ti in 1..=config.towers_per_coordinator {
                let crop = if config.randomize_crops {
                    *CropType::ALL.choose(&mut rng).unwrap_or(&CropType::Lettuce)
                } else {
                    CropType::ALL[(ti - 1) % CropType::ALL.len()]
                };

                let mut tower = Tower::new(
                    mac_id(TOWER_MAC_PREFIX, fi, ci, ti),
                    &coord_id,
                    &farm_id,
                    crop,
                );
                tower.planting_offset_days = round_to(rng.gen_range(1.0..20.0), 1);
                tower.signal_quality = rng.gen_range(-65..=-30);
                tower.vbat_mv = rng.gen_range(3400..=3800);
                let profile = crop.profile();
                tower.height_cm = round_to(
                    growth_sigmoid(
                        tower.planting_offset_days,
                        profile.max_height_cm,
                        profile.harvest_days,
                    ),
                    1,
                );
                towers.push(tower);
            }

            // Parents exist by construction, so wiring cannot fail
            let wired = topology
                .add_coordinator(coordinator)
                .and_then(|_| topology.set_reservoir(reservoir))
                .and_then(|_| towers.into_iter().try_for_each(|t| topology.add_tower(t)));
            debug_assert!(wired.is_ok());
        }
    }

    topology
}
