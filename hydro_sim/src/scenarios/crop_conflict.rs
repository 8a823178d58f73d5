//! Incompatible crops forced onto shared reservoirs.
//!
//! Physics stay baseline. The conflict lives in the data: tomato towers are
//! EC-starved at the compromise reservoir EC, lettuce is overloaded and
//! cilantro wants a higher pH than either.

use hydro_core::{CropType, Noise, Topology};
use tracing::info;

use super::{tower_ids_of, Scenario, ScenarioKind};

/// Crop per tower slot, repeated for coordinators with more towers.
pub const CONFLICT_PATTERN: [CropType; 10] = [
    CropType::Lettuce,
    CropType::Lettuce,
    CropType::Lettuce,
    CropType::Tomato,
    CropType::Tomato,
    CropType::Tomato,
    CropType::Mint,
    CropType::Mint,
    CropType::Cilantro,
    CropType::Cilantro,
];

/// Compromise reservoir chemistry between lettuce and tomato.
const COMPROMISE_EC: f64 = 1.8;
const COMPROMISE_PH: f64 = 6.2;

#[derive(Debug, Clone, Copy, Default)]
pub struct CropConflict;

impl Scenario for CropConflict {
    fn kind(&self) -> ScenarioKind {
        ScenarioKind::CropConflict
    }

    fn configure_topology(&mut self, topology: &mut Topology, _noise: &mut Noise) {
        for coord_id in topology.coordinator_ids() {
            for (slot, tower_id) in tower_ids_of(topology, &coord_id).iter().enumerate() {
                if let Some(tower) = topology.tower_mut(tower_id) {
                    tower.crop = CONFLICT_PATTERN[slot % CONFLICT_PATTERN.len()];
                }
            }
            if let Some(reservoir) = topology.reservoir_of_mut(&coord_id) {
                reservoir.ec_ms_cm = COMPROMISE_EC;
                reservoir.ph = COMPROMISE_PH;
            }
        }

        info!("Crop conflict: forced incompatible crops onto shared reservoirs");
        for crop in [CropType::Lettuce, CropType::Tomato, CropType::Mint, CropType::Cilantro] {
            let p = crop.profile();
            info!(
                "  {}: pH {:.1}-{:.1}, EC {:.1}-{:.1}",
                crop, p.ph_range.0, p.ph_range.1, p.ec_range.0, p.ec_range.1
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hydro_core::{build_topology, TopologyConfig};

    #[test]
    fn test_pattern_applied_per_coordinator() {
        let config = TopologyConfig::default()
            .with_farms(1)
            .with_coordinators_per_farm(2)
            .with_towers_per_coordinator(12);
        let mut topology = build_topology(&config);
        CropConflict.configure_topology(&mut topology, &mut Noise::new(1));

        for coord_id in topology.coordinator_ids() {
            let crops: Vec<CropType> = topology.towers_of(&coord_id).iter().map(|t| t.crop).collect();
            assert_eq!(&crops[..10], &CONFLICT_PATTERN);
            assert_eq!(crops[10], CropType::Lettuce);
            let reservoir = topology.reservoir_of(&coord_id).unwrap();
            assert_eq!((reservoir.ec_ms_cm, reservoir.ph), (1.8, 6.2));
        }
    }
}
