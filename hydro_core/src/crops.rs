//! Crop catalogue: static per-crop reference data.
//!
//! Every tower grows exactly one crop. The profile drives growth (max height,
//! harvest day) and the reservoir depletion physics (nutrient and water
//! consumption). Profiles are never mutated at runtime.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Reference values for one crop type.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CropProfile {
    /// Optimal reservoir pH
    pub ph_opt: f64,

    /// Acceptable pH window (low, high)
    pub ph_range: (f64, f64),

    /// Optimal electrical conductivity (mS/cm)
    pub ec_opt: f64,

    /// Acceptable EC window (low, high)
    pub ec_range: (f64, f64),

    /// Optimal air temperature (°C)
    pub temp_opt: f64,

    /// Acceptable air temperature window (low, high)
    pub temp_range: (f64, f64),

    /// Optimal relative humidity (%)
    pub humidity_opt: f64,

    /// Height at full maturity (cm)
    pub max_height_cm: f64,

    /// Days from planting to harvest
    pub harvest_days: f64,

    /// EC consumed per hour per tower, summed at reservoir scale (mS/cm/h)
    pub ec_consumption: f64,

    /// Water level consumed per hour per tower (%/h)
    pub water_consumption: f64,
}

/// Crop types known to the simulator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CropType {
    Lettuce,
    Basil,
    Spinach,
    Kale,
    Tomato,
    Pepper,
    Strawberry,
    Mint,
    Cilantro,
}

const LETTUCE: CropProfile = CropProfile {
    ph_opt: 6.0,
    ph_range: (5.5, 6.5),
    ec_opt: 1.0,
    ec_range: (0.8, 1.2),
    temp_opt: 20.0,
    temp_range: (15.0, 24.0),
    humidity_opt: 70.0,
    max_height_cm: 25.0,
    harvest_days: 45.0,
    ec_consumption: 0.020,
    water_consumption: 0.04,
};

const BASIL: CropProfile = CropProfile {
    ph_opt: 6.0,
    ph_range: (5.5, 6.5),
    ec_opt: 1.3,
    ec_range: (1.0, 1.6),
    temp_opt: 22.0,
    temp_range: (18.0, 28.0),
    humidity_opt: 65.0,
    max_height_cm: 30.0,
    harvest_days: 35.0,
    ec_consumption: 0.025,
    water_consumption: 0.05,
};

const SPINACH: CropProfile = CropProfile {
    ph_opt: 6.5,
    ph_range: (6.0, 7.0),
    ec_opt: 2.0,
    ec_range: (1.8, 2.3),
    temp_opt: 18.0,
    temp_range: (10.0, 24.0),
    humidity_opt: 65.0,
    max_height_cm: 20.0,
    harvest_days: 40.0,
    ec_consumption: 0.030,
    water_consumption: 0.04,
};

const KALE: CropProfile = CropProfile {
    ph_opt: 6.0,
    ph_range: (5.5, 6.5),
    ec_opt: 2.0,
    ec_range: (1.5, 2.5),
    temp_opt: 18.0,
    temp_range: (7.0, 24.0),
    humidity_opt: 65.0,
    max_height_cm: 35.0,
    harvest_days: 55.0,
    ec_consumption: 0.030,
    water_consumption: 0.05,
};

const TOMATO: CropProfile = CropProfile {
    ph_opt: 6.2,
    ph_range: (5.5, 6.8),
    ec_opt: 3.0,
    ec_range: (2.0, 5.0),
    temp_opt: 24.0,
    temp_range: (18.0, 32.0),
    humidity_opt: 60.0,
    max_height_cm: 100.0,
    harvest_days: 75.0,
    ec_consumption: 0.050,
    water_consumption: 0.08,
};

const PEPPER: CropProfile = CropProfile {
    ph_opt: 6.0,
    ph_range: (5.5, 6.8),
    ec_opt: 2.5,
    ec_range: (2.0, 3.5),
    temp_opt: 24.0,
    temp_range: (18.0, 32.0),
    humidity_opt: 60.0,
    max_height_cm: 60.0,
    harvest_days: 70.0,
    ec_consumption: 0.040,
    water_consumption: 0.07,
};

const STRAWBERRY: CropProfile = CropProfile {
    ph_opt: 6.0,
    ph_range: (5.5, 6.5),
    ec_opt: 1.2,
    ec_range: (1.0, 1.5),
    temp_opt: 20.0,
    temp_range: (15.0, 26.0),
    humidity_opt: 70.0,
    max_height_cm: 20.0,
    harvest_days: 60.0,
    ec_consumption: 0.020,
    water_consumption: 0.05,
};

const MINT: CropProfile = CropProfile {
    ph_opt: 6.0,
    ph_range: (5.5, 6.5),
    ec_opt: 2.0,
    ec_range: (1.6, 2.4),
    temp_opt: 21.0,
    temp_range: (15.0, 25.0),
    humidity_opt: 70.0,
    max_height_cm: 30.0,
    harvest_days: 30.0,
    ec_consumption: 0.025,
    water_consumption: 0.05,
};

const CILANTRO: CropProfile = CropProfile {
    ph_opt: 6.5,
    ph_range: (6.0, 7.0),
    ec_opt: 1.5,
    ec_range: (1.2, 1.8),
    temp_opt: 20.0,
    temp_range: (10.0, 24.0),
    humidity_opt: 65.0,
    max_height_cm: 25.0,
    harvest_days: 40.0,
    ec_consumption: 0.020,
    water_consumption: 0.04,
};

impl CropType {
    /// All crop types, in catalogue order.
    pub const ALL: [CropType; 9] = [
        CropType::Lettuce,
        CropType::Basil,
        CropType::Spinach,
        CropType::Kale,
        CropType::Tomato,
        CropType::Pepper,
        CropType::Strawberry,
        CropType::Mint,
        CropType::Cilantro,
    ];

    /// Returns the static reference profile for this crop.
    pub fn profile(&self) -> &'static CropProfile {
        match self {
            CropType::Lettuce => &LETTUCE,
            CropType::Basil => &BASIL,
            CropType::Spinach => &SPINACH,
            CropType::Kale => &KALE,
            CropType::Tomato => &TOMATO,
            CropType::Pepper => &PEPPER,
            CropType::Strawberry => &STRAWBERRY,
            CropType::Mint => &MINT,
            CropType::Cilantro => &CILANTRO,
        }
    }

    /// Returns the crop name as published in telemetry.
    pub fn name(&self) -> &'static str {
        match self {
            CropType::Lettuce => "lettuce",
            CropType::Basil => "basil",
            CropType::Spinach => "spinach",
            CropType::Kale => "kale",
            CropType::Tomato => "tomato",
            CropType::Pepper => "pepper",
            CropType::Strawberry => "strawberry",
            CropType::Mint => "mint",
            CropType::Cilantro => "cilantro",
        }
    }
}

impl std::fmt::Display for CropType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for CropType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        CropType::ALL
            .iter()
            .copied()
            .find(|c| c.name() == wanted)
            .ok_or_else(|| CoreError::UnknownCrop(s.to_string()))
    }
}
