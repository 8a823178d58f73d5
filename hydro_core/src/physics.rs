//! Stateless sensor physics for hydroponic towers and reservoirs.
//!
//! Every function takes the previous value(s), an elapsed time in simulated
//! hours and optional parameters, and returns the next value. Curves are
//! phenomenological (cosines, exponential approach, logistic growth), not
//! agronomic models.
//!
//! All outputs stay finite for any finite input; clamped outputs stay inside
//! their documented bounds even for NaN or infinite inputs.

use std::f64::consts::PI;

use crate::noise::Noise;

/// Valid reservoir pH range.
pub const PH_BOUNDS: (f64, f64) = (3.0, 9.0);

/// Valid EC range (mS/cm).
pub const EC_BOUNDS: (f64, f64) = (0.0, 10.0);

/// Valid water level range (%).
pub const WATER_LEVEL_BOUNDS: (f64, f64) = (0.0, 100.0);

/// Range produced by [`humidity_from_temp`] (%).
pub const HUMIDITY_BOUNDS: (f64, f64) = (30.0, 95.0);

/// Default natural acidification rate (pH units per hour).
pub const DEFAULT_PH_DRIFT_RATE: f64 = -0.015;

/// Default TDS/EC conversion (ppm per mS/cm).
pub const DEFAULT_TDS_FACTOR: f64 = 500.0;

/// Default fraction of the air/water temperature gap closed per hour.
pub const DEFAULT_THERMAL_LAG: f64 = 0.15;

/// Clamps `value` to `[lo, hi]`. NaN maps to `lo`.
pub fn clamp(value: f64, lo: f64, hi: f64) -> f64 {
    // f64::max ignores a NaN receiver, so NaN collapses to `lo` here
    value.max(lo).min(hi)
}

/// Rounds to a fixed number of decimals, matching what devices report.
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

// =============================================================================
// TEMPERATURE / HUMIDITY
// =============================================================================

/// Cosine day/night ambient temperature.
///
/// Peaks at `peak_hour` (24-h clock) and bottoms out 12 hours later.
pub fn day_night_temp(sim_hours: f64, base: f64, amplitude: f64, peak_hour: f64) -> f64 {
    let hour_of_day = sim_hours.rem_euclid(24.0);
    let phase = 2.0 * PI * (hour_of_day - peak_hour) / 24.0;
    base + amplitude * phase.cos()
}

/// [`day_night_temp`] with the greenhouse defaults: 22 °C ± 4 °C, peak 14:00.
pub fn ambient_temp(sim_hours: f64) -> f64 {
    day_night_temp(sim_hours, 22.0, 4.0, 14.0)
}

/// Relative humidity falls linearly as air warms above 22 °C.
///
/// Every degree above 22 °C removes `sensitivity` percent. Result is clamped
/// to [`HUMIDITY_BOUNDS`]; callers may clamp tighter.
pub fn humidity_from_temp(temp: f64, base_humidity: f64, sensitivity: f64) -> f64 {
    clamp(
        base_humidity - sensitivity * (temp - 22.0),
        HUMIDITY_BOUNDS.0,
        HUMIDITY_BOUNDS.1,
    )
}

// =============================================================================
// LIGHT
// =============================================================================

/// Grow-light on-window with linear ramps at each edge.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LightSchedule {
    /// Hour the lights switch on (24-h clock)
    pub on_hour: f64,
    /// Hour the lights switch off (may be < `on_hour` for windows spanning midnight)
    pub off_hour: f64,
    /// Intensity at full brightness (lux)
    pub max_lux: f64,
    /// Ramp length at each edge of the window (minutes)
    pub ramp_minutes: f64,
}

impl Default for LightSchedule {
    fn default() -> Self {
        // 16/8 photoperiod
        Self {
            on_hour: 6.0,
            off_hour: 22.0,
            max_lux: 30_000.0,
            ramp_minutes: 30.0,
        }
    }
}

/// Returns `(is_on, lux)` for the given simulated hour.
///
/// Inside the window, intensity ramps linearly from 0 to `max_lux` over
/// `ramp_minutes` at both edges. Outside it, the lights are off and a small
/// ambient level (≤ 5 lux) is reported.
pub fn grow_light(sim_hours: f64, schedule: &LightSchedule, noise: &mut Noise) -> (bool, f64) {
    let hour = sim_hours.rem_euclid(24.0);
    let on = schedule.on_hour.rem_euclid(24.0);
    let off = schedule.off_hour.rem_euclid(24.0);

    let in_window = if on < off {
        on <= hour && hour < off
    } else {
        hour >= on || hour < off
    };

    if !in_window {
        return (false, clamp(noise.jitter(2.5, 1.5), 0.0, 5.0));
    }

    let elapsed = (hour - on).rem_euclid(24.0);
    let window_len = (off - on).rem_euclid(24.0);
    let remaining = window_len - elapsed;

    let ramp_h = schedule.ramp_minutes / 60.0;
    let ramp = if ramp_h > 0.0 {
        (elapsed / ramp_h).min(remaining / ramp_h).min(1.0)
    } else {
        1.0
    };

    (true, schedule.max_lux * clamp(ramp, 0.0, 1.0))
}

// =============================================================================
// WATER CHEMISTRY
// =============================================================================

/// Linear pH drift at `rate` pH units per hour (negative = acidifying),
/// clamped to [`PH_BOUNDS`].
pub fn ph_drift(current: f64, dt_hours: f64, rate: f64) -> f64 {
    clamp(current + rate * dt_hours, PH_BOUNDS.0, PH_BOUNDS.1)
}

/// Nutrient uptake: EC falls by the summed consumption of every online
/// tower on the reservoir. Never negative.
pub fn ec_depletion(current: f64, dt_hours: f64, total_consumption_rate: f64) -> f64 {
    (current - total_consumption_rate * dt_hours).max(0.0)
}

/// Evapotranspiration + uptake: level (%) falls by `rate_per_tower` for each
/// of `n_towers`. Clamped to [`WATER_LEVEL_BOUNDS`].
pub fn water_level_depletion(
    current: f64,
    dt_hours: f64,
    n_towers: usize,
    rate_per_tower: f64,
) -> f64 {
    clamp(
        current - rate_per_tower * n_towers as f64 * dt_hours,
        WATER_LEVEL_BOUNDS.0,
        WATER_LEVEL_BOUNDS.1,
    )
}

/// Thermal lag: water temperature approaches `target_temp` exponentially,
/// closing roughly `lag_factor` of the gap per hour.
///
/// Uses `1 - e^(-lag·dt)` rather than `lag·dt` so large steps never
/// overshoot the target.
pub fn water_temp_track(
    target_temp: f64,
    current_water_temp: f64,
    dt_hours: f64,
    lag_factor: f64,
) -> f64 {
    let closed = 1.0 - (-(lag_factor * dt_hours).max(0.0)).exp();
    current_water_temp + (target_temp - current_water_temp) * closed
}

/// Total dissolved solids (ppm) from EC (mS/cm).
pub fn tds_from_ec(ec_ms_cm: f64, factor: f64) -> f64 {
    ec_ms_cm * factor
}

// =============================================================================
// GROWTH
// =============================================================================

/// Logistic plant height curve.
///
/// Inflection sits at 45 % of `harvest_days`, steepness is `8 / harvest_days`,
/// so height reaches ~98.8 % of `max_height_cm` on harvest day. Returns 0 for
/// non-positive days or a non-positive harvest period.
pub fn growth_sigmoid(days_since_planting: f64, max_height_cm: f64, harvest_days: f64) -> f64 {
    if !(days_since_planting > 0.0) || !(harvest_days > 0.0) {
        return 0.0;
    }
    let midpoint = harvest_days * 0.45;
    let k = 8.0 / harvest_days;
    let exponent = clamp(-k * (days_since_planting - midpoint), -20.0, 20.0);
    max_height_cm / (1.0 + exponent.exp())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use proptest::prelude::*;

    #[test]
    fn test_day_night_peak_and_trough() {
        assert_abs_diff_eq!(ambient_temp(14.0), 26.0, epsilon = 1e-9);
        assert_abs_diff_eq!(ambient_temp(2.0), 18.0, epsilon = 1e-9);
        // Periodic over 24 h
        assert_abs_diff_eq!(ambient_temp(38.0), ambient_temp(14.0), epsilon = 1e-9);
    }

    #[test]
    fn test_humidity_inverse_of_temperature() {
        assert_abs_diff_eq!(humidity_from_temp(22.0, 70.0, 1.5), 70.0);
        assert!(humidity_from_temp(30.0, 70.0, 1.5) < 70.0);
        assert_eq!(humidity_from_temp(100.0, 70.0, 1.5), 30.0);
        assert_eq!(humidity_from_temp(-100.0, 70.0, 1.5), 95.0);
    }

    #[test]
    fn test_grow_light_ramps_at_edges() {
        let schedule = LightSchedule::default();
        let mut noise = Noise::silent(1);

        let (on, lux) = grow_light(6.25, &schedule, &mut noise);
        assert!(on);
        assert_abs_diff_eq!(lux, 15_000.0, epsilon = 1e-6);

        let (on, lux) = grow_light(12.0, &schedule, &mut noise);
        assert!(on);
        assert_abs_diff_eq!(lux, 30_000.0);

        let (on, lux) = grow_light(21.75, &schedule, &mut noise);
        assert!(on);
        assert_abs_diff_eq!(lux, 15_000.0, epsilon = 1e-6);

        let (on, lux) = grow_light(23.0, &schedule, &mut noise);
        assert!(!on);
        assert!(lux <= 5.0);
    }

    #[test]
    fn test_grow_light_window_across_midnight() {
        let schedule = LightSchedule {
            on_hour: 20.0,
            off_hour: 4.0,
            ..LightSchedule::default()
        };
        let mut noise = Noise::silent(1);
        assert!(grow_light(1.0, &schedule, &mut noise).0);
        assert!(grow_light(22.0, &schedule, &mut noise).0);
        assert!(!grow_light(12.0, &schedule, &mut noise).0);
    }

    #[test]
    fn test_ec_depletion_floor() {
        assert_eq!(ec_depletion(0.5, 100.0, 1.0), 0.0);
        assert_abs_diff_eq!(ec_depletion(1.5, 2.0, 0.1), 1.3);
    }

    #[test]
    fn test_water_temp_converges_without_overshoot() {
        let mut water = 18.0;
        for _ in 0..100 {
            water = water_temp_track(25.0, water, 24.0, DEFAULT_THERMAL_LAG);
            assert!(water <= 25.0);
        }
        assert_abs_diff_eq!(water, 25.0, epsilon = 1e-6);
    }

    #[test]
    fn test_tds_default_factor() {
        assert_eq!(tds_from_ec(1.5, DEFAULT_TDS_FACTOR), 750.0);
    }

    #[test]
    fn test_growth_edges() {
        assert_eq!(growth_sigmoid(0.0, 25.0, 45.0), 0.0);
        assert_eq!(growth_sigmoid(-3.0, 25.0, 45.0), 0.0);
        assert_eq!(growth_sigmoid(10.0, 25.0, 0.0), 0.0);
        let at_harvest = growth_sigmoid(45.0, 25.0, 45.0);
        assert!(at_harvest >= 0.95 * 25.0 && at_harvest <= 25.0);
        assert!(growth_sigmoid(1e300, 25.0, 45.0).is_finite());
    }

    #[test]
    fn test_round_to() {
        assert_eq!(round_to(6.123, 2), 6.12);
        assert_eq!(round_to(34.06, 1), 34.1);
    }

    proptest! {
        #[test]
        fn prop_ph_drift_stays_in_bounds(
            current in -1e6f64..1e6,
            dt in 0.0f64..1e6,
            rate in -1e6f64..1e6,
        ) {
            let ph = ph_drift(current, dt, rate);
            prop_assert!((PH_BOUNDS.0..=PH_BOUNDS.1).contains(&ph));
        }

        #[test]
        fn prop_ec_depletion_never_negative(
            current in 0.0f64..100.0,
            dt in 0.0f64..1e6,
            rate in -1e3f64..1e6,
        ) {
            prop_assert!(ec_depletion(current, dt, rate) >= 0.0);
        }

        #[test]
        fn prop_water_level_in_bounds(
            current in -1e3f64..1e3,
            dt in 0.0f64..1e4,
            towers in 0usize..10_000,
            rate in -10.0f64..10.0,
        ) {
            let level = water_level_depletion(current, dt, towers, rate);
            prop_assert!((0.0..=100.0).contains(&level));
        }

        #[test]
        fn prop_growth_monotonic(
            d1 in -100.0f64..500.0,
            step in 0.0f64..100.0,
            max_height in 1.0f64..200.0,
            harvest in 1.0f64..200.0,
        ) {
            let h1 = growth_sigmoid(d1, max_height, harvest);
            let h2 = growth_sigmoid(d1 + step, max_height, harvest);
            prop_assert!(h2 >= h1);
            prop_assert!(h2 <= max_height);
        }

        #[test]
        fn prop_growth_near_max_at_harvest(
            max_height in 1.0f64..200.0,
            harvest in 1.0f64..500.0,
        ) {
            let h = growth_sigmoid(harvest, max_height, harvest);
            prop_assert!((h - max_height).abs() <= 0.05 * max_height);
        }
    }
}
