//! Baseline physics, split into composable steps.
//!
//! [`tower_physics`] and [`reservoir_physics`] are what every scenario gets
//! by default. Variants that change one quantity call the individual steps
//! for everything else.

use hydro_core::physics::{
    ambient_temp, clamp, ec_depletion, grow_light, growth_sigmoid, humidity_from_temp, ph_drift,
    round_to, tds_from_ec, water_level_depletion, water_temp_track, LightSchedule,
    DEFAULT_PH_DRIFT_RATE, DEFAULT_TDS_FACTOR, DEFAULT_THERMAL_LAG, EC_BOUNDS, PH_BOUNDS,
};
use hydro_core::{Coordinator, Demand, Reservoir, Tower};

use super::TickEnv;

/// Air-temperature jitter on a tower in normal operation.
pub const AIR_TEMP_STD: f64 = 0.2;

/// Water-level jitter per tick.
pub const WATER_LEVEL_STD: f64 = 0.2;

/// Reservoir water sits this many degrees below the air.
pub const WATER_BELOW_AIR_C: f64 = 3.0;

/// How a tower's relative humidity follows its air temperature.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HumidityModel {
    pub base: f64,
    pub sensitivity: f64,
    pub std: f64,
    pub bounds: (f64, f64),
}

impl HumidityModel {
    /// Normal greenhouse response.
    pub const NORMAL: HumidityModel = HumidityModel {
        base: 70.0,
        sensitivity: 1.5,
        std: 1.0,
        bounds: (25.0, 99.0),
    };

    /// Dry, hot air after an HVAC failure.
    pub const HEAT: HumidityModel = HumidityModel {
        base: 70.0,
        sensitivity: 2.5,
        std: 1.5,
        bounds: (20.0, 99.0),
    };
}

/// Default tower update: climate, light, growth, uptime.
pub fn tower_physics(env: &mut TickEnv<'_>, tower: &mut Tower) {
    let air = ambient_temp(env.sim_time_h);
    apply_climate(env, tower, air, AIR_TEMP_STD, &HumidityModel::NORMAL);
    apply_light(env, tower);
    tower.height_cm = round_to(grown_height(env, tower), 1);
    tower.uptime_s = env.uptime_s();
}

/// Sets air temperature around `air_c` and derives humidity from the
/// jittered reading.
pub fn apply_climate(
    env: &mut TickEnv<'_>,
    tower: &mut Tower,
    air_c: f64,
    temp_std: f64,
    humidity: &HumidityModel,
) {
    tower.air_temp_c = env.noise.jitter(air_c, temp_std);
    let rh = humidity_from_temp(tower.air_temp_c, humidity.base, humidity.sensitivity);
    tower.humidity_pct = clamp(
        env.noise.jitter(rh, humidity.std),
        humidity.bounds.0,
        humidity.bounds.1,
    );
}

/// Grow-light schedule: on/off state, brightness byte and measured lux.
pub fn apply_light(env: &mut TickEnv<'_>, tower: &mut Tower) {
    let (on, lux) = grow_light(env.sim_time_h, &LightSchedule::default(), env.noise);
    tower.light_on = on;
    if on {
        tower.light_brightness = clamp(lux / 120.0, 0.0, 255.0) as u8;
        tower.light_lux = env.noise.jitter(lux, 50.0).max(0.0);
    } else {
        tower.light_brightness = 0;
        tower.light_lux = lux.max(0.0);
    }
}

/// Unrounded height from the crop's growth curve at the current sim time.
pub fn grown_height(env: &TickEnv<'_>, tower: &Tower) -> f64 {
    let profile = tower.crop.profile();
    let days = tower.planting_offset_days + env.sim_time_h / 24.0;
    growth_sigmoid(days, profile.max_height_cm, profile.harvest_days)
}

/// Default reservoir update. A no-op while no tower is online.
pub fn reservoir_physics(
    env: &mut TickEnv<'_>,
    coordinator: &mut Coordinator,
    reservoir: &mut Reservoir,
    demand: &Demand,
) {
    if demand.online_towers == 0 {
        return;
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
    let air = ambient_temp(env.sim_time_h);
    apply_water_temp(env, reservoir, air - WATER_BELOW_AIR_C, DEFAULT_THERMAL_LAG);
    apply_coordinator_climate(env, coordinator, air);
}

pub fn apply_ph(env: &mut TickEnv<'_>, reservoir: &mut Reservoir, rate: f64) {
    let drifted = ph_drift(reservoir.ph, env.dt_h, rate);
    reservoir.ph = clamp(env.noise.jitter(drifted, 0.01), PH_BOUNDS.0, PH_BOUNDS.1);
}

/// EC uptake at `total_rate` mS/cm/h; TDS follows.
pub fn apply_ec(env: &mut TickEnv<'_>, reservoir: &mut Reservoir, total_rate: f64) {
    let depleted = ec_depletion(reservoir.ec_ms_cm, env.dt_h, total_rate);
    reservoir.ec_ms_cm = clamp(env.noise.jitter(depleted, 0.01), EC_BOUNDS.0, EC_BOUNDS.1);
    reservoir.tds_ppm = tds_from_ec(reservoir.ec_ms_cm, DEFAULT_TDS_FACTOR);
}

/// Level falls by `rate_per_tower` for each online tower. Depth and the
/// low-water flag follow.
pub fn apply_water_level(
    env: &mut TickEnv<'_>,
    reservoir: &mut Reservoir,
    online_towers: usize,
    rate_per_tower: f64,
    std: f64,
) {
    let level = water_level_depletion(reservoir.water_level_pct, env.dt_h, online_towers, rate_per_tower);
    reservoir.set_water_level(env.noise.jitter(level, std));
}

pub fn apply_water_temp(env: &mut TickEnv<'_>, reservoir: &mut Reservoir, target_c: f64, lag: f64) {
    let tracked = water_temp_track(target_c, reservoir.water_temp_c, env.dt_h, lag);
    reservoir.water_temp_c = round_to(env.noise.jitter(tracked, 0.1), 1);
}

/// Coordinator board temperature near the reservoir, plus uptime.
pub fn apply_coordinator_climate(env: &mut TickEnv<'_>, coordinator: &mut Coordinator, air_c: f64) {
    coordinator.temp_c = round_to(env.noise.jitter(air_c, 0.15), 1);
    coordinator.uptime_s = env.uptime_s();
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::broker::LocalBroker;
    use crate::clock::VirtualClock;
    use crate::publisher::TelemetryPublisher;
    use crate::scenarios::RunContext;
    use approx::assert_abs_diff_eq;
    use hydro_core::{CropType, Noise};
    use std::sync::Arc;
    use std::time::Duration;

    /// Context over an unconnected in-process broker, for hook-level tests.
    pub(crate) fn test_context() -> RunContext {
        let broker = Arc::new(LocalBroker::new());
        let clock = VirtualClock::shared();
        RunContext {
            publisher: Arc::new(TelemetryPublisher::new(broker.transport("sim"), clock.clone())),
            links: broker,
            clock,
            connect_timeout: Duration::from_secs(1),
        }
    }

    pub(crate) fn env<'a>(noise: &'a mut Noise, ctx: &'a RunContext, h: f64, dt: f64) -> TickEnv<'a> {
        TickEnv {
            tick: 1,
            sim_time_h: h,
            dt_h: dt,
            noise,
            ctx,
        }
    }

    #[test]
    fn test_tower_follows_day_night() {
        let ctx = test_context();
        let mut noise = Noise::silent(1);
        let mut tower = Tower::new("T", "C", "farm-001", CropType::Lettuce);

        tower_physics(&mut env(&mut noise, &ctx, 14.0, 0.1), &mut tower);
        assert_abs_diff_eq!(tower.air_temp_c, 26.0, epsilon = 1e-9);
        assert!(tower.light_on);
        assert_eq!(tower.light_brightness, 250);
        assert_eq!(tower.uptime_s, 14 * 3600);

        tower_physics(&mut env(&mut noise, &ctx, 2.0, 0.1), &mut tower);
        assert!(!tower.light_on);
        assert_eq!(tower.light_brightness, 0);
        assert!(tower.light_lux <= 5.0);
    }

    #[test]
    fn test_reservoir_noop_without_towers() {
        let ctx = test_context();
        let mut noise = Noise::new(1);
        let mut coordinator = Coordinator::new("C", "farm-001", "Coordinator 1-1");
        let mut reservoir = Reservoir::new("C", "farm-001");
        let before = reservoir.clone();

        reservoir_physics(
            &mut env(&mut noise, &ctx, 1.0, 1.0),
            &mut coordinator,
            &mut reservoir,
            &Demand::default(),
        );
        assert_eq!(reservoir, before);
    }

    #[test]
    fn test_reservoir_consumes() {
        let ctx = test_context();
        let mut noise = Noise::silent(1);
        let mut coordinator = Coordinator::new("C", "farm-001", "Coordinator 1-1");
        let mut reservoir = Reservoir::new("C", "farm-001");
        let towers: Vec<Tower> = (0..4)
            .map(|i| Tower::new(format!("T{i}"), "C", "farm-001", CropType::Tomato))
            .collect();
        let demand = Demand::of(&towers);
        let (ph, ec, level) = (reservoir.ph, reservoir.ec_ms_cm, reservoir.water_level_pct);

        reservoir_physics(&mut env(&mut noise, &ctx, 2.0, 2.0), &mut coordinator, &mut reservoir, &demand);

        assert_abs_diff_eq!(reservoir.ph, ph + DEFAULT_PH_DRIFT_RATE * 2.0, epsilon = 1e-9);
        assert_abs_diff_eq!(reservoir.ec_ms_cm, ec - demand.ec_rate * 2.0, epsilon = 1e-9);
        assert_abs_diff_eq!(reservoir.water_level_pct, level - demand.water_rate * 2.0, epsilon = 1e-9);
        assert_abs_diff_eq!(reservoir.tds_ppm, reservoir.ec_ms_cm * 500.0, epsilon = 1e-9);
        assert_eq!(coordinator.uptime_s, 7200);
    }
}
