//! Topic layout and JSON payloads published by the simulator.
//!
//! Farm-scoped channels live under `farm/{farm_id}/coord/{coord_id}/...`;
//! the coordinator announce channel is not farm-scoped.

use hydro_core::physics::round_to;
use hydro_core::{Coordinator, Reservoir, Tower};
use serde::Serialize;

/// Connection-status event published when a coordinator comes online.
pub const EVENT_CONNECTED: &str = "connected";

/// Connection-status event carried by the Last-Will.
pub const EVENT_DISCONNECTED: &str = "disconnected";

/// Manual status events used by the plain reconnection flow.
pub const EVENT_MQTT_CONNECTED: &str = "mqtt_connected";
pub const EVENT_MQTT_DISCONNECTED: &str = "mqtt_disconnected";

pub mod topics {
    //! Topic builders.

    pub fn tower_telemetry(farm_id: &str, coord_id: &str, tower_id: &str) -> String {
        format!("farm/{farm_id}/coord/{coord_id}/tower/{tower_id}/telemetry")
    }

    pub fn reservoir_telemetry(farm_id: &str, coord_id: &str) -> String {
        format!("farm/{farm_id}/coord/{coord_id}/reservoir/telemetry")
    }

    pub fn connection_status(farm_id: &str, coord_id: &str) -> String {
        format!("farm/{farm_id}/coord/{coord_id}/status/connection")
    }

    pub fn pairing_request(farm_id: &str, coord_id: &str) -> String {
        format!("farm/{farm_id}/coord/{coord_id}/pairing/request")
    }

    pub fn pairing_complete(farm_id: &str, coord_id: &str) -> String {
        format!("farm/{farm_id}/coord/{coord_id}/pairing/complete")
    }

    pub fn coordinator_announce(coord_id: &str) -> String {
        format!("coordinator/{coord_id}/announce")
    }

    /// Subscription filter covering every connection-status channel.
    pub const ALL_CONNECTION_STATUS: &str = "farm/+/coord/+/status/connection";
}

/// Per-tower sensor and device readings.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TowerTelemetry<'a> {
    pub air_temp_c: f64,
    pub humidity_pct: f64,
    pub light_lux: f64,
    pub pump_on: bool,
    pub light_on: bool,
    pub light_brightness: u8,
    pub status_mode: &'a str,
    pub vbat_mv: u32,
    pub fw_version: &'a str,
    pub uptime_s: u64,
    pub signal_quality: i32,
}

impl<'a> From<&'a Tower> for TowerTelemetry<'a> {
    fn from(tower: &'a Tower) -> Self {
        Self {
            air_temp_c: round_to(tower.air_temp_c, 1),
            humidity_pct: round_to(tower.humidity_pct, 1),
            light_lux: tower.light_lux.round(),
            pump_on: tower.pump_on,
            light_on: tower.light_on,
            light_brightness: tower.light_brightness,
            status_mode: &tower.status_mode,
            vbat_mv: tower.vbat_mv,
            fw_version: &tower.fw_version,
            uptime_s: tower.uptime_s,
            signal_quality: tower.signal_quality,
        }
    }
}

/// Reservoir chemistry plus the owning coordinator's system fields.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReservoirTelemetry<'a> {
    pub fw_version: &'a str,
    pub towers_online: usize,
    pub wifi_rssi: i32,
    pub status_mode: &'a str,
    pub uptime_s: u64,
    pub temp_c: f64,
    pub ph: f64,
    pub ec_ms_cm: f64,
    pub tds_ppm: f64,
    pub water_temp_c: f64,
    pub water_level_pct: f64,
    pub water_level_cm: f64,
    pub low_water_alert: bool,
    pub main_pump_on: bool,
    pub dosing_pump_ph_on: bool,
    pub dosing_pump_nutrient_on: bool,
}

impl<'a> ReservoirTelemetry<'a> {
    pub fn new(coordinator: &'a Coordinator, reservoir: &Reservoir, towers_online: usize) -> Self {
        Self {
            fw_version: &coordinator.fw_version,
            towers_online,
            wifi_rssi: coordinator.wifi_rssi,
            status_mode: &coordinator.status_mode,
            uptime_s: coordinator.uptime_s,
            temp_c: round_to(coordinator.temp_c, 1),
            ph: round_to(reservoir.ph, 2),
            ec_ms_cm: round_to(reservoir.ec_ms_cm, 2),
            tds_ppm: reservoir.tds_ppm.round(),
            water_temp_c: round_to(reservoir.water_temp_c, 1),
            water_level_pct: round_to(reservoir.water_level_pct, 1),
            water_level_cm: round_to(reservoir.water_level_cm, 1),
            low_water_alert: reservoir.low_water_alert,
            main_pump_on: reservoir.main_pump_on,
            dosing_pump_ph_on: reservoir.dosing_pump_ph_on,
            dosing_pump_nutrient_on: reservoir.dosing_pump_nutrient_on,
        }
    }
}

/// Retained connection status. Also the Last-Will payload, in which case
/// the optional fields are absent and `ts` is 0.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConnectionStatus<'a> {
    pub ts: u64,
    pub coord_id: &'a str,
    pub farm_id: &'a str,
    pub event: &'a str,
    pub wifi_connected: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wifi_rssi: Option<i32>,
    pub mqtt_connected: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uptime_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub free_heap: Option<u32>,
}

impl<'a> ConnectionStatus<'a> {
    /// Full status snapshot for `event`, stamped `ts`.
    pub fn snapshot(coordinator: &'a Coordinator, event: &'a str, online: bool, ts: u64) -> Self {
        Self {
            ts,
            coord_id: &coordinator.coord_id,
            farm_id: &coordinator.farm_id,
            event,
            wifi_connected: online,
            wifi_rssi: Some(coordinator.wifi_rssi),
            mqtt_connected: online,
            uptime_ms: Some(coordinator.uptime_s * 1000),
            free_heap: Some(coordinator.free_heap),
        }
    }

    /// Minimal "disconnected" notice armed as the Last-Will.
    pub fn last_will(coord_id: &'a str, farm_id: &'a str) -> Self {
        Self {
            ts: 0,
            coord_id,
            farm_id,
            event: EVENT_DISCONNECTED,
            wifi_connected: false,
            wifi_rssi: None,
            mqtt_connected: false,
            uptime_ms: None,
            free_heap: None,
        }
    }
}

/// Coordinator self-announcement, consumed by backend registration.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CoordinatorAnnounce<'a> {
    pub mac: &'a str,
    pub fw_version: &'a str,
    pub chip_model: &'a str,
    pub free_heap: u32,
    pub wifi_rssi: i32,
    pub ip: &'a str,
}

impl<'a> From<&'a Coordinator> for CoordinatorAnnounce<'a> {
    fn from(coordinator: &'a Coordinator) -> Self {
        Self {
            mac: &coordinator.coord_id,
            fw_version: &coordinator.fw_version,
            chip_model: "ESP32-S3",
            free_heap: coordinator.free_heap,
            wifi_rssi: coordinator.wifi_rssi,
            ip: &coordinator.ip,
        }
    }
}

/// Sensor/actuator capabilities a tower declares while pairing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Capabilities {
    pub dht_sensor: bool,
    pub light_sensor: bool,
    pub pump_relay: bool,
    pub grow_light: bool,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            dht_sensor: true,
            light_sensor: true,
            pump_relay: true,
            grow_light: true,
        }
    }
}

/// First step of the pairing handshake.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PairingRequest<'a> {
    pub tower_id: &'a str,
    pub mac_address: &'a str,
    pub fw_version: &'a str,
    pub capabilities: Capabilities,
    pub rssi: i32,
}

impl<'a> From<&'a Tower> for PairingRequest<'a> {
    fn from(tower: &'a Tower) -> Self {
        Self {
            tower_id: &tower.tower_id,
            mac_address: &tower.tower_id,
            fw_version: &tower.fw_version,
            capabilities: Capabilities::default(),
            rssi: tower.signal_quality,
        }
    }
}

/// Second step of the pairing handshake.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PairingComplete<'a> {
    pub tower_id: &'a str,
    pub status: &'a str,
    pub coord_id: &'a str,
}

#[cfg(test)]
mod tests {
    use super::*;
    use hydro_core::CropType;
    use serde_json::{json, Value};

    #[test]
    fn test_topics() {
        assert_eq!(
            topics::tower_telemetry("farm-001", "C", "T"),
            "farm/farm-001/coord/C/tower/T/telemetry"
        );
        assert_eq!(topics::coordinator_announce("C"), "coordinator/C/announce");
    }

    #[test]
    fn test_last_will_shape() {
        let value = serde_json::to_value(ConnectionStatus::last_will("C", "farm-001")).unwrap();
        assert_eq!(
            value,
            json!({
                "ts": 0,
                "coord_id": "C",
                "farm_id": "farm-001",
                "event": "disconnected",
                "wifi_connected": false,
                "mqtt_connected": false,
            })
        );
    }

    #[test]
    fn test_tower_payload_rounds() {
        let mut tower = Tower::new("T", "C", "farm-001", CropType::Basil);
        tower.air_temp_c = 21.456;
        tower.light_lux = 123.6;
        let value: Value = serde_json::to_value(TowerTelemetry::from(&tower)).unwrap();
        assert_eq!(value["air_temp_c"], json!(21.5));
        assert_eq!(value["light_lux"], json!(124.0));
        assert_eq!(value["fw_version"], json!("1.2.0"));
    }

    #[test]
    fn test_pairing_request_declares_capabilities() {
        let tower = Tower::new("T", "C", "farm-001", CropType::Basil);
        let value = serde_json::to_value(PairingRequest::from(&tower)).unwrap();
        assert_eq!(value["mac_address"], json!("T"));
        assert_eq!(value["capabilities"]["grow_light"], json!(true));
    }
}
