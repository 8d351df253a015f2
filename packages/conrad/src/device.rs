//! The three Conrad/HomeMatic device kinds and the fixed module layouts
//! they parse incoming channel readings into.

use std::sync::OnceLock;

use gw_core::prelude::*;
use regex::Regex;
use serde_json::Value;

pub const VENDOR_NAME: &str = "Conrad";

/// One Conrad device: its fixed module layout and how it turns a ZMQ/FHEM
/// `message` payload into samples (`ConradDevice::parseMessage`).
pub trait ConradDevice: Send + Sync {
    fn id(&self) -> DeviceId;
    fn product(&self) -> &'static str;
    fn module_types(&self) -> Vec<ModuleTypeSpec>;

    /// Conrad devices are event-driven; the original constructs every
    /// instance with `RefreshTime::DISABLED`.
    fn refresh_time(&self) -> RefreshTime {
        RefreshTime::Disabled
    }

    fn parse_message(&self, message: &Value) -> Result<SensorData>;
}

fn is_number(s: &str) -> bool {
    s.trim().parse::<f64>().is_ok()
}

fn channel(message: &Value, name: &str) -> Result<String> {
    message
        .get("channels")
        .and_then(|c| c.get(name))
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| Error::Protocol(format!("message has no channels.{name}")))
}

fn top_level_f64(message: &Value, name: &str) -> Result<f64> {
    message
        .get(name)
        .and_then(Value::as_f64)
        .ok_or_else(|| Error::Protocol(format!("message has no {name}")))
}

/// Module 0 open/close, module 1 rssi (`WirelessShutterContact.cpp`).
pub struct WirelessShutterContact {
    id: DeviceId,
}

impl WirelessShutterContact {
    pub const PRODUCT_NAME: &'static str = "HM-Sec-SC-2";

    pub fn new(id: DeviceId) -> Self {
        Self { id }
    }
}

impl ConradDevice for WirelessShutterContact {
    fn id(&self) -> DeviceId {
        self.id
    }

    fn product(&self) -> &'static str {
        Self::PRODUCT_NAME
    }

    fn module_types(&self) -> Vec<ModuleTypeSpec> {
        vec![ModuleTypeSpec::plain(ModuleType::OpenClose), ModuleTypeSpec::plain(ModuleType::Rssi)]
    }

    fn parse_message(&self, message: &Value) -> Result<SensorData> {
        let main = channel(message, "Main")?;
        let open = if main == "open" { 1.0 } else { 0.0 };
        let rssi = top_level_f64(message, "rssi")?;

        Ok(SensorData::new(self.id, vec![SensorValue::new(ModuleId(0), open), SensorValue::new(ModuleId(1), rssi)]))
    }
}

/// Modules 0-3 frequency/current/power/voltage (only when numeric), 4
/// on/off, 5 rssi (`PowerMeterSwitch.cpp`).
pub struct PowerMeterSwitch {
    id: DeviceId,
}

impl PowerMeterSwitch {
    pub const PRODUCT_NAME: &'static str = "HM-Es-PMSw1-PI";

    const FREQUENCY: ModuleId = ModuleId(0);
    const CURRENT: ModuleId = ModuleId(1);
    const POWER: ModuleId = ModuleId(2);
    const VOLTAGE: ModuleId = ModuleId(3);
    const ON_OFF: ModuleId = ModuleId(4);
    const RSSI: ModuleId = ModuleId(5);

    pub fn new(id: DeviceId) -> Self {
        Self { id }
    }
}

impl ConradDevice for PowerMeterSwitch {
    fn id(&self) -> DeviceId {
        self.id
    }

    fn product(&self) -> &'static str {
        Self::PRODUCT_NAME
    }

    fn module_types(&self) -> Vec<ModuleTypeSpec> {
        vec![
            ModuleTypeSpec::plain(ModuleType::Frequency),
            ModuleTypeSpec::plain(ModuleType::Current),
            ModuleTypeSpec::plain(ModuleType::Power),
            ModuleTypeSpec::plain(ModuleType::Voltage),
            ModuleTypeSpec::with_attributes(ModuleType::OnOff, vec![ModuleAttribute::Controllable]),
            ModuleTypeSpec::plain(ModuleType::Rssi),
        ]
    }

    fn parse_message(&self, message: &Value) -> Result<SensorData> {
        let mut values = Vec::new();

        for (name, module_id) in [("SenF", Self::FREQUENCY), ("SenI", Self::CURRENT), ("SenPwr", Self::POWER), ("SenU", Self::VOLTAGE)] {
            let raw = channel(message, name)?;
            if is_number(&raw) {
                values.push(SensorValue::new(module_id, raw.trim().parse().unwrap()));
            }
        }

        let switch = channel(message, "Sw")?;
        values.push(SensorValue::new(Self::ON_OFF, if switch == "on" { 1.0 } else { 0.0 }));
        values.push(SensorValue::new(Self::RSSI, top_level_f64(message, "rssi")?));

        Ok(SensorData::new(self.id, values))
    }
}

/// Modules 0 current temperature, 1 desired temperature, 2 valve
/// position, 3 rssi, parsed out of the `Clima` channel's free-text state
/// (`RadiatorThermostat.cpp`).
pub struct RadiatorThermostat {
    id: DeviceId,
}

impl RadiatorThermostat {
    pub const PRODUCT_NAME: &'static str = "HM-CC-RT-DN";

    const CURRENT_TEMPERATURE: ModuleId = ModuleId(0);
    const DESIRED_TEMPERATURE: ModuleId = ModuleId(1);
    const VALVE_POSITION: ModuleId = ModuleId(2);
    const RSSI: ModuleId = ModuleId(3);

    pub fn new(id: DeviceId) -> Self {
        Self { id }
    }

    fn clima_pattern() -> &'static Regex {
        static PATTERN: OnceLock<Regex> = OnceLock::new();
        PATTERN.get_or_init(|| {
            Regex::new(r"T:\s*([+-]?[0-9]+(?:\.[0-9]+)?)\s*desired:\s*([+-]?[0-9]+(?:\.[0-9]+)?)\s*valve:\s*(0|1)").unwrap()
        })
    }

    /// The FHEM bridge nests `Clima` under a `state` field; the Conrad
    /// ZMQ bridge reports the string directly. Both are accepted.
    fn clima_state(message: &Value) -> Result<String> {
        let clima = message
            .get("channels")
            .and_then(|c| c.get("Clima"))
            .ok_or_else(|| Error::Protocol("message has no channels.Clima".to_string()))?;

        if let Some(s) = clima.as_str() {
            return Ok(s.to_string());
        }
        clima
            .get("state")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| Error::Protocol("channels.Clima has no state".to_string()))
    }
}

impl ConradDevice for RadiatorThermostat {
    fn id(&self) -> DeviceId {
        self.id
    }

    fn product(&self) -> &'static str {
        Self::PRODUCT_NAME
    }

    fn module_types(&self) -> Vec<ModuleTypeSpec> {
        vec![
            ModuleTypeSpec::plain(ModuleType::Temperature),
            ModuleTypeSpec::plain(ModuleType::Temperature),
            ModuleTypeSpec::plain(ModuleType::OpenRatio),
            ModuleTypeSpec::plain(ModuleType::Rssi),
        ]
    }

    fn parse_message(&self, message: &Value) -> Result<SensorData> {
        let state = Self::clima_state(message)?;
        let caps = Self::clima_pattern()
            .captures(&state)
            .ok_or_else(|| Error::IllegalState("cannot parse Radiator Thermostat message".to_string()))?;

        let current: f64 = caps[1].parse().unwrap();
        let desired: f64 = caps[2].parse().unwrap();
        let valve: f64 = caps[3].parse().unwrap();
        let rssi = top_level_f64(message, "rssi")?;

        Ok(SensorData::new(
            self.id,
            vec![
                SensorValue::new(Self::CURRENT_TEMPERATURE, current),
                SensorValue::new(Self::DESIRED_TEMPERATURE, desired),
                SensorValue::new(Self::VALVE_POSITION, valve),
                SensorValue::new(Self::RSSI, rssi),
            ],
        ))
    }
}

/// Builds the device kind named by a ZMQ/FHEM `type` tag
/// (`ConradDeviceManager::createNewDeviceUnlocked`).
pub fn build(device_type: &str, id: DeviceId) -> Result<Box<dyn ConradDevice>> {
    match device_type {
        "threeStateSensor" => Ok(Box::new(WirelessShutterContact::new(id))),
        "powerMeter" => Ok(Box::new(PowerMeterSwitch::new(id))),
        "thermostat" => Ok(Box::new(RadiatorThermostat::new(id))),
        other => Err(Error::InvalidArgument(format!("unsupported device type: {other}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id() -> DeviceId {
        DeviceId::conrad("38D649").unwrap()
    }

    #[test]
    fn power_meter_switch_parses_scenario_message() {
        let message: Value = serde_json::from_str(
            r#"{"dev":"HM_38D649","event":"message","type":"powerMeter","rssi":-35.5,
               "channels":{"Main":"CMDs_done","Pwr":"32.6","SenF":"50","SenI":"120","SenPwr":"5","SenU":"240","Sw":"off"}}"#,
        )
        .unwrap();

        let data = PowerMeterSwitch::new(id()).parse_message(&message).unwrap();
        let values: Vec<(u16, f64)> = data.values.iter().map(|v| (v.module_id.0, v.value.unwrap())).collect();
        assert_eq!(values, vec![(0, 50.0), (1, 120.0), (2, 5.0), (3, 240.0), (4, 0.0), (5, -35.5)]);
    }

    #[test]
    fn radiator_thermostat_parses_scenario_message() {
        let message: Value = serde_json::from_str(
            r#"{"dev":"HM_36BA59","event":"message","type":"thermostat","rssi":-41.5,
               "channels":{"Clima":"T: 21.2 desired: 17.0 valve: 0"}}"#,
        )
        .unwrap();

        let data = RadiatorThermostat::new(id()).parse_message(&message).unwrap();
        let values: Vec<(u16, f64)> = data.values.iter().map(|v| (v.module_id.0, v.value.unwrap())).collect();
        assert_eq!(values, vec![(0, 21.2), (1, 17.0), (2, 0.0), (3, -41.5)]);
    }

    #[test]
    fn wireless_shutter_contact_parses_scenario_message() {
        let message: Value = serde_json::from_str(
            r#"{"dev":"HM_30B0BE","event":"message","type":"threeStateSensor","rssi":-52,
               "channels":{"Main":"open"}}"#,
        )
        .unwrap();

        let data = WirelessShutterContact::new(id()).parse_message(&message).unwrap();
        let values: Vec<(u16, f64)> = data.values.iter().map(|v| (v.module_id.0, v.value.unwrap())).collect();
        assert_eq!(values, vec![(0, 1.0), (1, -52.0)]);
    }

    #[test]
    fn build_rejects_unknown_type() {
        assert!(build("doorbell", id()).is_err());
    }
}
