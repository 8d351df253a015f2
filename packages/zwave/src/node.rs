//! The Z-Wave node model: identity, command classes, and the typed
//! value accessors mappers use to read a reported value.

use std::collections::BTreeSet;

use gw_core::prelude::{DeviceId, Error, Result};

/// A Z-Wave network address: the controller's home id plus a node id
/// local to that network.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct Identity {
    pub home: u32,
    pub node: u8,
}

impl Identity {
    pub fn new(home: u32, node: u8) -> Self {
        Self { home, node }
    }

    pub fn device_id(&self) -> DeviceId {
        DeviceId::zwave(self.home, self.node)
    }
}

/// Well-known command class identifiers the generic mapper table keys on
/// (`ZWaveNode.h`'s named constants).
pub mod cc {
    pub const BASIC: u8 = 32;
    pub const SWITCH_BINARY: u8 = 37;
    pub const SENSOR_BINARY: u8 = 48;
    pub const SENSOR_MULTILEVEL: u8 = 49;
    pub const ALARM: u8 = 113;
    pub const BATTERY: u8 = 128;
    pub const WAKE_UP: u8 = 132;
}

/// One command class instance reported by a node: which class, which
/// index within it (e.g. a Sensor Multilevel sensor type), and which
/// instance of a multi-instance endpoint.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct CommandClass {
    pub id: u8,
    pub index: u8,
    pub instance: u8,
    pub name: String,
}

impl CommandClass {
    pub fn new(id: u8, index: u8, instance: u8, name: impl Into<String>) -> Self {
        Self { id, index, instance, name: name.into() }
    }
}

bitflags::bitflags! {
    /// A node's reported capability set (`ZWaveNode.h`'s `Support` flags).
    #[derive(Clone, Copy, PartialEq, Eq, Debug)]
    pub struct Support: u8 {
        const LISTENING = 0x01;
        const BEAMING   = 0x02;
        const ROUTING   = 0x04;
        const SECURITY  = 0x08;
        const ZWAVEPLUS = 0x10;
    }
}

/// One reported value for a command class, carrying the physical unit it
/// arrived in so a mapper can convert it (`ZWaveNode.cpp`'s `Value`).
#[derive(Clone, Debug)]
pub struct Value {
    command_class: CommandClass,
    raw: String,
    unit: Option<String>,
}

impl Value {
    pub fn new(command_class: CommandClass, raw: impl Into<String>, unit: Option<String>) -> Self {
        Self { command_class, raw: raw.into(), unit }
    }

    pub fn command_class(&self) -> &CommandClass {
        &self.command_class
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn unit(&self) -> Option<&str> {
        self.unit.as_deref()
    }

    pub fn as_bool(&self) -> Result<bool> {
        match self.raw.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "on" => Ok(true),
            "false" | "0" | "off" => Ok(false),
            _ => Err(Error::Protocol(format!("{} is not a bool", self.raw))),
        }
    }

    pub fn as_double(&self) -> Result<f64> {
        self.raw
            .trim()
            .parse::<f64>()
            .map_err(|_| Error::Protocol(format!("{} is not a number", self.raw)))
    }

    pub fn as_hex32(&self) -> Result<u32> {
        let hex = self.raw.trim().trim_start_matches("0x").trim_start_matches("0X");
        u32::from_str_radix(hex, 16).map_err(|_| Error::Protocol(format!("{} is not hex", self.raw)))
    }

    /// Parses an integer reading; if the raw text isn't a clean integer it
    /// falls back to flooring a parsed float (`Value::asInt`).
    pub fn as_int(&self) -> Result<i64> {
        if let Ok(i) = self.raw.trim().parse::<i64>() {
            return Ok(i);
        }
        self.as_double().map(|d| d.floor() as i64)
    }

    /// Converts a temperature reading to Celsius; `"F"` is converted,
    /// `"C"` (or no unit) passes through, anything else is an error
    /// (`Value::asCelsius`).
    pub fn as_celsius(&self) -> Result<f64> {
        let value = self.as_double()?;
        match self.unit.as_deref() {
            None | Some("C") | Some("c") => Ok(value),
            Some("F") | Some("f") => Ok((5.0 * (value - 32.0)) / 9.0),
            Some(other) => Err(Error::Protocol(format!("unsupported temperature unit: {other}"))),
        }
    }

    /// Converts a luminance reading to lux: a `%` reading is rescaled
    /// (100% maps to 1000 lux, else a linear `10 * value` approximation),
    /// `lux` passes through (`Value::asLuminance`).
    pub fn as_luminance(&self) -> Result<f64> {
        let value = self.as_double()?;
        match self.unit.as_deref() {
            Some("%") => Ok(if value >= 100.0 { 1000.0 } else { 10.0 * value }),
            None | Some("lux") => Ok(value),
            Some(other) => Err(Error::Protocol(format!("unsupported luminance unit: {other}"))),
        }
    }

    /// Requires a `"ug/m3"` unit (case-insensitive); anything else errors
    /// (`Value::asPM25`).
    pub fn as_pm25(&self) -> Result<f64> {
        match self.unit.as_deref().map(str::to_ascii_lowercase).as_deref() {
            Some("ug/m3") => self.as_double(),
            _ => Err(Error::Protocol("PM2.5 reading requires a ug/m3 unit".to_string())),
        }
    }

    /// Requires a `"seconds"` unit; anything else errors (`Value::asTime`).
    pub fn as_time(&self) -> Result<f64> {
        match self.unit.as_deref() {
            Some("seconds") => self.as_double(),
            _ => Err(Error::Protocol("time reading requires a seconds unit".to_string())),
        }
    }
}

/// One node as discovered on a Z-Wave network: its identity, the command
/// classes it has advertised, and whether it's fully queried yet
/// (`ZWaveNode.h`).
#[derive(Clone, Debug)]
pub struct ZWaveNode {
    pub identity: Identity,
    pub controller: bool,
    pub queried: bool,
    pub support: Support,
    pub vendor_id: u16,
    pub vendor: String,
    pub product_id: u16,
    pub product_type: u16,
    pub product: String,
    pub command_classes: BTreeSet<CommandClass>,
}

impl ZWaveNode {
    pub fn new(identity: Identity) -> Self {
        Self {
            identity,
            controller: false,
            queried: false,
            support: Support::empty(),
            vendor_id: 0,
            vendor: String::new(),
            product_id: 0,
            product_type: 0,
            product: String::new(),
            command_classes: BTreeSet::new(),
        }
    }

    pub fn id(&self) -> DeviceId {
        self.identity.device_id()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cc(id: u8, index: u8) -> CommandClass {
        CommandClass::new(id, index, 0, "test")
    }

    #[test]
    fn celsius_converts_fahrenheit() {
        let value = Value::new(cc(cc::SENSOR_MULTILEVEL, 1), "98.6", Some("F".to_string()));
        assert!((value.as_celsius().unwrap() - 37.0).abs() < 0.01);
    }

    #[test]
    fn celsius_passes_through_native_unit() {
        let value = Value::new(cc(cc::SENSOR_MULTILEVEL, 1), "21.5", Some("C".to_string()));
        assert_eq!(value.as_celsius().unwrap(), 21.5);
    }

    #[test]
    fn luminance_percent_caps_at_1000() {
        let value = Value::new(cc(cc::SENSOR_MULTILEVEL, 3), "100", Some("%".to_string()));
        assert_eq!(value.as_luminance().unwrap(), 1000.0);
        let dim = Value::new(cc(cc::SENSOR_MULTILEVEL, 3), "40", Some("%".to_string()));
        assert_eq!(dim.as_luminance().unwrap(), 400.0);
    }

    #[test]
    fn pm25_requires_matching_unit() {
        let value = Value::new(cc(cc::SENSOR_MULTILEVEL, 0x23), "12", Some("ppm".to_string()));
        assert!(value.as_pm25().is_err());
        let value = Value::new(cc(cc::SENSOR_MULTILEVEL, 0x23), "12", Some("ug/m3".to_string()));
        assert_eq!(value.as_pm25().unwrap(), 12.0);
    }

    #[test]
    fn as_int_falls_back_to_flooring_a_float() {
        let value = Value::new(cc(cc::BATTERY, 0), "85.9", None);
        assert_eq!(value.as_int().unwrap(), 85);
    }
}
