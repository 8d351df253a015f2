//! The sample and device-description model: `SensorData`,
//! `DeviceDescription`, `RefreshTime`.

use std::time::{Duration, SystemTime};

use crate::device_id::DeviceId;
use crate::module_type::ModuleTypeSpec;

/// A 16-bit ordinal naming a sensor/actuator channel on a device.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
#[repr(transparent)]
pub struct ModuleId(pub u16);

impl From<u16> for ModuleId {
    fn from(value: u16) -> Self {
        Self(value)
    }
}

impl std::fmt::Display for ModuleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Either `NONE` (event-driven, never polled), `DISABLED` (readings arrive
/// unsolicited, never refresh) or a positive poll interval.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum RefreshTime {
    None,
    Disabled,
    Interval(Duration),
}

impl RefreshTime {
    pub fn interval(&self) -> Option<Duration> {
        match self {
            Self::Interval(d) => Some(*d),
            _ => None,
        }
    }
}

/// One `(module id, value)` pair; `value` is absent when the module could
/// not be derived from a given payload.
#[derive(Clone, Copy, PartialEq, Debug)]
pub struct SensorValue {
    pub module_id: ModuleId,
    pub value: Option<f64>,
}

impl SensorValue {
    pub fn new(module_id: impl Into<ModuleId>, value: f64) -> Self {
        Self {
            module_id: module_id.into(),
            value: Some(value),
        }
    }

    pub fn absent(module_id: impl Into<ModuleId>) -> Self {
        Self {
            module_id: module_id.into(),
            value: None,
        }
    }
}

/// A normalized sample ready to be shipped to the distributor.
/// A sample is shipped only if it carries at least one value and its
/// device is paired — enforced by the caller, this type only records
/// the data.
#[derive(Clone, Debug)]
pub struct SensorData {
    pub device_id: DeviceId,
    pub timestamp: Option<SystemTime>,
    pub values: Vec<SensorValue>,
}

impl SensorData {
    pub fn new(device_id: DeviceId, values: Vec<SensorValue>) -> Self {
        Self {
            device_id,
            timestamp: None,
            values,
        }
    }

    pub fn is_shippable(&self) -> bool {
        !self.values.is_empty()
    }
}

/// Constructed on first sight of a device and dispatched as a `new_device`
/// event to the server.
#[derive(Clone, Debug)]
pub struct DeviceDescription {
    pub device_id: DeviceId,
    pub vendor: String,
    pub product: String,
    pub modules: Vec<ModuleTypeSpec>,
    pub refresh_time: RefreshTime,
}
