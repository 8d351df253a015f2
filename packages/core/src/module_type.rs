//! The closed `ModuleType` enumeration and its attribute tags.

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum ModuleType {
    Temperature,
    Humidity,
    Battery,
    Rssi,
    OnOff,
    OpenClose,
    Motion,
    Shake,
    Fire,
    SecurityAlert,
    Luminance,
    Power,
    Voltage,
    Current,
    Frequency,
    Co2,
    Pm25,
    Noise,
    Ultraviolet,
    OpenRatio,
    Heat,
    Smoke,
    Unknown,
}

/// Attributes are an open set of tags; this enumerates the common ones.
/// Unrecognised tags round-trip through `Other`.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum ModuleAttribute {
    Inner,
    Outer,
    Controllable,
    ManualOnly,
    Other(String),
}

impl ModuleType {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Temperature => "temperature",
            Self::Humidity => "humidity",
            Self::Battery => "battery",
            Self::Rssi => "rssi",
            Self::OnOff => "on_off",
            Self::OpenClose => "open_close",
            Self::Motion => "motion",
            Self::Shake => "shake",
            Self::Fire => "fire",
            Self::SecurityAlert => "security_alert",
            Self::Luminance => "luminance",
            Self::Power => "power",
            Self::Voltage => "voltage",
            Self::Current => "current",
            Self::Frequency => "frequency",
            Self::Co2 => "co2",
            Self::Pm25 => "pm25",
            Self::Noise => "noise",
            Self::Ultraviolet => "ultraviolet",
            Self::OpenRatio => "open_ratio",
            Self::Heat => "heat",
            Self::Smoke => "smoke",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for ModuleType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A module type tag together with its attribute tags — the unit a
/// `DeviceDescription` lists one of per exposed channel.
#[derive(Clone, PartialEq, Debug)]
pub struct ModuleTypeSpec {
    pub kind: ModuleType,
    pub attributes: Vec<ModuleAttribute>,
}

impl ModuleTypeSpec {
    pub fn plain(kind: ModuleType) -> Self {
        Self {
            kind,
            attributes: Vec::new(),
        }
    }

    pub fn with_attributes(kind: ModuleType, attributes: Vec<ModuleAttribute>) -> Self {
        Self { kind, attributes }
    }

    pub fn has(&self, attr: &ModuleAttribute) -> bool {
        self.attributes.contains(attr)
    }
}
