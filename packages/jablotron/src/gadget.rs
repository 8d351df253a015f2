//! The static, address-indexed Jablotron gadget table: resolves a
//! report's address to a gadget type and decodes its report fields.

use gw_core::prelude::*;

use crate::report::JablotronReport;

pub const RC86K_FIRST: u32 = 0x800000;
pub const RC86K_LAST: u32 = 0x87_ffff;
const RC86K_DIFF: u32 = 0x100000;
const RC86K_SECONDARY_FIRST: u32 = RC86K_FIRST + RC86K_DIFF;
const RC86K_SECONDARY_LAST: u32 = RC86K_LAST + RC86K_DIFF;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum GadgetType {
    Ac88,
    Ja80l,
    Ja81m,
    Ja82sh,
    Ja83m,
    Ja83p,
    Ja85st,
    Rc86k,
    Tp82n,
}

impl GadgetType {
    pub fn name(&self) -> &'static str {
        match self {
            // " (sensor)" distinguishes it from the AC-88 relay entry on the wire.
            Self::Ac88 => "AC-88 (sensor)",
            Self::Ja80l => "JA-80L",
            Self::Ja81m => "JA-81M",
            Self::Ja82sh => "JA-82SH",
            Self::Ja83m => "JA-83M",
            Self::Ja83p => "JA-83P",
            Self::Ja85st => "JA-85ST",
            Self::Rc86k => "RC-86K (dual)",
            Self::Tp82n => "TP-82N",
        }
    }
}

#[derive(Clone, Debug)]
pub struct GadgetInfo {
    pub first_address: u32,
    pub last_address: u32,
    pub gadget_type: GadgetType,
    pub refresh_time: RefreshTime,
    pub modules: Vec<ModuleTypeSpec>,
}

fn plain(kind: ModuleType) -> ModuleTypeSpec {
    ModuleTypeSpec::plain(kind)
}

fn with(kind: ModuleType, attrs: &[ModuleAttribute]) -> ModuleTypeSpec {
    ModuleTypeSpec::with_attributes(kind, attrs.to_vec())
}

fn gadgets() -> Vec<GadgetInfo> {
    vec![
        GadgetInfo {
            first_address: 0xcf_0000,
            last_address: 0xcf_ffff,
            gadget_type: GadgetType::Ac88,
            refresh_time: RefreshTime::None,
            modules: vec![plain(ModuleType::OnOff)],
        },
        GadgetInfo {
            first_address: 0x58_0000,
            last_address: 0x59_ffff,
            gadget_type: GadgetType::Ja80l,
            refresh_time: RefreshTime::None,
            modules: vec![
                plain(ModuleType::OnOff),
                plain(ModuleType::SecurityAlert),
                plain(ModuleType::SecurityAlert),
            ],
        },
        GadgetInfo {
            first_address: 0x18_0000,
            last_address: 0x1b_ffff,
            gadget_type: GadgetType::Ja81m,
            refresh_time: RefreshTime::Interval(std::time::Duration::from_secs(9 * 60)),
            modules: vec![
                plain(ModuleType::OpenClose),
                plain(ModuleType::SecurityAlert),
                plain(ModuleType::Battery),
            ],
        },
        GadgetInfo {
            first_address: 0x7f_0000,
            last_address: 0x7f_ffff,
            gadget_type: GadgetType::Ja82sh,
            refresh_time: RefreshTime::Interval(std::time::Duration::from_secs(9 * 60)),
            modules: vec![
                plain(ModuleType::Shake),
                plain(ModuleType::SecurityAlert),
                plain(ModuleType::Battery),
            ],
        },
        GadgetInfo {
            first_address: 0x1c_0000,
            last_address: 0x1d_ffff,
            gadget_type: GadgetType::Ja83m,
            refresh_time: RefreshTime::Interval(std::time::Duration::from_secs(9 * 60)),
            modules: vec![
                plain(ModuleType::OpenClose),
                plain(ModuleType::SecurityAlert),
                plain(ModuleType::Battery),
            ],
        },
        GadgetInfo {
            first_address: 0x64_0000,
            last_address: 0x65_ffff,
            gadget_type: GadgetType::Ja83p,
            refresh_time: RefreshTime::Interval(std::time::Duration::from_secs(9 * 60)),
            modules: vec![
                plain(ModuleType::Motion),
                plain(ModuleType::SecurityAlert),
                plain(ModuleType::Battery),
            ],
        },
        GadgetInfo {
            first_address: 0x76_0000,
            last_address: 0x76_ffff,
            gadget_type: GadgetType::Ja85st,
            refresh_time: RefreshTime::Interval(std::time::Duration::from_secs(9 * 60)),
            modules: vec![
                plain(ModuleType::Fire),
                plain(ModuleType::SecurityAlert),
                plain(ModuleType::Battery),
            ],
        },
        GadgetInfo {
            first_address: RC86K_FIRST,
            last_address: RC86K_LAST,
            gadget_type: GadgetType::Rc86k,
            refresh_time: RefreshTime::None,
            modules: vec![
                with(ModuleType::OpenClose, &[ModuleAttribute::ManualOnly, ModuleAttribute::Controllable]),
                plain(ModuleType::OpenClose),
                plain(ModuleType::SecurityAlert),
                plain(ModuleType::Battery),
            ],
        },
        GadgetInfo {
            first_address: 0x24_0000,
            last_address: 0x25_ffff,
            gadget_type: GadgetType::Tp82n,
            refresh_time: RefreshTime::None,
            modules: vec![
                with(ModuleType::Temperature, &[ModuleAttribute::Inner, ModuleAttribute::ManualOnly, ModuleAttribute::Controllable]),
                with(ModuleType::Temperature, &[ModuleAttribute::Inner]),
                plain(ModuleType::Battery),
            ],
        },
    ]
}

/// RC-86K occupies two address ranges a fixed offset apart; everything
/// else maps to itself.
pub fn primary_address(address: u32) -> u32 {
    if (RC86K_SECONDARY_FIRST..=RC86K_SECONDARY_LAST).contains(&address) {
        address - RC86K_DIFF
    } else {
        address
    }
}

pub fn secondary_address(address: u32) -> u32 {
    if (RC86K_FIRST..=RC86K_LAST).contains(&address) {
        address + RC86K_DIFF
    } else {
        address
    }
}

/// Resolves the gadget entry whose range contains `address`, first
/// normalizing to the RC-86K primary address if needed.
pub fn resolve(address: u32) -> Option<GadgetInfo> {
    let primary = primary_address(address);
    gadgets()
        .into_iter()
        .find(|g| g.first_address <= primary && primary <= g.last_address)
}

/// Decodes a report's payload into BeeeOn sensor values at fixed module
/// slots, per-type.
pub fn parse(info: &GadgetInfo, report: &JablotronReport) -> Result<Vec<SensorValue>> {
    let mut values = Vec::new();

    match info.gadget_type {
        GadgetType::Ac88 => {
            values.push(SensorValue::new(0u16, report.get("RELAY")? as f64));
        }
        GadgetType::Ja80l => {
            if report.has("BUTTON", false) {
                values.push(SensorValue::new(0u16, 1.0));
            }
            if report.has("TAMPER", false) {
                values.push(SensorValue::new(1u16, 1.0));
            }
            values.push(SensorValue::new(2u16, report.get("BLACKOUT")? as f64));
        }
        GadgetType::Ja81m | GadgetType::Ja83m => {
            if report.has("SENSOR", false) {
                values.push(SensorValue::new(0u16, report.get("ACT")? as f64));
            }
            if report.has("TAMPER", false) {
                values.push(SensorValue::new(1u16, report.get("ACT")? as f64));
            }
            values.push(SensorValue::new(2u16, report.battery()));
        }
        GadgetType::Ja82sh | GadgetType::Ja83p | GadgetType::Ja85st => {
            if report.has("SENSOR", false) {
                values.push(SensorValue::new(0u16, 1.0));
            }
            if report.has("TAMPER", false) {
                values.push(SensorValue::new(1u16, report.get("ACT")? as f64));
            }
            values.push(SensorValue::new(2u16, report.battery()));
        }
        GadgetType::Rc86k => {
            if !report.has("PANIC", false) {
                let is_primary = report.address == primary_address(report.address);
                let module: u16 = if is_primary { 0 } else { 1 };
                values.push(SensorValue::new(module, report.get("ARM")? as f64));
            } else {
                values.push(SensorValue::new(2u16, 1.0));
            }
            values.push(SensorValue::new(3u16, report.battery()));
        }
        GadgetType::Tp82n => {
            if report.has("INT", true) {
                values.push(SensorValue::new(0u16, report.temperature("INT")?));
            }
            if report.has("SET", true) {
                values.push(SensorValue::new(1u16, report.temperature("SET")?));
            }
            values.push(SensorValue::new(2u16, report.battery()));
        }
    }

    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rc86k_primary_secondary_roundtrip() {
        assert_eq!(primary_address(8_388_608), 8_388_608);
        assert_eq!(primary_address(9_437_184), 8_388_608);
        assert_eq!(secondary_address(8_388_608), 9_437_184);
        assert_eq!(secondary_address(9_437_184), 9_437_184);
    }

    #[test]
    fn resolve_ja81m_range() {
        let info = resolve(0x1A0000).unwrap();
        assert_eq!(info.gadget_type, GadgetType::Ja81m);
    }

    #[test]
    fn resolve_rc86k_from_secondary_address() {
        let info = resolve(RC86K_SECONDARY_FIRST).unwrap();
        assert_eq!(info.gadget_type, GadgetType::Rc86k);
    }

    #[test]
    fn resolve_unknown_address() {
        assert!(resolve(0xFFFF_FFFF).is_none());
    }

    #[test]
    fn parse_ja81m_sensor_report() {
        let report = JablotronReport {
            address: 0x1A0000,
            type_tag: "JA-81M".to_string(),
            data: "SENSOR LB:0 ACT:1".to_string(),
        };
        let info = resolve(report.address).unwrap();
        let values = parse(&info, &report).unwrap();
        assert_eq!(values.len(), 2);
        assert_eq!(values[0], SensorValue::new(0u16, 1.0));
        assert_eq!(values[1], SensorValue::new(2u16, 100.0));
    }

    #[test]
    fn parse_tp82n_temperature() {
        let report = JablotronReport {
            address: 0x240000,
            type_tag: "TP-82N".to_string(),
            data: "SET:21.5\u{b0}C LB:0".to_string(),
        };
        let info = resolve(report.address).unwrap();
        let values = parse(&info, &report).unwrap();
        assert!(values.iter().any(|v| v.module_id == 1u16.into() && v.value == Some(21.5)));
    }

    #[test]
    fn parse_rc86k_primary_vs_secondary() {
        let primary_report = JablotronReport {
            address: RC86K_FIRST,
            type_tag: "RC-86K".to_string(),
            data: "ARM:1 LB:0".to_string(),
        };
        let info = resolve(primary_report.address).unwrap();
        let values = parse(&info, &primary_report).unwrap();
        assert_eq!(values[0].module_id, 0u16.into());

        let secondary_report = JablotronReport {
            address: secondary_address(RC86K_FIRST),
            ..primary_report
        };
        let values = parse(&info, &secondary_report).unwrap();
        assert_eq!(values[0].module_id, 1u16.into());
    }

    #[test]
    fn parse_rc86k_panic() {
        let report = JablotronReport {
            address: RC86K_FIRST,
            type_tag: "RC-86K".to_string(),
            data: "PANIC LB:1".to_string(),
        };
        let info = resolve(report.address).unwrap();
        let values = parse(&info, &report).unwrap();
        assert_eq!(values[0], SensorValue::new(2u16, 1.0));
        assert_eq!(values[1], SensorValue::new(3u16, 5.0));
    }
}
