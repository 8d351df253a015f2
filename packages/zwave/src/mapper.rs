//! The mapper registry chain that turns a queried `ZWaveNode` into the
//! module list a device manager exposes, and turns a raw command-class
//! `Value` into a `SensorValue`: a generic CC-indexed registry, a
//! first-match composite chain over several registries, and concrete
//! per-product mappers for devices the generic tables don't cover.

use std::collections::{BTreeMap, HashMap};

use gw_core::prelude::*;

use crate::node::{cc, CommandClass, Value, ZWaveNode};

/// The low 40 bits of the node's identity, with the top byte of the
/// 56-bit local part stamped with `bits`. Used so the generic mapper's
/// synthesized device ids never collide with a device a specific mapper
/// resolves for the same node (`Mapper::mangleID`).
const ZWAVE_IDENT_MASK: u64 = 0x0000_00FF_FFFF_FFFF;
const ZWAVE_MANGLE_SHIFT: u32 = 40;

fn mangle_id(id: DeviceId, bits: u8) -> DeviceId {
    let ident = id.ident() & ZWAVE_IDENT_MASK;
    let mangle_bits = (bits as u64) << ZWAVE_MANGLE_SHIFT;
    DeviceId::new(TechPrefix::ZWave, mangle_bits | ident)
}

/// Resolved per node: the module list, the id to ship it under, and the
/// conversion from a raw reported value to a `SensorValue`.
pub trait Mapper: Send + Sync {
    fn build_id(&self) -> DeviceId;
    fn product(&self) -> String;
    fn types(&self) -> Vec<ModuleTypeSpec>;

    /// A module id is simply the position of its type in `types()`
    /// (`Mapper::findType`).
    fn find_type(&self, module_id: ModuleId) -> Option<ModuleType> {
        self.types().get(module_id.0 as usize).map(|spec| spec.kind)
    }

    fn convert(&self, value: &Value) -> Result<SensorValue>;
}

/// Implemented by each stage of the resolution chain (specific vendor
/// mapper, generic command-class mapper, or a composite of both).
pub trait MapperRegistry: Send + Sync {
    fn resolve(&self, node: &ZWaveNode) -> Option<Box<dyn Mapper>>;
}

/// `(command class, index)` — the key both CC tables are keyed on
/// (`GenericZWaveKey`).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
struct GenericKey {
    cc: u8,
    index: u8,
}

const fn key(cc_id: u8, index: u8) -> GenericKey {
    GenericKey { cc: cc_id, index }
}

/// The canonical module ordering every generic-mapped node's module ids
/// are assigned from (`CC_ORDER`). `BASIC` anchors position 0 so a plain
/// on/off node still gets a stable id even though it isn't itself exposed
/// as a module (see `CC_MAPPING` below, which has no entry for it).
const CC_ORDER: &[GenericKey] = &[
    key(cc::BASIC, 0),
    key(cc::BATTERY, 0),
    key(cc::SWITCH_BINARY, 0),
    key(cc::SENSOR_BINARY, 0x00),
    key(cc::SENSOR_BINARY, 0x01),
    key(cc::SENSOR_BINARY, 0x02),
    key(cc::SENSOR_BINARY, 0x03),
    key(cc::SENSOR_BINARY, 0x04),
    key(cc::SENSOR_BINARY, 0x05),
    key(cc::SENSOR_BINARY, 0x06),
    key(cc::SENSOR_BINARY, 0x07),
    key(cc::SENSOR_BINARY, 0x08),
    key(cc::SENSOR_BINARY, 0x09),
    key(cc::SENSOR_BINARY, 0x0A),
    key(cc::SENSOR_BINARY, 0x0B),
    key(cc::SENSOR_BINARY, 0x0C),
    key(cc::SENSOR_BINARY, 0x0D),
    key(cc::ALARM, 0x01),
    key(cc::ALARM, 0x02),
    key(cc::ALARM, 0x03),
    key(cc::ALARM, 0x04),
    key(cc::ALARM, 0x05),
    key(cc::ALARM, 0x06),
    key(cc::ALARM, 0x07),
    key(cc::ALARM, 0x08),
    key(cc::ALARM, 0x09),
    key(cc::ALARM, 0x0A),
    key(cc::ALARM, 0x0B),
    key(cc::SENSOR_MULTILEVEL, 0x01),
    key(cc::SENSOR_MULTILEVEL, 0x03),
    key(cc::SENSOR_MULTILEVEL, 0x04),
    key(cc::SENSOR_MULTILEVEL, 0x05),
    key(cc::SENSOR_MULTILEVEL, 0x0F),
    key(cc::SENSOR_MULTILEVEL, 0x10),
    key(cc::SENSOR_MULTILEVEL, 0x17),
    key(cc::SENSOR_MULTILEVEL, 0x18),
    key(cc::SENSOR_MULTILEVEL, 0x1B),
    key(cc::SENSOR_MULTILEVEL, 0x1E),
    key(cc::SENSOR_MULTILEVEL, 0x23),
    key(cc::SENSOR_MULTILEVEL, 0x29),
    key(cc::SENSOR_MULTILEVEL, 0x40),
];

/// Which `ModuleType` each ordered key maps to. `BASIC` has no entry: it
/// establishes ordering only, it is never itself exposed as a module
/// (`GenericZWaveMapperRegistry::CC_MAPPING`).
fn cc_mapping() -> &'static HashMap<GenericKey, ModuleType> {
    use std::sync::OnceLock;
    static MAPPING: OnceLock<HashMap<GenericKey, ModuleType>> = OnceLock::new();
    MAPPING.get_or_init(|| {
        HashMap::from([
            (key(cc::BATTERY, 0), ModuleType::Battery),
            (key(cc::SWITCH_BINARY, 0), ModuleType::OnOff),
            (key(cc::SENSOR_BINARY, 0x00), ModuleType::Motion),
            (key(cc::SENSOR_BINARY, 0x01), ModuleType::Smoke),
            (key(cc::SENSOR_BINARY, 0x02), ModuleType::SecurityAlert),
            (key(cc::SENSOR_BINARY, 0x03), ModuleType::Co2),
            (key(cc::SENSOR_BINARY, 0x04), ModuleType::Heat),
            (key(cc::SENSOR_BINARY, 0x05), ModuleType::SecurityAlert),
            (key(cc::SENSOR_BINARY, 0x06), ModuleType::SecurityAlert),
            (key(cc::SENSOR_BINARY, 0x07), ModuleType::SecurityAlert),
            (key(cc::SENSOR_BINARY, 0x08), ModuleType::SecurityAlert),
            (key(cc::SENSOR_BINARY, 0x09), ModuleType::OpenClose),
            (key(cc::SENSOR_BINARY, 0x0A), ModuleType::OpenClose),
            (key(cc::SENSOR_BINARY, 0x0B), ModuleType::Motion),
            (key(cc::SENSOR_BINARY, 0x0C), ModuleType::SecurityAlert),
            (key(cc::SENSOR_BINARY, 0x0D), ModuleType::SecurityAlert),
            (key(cc::ALARM, 0x01), ModuleType::Smoke),
            (key(cc::ALARM, 0x02), ModuleType::SecurityAlert),
            (key(cc::ALARM, 0x03), ModuleType::Co2),
            (key(cc::ALARM, 0x04), ModuleType::Heat),
            (key(cc::ALARM, 0x05), ModuleType::SecurityAlert),
            (key(cc::ALARM, 0x06), ModuleType::SecurityAlert),
            (key(cc::ALARM, 0x07), ModuleType::SecurityAlert),
            (key(cc::ALARM, 0x08), ModuleType::SecurityAlert),
            (key(cc::ALARM, 0x09), ModuleType::SecurityAlert),
            (key(cc::ALARM, 0x0A), ModuleType::SecurityAlert),
            (key(cc::ALARM, 0x0B), ModuleType::SecurityAlert),
            (key(cc::SENSOR_MULTILEVEL, 0x01), ModuleType::Temperature),
            (key(cc::SENSOR_MULTILEVEL, 0x03), ModuleType::Luminance),
            (key(cc::SENSOR_MULTILEVEL, 0x04), ModuleType::Power),
            (key(cc::SENSOR_MULTILEVEL, 0x05), ModuleType::Humidity),
            (key(cc::SENSOR_MULTILEVEL, 0x0F), ModuleType::Voltage),
            (key(cc::SENSOR_MULTILEVEL, 0x10), ModuleType::Current),
            (key(cc::SENSOR_MULTILEVEL, 0x17), ModuleType::Temperature),
            (key(cc::SENSOR_MULTILEVEL, 0x18), ModuleType::Temperature),
            (key(cc::SENSOR_MULTILEVEL, 0x1B), ModuleType::Ultraviolet),
            (key(cc::SENSOR_MULTILEVEL, 0x1E), ModuleType::Co2),
            (key(cc::SENSOR_MULTILEVEL, 0x23), ModuleType::Pm25),
            (key(cc::SENSOR_MULTILEVEL, 0x29), ModuleType::Noise),
            (key(cc::SENSOR_MULTILEVEL, 0x40), ModuleType::Temperature),
        ])
    })
}

/// A mapper built purely from the command classes a node advertised, with
/// no vendor-specific knowledge (`GenericZWaveMapper`).
pub struct GenericMapper {
    id: DeviceId,
    product: String,
    ordered: Vec<GenericKey>,
}

impl GenericMapper {
    const ID_MANGLE_BITS: u8 = 0xFF;

    fn module_index(&self, key: &GenericKey) -> Option<usize> {
        self.ordered.iter().position(|k| k == key)
    }
}

impl Mapper for GenericMapper {
    fn build_id(&self) -> DeviceId {
        self.id
    }

    fn product(&self) -> String {
        format!("{} (generic)", self.product)
    }

    fn types(&self) -> Vec<ModuleTypeSpec> {
        let mapping = cc_mapping();
        self.ordered
            .iter()
            .filter_map(|k| mapping.get(k))
            .map(|t| ModuleTypeSpec::plain(*t))
            .collect()
    }

    fn convert(&self, value: &Value) -> Result<SensorValue> {
        let cc = value.command_class();
        let lookup = key(cc.id, cc.index);
        let module_id = ModuleId(
            self.module_index(&lookup)
                .ok_or_else(|| Error::NotFound(format!("no generic mapping for cc {}/{}", cc.id, cc.index)))?
                as u16,
        );

        let converted = match cc.id {
            x if x == self::cc::SWITCH_BINARY => value.as_bool()?.into_f64(),
            x if x == self::cc::SENSOR_BINARY && cc.index == 0x0A => (!value.as_bool()?).into_f64(),
            x if x == self::cc::SENSOR_BINARY => value.as_bool()?.into_f64(),
            x if x == self::cc::ALARM => {
                // 254 is the "no event" sentinel, independent of the
                // alarm's own severity scale.
                let active = value.as_int()? != 254;
                active.into_f64()
            }
            x if x == self::cc::BATTERY => value.as_double()?,
            x if x == self::cc::SENSOR_MULTILEVEL => match cc.index {
                0x01 | 0x17 | 0x18 | 0x40 => value.as_celsius()?,
                0x23 => value.as_pm25()?,
                _ => value.as_double()?,
            },
            other => return Err(Error::NotFound(format!("unhandled command class {other}"))),
        };

        Ok(SensorValue::new(module_id, converted))
    }
}

trait BoolExt {
    fn into_f64(self) -> f64;
}

impl BoolExt for bool {
    fn into_f64(self) -> f64 {
        if self {
            1.0
        } else {
            0.0
        }
    }
}

/// Builds a `GenericMapper` for any fully-queried node, walking its
/// command classes in `CC_ORDER` and skipping ones the table doesn't
/// recognise (`GenericZWaveMapperRegistry::resolve`).
pub struct GenericMapperRegistry;

impl MapperRegistry for GenericMapperRegistry {
    fn resolve(&self, node: &ZWaveNode) -> Option<Box<dyn Mapper>> {
        if !node.queried {
            return None;
        }

        let present: std::collections::HashSet<GenericKey> =
            node.command_classes.iter().map(|c| key(c.id, c.index)).collect();

        let ordered: Vec<GenericKey> = CC_ORDER
            .iter()
            .copied()
            .filter(|k| {
                let found = present.contains(k);
                if !found {
                    tracing::debug!(cc = k.cc, index = k.index, "command class not present on node, skipping");
                }
                found
            })
            .collect();

        if ordered.is_empty() {
            return None;
        }

        let mapping = cc_mapping();
        for k in &ordered {
            if !mapping.contains_key(k) && k.cc != cc::BASIC {
                tracing::warn!(cc = k.cc, index = k.index, "command class has no module mapping");
            }
        }

        Some(Box::new(GenericMapper {
            id: mangle_id(node.id(), GenericMapper::ID_MANGLE_BITS),
            product: node.product.clone(),
            ordered,
        }))
    }
}

/// A vendor/product pair identifying one Z-Wave device family
/// (`SpecificZWaveMapperRegistry::Spec`).
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct Spec {
    pub vendor: u16,
    pub product: u16,
}

impl Spec {
    pub fn new(vendor: u16, product: u16) -> Self {
        Self { vendor, product }
    }
}

impl std::fmt::Display for Spec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:04X}:{:04X}", self.vendor, self.product)
    }
}

type MapperInstantiator = fn(&ZWaveNode) -> Box<dyn Mapper>;

/// Resolves a node to a hand-written mapper by exact vendor/product match
/// (`SpecificZWaveMapperRegistry`). Concrete product families (Fibaro,
/// etc.) register themselves via [`SpecificMapperRegistry::register`].
#[derive(Default)]
pub struct SpecificMapperRegistry {
    instantiators: HashMap<Spec, MapperInstantiator>,
}

impl SpecificMapperRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, spec: Spec, instantiate: MapperInstantiator) {
        self.instantiators.insert(spec, instantiate);
    }

    /// The registry FGK101/FGSD002-equipped out of the box
    /// (`FibaroZWaveMapperRegistry`).
    pub fn with_fibaro() -> Self {
        let mut registry = Self::new();
        registry.register(fibaro::FGK101_SPEC, |node| Box::new(fibaro::FGK101Mapper::new(node)));
        registry.register(fibaro::FGSD002_SPEC, |node| Box::new(fibaro::FGSD002Mapper::new(node)));
        registry
    }
}

impl MapperRegistry for SpecificMapperRegistry {
    fn resolve(&self, node: &ZWaveNode) -> Option<Box<dyn Mapper>> {
        let spec = Spec::new(node.vendor_id, node.product_id);
        self.instantiators.get(&spec).map(|instantiate| instantiate(node))
    }
}

/// Tries each registry in turn and keeps the first match
/// (`CompositeZWaveMapperRegistry::resolve`).
#[derive(Default)]
pub struct CompositeMapperRegistry {
    registries: Vec<Box<dyn MapperRegistry>>,
}

impl CompositeMapperRegistry {
    pub fn new(registries: Vec<Box<dyn MapperRegistry>>) -> Self {
        Self { registries }
    }
}

impl MapperRegistry for CompositeMapperRegistry {
    fn resolve(&self, node: &ZWaveNode) -> Option<Box<dyn Mapper>> {
        self.registries.iter().find_map(|r| r.resolve(node))
    }
}

/// Fibaro-family mappers with a hand-written, non-generic module layout
/// (`FibaroZWaveMapperRegistry.cpp`).
pub mod fibaro {
    use super::*;

    pub const FGK101_SPEC: Spec = Spec { vendor: 0x010F, product: 0x0700 };
    pub const FGSD002_SPEC: Spec = Spec { vendor: 0x010F, product: 0x0B01 };

    /// Door/window sensor: battery + open/close.
    pub struct FGK101Mapper {
        id: DeviceId,
        product: String,
    }

    impl FGK101Mapper {
        pub fn new(node: &ZWaveNode) -> Self {
            Self { id: node.id(), product: node.product.clone() }
        }
    }

    impl Mapper for FGK101Mapper {
        fn build_id(&self) -> DeviceId {
            self.id
        }

        fn product(&self) -> String {
            self.product.clone()
        }

        fn types(&self) -> Vec<ModuleTypeSpec> {
            vec![ModuleTypeSpec::plain(ModuleType::Battery), ModuleTypeSpec::plain(ModuleType::OpenClose)]
        }

        fn convert(&self, value: &Value) -> Result<SensorValue> {
            match value.command_class().id {
                x if x == cc::BATTERY => Ok(SensorValue::new(ModuleId(0), value.as_double()?)),
                x if x == cc::SENSOR_BINARY => Ok(SensorValue::new(ModuleId(1), value.as_bool()?.into_f64())),
                other => Err(Error::NotFound(format!("FGK101 cannot convert command class {other}"))),
            }
        }
    }

    /// Smoke detector: battery, temperature, tamper, smoke, heat.
    pub struct FGSD002Mapper {
        id: DeviceId,
        product: String,
    }

    impl FGSD002Mapper {
        pub fn new(node: &ZWaveNode) -> Self {
            Self { id: node.id(), product: node.product.clone() }
        }

        fn convert_alarm(&self, value: &Value) -> Result<SensorValue> {
            let cc = value.command_class();
            // 254 marks "no event" on this alarm index, mirroring the
            // generic mapper's sentinel.
            let active = value.as_int()? != 254;
            match cc.index {
                0x01 => Ok(SensorValue::new(ModuleId(3), active.into_f64())),
                0x04 => Ok(SensorValue::new(ModuleId(4), active.into_f64())),
                0x07 => Ok(SensorValue::new(ModuleId(2), active.into_f64())),
                other => Err(Error::NotFound(format!("FGSD002 cannot convert alarm index {other}"))),
            }
        }
    }

    impl Mapper for FGSD002Mapper {
        fn build_id(&self) -> DeviceId {
            self.id
        }

        fn product(&self) -> String {
            self.product.clone()
        }

        fn types(&self) -> Vec<ModuleTypeSpec> {
            vec![
                ModuleTypeSpec::plain(ModuleType::Battery),
                ModuleTypeSpec::plain(ModuleType::Temperature),
                ModuleTypeSpec::plain(ModuleType::SecurityAlert),
                ModuleTypeSpec::plain(ModuleType::Smoke),
                ModuleTypeSpec::plain(ModuleType::Heat),
            ]
        }

        fn convert(&self, value: &Value) -> Result<SensorValue> {
            match value.command_class().id {
                x if x == cc::BATTERY => Ok(SensorValue::new(ModuleId(0), value.as_double()?)),
                x if x == cc::SENSOR_MULTILEVEL => Ok(SensorValue::new(ModuleId(1), value.as_celsius()?)),
                x if x == cc::ALARM => self.convert_alarm(value),
                other => Err(Error::NotFound(format!("FGSD002 cannot convert command class {other}"))),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{Identity, ZWaveNode};

    fn queried_node(classes: &[(u8, u8)]) -> ZWaveNode {
        let mut node = ZWaveNode::new(Identity::new(0x1234_5678, 9));
        node.queried = true;
        node.product = "Test Node".to_string();
        for (id, index) in classes {
            node.command_classes.insert(CommandClass::new(*id, *index, 0, "cc"));
        }
        node
    }

    #[test]
    fn generic_registry_skips_unqueried_nodes() {
        let registry = GenericMapperRegistry;
        let node = ZWaveNode::new(Identity::new(1, 2));
        assert!(registry.resolve(&node).is_none());
    }

    #[test]
    fn generic_mapper_orders_modules_by_cc_order_and_mangles_id() {
        let node = queried_node(&[(cc::BATTERY, 0), (cc::SENSOR_BINARY, 0x09)]);
        let registry = GenericMapperRegistry;
        let mapper = registry.resolve(&node).unwrap();

        let types = mapper.types();
        assert_eq!(types[0].kind, ModuleType::Battery);
        assert_eq!(types[1].kind, ModuleType::OpenClose);
        assert_ne!(mapper.build_id(), node.id());
    }

    #[test]
    fn generic_mapper_converts_switch_binary_to_on_off() {
        let node = queried_node(&[(cc::SWITCH_BINARY, 0)]);
        let registry = GenericMapperRegistry;
        let mapper = registry.resolve(&node).unwrap();

        let value = Value::new(CommandClass::new(cc::SWITCH_BINARY, 0, 0, "switch"), "true", None);
        let converted = mapper.convert(&value).unwrap();
        assert_eq!(converted.module_id, ModuleId(0));
        assert_eq!(converted.value, Some(1.0));
    }

    #[test]
    fn specific_registry_resolves_fgk101_by_vendor_product() {
        let mut node = ZWaveNode::new(Identity::new(1, 2));
        node.vendor_id = fibaro::FGK101_SPEC.vendor;
        node.product_id = fibaro::FGK101_SPEC.product;
        node.product = "FGK-101".to_string();

        let registry = SpecificMapperRegistry::with_fibaro();
        let mapper = registry.resolve(&node).expect("should resolve FGK101");
        assert_eq!(mapper.types().len(), 2);
    }

    #[test]
    fn composite_registry_falls_back_to_generic() {
        let node = queried_node(&[(cc::BATTERY, 0)]);
        let composite = CompositeMapperRegistry::new(vec![
            Box::new(SpecificMapperRegistry::with_fibaro()),
            Box::new(GenericMapperRegistry),
        ]);
        let mapper = composite.resolve(&node).expect("generic fallback should resolve");
        assert_eq!(mapper.types()[0].kind, ModuleType::Battery);
    }
}
