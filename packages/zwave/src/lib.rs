//! Z-Wave integration: node model, mapper registry and the device
//! manager built on them. Actual radio I/O and the OpenZWave-equivalent
//! driver are out of scope; this package assumes a
//! [`network::ZWaveNetwork`] implementation is supplied by the caller.

pub mod manager;
pub mod mapper;
pub mod network;
pub mod node;

pub mod prelude {
    pub use crate::manager::{ZWaveDeviceManager, ZWaveDeviceManagerConfig};
    pub use crate::mapper::{
        CompositeMapperRegistry, GenericMapperRegistry, Mapper, MapperRegistry, Spec, SpecificMapperRegistry,
    };
    pub use crate::network::{EventQueue, PollEvent, ZWaveNetwork};
    pub use crate::node::{cc, CommandClass, Identity, Support, Value, ZWaveNode};
}
