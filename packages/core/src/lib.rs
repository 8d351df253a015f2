//! Shared types for the gateway: device/module identity, the sensor
//! sample model, the error taxonomy, and the symmetric cipher
//! primitives the credentials store builds on.

pub mod crypto;
pub mod device_id;
pub mod error;
pub mod module_type;
pub mod sensor;
pub mod timeout;

pub mod prelude {
    pub use crate::crypto::{CipherError, CryptoParams};
    pub use crate::device_id::{DeviceId, TechPrefix};
    pub use crate::error::{Error, Result};
    pub use crate::module_type::{ModuleAttribute, ModuleType, ModuleTypeSpec};
    pub use crate::sensor::{DeviceDescription, ModuleId, RefreshTime, SensorData, SensorValue};
    pub use crate::timeout::{clamp_min, Timeout};
}
