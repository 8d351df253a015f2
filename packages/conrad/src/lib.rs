//! Conrad/HomeMatic integration: the ZMQ bridge ingestor and device-kind
//! model, plus an FHEM telnet fallback client and a minimal VPT HTTP
//! scanner sharing its poll-and-diff shape.

pub mod device;
pub mod fhem;
pub mod manager;
pub mod vpt;

pub mod prelude {
    pub use crate::device::{build, ConradDevice, PowerMeterSwitch, RadiatorThermostat, WirelessShutterContact};
    pub use crate::fhem::{FHEMClient, FHEMClientConfig, FHEMDeviceInfo, HttpPollScanner};
    pub use crate::manager::{ConradDeviceManager, ConradDeviceManagerConfig};
    pub use crate::vpt::{VptHttpScanner, VptHttpScannerConfig};
}
