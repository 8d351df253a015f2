//! The device-manager framework shared by every technology: the
//! recognised command set, the paired-device cache, the `AsyncWork` latch
//! discovery/unpair/set-value hand back to callers, and the
//! `DeviceManager` trait each technology package implements.

pub mod async_work;
pub mod cache;
pub mod command;
pub mod manager;
pub mod sink;

pub mod prelude {
    pub use crate::async_work::{new_async_work, AsyncWork, AsyncWorkHandle};
    pub use crate::cache::PairedDeviceCache;
    pub use crate::command::{
        Command, DeviceAcceptCommand, DeviceSetValueCommand, DeviceUnpairCommand, GatewayListenCommand,
    };
    pub use crate::manager::DeviceManager;
    pub use crate::sink::{NewDeviceSink, RecordingSink, SampleSink};
}
