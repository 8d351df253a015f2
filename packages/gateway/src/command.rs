//! The command shapes every technology-specific manager recognises:
//! listen/accept/unpair/set-value.

use std::time::Duration;

use gw_core::prelude::*;

/// Starts the device-manager's listen-for-new-devices window; dispatched
/// to every manager regardless of device prefix.
#[derive(Clone, Copy, Debug)]
pub struct GatewayListenCommand {
    pub duration: Duration,
}

/// Confirms that a previously dispatched `new_device` is now paired.
#[derive(Clone, Copy, Debug)]
pub struct DeviceAcceptCommand {
    pub device_id: DeviceId,
}

/// Requests that a device be unpaired and (where applicable) removed
/// from its radio network.
#[derive(Clone, Copy, Debug)]
pub struct DeviceUnpairCommand {
    pub device_id: DeviceId,
}

/// Requests a controllable module be set to `value`.
#[derive(Clone, Copy, Debug)]
pub struct DeviceSetValueCommand {
    pub device_id: DeviceId,
    pub module_id: ModuleId,
    pub value: f64,
    pub timeout: Timeout,
}

/// Any of the four recognised commands, as handed to
/// [`crate::manager::DeviceManager::accept`]/`handle`.
#[derive(Clone, Copy, Debug)]
pub enum Command {
    Listen(GatewayListenCommand),
    Accept(DeviceAcceptCommand),
    Unpair(DeviceUnpairCommand),
    SetValue(DeviceSetValueCommand),
}

impl Command {
    /// The device a command targets, if any (`Listen` targets none).
    pub fn device_id(&self) -> Option<DeviceId> {
        match self {
            Command::Listen(_) => None,
            Command::Accept(c) => Some(c.device_id),
            Command::Unpair(c) => Some(c.device_id),
            Command::SetValue(c) => Some(c.device_id),
        }
    }
}
