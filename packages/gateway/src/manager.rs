//! The shape shared by every technology-specific device manager: command
//! routing by prefix, a paired-device cache, and the
//! discovery/unpair/set-value contract that each manager fulfils
//! asynchronously.

use std::time::Duration;

use gw_core::prelude::*;

use crate::async_work::AsyncWork;
use crate::cache::PairedDeviceCache;
use crate::command::{Command, DeviceAcceptCommand, DeviceSetValueCommand, DeviceUnpairCommand};

/// Implemented by one manager per radio technology. `accept`/`handle` give
/// the common routing; `start_discovery`/`start_unpair`/`start_set_value`
/// are each technology's own asynchronous work.
pub trait DeviceManager {
    /// The technology prefix this manager owns.
    fn prefix(&self) -> TechPrefix;

    fn paired(&self) -> &PairedDeviceCache;

    /// True when `cmd` targets this manager: any `Listen` command, or a
    /// device-targeted command whose id carries this manager's prefix.
    fn accept(&self, cmd: &Command) -> bool {
        match cmd.device_id() {
            None => true,
            Some(id) => id.prefix() == Some(self.prefix()),
        }
    }

    /// Records that the server has confirmed pairing of the device named
    /// by `cmd`. Callers must have already located the underlying device
    /// instance; a not-found device is an error.
    fn handle_accept(&self, cmd: &DeviceAcceptCommand) -> Result<()> {
        self.paired().mark_paired(cmd.device_id);
        Ok(())
    }

    /// Opens a listen-for-new-devices window of `duration`, returning a
    /// handle the command dispatcher can await without blocking its own
    /// loop.
    fn start_discovery(&self, duration: Duration) -> AsyncWork<()>;

    /// Unpairs `id` within `timeout`, returning the set of device ids that
    /// were actually removed (usually just `id`, but Z-Wave unpair can
    /// surface extra removals observed during the same window).
    fn start_unpair(&self, cmd: &DeviceUnpairCommand, timeout: Timeout) -> AsyncWork<std::collections::HashSet<DeviceId>>;

    /// Requests a module be set to a new value within `timeout`.
    fn start_set_value(&self, cmd: &DeviceSetValueCommand) -> AsyncWork<()>;

    /// Runs the manager's main loop; blocks until `stop` is called.
    fn run(&self);

    /// Signals the main loop to terminate and releases anything it may
    /// be blocked on.
    fn stop(&self);
}
