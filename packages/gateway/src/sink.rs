//! The outbound edge a device manager dispatches `new_device`/sample
//! events to. The distributor/dispatcher that actually ships these
//! further is an external collaborator; each manager only needs
//! somewhere to hand events once it has them, so this is a trait object
//! callers provide, not a network client.

use gw_core::prelude::*;

pub trait NewDeviceSink: Send + Sync {
    fn new_device(&self, description: DeviceDescription);
}

pub trait SampleSink: Send + Sync {
    fn ship(&self, sample: SensorData);
}

/// A sink that only records what it was given, for tests and for a
/// manager run standalone without a wired-up distributor.
#[derive(Default)]
pub struct RecordingSink {
    new_devices: std::sync::Mutex<Vec<DeviceDescription>>,
    samples: std::sync::Mutex<Vec<SensorData>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_devices(&self) -> Vec<DeviceDescription> {
        self.new_devices.lock().unwrap().clone()
    }

    pub fn samples(&self) -> Vec<SensorData> {
        self.samples.lock().unwrap().clone()
    }
}

impl NewDeviceSink for RecordingSink {
    fn new_device(&self, description: DeviceDescription) {
        self.new_devices.lock().unwrap().push(description);
    }
}

impl SampleSink for RecordingSink {
    fn ship(&self, sample: SensorData) {
        self.samples.lock().unwrap().push(sample);
    }
}
