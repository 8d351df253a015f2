//! The outbound distributor is an external collaborator; this is the
//! minimal stand-in gw-cli provides so the managers have somewhere to
//! ship events in the absence of one: log them.

use gw_core::prelude::*;
use gw_gateway::prelude::{NewDeviceSink, SampleSink};

pub struct LoggingSink;

impl NewDeviceSink for LoggingSink {
    fn new_device(&self, description: DeviceDescription) {
        tracing::info!(
            device_id = %description.device_id,
            vendor = %description.vendor,
            product = %description.product,
            modules = description.modules.len(),
            "new device"
        );
    }
}

impl SampleSink for LoggingSink {
    fn ship(&self, sample: SensorData) {
        tracing::info!(device_id = %sample.device_id, values = sample.values.len(), "sample");
    }
}
