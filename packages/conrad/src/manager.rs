//! The Conrad ZMQ ingestor: a SUB loop that turns bridge-published JSON
//! events into devices and samples, plus the REQ/REP pair/unpair
//! commands.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use gw_core::prelude::*;
use gw_gateway::prelude::*;
use serde_json::{json, Value};

use crate::device::{self, ConradDevice};

const RSP_BUFFER_SIZE: usize = 129_070;

#[derive(Clone, Debug)]
pub struct ConradDeviceManagerConfig {
    pub event_endpoint: String,
    pub cmd_endpoint: String,
    /// How long the SUB loop blocks between checks of the stop flag, and
    /// the REQ/REP round-trip timeout.
    pub poll_interval: Duration,
}

pub struct ConradDeviceManager {
    config: ConradDeviceManagerConfig,
    devices: Mutex<HashMap<DeviceId, Box<dyn ConradDevice>>>,
    paired: PairedDeviceCache,
    sink: Arc<dyn NewDeviceSink>,
    samples: Arc<dyn SampleSink>,
    stop: AtomicBool,
}

impl ConradDeviceManager {
    pub fn new(config: ConradDeviceManagerConfig, sink: Arc<dyn NewDeviceSink>, samples: Arc<dyn SampleSink>) -> Self {
        Self {
            config,
            devices: Mutex::new(HashMap::new()),
            paired: PairedDeviceCache::new(),
            sink,
            samples,
            stop: AtomicBool::new(false),
        }
    }

    fn create_new_device_unlocked(
        &self,
        devices: &mut HashMap<DeviceId, Box<dyn ConradDevice>>,
        id: DeviceId,
        device_type: &str,
    ) -> Result<()> {
        let device = device::build(device_type, id)?;
        self.sink.new_device(DeviceDescription {
            device_id: device.id(),
            vendor: device::VENDOR_NAME.to_string(),
            product: device.product().to_string(),
            modules: device.module_types(),
            refresh_time: device.refresh_time(),
        });
        devices.insert(id, device);
        Ok(())
    }

    fn process_message(&self, raw: &str) -> Result<()> {
        let message: Value = serde_json::from_str(raw).map_err(|e| Error::Protocol(e.to_string()))?;
        let dev = message
            .get("dev")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::Protocol("message does not contain 'dev' element".to_string()))?;
        let id = DeviceId::conrad(dev).ok_or_else(|| Error::Protocol(format!("malformed device id: {dev}")))?;
        let event = message
            .get("event")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::Protocol("message does not contain 'event' element".to_string()))?;
        let device_type = message.get("type").and_then(Value::as_str).unwrap_or_default();

        tracing::debug!(%id, event, "received conrad event");

        let mut devices = self.devices.lock().unwrap();
        match event {
            "new_device" => self.create_new_device_unlocked(&mut devices, id, device_type),
            "message" => {
                if !devices.contains_key(&id) {
                    self.create_new_device_unlocked(&mut devices, id, device_type)?;
                }
                let data = devices.get(&id).unwrap().parse_message(&message)?;
                drop(devices);

                if !self.paired.paired(id) {
                    return Ok(());
                }
                if data.is_shippable() {
                    self.samples.ship(data);
                }
                Ok(())
            }
            other => Err(Error::IllegalState(format!("unknown message event: {other}"))),
        }
    }

    fn send_cmd_request(&self, request: &Value) -> Result<Value> {
        let ctx = zmq::Context::new();
        let requester = ctx.socket(zmq::REQ).map_err(|e| Error::Io(std::io::Error::other(e)))?;
        requester
            .set_rcvtimeo(self.config.poll_interval.as_millis() as i32)
            .map_err(|e| Error::Io(std::io::Error::other(e)))?;
        requester.connect(&self.config.cmd_endpoint).map_err(|e| Error::Io(std::io::Error::other(e)))?;

        let body = request.to_string();
        requester.send(&body, 0).map_err(|e| Error::Io(std::io::Error::other(e)))?;

        let mut buffer = vec![0u8; RSP_BUFFER_SIZE];
        let size = requester.recv_into(&mut buffer, 0).map_err(|e| Error::Io(std::io::Error::other(e)))?;
        serde_json::from_slice(&buffer[..size]).map_err(|e| Error::Protocol(e.to_string()))
    }
}

impl DeviceManager for ConradDeviceManager {
    fn prefix(&self) -> TechPrefix {
        TechPrefix::Conrad
    }

    fn paired(&self) -> &PairedDeviceCache {
        &self.paired
    }

    fn handle_accept(&self, cmd: &gw_gateway::command::DeviceAcceptCommand) -> Result<()> {
        let devices = self.devices.lock().unwrap();
        if !devices.contains_key(&cmd.device_id) {
            return Err(Error::NotFound(format!("accept: {}", cmd.device_id)));
        }
        drop(devices);
        self.paired.mark_paired(cmd.device_id);
        Ok(())
    }

    fn start_discovery(&self, duration: Duration) -> AsyncWork<()> {
        let request = json!({"cmd": "pair", "tout": duration.as_secs().to_string()});
        AsyncWork::ready(self.send_cmd_request(&request).map(|_| ()))
    }

    fn start_unpair(
        &self,
        cmd: &gw_gateway::command::DeviceUnpairCommand,
        _timeout: Timeout,
    ) -> AsyncWork<HashSet<DeviceId>> {
        if !self.paired.paired(cmd.device_id) {
            tracing::warn!(device_id = %cmd.device_id, "unpairing device that is not paired");
            return AsyncWork::ready(Ok(HashSet::new()));
        }

        self.paired.mark_unpaired(cmd.device_id);
        let request = json!({"cmd": "unpair", "device": cmd.device_id.to_fhem_id()});
        let result = self.send_cmd_request(&request).map(|_| {
            self.devices.lock().unwrap().remove(&cmd.device_id);
            HashSet::from([cmd.device_id])
        });
        AsyncWork::ready(result)
    }

    fn start_set_value(&self, cmd: &gw_gateway::command::DeviceSetValueCommand) -> AsyncWork<()> {
        // Set-value for Conrad devices is carried out by the paired FHEM
        // telnet client against the device's `_Sw`-style actuator, not
        // through this ZMQ ingestor.
        AsyncWork::ready(Err(Error::InvalidArgument(format!(
            "device {} does not support set-value through the Conrad ZMQ manager",
            cmd.device_id
        ))))
    }

    fn run(&self) {
        let ctx = zmq::Context::new();
        let subscriber = ctx.socket(zmq::SUB).expect("create zmq SUB socket");
        subscriber.connect(&self.config.event_endpoint).expect("connect to conrad event endpoint");
        subscriber.set_subscribe(b"").expect("subscribe to all conrad events");
        subscriber
            .set_rcvtimeo(self.config.poll_interval.as_millis() as i32)
            .expect("set conrad SUB receive timeout");

        tracing::info!("starting Conrad device manager");

        let mut buffer = vec![0u8; RSP_BUFFER_SIZE];
        while !self.stop.load(Ordering::Relaxed) {
            let size = match subscriber.recv_into(&mut buffer, 0) {
                Ok(size) => size,
                Err(zmq::Error::EAGAIN) => continue,
                Err(e) => {
                    tracing::warn!(error = %e, "zmq receive failed");
                    continue;
                }
            };

            let message = String::from_utf8_lossy(&buffer[..size]).into_owned();
            if let Err(e) = self.process_message(&message) {
                tracing::warn!(error = %e, "failed to process conrad event");
            }
        }

        tracing::info!("stopping Conrad device manager");
    }

    fn stop(&self) {
        self.stop.store(true, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> (ConradDeviceManager, Arc<RecordingSink>, Arc<RecordingSink>) {
        let new_device_sink = Arc::new(RecordingSink::new());
        let sample_sink = Arc::new(RecordingSink::new());
        let manager = ConradDeviceManager::new(
            ConradDeviceManagerConfig {
                event_endpoint: "inproc://events".to_string(),
                cmd_endpoint: "inproc://cmd".to_string(),
                poll_interval: Duration::from_millis(200),
            },
            new_device_sink.clone(),
            sample_sink.clone(),
        );
        (manager, new_device_sink, sample_sink)
    }

    #[test]
    fn new_device_event_dispatches_and_registers_the_device() {
        let (manager, sink, _) = manager();
        manager
            .process_message(r#"{"dev":"38D649","event":"new_device","type":"powerMeter"}"#)
            .unwrap();

        assert_eq!(sink.new_devices().len(), 1);
        assert!(manager.devices.lock().unwrap().contains_key(&DeviceId::conrad("38D649").unwrap()));
    }

    #[test]
    fn message_for_unpaired_device_is_parsed_but_not_shipped() {
        let (manager, _, samples) = manager();
        let message = r#"{"dev":"HM_30B0BE","event":"message","type":"threeStateSensor","rssi":-52,"channels":{"Main":"open"}}"#;
        manager.process_message(message).unwrap();
        assert!(samples.samples().is_empty());
    }

    #[test]
    fn message_for_paired_device_is_shipped() {
        let (manager, _, samples) = manager();
        let id = DeviceId::conrad("30B0BE").unwrap();
        manager.paired.mark_paired(id);

        let message = r#"{"dev":"HM_30B0BE","event":"message","type":"threeStateSensor","rssi":-52,"channels":{"Main":"open"}}"#;
        manager.process_message(message).unwrap();
        assert_eq!(samples.samples().len(), 1);
    }

    #[test]
    fn unpair_of_a_device_not_paired_is_a_no_op() {
        let (manager, _, _) = manager();
        let cmd = gw_gateway::command::DeviceUnpairCommand { device_id: DeviceId::conrad("38D649").unwrap() };
        let removed = manager.start_unpair(&cmd, None).try_join(None).unwrap();
        assert!(removed.is_empty());
    }

    #[test]
    fn handle_accept_rejects_unknown_device() {
        let (manager, _, _) = manager();
        let cmd = gw_gateway::command::DeviceAcceptCommand { device_id: DeviceId::conrad("38D649").unwrap() };
        assert!(manager.handle_accept(&cmd).is_err());
    }
}
