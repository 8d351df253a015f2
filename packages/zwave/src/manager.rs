//! The Z-Wave device manager: tracks nodes as they're reported by the
//! network, resolves a mapper for each once queried, and dispatches
//! `new_device`/sample events for paired devices.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use gw_core::prelude::*;
use gw_gateway::prelude::*;

use crate::mapper::{Mapper, MapperRegistry};
use crate::network::{PollEvent, ZWaveNetwork};
use crate::node::{cc, CommandClass, Identity, Value, ZWaveNode};

struct Device {
    node: ZWaveNode,
    mapper: Option<Box<dyn crate::mapper::Mapper>>,
    refresh: RefreshTime,
}

impl Device {
    fn new(node: ZWaveNode) -> Self {
        Self { node, mapper: None, refresh: RefreshTime::None }
    }

    /// The id devices are shipped under once resolved; the node's own id
    /// before that (`Device::id`).
    fn id(&self) -> DeviceId {
        self.mapper.as_ref().map(|m| m.build_id()).unwrap_or_else(|| self.node.id())
    }

    fn resolve_mapper(&mut self, registry: &dyn MapperRegistry) -> bool {
        self.mapper = registry.resolve(&self.node);
        self.mapper.is_some()
    }

    fn description(&self) -> Option<DeviceDescription> {
        let mapper = self.mapper.as_ref()?;
        Some(DeviceDescription {
            device_id: mapper.build_id(),
            vendor: format!("{:04X}", self.node.vendor_id),
            product: mapper.product(),
            modules: mapper.types(),
            refresh_time: self.refresh,
        })
    }
}

/// Tunables from `ZWaveDeviceManager.h`'s setters.
#[derive(Clone, Copy, Debug)]
pub struct ZWaveDeviceManagerConfig {
    /// How long a listen window stays open for new-node dispatch once a
    /// `GatewayListenCommand` arrives. Usually longer than the caller's
    /// own listen duration: node discovery (especially over a mesh with
    /// sleeping battery nodes) is sometimes very slow, and nodes that
    /// finish querying slightly after the caller's window closed should
    /// still be dispatched (`ZWaveDeviceManager::setDispatchDuration`).
    pub dispatch_duration: Duration,
    pub poll_timeout: Timeout,
}

impl Default for ZWaveDeviceManagerConfig {
    fn default() -> Self {
        Self {
            dispatch_duration: Duration::from_secs(60),
            poll_timeout: Some(Duration::from_secs(5)),
        }
    }
}

pub struct ZWaveDeviceManager {
    network: Arc<dyn ZWaveNetwork>,
    registry: Arc<dyn MapperRegistry>,
    sink: Arc<dyn NewDeviceSink>,
    samples: Arc<dyn SampleSink>,
    config: ZWaveDeviceManagerConfig,
    paired: PairedDeviceCache,
    devices: Mutex<HashMap<Identity, Device>>,
    recently_unpaired: Mutex<HashSet<DeviceId>>,
    dispatch_until: Mutex<Option<std::time::Instant>>,
    stop: AtomicBool,
}

impl ZWaveDeviceManager {
    pub fn new(
        network: Arc<dyn ZWaveNetwork>,
        registry: Arc<dyn MapperRegistry>,
        sink: Arc<dyn NewDeviceSink>,
        samples: Arc<dyn SampleSink>,
        config: ZWaveDeviceManagerConfig,
    ) -> Self {
        Self {
            network,
            registry,
            sink,
            samples,
            config,
            paired: PairedDeviceCache::new(),
            devices: Mutex::new(HashMap::new()),
            recently_unpaired: Mutex::new(HashSet::new()),
            dispatch_until: Mutex::new(None),
            stop: AtomicBool::new(false),
        }
    }

    fn dispatch_window_open(&self) -> bool {
        match *self.dispatch_until.lock().unwrap() {
            Some(deadline) => std::time::Instant::now() < deadline,
            None => false,
        }
    }

    /// Skips controllers and already-paired devices; dispatches the rest
    /// only while the listen/dispatch window is open
    /// (`ZWaveDeviceManager::dispatchDevice`).
    fn dispatch_device(&self, device: &Device, enabled: bool) {
        if device.node.controller || self.paired.paired(device.id()) {
            return;
        }
        if !enabled {
            return;
        }
        if let Some(description) = device.description() {
            self.sink.new_device(description);
        }
    }

    fn dispatch_unpaired(&self) {
        let enabled = self.dispatch_window_open();
        let devices = self.devices.lock().unwrap();
        for device in devices.values() {
            self.dispatch_device(device, enabled);
        }
    }

    /// Ships `value` if its device is paired and the mapper could convert
    /// it; unconvertible/unpaired values are processed (for bookkeeping,
    /// e.g. refresh-time values) but never shipped
    /// (`ZWaveDeviceManager::processValue`).
    fn process_value(&self, identity: Identity, value: Value) {
        let devices = self.devices.lock().unwrap();
        let Some(device) = devices.get(&identity) else {
            tracing::debug!(?identity, "value for unknown node, ignoring");
            return;
        };
        let Some(mapper) = device.mapper.as_ref() else {
            return;
        };
        let id = mapper.build_id();
        if !self.paired.paired(id) {
            return;
        }
        match mapper.convert(&value) {
            Ok(sensor_value) => self.samples.ship(SensorData::new(id, vec![sensor_value])),
            Err(e) => tracing::debug!(?identity, error = %e, "value could not be converted, dropping"),
        }
    }

    fn handle_poll_event(&self, event: PollEvent) {
        match event {
            PollEvent::NewNode(node) => {
                let identity = node.identity;
                let mut devices = self.devices.lock().unwrap();
                let mut device = Device::new(node);
                device.resolve_mapper(self.registry.as_ref());
                devices.insert(identity, device);
                drop(devices);
                self.dispatch_unpaired();
            }
            PollEvent::UpdateNode(node) => {
                let identity = node.identity;
                let mut devices = self.devices.lock().unwrap();
                let entry = devices.entry(identity).or_insert_with(|| Device::new(node.clone()));
                entry.node = node;
                entry.resolve_mapper(self.registry.as_ref());
                drop(devices);
                self.dispatch_unpaired();
            }
            PollEvent::RemoveNode(identity) => {
                let mut devices = self.devices.lock().unwrap();
                if let Some(device) = devices.remove(&identity) {
                    let id = device.id();
                    self.paired.mark_unpaired(id);
                    self.recently_unpaired.lock().unwrap().insert(id);
                }
            }
            PollEvent::Value(identity, value) => self.process_value(identity, value),
            PollEvent::InclusionStart | PollEvent::InclusionDone | PollEvent::RemoveNodeStart | PollEvent::RemoveNodeDone | PollEvent::Ready => {
                tracing::debug!(?event, "network lifecycle event");
            }
        }
    }

    /// Drains and clears the set of device ids removed since the last
    /// call (`ZWaveDeviceManager::recentlyUnpaired`).
    fn recently_unpaired(&self) -> HashSet<DeviceId> {
        std::mem::take(&mut self.recently_unpaired.lock().unwrap())
    }
}

impl DeviceManager for ZWaveDeviceManager {
    fn prefix(&self) -> TechPrefix {
        TechPrefix::ZWave
    }

    fn paired(&self) -> &PairedDeviceCache {
        &self.paired
    }

    fn start_discovery(&self, duration: Duration) -> AsyncWork<()> {
        *self.dispatch_until.lock().unwrap() = Some(std::time::Instant::now() + self.config.dispatch_duration.max(duration));
        match self.network.start_inclusion() {
            Ok(()) => {
                self.dispatch_unpaired();
                AsyncWork::ready(Ok(()))
            }
            Err(e) => AsyncWork::ready(Err(e)),
        }
    }

    fn start_unpair(&self, cmd: &gw_gateway::command::DeviceUnpairCommand, _timeout: Timeout) -> AsyncWork<HashSet<DeviceId>> {
        if !self.paired.paired(cmd.device_id) {
            tracing::warn!(device_id = %cmd.device_id, "unpair requested for a device that isn't paired");
            return AsyncWork::ready(Ok(HashSet::new()));
        }

        self.paired.mark_unpaired(cmd.device_id);
        let result = self.network.start_remove_node().map(|()| {
            let mut removed = self.recently_unpaired();
            removed.insert(cmd.device_id);
            removed
        });
        AsyncWork::ready(result)
    }

    fn start_set_value(&self, cmd: &gw_gateway::command::DeviceSetValueCommand) -> AsyncWork<()> {
        let devices = self.devices.lock().unwrap();
        let Some((identity, _device)) = devices.iter().find(|(_, d)| d.id() == cmd.device_id) else {
            return AsyncWork::ready(Err(Error::NotFound(cmd.device_id.to_string())));
        };
        let identity = *identity;
        drop(devices);

        let raw_value = format!("{}", cmd.value != 0.0);
        let value = Value::new(CommandClass::new(cc::SWITCH_BINARY, 0, 0, "set"), raw_value, None);
        AsyncWork::ready(self.network.post_value(identity, value))
    }

    fn run(&self) {
        while !self.stop.load(Ordering::Relaxed) {
            match self.network.poll_event(self.config.poll_timeout) {
                Ok(event) => self.handle_poll_event(event),
                Err(Error::Timeout) => continue,
                Err(e) => tracing::warn!(error = %e, "z-wave poll failed"),
            }
        }
    }

    fn stop(&self) {
        self.stop.store(true, Ordering::Relaxed);
        self.network.interrupt();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapper::GenericMapperRegistry;
    use crate::network::EventQueue;
    use crate::node::cc;

    struct TestNetwork {
        queue: EventQueue,
    }

    impl ZWaveNetwork for TestNetwork {
        fn poll_event(&self, timeout: Timeout) -> Result<PollEvent> {
            self.queue.poll_event(timeout)
        }
        fn start_inclusion(&self) -> Result<()> {
            Ok(())
        }
        fn cancel_inclusion(&self) -> Result<()> {
            Ok(())
        }
        fn start_remove_node(&self) -> Result<()> {
            Ok(())
        }
        fn cancel_remove_node(&self) -> Result<()> {
            Ok(())
        }
        fn interrupt(&self) {
            self.queue.interrupt();
        }
        fn post_value(&self, _identity: Identity, _value: Value) -> Result<()> {
            Ok(())
        }
    }

    fn manager() -> (ZWaveDeviceManager, Arc<RecordingSink>, Arc<RecordingSink>) {
        let network = Arc::new(TestNetwork { queue: EventQueue::new() });
        let registry = Arc::new(GenericMapperRegistry);
        let new_device_sink = Arc::new(RecordingSink::new());
        let sample_sink = Arc::new(RecordingSink::new());
        let manager = ZWaveDeviceManager::new(
            network,
            registry,
            new_device_sink.clone(),
            sample_sink.clone(),
            ZWaveDeviceManagerConfig::default(),
        );
        (manager, new_device_sink, sample_sink)
    }

    fn queried_node(identity: Identity) -> ZWaveNode {
        let mut node = ZWaveNode::new(identity);
        node.queried = true;
        node.product = "Test".to_string();
        node.command_classes.insert(crate::node::CommandClass::new(cc::BATTERY, 0, 0, "battery"));
        node
    }

    #[test]
    fn new_node_is_not_dispatched_outside_a_listen_window() {
        let (manager, sink, _) = manager();
        manager.handle_poll_event(PollEvent::NewNode(queried_node(Identity::new(1, 2))));
        assert!(sink.new_devices().is_empty());
    }

    #[test]
    fn new_node_dispatches_once_discovery_is_started() {
        let (manager, sink, _) = manager();
        manager.start_discovery(Duration::from_secs(1));
        manager.handle_poll_event(PollEvent::NewNode(queried_node(Identity::new(1, 2))));
        assert_eq!(sink.new_devices().len(), 1);
    }

    #[test]
    fn paired_device_is_never_redispatched() {
        let (manager, sink, _) = manager();
        manager.start_discovery(Duration::from_secs(1));
        let node = queried_node(Identity::new(1, 2));
        manager.handle_poll_event(PollEvent::NewNode(node.clone()));
        let id = sink.new_devices()[0].device_id;
        manager.paired.mark_paired(id);
        manager.handle_poll_event(PollEvent::UpdateNode(node));
        assert_eq!(sink.new_devices().len(), 1);
    }

    #[test]
    fn value_ships_only_once_paired() {
        let (manager, _, samples) = manager();
        let identity = Identity::new(1, 2);
        manager.handle_poll_event(PollEvent::NewNode(queried_node(identity)));
        let value = Value::new(crate::node::CommandClass::new(cc::BATTERY, 0, 0, "battery"), "77", None);
        manager.handle_poll_event(PollEvent::Value(identity, value.clone()));
        assert!(samples.samples().is_empty());

        let id = manager.devices.lock().unwrap().get(&identity).unwrap().id();
        manager.paired.mark_paired(id);
        manager.handle_poll_event(PollEvent::Value(identity, value));
        assert_eq!(samples.samples().len(), 1);
    }

    #[test]
    fn unpair_of_a_device_not_paired_is_a_no_op() {
        let (manager, _, _) = manager();
        let cmd = gw_gateway::command::DeviceUnpairCommand { device_id: DeviceId::zwave(1, 2) };
        let removed = manager.start_unpair(&cmd, None).try_join(None).unwrap();
        assert!(removed.is_empty());
    }
}
