//! The FHEM telnet bridge client: polls FHEM for HomeMatic devices and
//! channel state over telnet, diffing against previous readings to
//! synthesize the same `new_device`/`message` event shape the Conrad ZMQ
//! ingestor (`manager.rs`) consumes from the bridge.

use std::collections::{HashMap, HashSet, VecDeque};
use std::io::{self, BufRead, BufReader, Write};
use std::net::TcpStream;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Condvar, Mutex, OnceLock};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use gw_core::prelude::*;
use regex::Regex;
use serde_json::{json, Value};

/// Per-device bookkeeping mirroring the `protRcv`/`protSnd` Readings FHEM
/// reports for each HomeMatic device; a change in either since the last
/// poll is what triggers a channel-state refresh (`FHEMDeviceInfo.cpp`).
#[derive(Clone, Debug)]
pub struct FHEMDeviceInfo {
    dev: String,
    prot_rcv: u64,
    prot_snd: u64,
    last_rcv: Option<Instant>,
}

impl FHEMDeviceInfo {
    pub fn new(dev: impl Into<String>) -> Self {
        Self {
            dev: dev.into(),
            prot_rcv: 0,
            prot_snd: 0,
            last_rcv: None,
        }
    }

    pub fn dev(&self) -> &str {
        &self.dev
    }

    pub fn prot_rcv(&self) -> u64 {
        self.prot_rcv
    }

    pub fn prot_snd(&self) -> u64 {
        self.prot_snd
    }

    pub fn last_rcv(&self) -> Option<Instant> {
        self.last_rcv
    }

    pub fn set_prot_rcv(&mut self, value: u64) {
        self.prot_rcv = value;
    }

    pub fn set_prot_snd(&mut self, value: u64) {
        self.prot_snd = value;
    }

    pub fn touch(&mut self) {
        self.last_rcv = Some(Instant::now());
    }
}

#[derive(Clone, Debug)]
pub struct FHEMClientConfig {
    pub host: String,
    pub port: u16,
    pub reconnect_delay: Duration,
    pub cycle_interval: Duration,
    pub io_timeout: Duration,
}

impl Default for FHEMClientConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 7072,
            reconnect_delay: Duration::from_secs(5),
            cycle_interval: Duration::from_secs(10),
            io_timeout: Duration::from_secs(5),
        }
    }
}

struct Shared {
    events: Mutex<VecDeque<Value>>,
    has_events: Condvar,
    stop: AtomicBool,
}

struct IoHandle {
    done_rx: mpsc::Receiver<()>,
    thread: JoinHandle<()>,
}

/// The telnet client. Runs a background thread that reconnects on
/// failure and, once connected, repeatedly `cycle()`s: enumerate
/// HomeMatic devices from `ActionDetector`, then poll each device's
/// channel state whenever its protocol counters moved since last time.
pub struct FHEMClient {
    config: FHEMClientConfig,
    shared: Arc<Shared>,
    io: Mutex<Option<IoHandle>>,
}

impl FHEMClient {
    pub fn new(config: FHEMClientConfig) -> Self {
        Self {
            config,
            shared: Arc::new(Shared {
                events: Mutex::new(VecDeque::new()),
                has_events: Condvar::new(),
                stop: AtomicBool::new(false),
            }),
            io: Mutex::new(None),
        }
    }

    pub fn start(&self) -> Result<()> {
        let mut io = self.io.lock().unwrap();
        if io.is_some() {
            return Ok(());
        }

        self.shared.stop.store(false, Ordering::SeqCst);
        let shared = self.shared.clone();
        let config = self.config.clone();
        let (done_tx, done_rx) = mpsc::channel();
        let thread = std::thread::Builder::new()
            .name("fhem-client".to_string())
            .spawn(move || {
                client_loop(&shared, &config);
                let _ = done_tx.send(());
            })
            .expect("spawn FHEM client thread");

        *io = Some(IoHandle { done_rx, thread });
        Ok(())
    }

    pub fn stop(&self) {
        self.shared.stop.store(true, Ordering::SeqCst);
        self.shared.has_events.notify_all();

        let mut io = self.io.lock().unwrap();
        let Some(handle) = io.take() else {
            return;
        };
        match handle.done_rx.recv_timeout(Duration::from_secs(5)) {
            Ok(()) => {
                let _ = handle.thread.join();
            }
            Err(_) => tracing::error!("timeout while joining FHEM client thread"),
        }
    }

    /// Pops the next synthesized event. `timeout`: `None` blocks
    /// indefinitely, `Some(Duration::ZERO)` is non-blocking, any other
    /// `Some(d)` waits up to `d` (mirrors `FHEMClient::receive`'s
    /// negative/zero/positive timeout convention).
    pub fn receive(&self, timeout: Timeout) -> Option<Value> {
        let mut events = self.shared.events.lock().unwrap();
        if let Some(event) = events.pop_front() {
            return Some(event);
        }

        match timeout {
            None => {
                events = self.shared.has_events.wait_while(events, |e| e.is_empty() && !self.shared.stop.load(Ordering::SeqCst)).unwrap();
            }
            Some(d) if d.is_zero() => {}
            Some(d) => {
                let (guard, _) = self
                    .shared
                    .has_events
                    .wait_timeout_while(events, d, |e| e.is_empty() && !self.shared.stop.load(Ordering::SeqCst))
                    .unwrap();
                events = guard;
            }
        }

        events.pop_front()
    }
}

fn push_event(shared: &Shared, event: Value) {
    shared.events.lock().unwrap().push_back(event);
    shared.has_events.notify_all();
}

struct Connection {
    writer: TcpStream,
    reader: BufReader<TcpStream>,
}

impl Connection {
    fn open(config: &FHEMClientConfig) -> Result<Self> {
        let stream = TcpStream::connect((config.host.as_str(), config.port))?;
        stream.set_read_timeout(Some(config.io_timeout))?;
        let writer = stream.try_clone()?;
        Ok(Self { writer, reader: BufReader::new(stream) })
    }

    /// Sends a FHEM telnet command and reads until the `fhem>` prompt.
    fn command(&mut self, command: &str) -> Result<String> {
        writeln!(self.writer, "{command}")?;
        self.writer.flush()?;

        let mut output = String::new();
        loop {
            let mut line = String::new();
            let n = self.reader.read_line(&mut line)?;
            if n == 0 {
                return Err(Error::Io(io::Error::new(io::ErrorKind::UnexpectedEof, "FHEM connection closed")));
            }
            if line.trim_end_matches(['\r', '\n']) == "fhem>" {
                break;
            }
            output.push_str(&line);
        }
        Ok(output)
    }
}

fn retrieve_homematic_devices(action_detector: &str) -> Vec<String> {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let pattern = PATTERN.get_or_init(|| Regex::new(r"status_(HM_[A-Za-z0-9]+)").unwrap());

    let mut seen = HashSet::new();
    pattern
        .captures_iter(action_detector)
        .filter_map(|caps| {
            let dev = caps[1].to_string();
            seen.insert(dev.clone()).then_some(dev)
        })
        .collect()
}

/// Finds a top-level `Readings.<name>.Value` in a `jsonlist2` response.
fn reading(device: &Value, name: &str) -> Option<&Value> {
    device.get("Readings")?.get(name)?.get("Value")
}

fn reading_u64(device: &Value, name: &str) -> u64 {
    reading(device, name).and_then(Value::as_str).and_then(|s| s.parse().ok()).unwrap_or(0)
}

/// Turns a device kind guess from FHEM's reported `model`/`subType`
/// Reading into the `type` tag the ZMQ bridge would have attached.
fn guess_device_type(device: &Value) -> &'static str {
    let sub_type = reading(device, "subType").and_then(Value::as_str).unwrap_or("");
    match sub_type {
        "powerMeter" | "switch" => "powerMeter",
        "thermostat" => "thermostat",
        _ => "threeStateSensor",
    }
}

/// `Main` channel plus any `channel_N` extras, mirroring
/// `FHEMClient::retrieveChannelsState`.
fn retrieve_channels_state(connection: &mut Connection, dev: &str) -> Result<Value> {
    let main = connection.command(&format!("jsonlist2 {dev}"))?;
    let main: Value = serde_json::from_str(main.trim()).map_err(|e| Error::Protocol(e.to_string()))?;

    let mut channels = serde_json::Map::new();
    if let Some(state) = reading(&main, "state").and_then(Value::as_str) {
        channels.insert("Main".to_string(), json!(state));
    }

    let mut index = 1;
    loop {
        let name = format!("{dev}_Chn-{index:02}");
        let channel = connection.command(&format!("jsonlist2 {name}"))?;
        let Ok(channel_value) = serde_json::from_str::<Value>(channel.trim()) else {
            break;
        };
        let Some(state) = reading(&channel_value, "state").and_then(Value::as_str) else {
            break;
        };
        channels.insert(format!("channel_{index}"), json!(state));
        index += 1;
    }

    Ok(Value::Object(channels))
}

fn cycle(shared: &Shared, config: &FHEMClientConfig, connection: &mut Connection, infos: &mut HashMap<String, FHEMDeviceInfo>) -> Result<()> {
    let action_detector = connection.command("jsonlist2 ActionDetector")?;
    for dev in retrieve_homematic_devices(&action_detector) {
        if shared.stop.load(Ordering::SeqCst) {
            break;
        }
        if let Err(e) = process_device_shared(shared, connection, infos, &dev) {
            tracing::warn!(dev, error = %e, "failed to process FHEM device");
        }
    }
    let _ = config;
    Ok(())
}

fn process_device_shared(shared: &Shared, connection: &mut Connection, infos: &mut HashMap<String, FHEMDeviceInfo>, dev: &str) -> Result<()> {
    let raw = connection.command(&format!("jsonlist2 {dev}"))?;
    let device: Value = serde_json::from_str(raw.trim()).map_err(|e| Error::Protocol(e.to_string()))?;

    let prot_rcv = reading_u64(&device, "protState_RCV");
    let prot_snd = reading_u64(&device, "protState_SND");
    let rssi = reading(&device, "rssi").and_then(Value::as_str).and_then(|s| s.parse::<f64>().ok()).unwrap_or(0.0);

    let is_new = !infos.contains_key(dev);
    let device_type = guess_device_type(&device);

    if is_new {
        infos.insert(dev.to_string(), FHEMDeviceInfo::new(dev));
        push_event(shared, json!({"dev": dev, "event": "new_device", "type": device_type}));
    }

    let info = infos.get_mut(dev).unwrap();
    if prot_rcv != info.prot_rcv() || prot_snd != info.prot_snd() || is_new {
        info.set_prot_rcv(prot_rcv);
        info.set_prot_snd(prot_snd);
        info.touch();

        let channels = retrieve_channels_state(connection, dev)?;
        push_event(shared, json!({"dev": dev, "event": "message", "type": device_type, "rssi": rssi, "channels": channels}));
    }

    Ok(())
}

fn client_loop(shared: &Shared, config: &FHEMClientConfig) {
    tracing::info!(host = %config.host, port = config.port, "starting FHEM client");
    let mut infos: HashMap<String, FHEMDeviceInfo> = HashMap::new();

    while !shared.stop.load(Ordering::SeqCst) {
        let mut connection = match Connection::open(config) {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!(error = %e, "failed to connect to FHEM, retrying");
                std::thread::sleep(config.reconnect_delay);
                continue;
            }
        };

        while !shared.stop.load(Ordering::SeqCst) {
            if let Err(e) = cycle(shared, config, &mut connection, &mut infos) {
                tracing::warn!(error = %e, "FHEM cycle failed, reconnecting");
                break;
            }
            std::thread::sleep(config.cycle_interval);
        }
    }

    tracing::info!("FHEM client stopped");
}

/// The poll-and-diff shape FHEM's telnet cycle and VPT's HTTP scan share:
/// fetch a snapshot keyed by device id, diff it against what was seen last
/// time, and report which entries are new versus merely changed.
pub trait HttpPollScanner {
    fn fetch_snapshot(&self) -> Result<HashMap<String, Value>>;

    /// Diffs `previous` against a freshly fetched snapshot, returning
    /// `(new_device, dev, payload)` for every entry that changed since
    /// last time (first sight counts as a change).
    fn poll(&self, previous: &mut HashMap<String, Value>) -> Result<Vec<(bool, String, Value)>> {
        let snapshot = self.fetch_snapshot()?;
        let mut changes = Vec::new();

        for (dev, payload) in snapshot {
            let is_new = !previous.contains_key(&dev);
            let changed = previous.get(&dev) != Some(&payload);
            if changed {
                changes.push((is_new, dev.clone(), payload.clone()));
            }
            previous.insert(dev, payload);
        }

        Ok(changes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retrieves_distinct_homematic_devices() {
        let body = "status_HM_38D649 status_HM_38D649 status_HM_30B0BE other_reading";
        let devices = retrieve_homematic_devices(body);
        assert_eq!(devices, vec!["HM_38D649".to_string(), "HM_30B0BE".to_string()]);
    }

    #[test]
    fn guesses_power_meter_from_subtype() {
        let device = json!({"Readings": {"subType": {"Value": "powerMeter"}}});
        assert_eq!(guess_device_type(&device), "powerMeter");
    }

    #[test]
    fn receive_is_non_blocking_when_queue_is_empty() {
        let client = FHEMClient::new(FHEMClientConfig::default());
        assert!(client.receive(Some(Duration::ZERO)).is_none());
    }

    #[test]
    fn receive_returns_pushed_events_in_order() {
        let client = FHEMClient::new(FHEMClientConfig::default());
        push_event(&client.shared, json!({"dev": "HM_1"}));
        push_event(&client.shared, json!({"dev": "HM_2"}));

        assert_eq!(client.receive(Some(Duration::ZERO)).unwrap()["dev"], "HM_1");
        assert_eq!(client.receive(Some(Duration::ZERO)).unwrap()["dev"], "HM_2");
    }
}
