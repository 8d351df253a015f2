//! The Turris Dongle controller: probes a serial port, then runs a
//! background I/O thread that frames incoming lines into either command
//! responses or sensor reports.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use gw_core::prelude::*;
use gw_serial::{Parity, SerialConfig, SerialPort};
use regex::Regex;

use crate::report::JablotronReport;

const CMD_BEGIN: &str = "\x1B";
const CMD_END: &str = "\n";
const CMD_VERSION: &str = "WHO AM I?";

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Beep {
    None,
    Slow,
    Fast,
}

impl Beep {
    fn as_str(&self) -> &'static str {
        match self {
            Self::None => "NONE",
            Self::Slow => "SLOW",
            Self::Fast => "FAST",
        }
    }
}

fn cmd_read_slot(i: u32) -> String {
    format!("GET SLOT:{i:02}")
}

fn cmd_set_slot(i: u32, addr: u32) -> String {
    format!("SET SLOT:{i:02} [{addr:08}]")
}

fn cmd_clear_slot(i: u32) -> String {
    format!("SET SLOT:{i:02} [--------]")
}

const CMD_ERASE_SLOTS: &str = "ERASE ALL SLOTS";

fn cmd_tx(enroll: bool, x: bool, y: bool, alarm: bool, beep: Beep) -> String {
    format!(
        "TX ENROLL:{} PGX:{} PGY:{} ALARM:{} BEEP:{}",
        enroll as u8,
        x as u8,
        y as u8,
        alarm as u8,
        beep.as_str()
    )
}

/// Tunables for probing and running the dongle's I/O loop.
#[derive(Clone, Copy, Debug)]
pub struct ControllerConfig {
    pub max_probe_attempts: u32,
    pub probe_timeout: Duration,
    pub io_join_timeout: Duration,
    pub io_read_timeout: Timeout,
    pub io_error_sleep: Duration,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            max_probe_attempts: 5,
            probe_timeout: Duration::from_millis(100),
            io_join_timeout: Duration::from_secs(2),
            io_read_timeout: Some(Duration::from_millis(500)),
            io_error_sleep: Duration::from_secs(2),
        }
    }
}

struct Shared {
    port: Mutex<Option<SerialPort>>,
    dev: Mutex<String>,
    responses: Mutex<VecDeque<String>>,
    request_cv: Condvar,
    reports: Mutex<VecDeque<JablotronReport>>,
    poll_cv: Condvar,
    stop: AtomicBool,
}

struct IoHandle {
    dev: String,
    done_rx: mpsc::Receiver<()>,
    thread: JoinHandle<()>,
}

/// Provides access to the Turris Dongle over a serial port. Probing
/// starts an internal I/O thread; only one dongle can be served at a
/// time by a given instance.
pub struct JablotronController {
    config: ControllerConfig,
    shared: Arc<Shared>,
    io: Mutex<Option<IoHandle>>,
    request_lock: Mutex<()>,
}

impl JablotronController {
    pub fn new(config: ControllerConfig) -> Self {
        Self {
            config,
            shared: Arc::new(Shared {
                port: Mutex::new(None),
                dev: Mutex::new(String::new()),
                responses: Mutex::new(VecDeque::new()),
                request_cv: Condvar::new(),
                reports: Mutex::new(VecDeque::new()),
                poll_cv: Condvar::new(),
                stop: AtomicBool::new(false),
            }),
            io: Mutex::new(None),
            request_lock: Mutex::new(()),
        }
    }

    /// Probes `dev` and, if it answers as a Turris Dongle, starts the I/O
    /// thread. A second `probe` while one is already running is a no-op.
    pub fn probe(&self, dev: &str) -> Result<()> {
        let mut io = self.io.lock().unwrap();
        if io.is_some() {
            tracing::info!(dev, "I/O thread is already running, ignoring probe");
            return Ok(());
        }

        let port = self.probe_port(dev)?;

        *self.shared.port.lock().unwrap() = Some(port);
        *self.shared.dev.lock().unwrap() = dev.to_string();
        self.shared.responses.lock().unwrap().clear();
        self.shared.reports.lock().unwrap().clear();
        self.shared.stop.store(false, Ordering::SeqCst);

        let shared = self.shared.clone();
        let config = self.config;
        let (done_tx, done_rx) = mpsc::channel();
        let thread = std::thread::Builder::new()
            .name(format!("io-{dev}"))
            .spawn(move || {
                io_loop(&shared, &config);
                let _ = done_tx.send(());
            })
            .expect("spawn jablotron I/O thread");

        *io = Some(IoHandle {
            dev: dev.to_string(),
            done_rx,
            thread,
        });

        Ok(())
    }

    /// Stops the I/O thread if `dev` matches the currently served port.
    pub fn release(&self, dev: &str) {
        self.shared.request_cv.notify_all();
        self.shared.poll_cv.notify_all();
        self.stop_io(dev);
    }

    pub fn dispose(&self) {
        let dev = self.shared.dev.lock().unwrap().clone();
        self.release(&dev);
    }

    fn stop_io(&self, dev: &str) {
        let mut io = self.io.lock().unwrap();
        let Some(handle) = io.as_ref() else {
            return;
        };
        if handle.dev != dev {
            return;
        }

        tracing::info!(dev, "stopping I/O thread");
        self.shared.stop.store(true, Ordering::SeqCst);

        let handle = io.take().unwrap();
        match handle.done_rx.recv_timeout(self.config.io_join_timeout) {
            Ok(()) => {
                let _ = handle.thread.join();
            }
            Err(_) => {
                tracing::error!(dev, "timeout while joining I/O thread");
            }
        }
    }

    /// Polls for the next sensor report, blocking up to `timeout`
    /// (`None` blocks indefinitely). Returns an invalid report on
    /// timeout.
    pub fn poll_report(&self, timeout: Timeout) -> JablotronReport {
        if let Some(report) = self.pop_report() {
            return report;
        }

        let guard = self.shared.reports.lock().unwrap();
        match timeout {
            None => {
                drop(self.shared.poll_cv.wait_while(guard, |r| r.is_empty()).unwrap());
            }
            Some(d) => {
                let (guard, _) = self
                    .shared
                    .poll_cv
                    .wait_timeout_while(guard, clamp_min(d), |r| r.is_empty())
                    .unwrap();
                drop(guard);
            }
        }

        self.pop_report().unwrap_or_else(JablotronReport::invalid)
    }

    fn pop_report(&self) -> Option<JablotronReport> {
        self.shared.reports.lock().unwrap().pop_front()
    }

    pub fn read_slot(&self, i: u32, timeout: Timeout) -> Result<Option<u32>> {
        static PATTERN: std::sync::OnceLock<Regex> = std::sync::OnceLock::new();
        let pattern = PATTERN.get_or_init(|| Regex::new(r"^SLOT:(\d\d) \[([-0-9]{8})\]$").unwrap());

        let data = self.command(&cmd_read_slot(i), timeout)?;
        let caps = pattern
            .captures(data.trim())
            .ok_or_else(|| Error::IllegalState(format!("expected slot status but got: {data}")))?;

        let addr = &caps[2];
        if addr == "--------" {
            return Ok(None);
        }

        let slot: u32 = caps[1].parse().unwrap();
        if slot != i {
            return Err(Error::IllegalState(format!(
                "received result for slot {slot} but requested slot {i}"
            )));
        }

        addr.parse::<u32>()
            .map(Some)
            .map_err(|_| Error::Protocol(format!("malformed slot address: {addr}")))
    }

    pub fn register_slot(&self, i: u32, address: u32, timeout: Timeout) -> Result<()> {
        self.handle_ok_error(&self.command(&cmd_set_slot(i, address), timeout)?)
    }

    pub fn unregister_slot(&self, i: u32, timeout: Timeout) -> Result<()> {
        self.handle_ok_error(&self.command(&cmd_clear_slot(i), timeout)?)
    }

    pub fn erase_slots(&self, timeout: Timeout) -> Result<()> {
        self.handle_ok_error(&self.command(CMD_ERASE_SLOTS, timeout)?)
    }

    pub fn send_tx(&self, x: bool, y: bool, alarm: bool, beep: Beep, timeout: Timeout) -> Result<()> {
        self.handle_ok_error(&self.command(&cmd_tx(false, x, y, alarm, beep), timeout)?)
    }

    pub fn send_enroll(&self, timeout: Timeout) -> Result<()> {
        self.handle_ok_error(&self.command(&cmd_tx(true, false, false, false, Beep::None), timeout)?)
    }

    fn handle_ok_error(&self, response: &str) -> Result<()> {
        match response {
            "OK" => Ok(()),
            "ERROR" => Err(Error::Protocol("received result ERROR".to_string())),
            other => Err(Error::IllegalState(format!("received result {other}"))),
        }
    }

    /// Issues `request` and waits for the next response line.
    fn command(&self, request: &str, timeout: Timeout) -> Result<String> {
        let started = Instant::now();
        let _request_guard = self.request_lock.lock().unwrap();

        {
            let mut responses = self.shared.responses.lock().unwrap();
            if !responses.is_empty() {
                tracing::warn!(count = responses.len(), "responses in queue before issuing a command");
            }
            responses.clear();
        }

        self.write_port(&format!("{CMD_BEGIN}{request}{CMD_END}"))?;

        let guard = self.shared.responses.lock().unwrap();
        let guard = match timeout {
            None => self
                .shared
                .request_cv
                .wait_while(guard, |r| r.is_empty() && !self.shared.stop.load(Ordering::SeqCst))
                .unwrap(),
            Some(d) => {
                let remaining = d.saturating_sub(started.elapsed());
                let (guard, _) = self
                    .shared
                    .request_cv
                    .wait_timeout_while(guard, clamp_min(remaining), |r| {
                        r.is_empty() && !self.shared.stop.load(Ordering::SeqCst)
                    })
                    .unwrap();
                guard
            }
        };

        if guard.is_empty() {
            return Err(Error::Timeout);
        }
        drop(guard);

        self.pop_response()
    }

    fn pop_response(&self) -> Result<String> {
        let mut responses = self.shared.responses.lock().unwrap();
        let first = responses
            .front()
            .cloned()
            .ok_or_else(|| Error::IllegalState("no response in the queue".to_string()))?;
        responses.clear();
        Ok(first)
    }

    fn probe_port(&self, dev: &str) -> Result<SerialPort> {
        let config = SerialConfig::new(57600, 8, Parity::None, 1);
        let mut port = SerialPort::open(dev, config)?;
        port.flush()?;

        tracing::info!(dev, "probing port");

        let mut buffer = String::new();
        if let Ok(bytes) = read_port(&mut port, Some(self.config.probe_timeout)) {
            buffer.push_str(&bytes);
        }

        write_port(&mut port, &format!("{CMD_BEGIN}{CMD_VERSION}{CMD_END}"))?;

        for _ in 0..self.config.max_probe_attempts {
            match read_port(&mut port, Some(self.config.probe_timeout)) {
                Ok(bytes) => buffer.push_str(&bytes),
                Err(Error::Timeout) => continue,
                Err(e) => return Err(e),
            }

            if received_version(&buffer) {
                return Ok(port);
            }
        }

        Err(Error::Timeout)
    }

    fn write_port(&self, request: &str) -> Result<()> {
        let mut port = self.shared.port.lock().unwrap();
        let port = port.as_mut().ok_or_else(|| Error::IllegalState("port not open".to_string()))?;
        tracing::trace!(bytes = request.len(), "writing to port");
        write_port(port, request)
    }
}

fn write_port(port: &mut SerialPort, request: &str) -> Result<()> {
    port.write_all(request.as_bytes())
}

fn read_port(port: &mut SerialPort, timeout: Timeout) -> Result<String> {
    let data = port.read(timeout)?;
    if data.is_empty() {
        return Ok(String::new());
    }
    Ok(String::from_utf8_lossy(&data).into_owned())
}

fn received_version(response: &str) -> bool {
    static PATTERN: std::sync::OnceLock<Regex> = std::sync::OnceLock::new();
    let pattern = PATTERN.get_or_init(|| Regex::new(r"\n([A-Z ]+V[0-9]\.[0-9])( [A-Z]+)?\n").unwrap());

    if let Some(caps) = pattern.captures(response) {
        tracing::info!(dongle = %caps[1], "detected dongle");
        true
    } else {
        false
    }
}

fn process_message(shared: &Shared, message: &str) {
    static PATTERN: std::sync::OnceLock<Regex> = std::sync::OnceLock::new();
    let pattern = PATTERN.get_or_init(|| Regex::new(r"^\[(\d{8})\] (\S+) (.+)$").unwrap());

    if let Some(caps) = pattern.captures(message) {
        let address: u32 = caps[1].parse().unwrap_or(0);
        let type_tag = caps[2].to_string();
        let data = caps[3].to_string();

        let report = JablotronReport {
            address,
            type_tag,
            data,
        };
        tracing::debug!(?report, "received report");

        shared.reports.lock().unwrap().push_back(report);
        shared.poll_cv.notify_all();
    } else {
        tracing::debug!(size = message.len(), "received response");
        shared.responses.lock().unwrap().push_back(message.to_string());
        shared.request_cv.notify_all();
    }
}

/// Reads whole `\n`-delimited lines out of the port and dispatches each
/// to [`process_message`].
fn read_and_process(shared: &Shared, io_read_timeout: Timeout) -> Result<()> {
    static PATTERN: std::sync::OnceLock<Regex> = std::sync::OnceLock::new();
    let pattern = PATTERN.get_or_init(|| Regex::new(r"\n([^\n]+)\n").unwrap());

    let mut buffer = String::new();
    loop {
        if pattern.is_match(&buffer) {
            break;
        }
        let mut port = shared.port.lock().unwrap();
        let port = port.as_mut().ok_or_else(|| Error::IllegalState("port not open".to_string()))?;
        buffer.push_str(&read_port(port, io_read_timeout)?);
    }

    let mut offset = 0;
    while let Some(caps) = pattern.captures(&buffer[offset..]) {
        let whole = caps.get(0).unwrap();
        let line = caps.get(1).unwrap().as_str();
        process_message(shared, line);
        offset += whole.end();
    }

    Ok(())
}

fn io_loop(shared: &Shared, config: &ControllerConfig) {
    tracing::info!("starting I/O thread");

    while !shared.stop.load(Ordering::SeqCst) {
        match read_and_process(shared, config.io_read_timeout) {
            Ok(()) => {}
            Err(Error::Timeout) => continue,
            Err(e) => {
                tracing::error!(error = %e, "I/O error, sleeping before retry");
                std::thread::sleep(config.io_error_sleep);
            }
        }
    }

    *shared.port.lock().unwrap() = None;
    tracing::info!("I/O thread has finished");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_line_recognized() {
        assert!(received_version("garbage\nTURRIS V1.2 BETA\n"));
        assert!(!received_version("no version here"));
    }

    #[test]
    fn report_line_parsed() {
        let shared = Shared {
            port: Mutex::new(None),
            dev: Mutex::new(String::new()),
            responses: Mutex::new(VecDeque::new()),
            request_cv: Condvar::new(),
            reports: Mutex::new(VecDeque::new()),
            poll_cv: Condvar::new(),
            stop: AtomicBool::new(false),
        };

        process_message(&shared, "[01703936] JA-81M SENSOR LB:0 ACT:1");
        let report = shared.reports.lock().unwrap().pop_front().unwrap();
        assert_eq!(report.address, 1_703_936);
        assert_eq!(report.type_tag, "JA-81M");
        assert_eq!(report.data, "SENSOR LB:0 ACT:1");
    }

    #[test]
    fn non_report_line_becomes_response() {
        let shared = Shared {
            port: Mutex::new(None),
            dev: Mutex::new(String::new()),
            responses: Mutex::new(VecDeque::new()),
            request_cv: Condvar::new(),
            reports: Mutex::new(VecDeque::new()),
            poll_cv: Condvar::new(),
            stop: AtomicBool::new(false),
        };

        process_message(&shared, "OK");
        assert_eq!(shared.responses.lock().unwrap().pop_front().unwrap(), "OK");
    }
}
