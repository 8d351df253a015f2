//! `gatewayd` — the thin daemon entry point; wires each technology's
//! manager together from a `GatewayConfig` and starts them as threads.
//! The DI container, XML config loader, outbound distributor and
//! command dispatcher a full daemon would compose around these are
//! genuinely out of scope; `sink::LoggingSink` stands in for the
//! distributor so every manager has somewhere to ship events.

mod config;
mod sink;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use gw_conrad::manager::{ConradDeviceManager, ConradDeviceManagerConfig};
use gw_core::prelude::*;
use gw_credentials::prelude::FileCredentialsStorage;
use gw_gateway::prelude::{DeviceManager, SampleSink};
use gw_jablotron::prelude::{ControllerConfig, JablotronController};

use config::GatewayConfig;
use sink::LoggingSink;

#[derive(Parser, Debug)]
#[command(name = "gatewayd", about = "Heterogeneous radio gateway daemon")]
struct Args {
    /// Path to the gateway's toml configuration file.
    #[arg(long, default_value = "gateway.toml")]
    config: PathBuf,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).init();

    let args = Args::parse();
    let config = GatewayConfig::load(&args.config).context("loading gateway configuration")?;

    let credentials = FileCredentialsStorage::new(&config.credentials.path, &config.credentials.root);
    credentials.load();
    let _crypto_key = config.credentials.key().context("parsing credentials.key_hex")?;

    let sink = Arc::new(LoggingSink);

    let mut handles = Vec::new();

    if let Some(jablotron) = &config.jablotron {
        let controller = Arc::new(JablotronController::new(ControllerConfig::default()));
        controller.probe(&jablotron.serial_port).context("probing Jablotron dongle")?;
        tracing::info!(port = %jablotron.serial_port, "Jablotron controller started");

        let poller = controller.clone();
        let poller_sink = sink.clone();
        handles.push(std::thread::spawn(move || {
            loop {
                let report = poller.poll_report(Some(Duration::from_secs(1)));
                if !report.is_valid() {
                    continue;
                }
                let Some(info) = gw_jablotron::gadget::resolve(report.address) else {
                    tracing::warn!(address = report.address, "unrecognised Jablotron gadget address");
                    continue;
                };
                match gw_jablotron::gadget::parse(&info, &report) {
                    Ok(values) => {
                        let id = DeviceId::jablotron(report.address);
                        poller_sink.ship(SensorData::new(id, values));
                    }
                    Err(e) => tracing::warn!(address = report.address, error = %e, "failed to decode report"),
                }
            }
        }));
    }

    if let Some(conrad) = &config.conrad {
        let manager = Arc::new(ConradDeviceManager::new(
            ConradDeviceManagerConfig {
                event_endpoint: conrad.event_endpoint.clone(),
                cmd_endpoint: conrad.cmd_endpoint.clone(),
                poll_interval: conrad.poll_interval(),
            },
            sink.clone(),
            sink.clone(),
        ));
        tracing::info!(endpoint = %conrad.event_endpoint, "Conrad device manager started");
        let runner = manager.clone();
        handles.push(std::thread::spawn(move || runner.run()));
    }

    // Z-Wave's device manager (gw-zwave::manager::ZWaveDeviceManager) needs
    // a `ZWaveNetwork` backed by an OpenZWave-equivalent driver; that radio
    // binding is out of scope here, so it is not wired up.

    if handles.is_empty() {
        tracing::warn!("no technology configured; nothing to run");
        return Ok(());
    }

    for handle in handles {
        let _ = handle.join();
    }

    Ok(())
}
