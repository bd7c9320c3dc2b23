//! PumpLink device agent entry point.
//!
//! Wires the hardware ports, the actuation controller, the telemetry source,
//! and the relay uplink together, then runs the dispatch loop.
//!
//! # Architecture
//!
//! ```text
//! main()
//!  └─ DeviceConfig::load()     -- identity, relay address, secrets
//!  └─ RelayUplink::start()     -- TCP redial loop
//!  └─ dispatch loop
//!       ├─ TelemetryTick       -> sample, frame, send; publish JSON readout
//!       ├─ CutoffExpired       -> stop pulse
//!       └─ SealedFrame         -> open, decode, apply command
//! ```
//!
//! The dispatch loop is the single owner of the controller's state: timer
//! expiries and inbound commands are both just events here, so actuation
//! transitions never race each other.

use std::path::PathBuf;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use anyhow::Context;
use clap::Parser;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use pump_core::protocol::codec::{decode, encode_telemetry, DecodeContext};
use pump_core::protocol::messages::LinkMessage;
use pump_core::protocol::seal::open;
use pump_core::timer::TimerService;

use pump_device::application::control::{MotorController, PinDriver};
use pump_device::application::telemetry::{AdcSampler, TelemetryPublisher, TelemetrySource};
use pump_device::application::AgentTimer;
use pump_device::infrastructure::adc::SimulatedAdc;
use pump_device::infrastructure::config::DeviceConfig;
use pump_device::infrastructure::gpio::SimulatedPins;
use pump_device::infrastructure::publish::LogPublisher;
use pump_device::infrastructure::uplink::{RelayUplink, UplinkEvent};

#[derive(Debug, Parser)]
#[command(name = "pump-device", about = "PumpLink device agent")]
struct Args {
    /// Path to the device configuration file.
    #[arg(long, env = "PUMP_DEVICE_CONFIG", default_value = "device.toml")]
    config: PathBuf,

    /// Log filter override (e.g. "debug", "pump_device=trace").
    #[arg(long, env = "RUST_LOG")]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let filter = match &args.log_level {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cfg = DeviceConfig::load(&args.config)
        .with_context(|| format!("loading config from {}", args.config.display()))?;
    let key = cfg.secrets.key().context("parsing the configured AES key")?;
    let passcode = cfg.secrets.passcode;
    let device_id = cfg.device.id;
    let ctx = DecodeContext::device(passcode, device_id);

    info!("PumpLink device agent starting as {device_id}");

    // ── Hardware ports ────────────────────────────────────────────────────────
    // On the target these are the gpiod- and SPI-backed drivers from the
    // board support package; the simulator keeps the agent runnable anywhere.
    let pins: Arc<dyn PinDriver> = Arc::new(SimulatedPins::new());
    let adc: Arc<dyn AdcSampler> = Arc::new(SimulatedAdc::new());
    let publisher = LogPublisher;

    // ── Timers and controller ─────────────────────────────────────────────────
    let (timer_tx, mut timer_rx) = mpsc::channel(16);
    let timers = TimerService::new(timer_tx);

    let mut controller = MotorController::new(Arc::clone(&pins), timers.clone(), cfg.start_pulse());
    controller
        .initialize()
        .context("driving valves to their startup position")?;

    let source = TelemetrySource::new(device_id, Arc::clone(&pins), adc);

    // ── Uplink ────────────────────────────────────────────────────────────────
    let running = Arc::new(AtomicBool::new(true));
    let uplink = Arc::new(RelayUplink::new(cfg.uplink()?));
    let mut uplink_rx = Arc::clone(&uplink).start(Arc::clone(&running)).await;

    // The periodic telemetry deadline; the handle must outlive the loop.
    let _telemetry_timer = timers.start(
        cfg.telemetry_period(),
        Some(cfg.telemetry_period()),
        AgentTimer::TelemetryTick,
    );

    // ── Dispatch loop ─────────────────────────────────────────────────────────
    loop {
        tokio::select! {
            Some(event) = timer_rx.recv() => match event {
                AgentTimer::TelemetryTick => {
                    let remaining = controller.remaining_minutes();
                    match source.report(uplink.rssi(), remaining) {
                        Ok(report) => {
                            let frame = encode_telemetry(&report, passcode);
                            uplink.send_telemetry(&frame).await;
                        }
                        Err(e) => error!("telemetry assembly failed: {e}"),
                    }
                    match source.readout_json(remaining) {
                        Ok(json) => {
                            if let Err(e) = publisher.publish(&cfg.telemetry.publish_topic, &json) {
                                warn!("readout publish failed: {e}");
                            }
                        }
                        Err(e) => error!("readout assembly failed: {e}"),
                    }
                }
                AgentTimer::CutoffExpired => {
                    if let Err(e) = controller.on_cutoff_expired().await {
                        error!("cutoff handling failed: {e}");
                    }
                }
            },
            Some(event) = uplink_rx.recv() => match event {
                UplinkEvent::Connected { relay_addr } => {
                    info!("uplink established to {relay_addr}");
                }
                UplinkEvent::Disconnected => {
                    warn!("uplink lost; commands will resume after redial");
                }
                UplinkEvent::SealedFrame(sealed) => match open(&sealed, &key) {
                    Ok((_iv, payload)) => match decode(&payload, &ctx) {
                        Ok(LinkMessage::Command(command)) => {
                            if let Err(e) = controller.apply_command(&command).await {
                                error!("command actuation failed: {e}");
                            }
                        }
                        Ok(other) => {
                            debug!("sealed frame carried {:?}; ignoring", other.tag());
                        }
                        // Rejected frames die here without a reply.
                        Err(reason) => debug!("sealed frame rejected: {reason}"),
                    },
                    Err(e) => debug!("sealed frame failed to open: {e}"),
                },
            },
            _ = tokio::signal::ctrl_c() => {
                info!("shutdown signal received");
                running.store(false, Ordering::Relaxed);
                break;
            }
        }
    }

    info!("device agent stopped");
    Ok(())
}
