//! Integration tests for the device agent's moving parts.
//!
//! Two groups:
//!
//! - State-machine scenarios against the simulated pin driver with a paused
//!   clock: a command starts the motor and arms the cutoff, the cutoff fires
//!   and stops it, and telemetry tracks the whole cycle.
//! - The uplink over a real socket: telemetry frames reach the listener, and
//!   sealed command blocks pushed the other way surface as events that open
//!   and decode back to the original command.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::timeout;

use pump_core::domain::DeviceId;
use pump_core::protocol::codec::{decode, encode_command, encode_telemetry, DecodeContext};
use pump_core::protocol::messages::{LinkMessage, MotorCommand, FRAME_LEN, SEALED_LEN};
use pump_core::protocol::seal::{open, seal, IV_LEN, KEY_LEN};
use pump_core::timer::TimerService;

use pump_device::application::control::{MotorController, PinDriver};
use pump_device::application::telemetry::{TelemetryPublisher, TelemetrySource};
use pump_device::application::AgentTimer;
use pump_device::infrastructure::adc::SimulatedAdc;
use pump_device::infrastructure::gpio::SimulatedPins;
use pump_device::infrastructure::publish::CapturingPublisher;
use pump_device::infrastructure::uplink::{RelayUplink, UplinkConfig, UplinkEvent};

const PASSCODE: u16 = 39403;

fn command(minutes: u16) -> MotorCommand {
    MotorCommand {
        device_id: DeviceId(1),
        remaining_minutes: minutes,
        motor_on: true,
        valve0_closed: true,
        valve1_closed: false,
    }
}

#[tokio::test(start_paused = true)]
async fn test_command_cycle_start_to_cutoff_tracked_by_telemetry() {
    let pins = Arc::new(SimulatedPins::new());
    let adc = Arc::new(SimulatedAdc::new());
    let (timer_tx, mut timer_rx) = mpsc::channel(16);
    let timers = TimerService::new(timer_tx);

    let mut controller = MotorController::new(
        Arc::clone(&pins) as Arc<dyn PinDriver>,
        timers,
        Duration::from_millis(200),
    );
    controller.initialize().unwrap();

    let source = TelemetrySource::new(
        DeviceId(1),
        Arc::clone(&pins) as Arc<dyn PinDriver>,
        adc,
    );

    // Start the motor for 10 minutes.
    controller.apply_command(&command(10)).await.unwrap();
    let report = source.report(-33, controller.remaining_minutes()).unwrap();
    assert!(report.status.motor_running());
    assert!(report.status.valve0_closed());
    assert_eq!(report.remaining_minutes, 10);

    // The cutoff fires after the commanded run time.
    let fired = timeout(Duration::from_secs(601), timer_rx.recv()).await;
    assert_eq!(fired.unwrap(), Some(AgentTimer::CutoffExpired));
    controller.on_cutoff_expired().await.unwrap();

    let report = source.report(-33, controller.remaining_minutes()).unwrap();
    assert!(!report.status.motor_running());
    assert_eq!(report.remaining_minutes, 0);
}

#[tokio::test(start_paused = true)]
async fn test_rearm_keeps_motor_running_until_new_deadline() {
    let pins = Arc::new(SimulatedPins::new());
    let (timer_tx, mut timer_rx) = mpsc::channel(16);
    let timers = TimerService::new(timer_tx);
    let mut controller = MotorController::new(
        Arc::clone(&pins) as Arc<dyn PinDriver>,
        timers,
        Duration::from_millis(200),
    );

    controller.apply_command(&command(10)).await.unwrap();
    // Five minutes in, the operator extends the run to 20 minutes.
    tokio::time::advance(Duration::from_secs(300)).await;
    controller.apply_command(&command(20)).await.unwrap();
    assert_eq!(controller.remaining_minutes(), 20);

    // Nothing fires at the original deadline…
    let early = timeout(Duration::from_secs(600), timer_rx.recv()).await;
    assert!(early.is_err(), "cutoff fired at the superseded deadline");

    // …and the cutoff arrives at the extended one.
    let fired = timeout(Duration::from_secs(601), timer_rx.recv()).await;
    assert_eq!(fired.unwrap(), Some(AgentTimer::CutoffExpired));
}

#[tokio::test(start_paused = true)]
async fn test_readout_published_on_the_side_channel() {
    let pins = Arc::new(SimulatedPins::new());
    let adc = Arc::new(SimulatedAdc::new());
    let source = TelemetrySource::new(
        DeviceId(1),
        Arc::clone(&pins) as Arc<dyn PinDriver>,
        adc,
    );
    let publisher = CapturingPublisher::new();

    let json = source.readout_json(5).unwrap();
    publisher.publish("voltage/", &json).unwrap();

    let published = publisher.published.lock().unwrap();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].0, "voltage/");
    let value: serde_json::Value = serde_json::from_str(&published[0].1).unwrap();
    assert_eq!(value["cutoff_time"], "5");
    assert_eq!(value["motor_state"], "off");
}

#[tokio::test]
async fn test_uplink_carries_telemetry_up_and_sealed_commands_down() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let running = Arc::new(AtomicBool::new(true));
    let uplink = Arc::new(RelayUplink::new(UplinkConfig {
        relay_addr: addr,
        reconnect_interval: Duration::from_millis(100),
    }));
    let mut events = Arc::clone(&uplink).start(Arc::clone(&running)).await;

    let (mut relay_side, _) = listener.accept().await.unwrap();

    let connected = timeout(Duration::from_secs(2), events.recv()).await.unwrap();
    assert!(matches!(connected, Some(UplinkEvent::Connected { .. })));

    // Device → relay: one telemetry frame. The write half is installed just
    // after the Connected event, so retry briefly.
    let frame = encode_telemetry(
        &pump_core::protocol::messages::TelemetryReport {
            device_id: DeviceId(1),
            rssi: -33,
            adc: [1, 2, 3, 4],
            remaining_minutes: 0,
            status: Default::default(),
        },
        PASSCODE,
    );
    let mut sent = false;
    for _ in 0..20 {
        if uplink.send_frame(&frame).await {
            sent = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    assert!(sent, "telemetry send never succeeded");

    let mut received = [0u8; FRAME_LEN];
    timeout(Duration::from_secs(2), relay_side.read_exact(&mut received))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(received, frame);

    // Relay → device: one sealed command block.
    let key = [0x24u8; KEY_LEN];
    let iv = [0x31u8; IV_LEN];
    let original = command(7);
    let sealed = seal(&encode_command(&original, PASSCODE), &key, &iv).unwrap();
    relay_side.write_all(&sealed).await.unwrap();

    let event = timeout(Duration::from_secs(2), events.recv()).await.unwrap();
    let Some(UplinkEvent::SealedFrame(block)) = event else {
        panic!("expected a sealed frame, got {event:?}");
    };
    assert_eq!(block.len(), SEALED_LEN);

    let (opened_iv, payload) = open(&block, &key).unwrap();
    assert_eq!(opened_iv, iv);
    let ctx = DecodeContext::device(PASSCODE, DeviceId(1));
    match decode(&payload, &ctx).unwrap() {
        LinkMessage::Command(decoded) => assert_eq!(decoded, original),
        other => panic!("expected a command, got {other:?}"),
    }

    running.store(false, std::sync::atomic::Ordering::Relaxed);
}
