//! Criterion benchmarks for the PumpLink binary codec and frame sealing.
//!
//! Run with:
//! ```bash
//! cargo bench --package pump-core --bench codec_bench
//! ```

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use pump_core::domain::{DeviceId, StatusBits};
use pump_core::protocol::codec::{decode, encode, DecodeContext};
use pump_core::protocol::messages::{
    CommandRelay, LinkMessage, ListQuery, ListResponse, MotorCommand, TelemetryQuery,
    TelemetryReport, TelemetryResponse, FRAME_LEN, SEALED_LEN,
};
use pump_core::protocol::seal::{open, seal, IV_LEN, KEY_LEN};

const PASSCODE: u16 = 39403;

// ── Message fixtures ──────────────────────────────────────────────────────────

fn make_telemetry() -> LinkMessage {
    LinkMessage::Telemetry(TelemetryReport {
        device_id: DeviceId(1),
        rssi: -33,
        adc: [100, 450, 560, 190],
        remaining_minutes: 12,
        status: StatusBits::from_lines(true, false, true, false, false),
    })
}

fn make_command() -> LinkMessage {
    LinkMessage::Command(MotorCommand {
        device_id: DeviceId(1),
        remaining_minutes: 10,
        motor_on: true,
        valve0_closed: true,
        valve1_closed: false,
    })
}

fn make_list_query() -> LinkMessage {
    LinkMessage::ListQuery(ListQuery { passcode: PASSCODE })
}

fn make_telemetry_query() -> LinkMessage {
    LinkMessage::TelemetryQuery(TelemetryQuery {
        device_id: DeviceId(1),
    })
}

fn make_command_relay() -> LinkMessage {
    LinkMessage::CommandRelay(CommandRelay {
        sealed: [0xA5; SEALED_LEN],
    })
}

fn make_list_response() -> LinkMessage {
    LinkMessage::ListResponse(ListResponse {
        device_ids: vec![DeviceId(1), DeviceId(2)],
    })
}

fn make_telemetry_response() -> LinkMessage {
    LinkMessage::TelemetryResponse(TelemetryResponse {
        frame: [0x11; FRAME_LEN],
    })
}

fn all_messages() -> Vec<(&'static str, LinkMessage)> {
    vec![
        ("Telemetry", make_telemetry()),
        ("Command", make_command()),
        ("ListQuery", make_list_query()),
        ("TelemetryQuery", make_telemetry_query()),
        ("CommandRelay", make_command_relay()),
        ("ListResponse", make_list_response()),
        ("TelemetryResponse", make_telemetry_response()),
    ]
}

// ── Benchmark groups ──────────────────────────────────────────────────────────

/// Benchmarks `encode` for every frame kind.
fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode");
    for (name, msg) in all_messages() {
        group.bench_with_input(BenchmarkId::new("msg", name), &msg, |b, msg| {
            b.iter(|| encode(black_box(msg), black_box(PASSCODE)).expect("encode must succeed"))
        });
    }
    group.finish();
}

/// Benchmarks `decode` for every frame kind (from pre-encoded bytes).
fn bench_decode(c: &mut Criterion) {
    let ctx = DecodeContext::server(PASSCODE);
    let mut group = c.benchmark_group("decode");
    for (name, msg) in all_messages() {
        let bytes = encode(&msg, PASSCODE).expect("encode must succeed for benchmark setup");
        group.bench_with_input(BenchmarkId::new("msg", name), &bytes, |b, bytes| {
            b.iter(|| decode(black_box(bytes), black_box(&ctx)).expect("decode must succeed"))
        });
    }
    group.finish();
}

/// Benchmarks the command-path crypto: seal and open of one frame.
fn bench_seal_open(c: &mut Criterion) {
    let key = [0x42u8; KEY_LEN];
    let iv = [0x17u8; IV_LEN];
    let payload = [0x5Au8; FRAME_LEN];
    let sealed = seal(&payload, &key, &iv).expect("seal must succeed");

    let mut group = c.benchmark_group("seal");
    group.bench_function("seal_frame", |b| {
        b.iter(|| seal(black_box(&payload), black_box(&key), black_box(&iv)).unwrap())
    });
    group.bench_function("open_frame", |b| {
        b.iter(|| open(black_box(&sealed), black_box(&key)).unwrap())
    });
    group.finish();
}

criterion_group!(benches, bench_encode, bench_decode, bench_seal_open);
criterion_main!(benches);
