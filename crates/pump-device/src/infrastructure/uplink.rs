//! The device's TCP uplink to the relay.
//!
//! One connection carries both directions: telemetry frames go up, sealed
//! command blocks come down. The uplink never gives up — a failed dial, a
//! dropped connection, or a run of failed sends all funnel into the same
//! redial loop with a fixed backoff.
//!
//! Inbound sealed blocks are forwarded on an `mpsc` channel to the agent's
//! dispatch loop; this module does not decrypt or interpret them.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex, Notify};
use tokio::time;
use tracing::{debug, error, info, warn};

use pump_core::protocol::messages::SEALED_LEN;

/// Consecutive telemetry send failures that trigger a teardown-and-redial.
pub const MAX_SEND_FAILURES: u32 = 3;

/// Configuration for the uplink.
#[derive(Debug, Clone)]
pub struct UplinkConfig {
    /// Address of the relay's listening socket.
    pub relay_addr: SocketAddr,
    /// Backoff between redial attempts and after a dropped connection.
    pub reconnect_interval: Duration,
}

impl Default for UplinkConfig {
    fn default() -> Self {
        Self {
            relay_addr: "127.0.0.1:9482".parse().unwrap(),
            reconnect_interval: Duration::from_secs(10),
        }
    }
}

/// Events emitted to the agent's dispatch loop.
#[derive(Debug)]
pub enum UplinkEvent {
    /// The TCP connection was established.
    Connected { relay_addr: SocketAddr },
    /// The TCP connection was lost; the uplink is backing off to redial.
    Disconnected,
    /// One whole sealed command block arrived.
    SealedFrame([u8; SEALED_LEN]),
}

/// Counts consecutive failures up to a teardown threshold.
#[derive(Debug)]
struct FailureGate {
    consecutive: u32,
    limit: u32,
}

impl FailureGate {
    fn new(limit: u32) -> Self {
        Self {
            consecutive: 0,
            limit,
        }
    }

    fn record_success(&mut self) {
        self.consecutive = 0;
    }

    /// Returns `true` when the failure run reaches the limit; the counter
    /// resets so the next run starts from zero.
    fn record_failure(&mut self) -> bool {
        self.consecutive += 1;
        if self.consecutive >= self.limit {
            self.consecutive = 0;
            true
        } else {
            false
        }
    }
}

/// Manages the TCP connection from the device to the relay.
pub struct RelayUplink {
    config: UplinkConfig,
    write_half: Arc<Mutex<Option<tokio::net::tcp::OwnedWriteHalf>>>,
    gate: std::sync::Mutex<FailureGate>,
    reset: Notify,
}

impl RelayUplink {
    /// Creates a new (not yet connected) uplink.
    pub fn new(config: UplinkConfig) -> Self {
        Self {
            config,
            write_half: Arc::new(Mutex::new(None)),
            gate: std::sync::Mutex::new(FailureGate::new(MAX_SEND_FAILURES)),
            reset: Notify::new(),
        }
    }

    /// Connects to the relay and begins reading sealed blocks.
    ///
    /// Returns a channel receiver delivering [`UplinkEvent`]s. Runs a
    /// continuous redial loop until `running` is cleared.
    pub async fn start(
        self: Arc<Self>,
        running: Arc<AtomicBool>,
    ) -> mpsc::Receiver<UplinkEvent> {
        let (tx, rx) = mpsc::channel(64);
        let this = Arc::clone(&self);

        tokio::spawn(async move {
            while running.load(Ordering::Relaxed) {
                match TcpStream::connect(this.config.relay_addr).await {
                    Ok(stream) => {
                        info!("connected to relay at {}", this.config.relay_addr);
                        let _ = tx
                            .send(UplinkEvent::Connected {
                                relay_addr: this.config.relay_addr,
                            })
                            .await;

                        let (read_half, write_half) = stream.into_split();
                        {
                            let mut guard = this.write_half.lock().await;
                            *guard = Some(write_half);
                        }

                        this.read_loop(read_half, &tx).await;

                        {
                            let mut guard = this.write_half.lock().await;
                            *guard = None;
                        }
                        let _ = tx.send(UplinkEvent::Disconnected).await;
                        info!(
                            "relay connection lost; redialing in {:?}",
                            this.config.reconnect_interval
                        );
                    }
                    Err(e) => {
                        warn!("could not reach relay at {}: {e}", this.config.relay_addr);
                    }
                }

                if running.load(Ordering::Relaxed) {
                    time::sleep(this.config.reconnect_interval).await;
                }
            }
        });

        rx
    }

    /// Reads whole sealed blocks until the connection dies or a reset is
    /// requested.
    async fn read_loop(
        &self,
        mut reader: tokio::net::tcp::OwnedReadHalf,
        tx: &mpsc::Sender<UplinkEvent>,
    ) {
        loop {
            let mut sealed = [0u8; SEALED_LEN];
            tokio::select! {
                result = reader.read_exact(&mut sealed) => {
                    match result {
                        Ok(_) => {
                            if tx.send(UplinkEvent::SealedFrame(sealed)).await.is_err() {
                                return;
                            }
                        }
                        Err(e) => {
                            if e.kind() != std::io::ErrorKind::UnexpectedEof {
                                error!("read error on uplink: {e}");
                            }
                            return;
                        }
                    }
                }
                _ = self.reset.notified() => {
                    info!("tearing down uplink after repeated send failures");
                    return;
                }
            }
        }
    }

    /// Writes one frame; returns whether the write succeeded.
    pub async fn send_frame(&self, bytes: &[u8]) -> bool {
        let mut guard = self.write_half.lock().await;
        match guard.as_mut() {
            Some(writer) => match writer.write_all(bytes).await {
                Ok(()) => true,
                Err(e) => {
                    debug!("uplink send failed: {e}");
                    false
                }
            },
            None => false,
        }
    }

    /// Sends one telemetry frame, tracking consecutive failures.
    ///
    /// At [`MAX_SEND_FAILURES`] the current connection is torn down and the
    /// redial loop takes over; the telemetry loop itself never stops.
    pub async fn send_telemetry(&self, frame: &[u8]) {
        if self.send_frame(frame).await {
            self.gate.lock().unwrap().record_success();
            return;
        }
        let teardown = self.gate.lock().unwrap().record_failure();
        warn!("telemetry send failed");
        if teardown {
            warn!("{MAX_SEND_FAILURES} consecutive send failures; resetting connection");
            self.reset.notify_one();
        }
    }

    /// Modem signal strength for the telemetry frame.
    // TODO: query the modem's AT interface for the live RSSI figure.
    pub fn rssi(&self) -> i8 {
        -33
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_gate_trips_at_limit() {
        let mut gate = FailureGate::new(3);
        assert!(!gate.record_failure());
        assert!(!gate.record_failure());
        assert!(gate.record_failure(), "third consecutive failure must trip");
    }

    #[test]
    fn test_failure_gate_resets_after_tripping() {
        let mut gate = FailureGate::new(3);
        for _ in 0..2 {
            gate.record_failure();
        }
        assert!(gate.record_failure());
        // A fresh run starts counting from zero again.
        assert!(!gate.record_failure());
    }

    #[test]
    fn test_success_clears_the_failure_run() {
        let mut gate = FailureGate::new(3);
        gate.record_failure();
        gate.record_failure();
        gate.record_success();
        assert!(!gate.record_failure());
        assert!(!gate.record_failure());
        assert!(gate.record_failure());
    }

    #[test]
    fn test_default_config_targets_the_standard_port() {
        let cfg = UplinkConfig::default();
        assert_eq!(cfg.relay_addr.port(), 9482);
        assert_eq!(cfg.reconnect_interval, Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_send_frame_without_connection_reports_failure() {
        let uplink = RelayUplink::new(UplinkConfig::default());
        assert!(!uplink.send_frame(&[0u8; 16]).await);
    }
}
