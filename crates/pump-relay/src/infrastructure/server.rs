//! The relay's TCP front end and broker loop.
//!
//! Topology: one acceptor task and one reader task per connection all feed a
//! single `mpsc` channel; the broker task drains it, owns the
//! [`DeviceRegistry`] and every connection's write half, and is the only
//! place any of that state is touched. Inactivity timers deliver their
//! device ids on a second channel into the same `select!`. The broker never
//! blocks anywhere except those channel reads.
//!
//! Devices and clients share one bounded connection table. A connection is
//! promoted to "device" implicitly when a telemetry frame binds it to a
//! registry slot; everything else is treated as a client until it says
//! otherwise.
//!
//! Framing: the first byte of every frame is its tag, and the tag determines
//! the frame's total size (`wire_len`). A reader pulls exactly one whole
//! frame per event; EOF or a read error mid-frame tears the connection down.

use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use pump_core::config::SecretsError;
use pump_core::domain::DeviceId;
use pump_core::protocol::codec::{decode, encode, wire_len, DecodeContext, FrameRejected};
use pump_core::protocol::messages::{CommandRelay, LinkMessage, TelemetryResponse, FRAME_LEN};
use pump_core::protocol::seal::{open, seal, KEY_LEN};
use pump_core::timer::TimerService;

use crate::application::registry::{BufferKind, ConnId, DeviceRegistry, StoreOutcome};
use crate::infrastructure::config::RelayConfig;

/// Fatal startup errors. Everything after a successful bind is non-fatal.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("invalid bind address {addr}: {source}")]
    BadAddress {
        addr: String,
        #[source]
        source: std::net::AddrParseError,
    },

    #[error("bind failed on {addr}: {source}")]
    BindFailed {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Secrets(#[from] SecretsError),
}

/// Events multiplexed into the broker.
#[derive(Debug)]
enum SocketEvent {
    Accepted(TcpStream, SocketAddr),
    Frame { conn: ConnId, bytes: Vec<u8> },
    Closed { conn: ConnId },
}

/// A bound relay server, ready to run.
pub struct RelayServer {
    listener: TcpListener,
    local_addr: SocketAddr,
    cfg: RelayConfig,
    key: [u8; KEY_LEN],
}

impl RelayServer {
    /// Parses the secrets and binds the listening socket.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError`] on a malformed key or a failed bind; both are
    /// fatal at startup.
    pub async fn bind(cfg: RelayConfig) -> Result<Self, ServerError> {
        let key = cfg.secrets.key()?;
        let ip: std::net::IpAddr =
            cfg.network
                .bind_address
                .parse()
                .map_err(|source| ServerError::BadAddress {
                    addr: cfg.network.bind_address.clone(),
                    source,
                })?;
        let addr = SocketAddr::new(ip, cfg.network.port);
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::BindFailed { addr, source })?;
        let local_addr = listener.local_addr().map_err(|source| ServerError::BindFailed {
            addr,
            source,
        })?;
        info!("relay listening on {local_addr}");
        Ok(Self {
            listener,
            local_addr,
            cfg,
            key,
        })
    }

    /// The address the listener actually bound (useful with port 0).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Runs the acceptor and the broker until the process is stopped.
    pub async fn run(self) {
        let (sock_tx, mut sock_rx) = mpsc::channel::<SocketEvent>(64);
        let (inact_tx, mut inact_rx) = mpsc::channel::<DeviceId>(16);

        tokio::spawn(accept_loop(self.listener, sock_tx.clone()));

        let registry = DeviceRegistry::new(
            &self.cfg.devices.known_ids,
            TimerService::new(inact_tx),
            Duration::from_secs(self.cfg.devices.inactivity_timeout_secs),
            self.cfg.secrets.passcode,
        );

        let mut broker = Broker {
            registry,
            connections: (0..self.cfg.network.max_connections).map(|_| None).collect(),
            passcode: self.cfg.secrets.passcode,
            key: self.key,
            sock_tx,
        };

        loop {
            tokio::select! {
                Some(event) = sock_rx.recv() => match event {
                    SocketEvent::Accepted(stream, peer) => broker.accept(stream, peer),
                    SocketEvent::Frame { conn, bytes } => broker.handle_frame(conn, &bytes).await,
                    SocketEvent::Closed { conn } => broker.connection_closed(conn),
                },
                Some(id) = inact_rx.recv() => broker.device_inactive(id),
                else => break,
            }
        }
    }
}

/// Accepts connections forever, retrying on transient accept errors.
async fn accept_loop(listener: TcpListener, tx: mpsc::Sender<SocketEvent>) {
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                if tx.send(SocketEvent::Accepted(stream, peer)).await.is_err() {
                    return;
                }
            }
            Err(e) => {
                warn!("accept failed: {e}; retrying");
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
        }
    }
}

/// Reads whole frames from one connection and forwards them to the broker.
async fn read_frames(conn: ConnId, mut reader: OwnedReadHalf, tx: mpsc::Sender<SocketEvent>) {
    loop {
        let mut tag = [0u8; 1];
        if reader.read_exact(&mut tag).await.is_err() {
            break;
        }
        let Some(total) = wire_len(tag[0]) else {
            // Unknown tag: the frame length is unknowable, so surface just
            // the tag byte for logging and keep the connection open.
            if tx
                .send(SocketEvent::Frame {
                    conn,
                    bytes: tag.to_vec(),
                })
                .await
                .is_err()
            {
                return;
            }
            continue;
        };
        let mut frame = vec![0u8; total];
        frame[0] = tag[0];
        if reader.read_exact(&mut frame[1..]).await.is_err() {
            break;
        }
        if tx.send(SocketEvent::Frame { conn, bytes: frame }).await.is_err() {
            return;
        }
    }
    let _ = tx.send(SocketEvent::Closed { conn }).await;
}

struct ConnEntry {
    peer: SocketAddr,
    writer: OwnedWriteHalf,
    reader: JoinHandle<()>,
}

/// Single owner of the registry and all connection state.
struct Broker {
    registry: DeviceRegistry,
    connections: Vec<Option<ConnEntry>>,
    passcode: u16,
    key: [u8; KEY_LEN],
    sock_tx: mpsc::Sender<SocketEvent>,
}

impl Broker {
    /// Places an accepted socket into the first free connection slot, or
    /// drops it when the table is full. The refused peer gets no reply.
    fn accept(&mut self, stream: TcpStream, peer: SocketAddr) {
        let Some(index) = self.connections.iter().position(Option::is_none) else {
            debug!("connection table full; dropping connection from {peer}");
            return;
        };
        let conn = ConnId(index);
        let (read_half, write_half) = stream.into_split();
        let reader = tokio::spawn(read_frames(conn, read_half, self.sock_tx.clone()));
        self.connections[index] = Some(ConnEntry {
            peer,
            writer: write_half,
            reader,
        });
        debug!("{conn} accepted from {peer}");
    }

    async fn handle_frame(&mut self, conn: ConnId, bytes: &[u8]) {
        if self.connections.get(conn.0).map_or(true, Option::is_none) {
            // Late frame from a connection we already tore down.
            return;
        }

        let ctx = DecodeContext::server(self.passcode);
        match decode(bytes, &ctx) {
            Ok(LinkMessage::Telemetry(report)) => {
                let mut raw = [0u8; FRAME_LEN];
                raw.copy_from_slice(&bytes[..FRAME_LEN]);
                match self.registry.store_telemetry(conn, &report, raw) {
                    StoreOutcome::Stored { newly_bound: true } => {
                        info!("{} online on {conn}", report.device_id);
                    }
                    StoreOutcome::Stored { newly_bound: false } => {
                        if let Some(snap) = self.registry.snapshot(report.device_id) {
                            debug!(
                                "telemetry from {} on {conn} (rssi {} dBm, cutoff {} min)",
                                snap.id, snap.last_rssi, snap.remaining_minutes
                            );
                        }
                    }
                    StoreOutcome::UnknownDevice => {}
                }
            }
            Ok(LinkMessage::ListQuery(query)) => {
                // The response is assembled either way; a wrong passcode only
                // suppresses the send.
                let response = self.registry.build_list_response();
                if query.passcode == self.passcode {
                    match encode(&LinkMessage::ListResponse(response), self.passcode) {
                        Ok(frame) => self.send_to(conn, &frame).await,
                        Err(e) => warn!("list response does not fit a frame: {e}"),
                    }
                } else {
                    debug!("list query on {conn} with wrong passcode; response dropped");
                }
            }
            Ok(LinkMessage::TelemetryQuery(query)) => {
                match self.registry.lookup_buffer(query.device_id, BufferKind::Telemetry) {
                    Ok((frame, _)) => {
                        let response =
                            LinkMessage::TelemetryResponse(TelemetryResponse { frame });
                        match encode(&response, self.passcode) {
                            Ok(out) => self.send_to(conn, &out).await,
                            Err(e) => warn!("telemetry response encode failed: {e}"),
                        }
                    }
                    Err(e) => debug!("telemetry query on {conn}: {e}"),
                }
            }
            Ok(LinkMessage::CommandRelay(relay)) => self.relay_command(conn, &relay).await,
            Ok(other) => {
                debug!("unexpected {:?} frame on {conn}; ignoring", other.tag());
            }
            Err(FrameRejected::UnknownTag(tag)) => {
                warn!("unknown tag 0x{tag:02X} on {conn}; ignoring");
            }
            Err(reason) => {
                debug!("frame on {conn} rejected: {reason}");
            }
        }
    }

    /// Opens a relayed command, records it, and pushes it — re-sealed under
    /// the same IV — straight to the addressed device's socket.
    async fn relay_command(&mut self, conn: ConnId, relay: &CommandRelay) {
        let (iv, payload) = match open(&relay.sealed, &self.key) {
            Ok(parts) => parts,
            Err(e) => {
                debug!("relay on {conn} failed to open: {e}");
                return;
            }
        };

        let ctx = DecodeContext::server(self.passcode);
        let command = match decode(&payload, &ctx) {
            Ok(LinkMessage::Command(command)) => command,
            Ok(other) => {
                debug!(
                    "relay on {conn} carried {:?}, not a command; dropping",
                    other.tag()
                );
                return;
            }
            Err(reason) => {
                debug!("relayed payload on {conn} rejected: {reason}");
                return;
            }
        };

        if self.registry.store_command_ack(command.device_id, payload).is_err() {
            debug!("relayed command for unconfigured {}; dropping", command.device_id);
            return;
        }

        let Some(device_conn) = self.registry.bound_conn(command.device_id) else {
            debug!("{} has no bound connection; forward skipped", command.device_id);
            return;
        };

        match seal(&payload, &self.key, &iv) {
            Ok(sealed) => {
                info!(
                    "forwarding command to {} (motor_on={}, {} min)",
                    command.device_id, command.motor_on, command.remaining_minutes
                );
                self.send_to(device_conn, &sealed).await;
            }
            Err(e) => warn!("re-seal for {} failed: {e}", command.device_id),
        }
    }

    /// Fire-and-forget write; a failed send is logged, not fatal.
    async fn send_to(&mut self, conn: ConnId, bytes: &[u8]) {
        if let Some(Some(entry)) = self.connections.get_mut(conn.0) {
            if let Err(e) = entry.writer.write_all(bytes).await {
                warn!("send to {conn} ({}) failed: {e}", entry.peer);
            }
        }
    }

    /// A reader saw EOF or a read error: free the slot, and unbind the
    /// device if this connection was bound to one.
    fn connection_closed(&mut self, conn: ConnId) {
        if let Some(id) = self.registry.device_for_conn(conn) {
            self.registry.disconnect(id);
            info!("{id} disconnected ({conn} closed)");
        } else {
            debug!("{conn} closed");
        }
        self.free_conn(conn);
    }

    /// A device's inactivity window elapsed without telemetry.
    fn device_inactive(&mut self, id: DeviceId) {
        if let Some(conn) = self.registry.disconnect(id) {
            info!("{id} silent past the inactivity window; unbinding {conn}");
            self.free_conn(conn);
        }
    }

    fn free_conn(&mut self, conn: ConnId) {
        if let Some(Some(entry)) = self.connections.get_mut(conn.0).map(Option::take) {
            entry.reader.abort();
            // Dropping the writer closes our side of the socket.
        }
    }
}
