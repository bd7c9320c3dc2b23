//! Application layer of the relay server.
//!
//! The relay's business rules live here, free of sockets and I/O:
//!
//! - **`registry`** – the bounded table of device records. One slot per
//!   configured device id, bound to a live connection by its telemetry and
//!   unbound by inactivity or a read error. The registry also owns each bound
//!   slot's inactivity timer handle.
//!
//! The dispatch rules themselves (who may read what, what gets forwarded
//! where) are thin enough that they live with the socket broker in
//! `infrastructure::server`; everything they decide *about* is queried from
//! the registry.

pub mod registry;
