//! Infrastructure layer of the relay server.
//!
//! - **`config`** – TOML configuration schema and loading.
//! - **`server`** – the TCP listener, the bounded connection table, and the
//!   broker task that owns the registry and routes every frame.

pub mod config;
pub mod server;
