//! pump-device library entry point.
//!
//! Re-exports the module tree so that integration tests in `tests/` and the
//! binary entry point in `main.rs` share the same code.

pub mod application;
pub mod infrastructure;
