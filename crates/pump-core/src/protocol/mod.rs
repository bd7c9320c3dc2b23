//! The PumpLink wire protocol.
//!
//! Every message travels as one fixed-size frame: 16 bytes for plaintext
//! kinds, 33 bytes (tag + IV + one AES block) for the encrypted command
//! relay. A frame is read or not read as a whole unit — there is no partial
//! framing on the wire.
//!
//! - **`messages`** – tag values, frame-size constants, and the typed frame
//!   structs.
//! - **`codec`** – packing and unpacking between bytes and typed messages,
//!   with typed rejection reasons that callers drop silently at the wire.
//! - **`seal`** – the IV-prefixed single-block AES-256-CBC framing used on
//!   the client→relay→device command path.

pub mod codec;
pub mod messages;
pub mod seal;
