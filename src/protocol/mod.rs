//! Block Wire Protocol
//!
//! Fixed-layout binary framing shared by the server and the client library.
//! Every integer on the wire is a 4-byte big-endian (network order) word.
//!
//! ## Frames
//! - **Request**: `<opcode, block_id>`; a `WRITE` request is followed by exactly
//!   `block_size` raw bytes.
//! - **Response**: `<status>`; `MAP` and fresh `UPDATE` replies are followed by
//!   `block_size` raw bytes, a failed `WRITE` by one qualifier word
//!   (`UNMAPPED` or `INVALID`).
//!
//! A short read or write is a transport failure, never a protocol status.

pub mod codec;
pub mod types;
