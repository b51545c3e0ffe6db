//! Client Library
//!
//! The protocol peer applications link against. A `DistMemClient` keeps one
//! persistent connection per configured server and a library-owned local copy of
//! every block it has mapped.
//!
//! ## Core Concepts
//! - **Routing**: Block IDs are resolved to a server through the ranges of a `ClientConfig`.
//! - **Local copies**: `map` and `update` fill the local buffer; `write` pushes it back.
//! - **Validity**: Each local copy is flagged valid or invalid, mirroring the version
//!   bookkeeping the server reports back (`UPDATED`, `ERROR`+`INVALID`, `WAIT` release).
//! - **Read timeout**: Replies are bounded by a read timeout, lifted for the duration of `wait`.

pub mod connection;
pub mod distmem;
pub mod types;
