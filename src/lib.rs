//! Distributed Shared Memory Library
//!
//! A fixed universe of fixed-size memory blocks, partitioned across independent block
//! servers, that clients map into local memory, read, write and synchronise on through
//! a small binary protocol.
//!
//! ## Architecture Modules
//!
//! - **`protocol`**: The wire format. Fixed big-endian request/response headers and the
//!   async framing helpers both peers use.
//! - **`memory`**: The coherence core. Per-block version tracking, per-client validity,
//!   and invalidation waits, behind one lock per block (`Block`, `BlockStore`).
//! - **`server`**: The concurrency core. A TCP accept loop that gives every connection its
//!   own task and request loop, sharing one `BlockStore`.
//! - **`client`**: The library applications use. Routes block IDs to servers and keeps
//!   library-owned local copies in step with the version bookkeeping.
//! - **`config`**: Server arguments and environment overrides, and the client's
//!   block-range file format.

pub mod client;
pub mod config;
pub mod memory;
pub mod protocol;
pub mod server;
