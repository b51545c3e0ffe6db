use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;

/// Block size used when the deployment does not configure one.
pub const DEFAULT_BLOCK_SIZE: usize = 128;

static NEXT_CLIENT_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of one connected client.
///
/// Minted once per accepted connection from a process-wide counter and never
/// reused, so a late cleanup can never remove a newer connection's mappings.
/// The field is private: `new` is the only way to obtain one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ClientId(u64);

impl ClientId {
    pub fn new() -> Self {
        Self(NEXT_CLIENT_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(&self) -> u64 {
        self.0
    }
}

impl Default for ClientId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "client-{}", self.0)
    }
}

/// Result of a successful `update`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// The client's copy already matched the current version; nothing to send.
    UpToDate,
    /// The client was stale; carries a copy of the current data.
    Refreshed(Vec<u8>),
}

/// Result of a successful `wait`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// The client's copy is stale (either already on entry, or after a write).
    Invalidated,
    /// Only produced by the bounded variant.
    TimedOut,
}

/// Application-level rejections. None of these end a connection.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BlockError {
    #[error("block already mapped by this client")]
    AlreadyMapped,

    #[error("block not mapped by this client")]
    NotMapped,

    #[error("client copy is stale, update before writing")]
    Stale,

    #[error("block {0} is not served here")]
    UnknownBlock(u32),

    #[error("payload is {actual} bytes, block size is {expected}")]
    PayloadSize { expected: usize, actual: usize },
}

/// Point-in-time view of one block, for stats and tests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BlockInfo {
    pub id: u32,
    pub version: u64,
    pub mapped_clients: usize,
    pub waiters: usize,
}
