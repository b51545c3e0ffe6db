use crate::protocol::types::{Opcode, Status, WireError};

use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

/// Default bound on how long the client waits for any reply other than `WAIT`.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("client is not initialised")]
    NotInitialized,

    #[error("client is already initialised")]
    AlreadyInitialized,

    #[error("configuration assigns no block ranges to any server")]
    NoBlockRanges,

    #[error("block {0} is already mapped")]
    AlreadyMapped(u32),

    #[error("block {0} is not mapped")]
    NotMapped(u32),

    #[error("block {0} is stale, update it before writing")]
    Stale(u32),

    #[error("no configured server owns block {0}")]
    UnknownBlock(u32),

    #[error("server rejected {op:?} on block {id}")]
    Rejected { op: Opcode, id: u32 },

    #[error("unexpected {status:?} in reply to {op:?}")]
    UnexpectedStatus { op: Opcode, status: Status },

    #[error("payload is {actual} bytes, block size is {expected}")]
    PayloadSize { expected: usize, actual: usize },

    #[error("no reply within {0:?}")]
    Timeout(Duration),

    #[error("connection to {0} was lost")]
    ConnectionLost(SocketAddr),

    #[error("unable to connect to {addr}: {source}")]
    Connect {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Wire(#[from] WireError),
}

/// The library-owned copy of one mapped block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalBlock {
    pub data: Vec<u8>,
    /// `false` once a write elsewhere is known to have superseded `data`.
    pub valid: bool,
}

impl LocalBlock {
    pub fn new(data: Vec<u8>) -> Self {
        Self { data, valid: true }
    }
}
