//! The Distributed Memory Client
//!
//! Thin request/response wrappers over the block protocol, plus the local-copy
//! bookkeeping that mirrors what the servers report back.
//!
//! Checks that need no server round trip (uninitialised client, block already or
//! not yet mapped locally, no server for the ID) are answered without any I/O.

use super::connection::ServerConnection;
use super::types::{ClientError, DEFAULT_READ_TIMEOUT, LocalBlock};
use crate::config::client::ClientConfig;
use crate::protocol::types::{Opcode, RequestHeader, Status};

use std::collections::HashMap;
use std::time::Duration;

/// An inclusive ID range and the index of the connection serving it.
#[derive(Debug, Clone, Copy)]
struct Route {
    first: u32,
    last: u32,
    server: usize,
}

/// Everything that only exists between `init` and `close`.
struct Session {
    block_size: usize,
    servers: Vec<ServerConnection>,
    routes: Vec<Route>,
    local: HashMap<u32, LocalBlock>,
}

pub struct DistMemClient {
    read_timeout: Duration,
    session: Option<Session>,
}

impl Default for DistMemClient {
    fn default() -> Self {
        Self::new()
    }
}

impl DistMemClient {
    /// An uninitialised client. Every operation fails with `NotInitialized` until `init`.
    pub fn new() -> Self {
        Self {
            read_timeout: DEFAULT_READ_TIMEOUT,
            session: None,
        }
    }

    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    pub async fn connect(config: &ClientConfig) -> Result<Self, ClientError> {
        let mut client = Self::new();
        client.init(config).await?;
        Ok(client)
    }

    /// Opens one connection per distinct server endpoint in `config`.
    ///
    /// All or nothing: if any server is unreachable the connections already opened
    /// are dropped and the client stays uninitialised. A config without `ID=` ranges
    /// is rejected, since a client with an empty server table cannot do anything.
    pub async fn init(&mut self, config: &ClientConfig) -> Result<(), ClientError> {
        if self.session.is_some() {
            return Err(ClientError::AlreadyInitialized);
        }
        if config.ranges.is_empty() {
            return Err(ClientError::NoBlockRanges);
        }

        let endpoints = config.endpoints();
        let mut servers = Vec::with_capacity(endpoints.len());
        for addr in &endpoints {
            servers.push(ServerConnection::open(*addr, Some(self.read_timeout)).await?);
        }

        let routes = config
            .ranges
            .iter()
            .filter_map(|range| {
                let server = endpoints.iter().position(|addr| *addr == range.endpoint)?;
                Some(Route {
                    first: range.first,
                    last: range.last,
                    server,
                })
            })
            .collect();

        tracing::info!(
            "Client initialised: {} servers, {} ranges, {} byte blocks",
            servers.len(),
            config.ranges.len(),
            config.block_size
        );

        self.session = Some(Session {
            block_size: config.block_size,
            servers,
            routes,
            local: HashMap::new(),
        });
        Ok(())
    }

    /// Drops every connection and local copy. The server releases the mappings.
    pub fn close(&mut self) {
        if let Some(session) = self.session.take() {
            tracing::debug!(
                "Closing client: {} connections, {} mapped blocks",
                session.servers.len(),
                session.local.len()
            );
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.session.is_some()
    }

    /// Configured block size, or 0 when not initialised.
    pub fn block_size(&self) -> usize {
        self.session.as_ref().map_or(0, |s| s.block_size)
    }

    pub fn is_mapped(&self, id: u32) -> bool {
        self.local_block(id).is_some()
    }

    /// Whether the local copy of `id` is known to match the server's current version.
    pub fn is_valid(&self, id: u32) -> bool {
        self.local_block(id).is_some_and(|block| block.valid)
    }

    pub fn block(&self, id: u32) -> Option<&[u8]> {
        self.local_block(id).map(|block| block.data.as_slice())
    }

    /// Mutable access to the local copy. Changes are only published by `write`.
    pub fn block_mut(&mut self, id: u32) -> Option<&mut [u8]> {
        self.session
            .as_mut()?
            .local
            .get_mut(&id)
            .map(|block| block.data.as_mut_slice())
    }

    pub async fn map(&mut self, id: u32) -> Result<(), ClientError> {
        self.session_mut()?.map(id).await
    }

    pub async fn unmap(&mut self, id: u32) -> Result<(), ClientError> {
        self.session_mut()?.unmap(id).await
    }

    /// Re-syncs the local copy. Returns `true` if new data was received,
    /// `false` if the copy was already current.
    pub async fn update(&mut self, id: u32) -> Result<bool, ClientError> {
        self.session_mut()?.update(id).await
    }

    /// Publishes the local copy of `id`.
    pub async fn write(&mut self, id: u32) -> Result<(), ClientError> {
        self.session_mut()?.write(id).await
    }

    /// Copies `data` into the local copy of `id`, then publishes it.
    pub async fn write_from(&mut self, id: u32, data: &[u8]) -> Result<(), ClientError> {
        let session = self.session_mut()?;
        let block = session.local.get_mut(&id).ok_or(ClientError::NotMapped(id))?;
        if data.len() != block.data.len() {
            return Err(ClientError::PayloadSize {
                expected: block.data.len(),
                actual: data.len(),
            });
        }
        block.data.copy_from_slice(data);
        session.write(id).await
    }

    /// Blocks until another client's write supersedes the local copy of `id`.
    ///
    /// Returns immediately if that already happened. The read timeout is lifted for
    /// the duration of the call and restored on every exit, including cancellation.
    /// A cancelled wait leaves its reply pending, so the connection to that server is
    /// dropped and later calls routed to it fail with `ConnectionLost`.
    pub async fn wait(&mut self, id: u32) -> Result<(), ClientError> {
        self.session_mut()?.wait(id).await
    }

    fn session_mut(&mut self) -> Result<&mut Session, ClientError> {
        self.session.as_mut().ok_or(ClientError::NotInitialized)
    }

    fn local_block(&self, id: u32) -> Option<&LocalBlock> {
        self.session.as_ref()?.local.get(&id)
    }
}

impl Session {
    /// Index of the connection serving `id`. Later ranges take precedence.
    fn route(&self, id: u32) -> Result<usize, ClientError> {
        self.routes
            .iter()
            .rev()
            .find(|route| (route.first..=route.last).contains(&id))
            .map(|route| route.server)
            .ok_or(ClientError::UnknownBlock(id))
    }

    /// Route for an operation that requires `id` to be mapped locally.
    fn mapped_route(&self, id: u32) -> Result<usize, ClientError> {
        let server = self.route(id)?;
        if !self.local.contains_key(&id) {
            return Err(ClientError::NotMapped(id));
        }
        Ok(server)
    }

    async fn map(&mut self, id: u32) -> Result<(), ClientError> {
        let server = self.route(id)?;
        if self.local.contains_key(&id) {
            return Err(ClientError::AlreadyMapped(id));
        }

        let conn = &mut self.servers[server];
        conn.send(RequestHeader::new(Opcode::Map, id), None).await?;
        let result = match conn.recv_status().await? {
            Status::Ok => {
                let mut data = vec![0u8; self.block_size];
                conn.recv_payload_into(&mut data).await?;
                self.local.insert(id, LocalBlock::new(data));
                Ok(())
            }
            Status::Error => Err(ClientError::Rejected { op: Opcode::Map, id }),
            status => Err(unexpected(conn, Opcode::Map, status)),
        };
        conn.complete();
        result
    }

    async fn unmap(&mut self, id: u32) -> Result<(), ClientError> {
        let server = self.mapped_route(id)?;

        let conn = &mut self.servers[server];
        conn.send(RequestHeader::new(Opcode::Unmap, id), None).await?;
        let result = match conn.recv_status().await? {
            Status::Ok => {
                self.local.remove(&id);
                Ok(())
            }
            Status::Error => Err(ClientError::Rejected { op: Opcode::Unmap, id }),
            status => Err(unexpected(conn, Opcode::Unmap, status)),
        };
        conn.complete();
        result
    }

    async fn update(&mut self, id: u32) -> Result<bool, ClientError> {
        let server = self.mapped_route(id)?;

        let conn = &mut self.servers[server];
        conn.send(RequestHeader::new(Opcode::Update, id), None).await?;
        let refreshed = match conn.recv_status().await? {
            Status::Ok => {
                // Staged so a cancelled read never leaves a half-written local copy.
                let mut data = vec![0u8; self.block_size];
                conn.recv_payload_into(&mut data).await?;
                Ok(Some(data))
            }
            Status::Updated => Ok(None),
            Status::Error => Err(ClientError::Rejected { op: Opcode::Update, id }),
            status => Err(unexpected(conn, Opcode::Update, status)),
        };
        conn.complete();

        let refreshed = refreshed?;
        let Some(block) = self.local.get_mut(&id) else {
            return Err(ClientError::NotMapped(id));
        };
        block.valid = true;
        match refreshed {
            Some(data) => {
                block.data = data;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn write(&mut self, id: u32) -> Result<(), ClientError> {
        let server = self.mapped_route(id)?;

        let conn = &mut self.servers[server];
        let Some(block) = self.local.get_mut(&id) else {
            return Err(ClientError::NotMapped(id));
        };
        conn.send(RequestHeader::new(Opcode::Write, id), Some(block.data.as_slice())).await?;

        let result = match conn.recv_status().await? {
            Status::Ok => {
                block.valid = true;
                Ok(())
            }
            Status::Error => {
                block.valid = false;
                match conn.recv_status().await? {
                    Status::Unmapped => Err(ClientError::NotMapped(id)),
                    Status::Invalid => Err(ClientError::Stale(id)),
                    status => Err(unexpected(conn, Opcode::Write, status)),
                }
            }
            status => Err(unexpected(conn, Opcode::Write, status)),
        };
        conn.complete();
        result
    }

    async fn wait(&mut self, id: u32) -> Result<(), ClientError> {
        let server = self.mapped_route(id)?;

        // The copy counts as superseded from here on, even if the call is cancelled.
        if let Some(block) = self.local.get_mut(&id) {
            block.valid = false;
        }

        let mut conn = self.servers[server].lift_read_timeout();
        conn.send(RequestHeader::new(Opcode::Wait, id), None).await?;
        let result = match conn.recv_status().await? {
            Status::Ok => Ok(()),
            Status::Error => Err(ClientError::Rejected { op: Opcode::Wait, id }),
            status => Err(unexpected(&mut conn, Opcode::Wait, status)),
        };
        conn.complete();
        result
    }
}

fn unexpected(conn: &mut ServerConnection, op: Opcode, status: Status) -> ClientError {
    conn.poison();
    ClientError::UnexpectedStatus { op, status }
}
