//! Per-Connection Request Loop
//!
//! One `ConnectionHandler` serves exactly one client for the lifetime of its connection.
//!
//! ## Loop
//! 1. Read a request header (`<opcode, block_id>`); a `WRITE` also carries one block of data.
//! 2. Apply it to the shared `BlockStore` on behalf of this handler's `ClientId`.
//! 3. Write the reply and go back to 1.
//!
//! The loop ends on EOF, any transport error, or an unknown opcode. In every case the
//! client's mappings are then released from all blocks before the stream is shut down.

use crate::memory::store::BlockStore;
use crate::memory::types::{BlockError, ClientId, UpdateOutcome};
use crate::protocol::codec::*;
use crate::protocol::types::{Opcode, RequestHeader, Status, WireError};
use crate::server::types::ServerStats;

use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

pub struct ConnectionHandler {
    client: ClientId,
    peer: SocketAddr,
    store: Arc<BlockStore>,
    stats: Arc<ServerStats>,
}

impl ConnectionHandler {
    pub fn new(
        client: ClientId,
        peer: SocketAddr,
        store: Arc<BlockStore>,
        stats: Arc<ServerStats>,
    ) -> Self {
        Self {
            client,
            peer,
            store,
            stats,
        }
    }

    pub fn client(&self) -> ClientId {
        self.client
    }

    /// Serves the connection until it ends, then releases the client's mappings.
    pub async fn run<S>(self, mut stream: S)
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        self.stats.connection_opened(self.client, self.peer);
        tracing::info!("Client {} connected from {}", self.client, self.peer);

        match self.serve(&mut stream).await {
            Ok(()) => {
                tracing::debug!("Client {} closed the connection", self.client);
            }
            Err(e) if e.is_disconnect() => {
                tracing::debug!("Client {} went away mid-frame: {}", self.client, e);
            }
            Err(e @ (WireError::UnknownOpcode(_) | WireError::Violation(_))) => {
                self.stats.record_protocol_error();
                tracing::warn!("Dropping client {}: {}", self.client, e);
            }
            Err(e) => {
                tracing::debug!("Connection to client {} failed: {}", self.client, e);
            }
        }

        // Always runs: a crashed client must not leave mappings behind.
        let released = self.store.clean_client(self.client);
        self.stats.connection_closed(self.client);
        if let Err(e) = stream.shutdown().await {
            tracing::debug!("Failed to shut down stream of client {}: {}", self.client, e);
        }

        tracing::info!(
            "Client {} disconnected ({} mappings released)",
            self.client,
            released
        );
    }

    /// Returns `Ok(())` when the peer closes cleanly between requests.
    async fn serve<S>(&self, stream: &mut S) -> Result<(), WireError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        loop {
            let header = match read_request_header(stream).await {
                Ok(header) => header,
                Err(e) if e.is_disconnect() => return Ok(()),
                Err(e) => return Err(e),
            };

            tracing::debug!(
                "Client {} -> {:?} block {}",
                self.client,
                header.opcode,
                header.block_id
            );

            let keep_going = self.handle_request(stream, header).await?;
            self.stats.record_request();
            if !keep_going {
                return Ok(());
            }
        }
    }

    /// Applies one request and writes its reply.
    ///
    /// Returns `Ok(false)` when the peer went away while a `WAIT` was pending.
    async fn handle_request<S>(&self, stream: &mut S, header: RequestHeader) -> Result<bool, WireError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let id = header.block_id;

        match header.opcode {
            Opcode::Map => match self.store.map_client(self.client, id) {
                Ok(data) => write_response(stream, &[Status::Ok], Some(&data)).await?,
                Err(e) => {
                    tracing::debug!("MAP {} rejected for {}: {}", id, self.client, e);
                    write_status(stream, Status::Error).await?;
                }
            },

            Opcode::Unmap => {
                let status = match self.store.unmap_client(self.client, id) {
                    Ok(()) => Status::Ok,
                    Err(e) => {
                        tracing::debug!("UNMAP {} rejected for {}: {}", id, self.client, e);
                        Status::Error
                    }
                };
                write_status(stream, status).await?;
            }

            Opcode::Update => match self.store.update_block(self.client, id) {
                Ok(UpdateOutcome::UpToDate) => write_status(stream, Status::Updated).await?,
                Ok(UpdateOutcome::Refreshed(data)) => {
                    write_response(stream, &[Status::Ok], Some(&data)).await?
                }
                Err(e) => {
                    tracing::debug!("UPDATE {} rejected for {}: {}", id, self.client, e);
                    write_status(stream, Status::Error).await?;
                }
            },

            Opcode::Write => {
                // The payload is always on the wire, even for an unknown block.
                let data = read_payload(stream, self.store.block_size()).await?;
                let statuses: &[Status] = match self.store.write_block(self.client, id, &data) {
                    Ok(()) => &[Status::Ok],
                    Err(BlockError::Stale) => &[Status::Error, Status::Invalid],
                    Err(e) => {
                        tracing::debug!("WRITE {} rejected for {}: {}", id, self.client, e);
                        &[Status::Error, Status::Unmapped]
                    }
                };
                write_response(stream, statuses, None).await?;
            }

            Opcode::Wait => {
                let result = tokio::select! {
                    result = self.store.wait_block(self.client, id) => result,
                    ended = watch_peer(stream) => {
                        ended?;
                        tracing::debug!("Client {} left while waiting on block {}", self.client, id);
                        return Ok(false);
                    }
                };

                let status = match result {
                    Ok(outcome) => {
                        tracing::debug!("WAIT {} for {} returned {:?}", id, self.client, outcome);
                        Status::Ok
                    }
                    Err(e) => {
                        tracing::debug!("WAIT {} rejected for {}: {}", id, self.client, e);
                        Status::Error
                    }
                };
                write_status(stream, status).await?;
            }
        }

        Ok(true)
    }
}

/// Resolves when the peer closes the stream or sends anything while it should be
/// waiting for a reply.
async fn watch_peer<S>(stream: &mut S) -> Result<(), WireError>
where
    S: AsyncRead + Unpin,
{
    let mut probe = [0u8; 1];
    match stream.read(&mut probe).await {
        Ok(0) => Ok(()),
        Ok(_) => Err(WireError::Violation("request sent while a wait was pending")),
        Err(e) => Err(e.into()),
    }
}
