use super::connection::ConnectionHandler;
use super::types::ServerStats;
use crate::memory::store::BlockStore;
use crate::memory::types::ClientId;

use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::Instrument;

/// Accepts block-protocol connections and gives each its own task.
pub struct Listener {
    listener: TcpListener,
    store: Arc<BlockStore>,
    stats: Arc<ServerStats>,
}

impl Listener {
    pub async fn bind(addr: SocketAddr, store: Arc<BlockStore>) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| anyhow::anyhow!("Unable to listen on {}: {}", addr, e))?;

        Ok(Self {
            listener,
            store,
            stats: Arc::new(ServerStats::new()),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn stats(&self) -> Arc<ServerStats> {
        self.stats.clone()
    }

    pub fn store(&self) -> Arc<BlockStore> {
        self.store.clone()
    }

    /// Runs the accept loop. Only returns on an accept failure, which is fatal.
    pub async fn run(self) -> Result<()> {
        let range = self.store.range();
        tracing::info!(
            "Serving blocks {}-{} ({} bytes each) on {}",
            range.start(),
            range.end(),
            self.store.block_size(),
            self.local_addr()?
        );

        loop {
            let (stream, peer) = self
                .listener
                .accept()
                .await
                .map_err(|e| anyhow::anyhow!("Unable to accept connection: {}", e))?;

            if let Err(e) = stream.set_nodelay(true) {
                tracing::debug!("Failed to set TCP_NODELAY for {}: {}", peer, e);
            }

            let client = ClientId::new();
            let handler =
                ConnectionHandler::new(client, peer, self.store.clone(), self.stats.clone());
            let span = tracing::info_span!("conn", client = client.get(), peer = %peer);

            tokio::spawn(handler.run(stream).instrument(span));
        }
    }
}
