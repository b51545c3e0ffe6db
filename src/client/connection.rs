use super::types::ClientError;
use crate::protocol::codec::*;
use crate::protocol::types::{RequestHeader, Status, WireError};

use std::future::Future;
use std::net::SocketAddr;
use std::ops::{Deref, DerefMut};
use std::time::Duration;
use tokio::net::TcpStream;

/// One persistent connection to a block server.
///
/// Any failure leaves the stream at an unknown frame boundary, so the connection
/// is marked broken and every later call fails with `ConnectionLost`. The same holds
/// when an exchange is abandoned between `send` and `complete`, e.g. because the
/// caller's future was dropped: its reply may still arrive and would be misread.
pub struct ServerConnection {
    addr: SocketAddr,
    stream: TcpStream,
    read_timeout: Option<Duration>,
    /// Set by `send`, cleared by `complete` once the whole reply has been read.
    in_flight: bool,
    broken: bool,
}

impl ServerConnection {
    pub async fn open(addr: SocketAddr, read_timeout: Option<Duration>) -> Result<Self, ClientError> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|source| ClientError::Connect { addr, source })?;

        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!("Failed to set TCP_NODELAY for {}: {}", addr, e);
        }

        tracing::debug!("Connected to block server {}", addr);

        Ok(Self {
            addr,
            stream,
            read_timeout,
            in_flight: false,
            broken: false,
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn is_broken(&self) -> bool {
        self.broken
    }

    pub fn read_timeout(&self) -> Option<Duration> {
        self.read_timeout
    }

    /// Replaces the read timeout, returning the previous one.
    pub fn set_read_timeout(&mut self, timeout: Option<Duration>) -> Option<Duration> {
        std::mem::replace(&mut self.read_timeout, timeout)
    }

    /// Lifts the read timeout until the returned guard is dropped.
    pub fn lift_read_timeout(&mut self) -> ReadTimeoutLift<'_> {
        let previous = self.set_read_timeout(None);
        ReadTimeoutLift {
            conn: self,
            previous,
        }
    }

    /// Gives up on the connection after a reply that makes no sense.
    pub fn poison(&mut self) {
        self.broken = true;
    }

    /// Starts an exchange. Fails if the previous one was never completed.
    pub async fn send(&mut self, header: RequestHeader, payload: Option<&[u8]>) -> Result<(), ClientError> {
        self.ensure_usable()?;
        if self.in_flight {
            tracing::warn!("Abandoned exchange with {}, dropping the connection", self.addr);
            self.broken = true;
            return Err(ClientError::ConnectionLost(self.addr));
        }
        self.in_flight = true;
        let result = write_request(&mut self.stream, header, payload)
            .await
            .map_err(ClientError::from);
        self.settle(result)
    }

    pub async fn recv_status(&mut self) -> Result<Status, ClientError> {
        self.ensure_usable()?;
        let result = with_limit(self.read_timeout, read_status(&mut self.stream)).await;
        self.settle(result)
    }

    pub async fn recv_payload_into(&mut self, buf: &mut [u8]) -> Result<(), ClientError> {
        self.ensure_usable()?;
        let result = with_limit(self.read_timeout, read_payload_into(&mut self.stream, buf)).await;
        self.settle(result)
    }

    /// Marks the reply of the current exchange as fully read.
    pub fn complete(&mut self) {
        self.in_flight = false;
    }

    fn ensure_usable(&self) -> Result<(), ClientError> {
        if self.broken {
            return Err(ClientError::ConnectionLost(self.addr));
        }
        Ok(())
    }

    fn settle<T>(&mut self, result: Result<T, ClientError>) -> Result<T, ClientError> {
        if let Err(e) = &result {
            tracing::warn!("Connection to {} failed: {}", self.addr, e);
            self.broken = true;
        }
        result
    }
}

/// Restores the previous read timeout when dropped, including when the
/// exchange it guards is cancelled.
pub struct ReadTimeoutLift<'a> {
    conn: &'a mut ServerConnection,
    previous: Option<Duration>,
}

impl Deref for ReadTimeoutLift<'_> {
    type Target = ServerConnection;

    fn deref(&self) -> &ServerConnection {
        self.conn
    }
}

impl DerefMut for ReadTimeoutLift<'_> {
    fn deref_mut(&mut self) -> &mut ServerConnection {
        self.conn
    }
}

impl Drop for ReadTimeoutLift<'_> {
    fn drop(&mut self) {
        self.conn.set_read_timeout(self.previous);
    }
}

async fn with_limit<T, F>(limit: Option<Duration>, fut: F) -> Result<T, ClientError>
where
    F: Future<Output = Result<T, WireError>>,
{
    match limit {
        Some(limit) => match tokio::time::timeout(limit, fut).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(ClientError::Timeout(limit)),
        },
        None => Ok(fut.await?),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::types::Opcode;
    use tokio::net::TcpListener;

    /// A peer that accepts and then stays silent.
    async fn silent_peer() -> (SocketAddr, tokio::task::JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let (_stream, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
        });
        (addr, handle)
    }

    #[tokio::test]
    async fn test_lift_restores_timeout_when_cancelled() {
        let (addr, peer) = silent_peer().await;
        let limit = Some(Duration::from_secs(60));
        let mut conn = ServerConnection::open(addr, limit).await.unwrap();

        let exchange = async {
            let mut lifted = conn.lift_read_timeout();
            assert_eq!(lifted.read_timeout(), None);
            lifted.send(RequestHeader::new(Opcode::Wait, 0), None).await?;
            lifted.recv_status().await
        };
        let result = tokio::time::timeout(Duration::from_millis(50), exchange).await;
        assert!(result.is_err());

        assert_eq!(conn.read_timeout(), limit);
        peer.abort();
    }

    #[tokio::test]
    async fn test_abandoned_exchange_breaks_connection() {
        let (addr, peer) = silent_peer().await;
        let mut conn = ServerConnection::open(addr, None).await.unwrap();

        let exchange = async {
            conn.send(RequestHeader::new(Opcode::Wait, 0), None).await?;
            conn.recv_status().await
        };
        assert!(tokio::time::timeout(Duration::from_millis(50), exchange).await.is_err());

        let next = conn.send(RequestHeader::new(Opcode::Update, 0), None).await;
        assert!(matches!(next, Err(ClientError::ConnectionLost(lost)) if lost == addr));
        assert!(conn.is_broken());
        peer.abort();
    }

    #[tokio::test]
    async fn test_completed_exchange_allows_next() {
        let (addr, peer) = silent_peer().await;
        let mut conn = ServerConnection::open(addr, None).await.unwrap();

        conn.send(RequestHeader::new(Opcode::Map, 0), None).await.unwrap();
        conn.complete();
        conn.send(RequestHeader::new(Opcode::Map, 1), None).await.unwrap();
        assert!(!conn.is_broken());
        peer.abort();
    }
}
