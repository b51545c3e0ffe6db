use crate::memory::types::ClientId;

use dashmap::DashMap;
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};

/// Server-wide counters and the registry of live sessions.
///
/// Shared by the listener and every connection task.
#[derive(Default)]
pub struct ServerStats {
    connections_accepted: AtomicU64,
    connections_closed: AtomicU64,
    requests_handled: AtomicU64,
    protocol_errors: AtomicU64,
    sessions: DashMap<ClientId, SocketAddr>,
}

/// Serializable copy of the counters, logged periodically by the binary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub connections_accepted: u64,
    pub connections_closed: u64,
    pub active_sessions: usize,
    pub requests_handled: u64,
    pub protocol_errors: u64,
}

impl ServerStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connection_opened(&self, client: ClientId, peer: SocketAddr) {
        self.connections_accepted.fetch_add(1, Ordering::Relaxed);
        self.sessions.insert(client, peer);
    }

    pub fn connection_closed(&self, client: ClientId) {
        self.connections_closed.fetch_add(1, Ordering::Relaxed);
        self.sessions.remove(&client);
    }

    pub fn record_request(&self) {
        self.requests_handled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_protocol_error(&self) {
        self.protocol_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn is_active(&self, client: ClientId) -> bool {
        self.sessions.contains_key(&client)
    }

    pub fn active_sessions(&self) -> Vec<(ClientId, SocketAddr)> {
        let mut sessions: Vec<(ClientId, SocketAddr)> = self
            .sessions
            .iter()
            .map(|entry| (*entry.key(), *entry.value()))
            .collect();
        sessions.sort_by_key(|(client, _)| *client);
        sessions
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            connections_accepted: self.connections_accepted.load(Ordering::Relaxed),
            connections_closed: self.connections_closed.load(Ordering::Relaxed),
            active_sessions: self.sessions.len(),
            requests_handled: self.requests_handled.load(Ordering::Relaxed),
            protocol_errors: self.protocol_errors.load(Ordering::Relaxed),
        }
    }
}
