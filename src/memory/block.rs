//! Block Coherence State Machine
//!
//! Per (block, client) pair the state is one of:
//! - **Unmapped**: no entry in the client table.
//! - **Valid**: recorded version == block version.
//! - **Invalid**: recorded version < block version.
//!
//! Every operation runs under the block's own mutex, so operations on the same block are
//! strictly serialized and `write`s are linearizable. The mutex is never held across an
//! `.await`: `wait` registers itself with the wake signal while still holding the lock and
//! only then releases it, which closes the window between "checked version" and "parked".

use super::types::*;

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::Notify;

struct BlockState {
    data: Vec<u8>,
    /// Only ever increases.
    version: u64,
    /// Client -> last version that client observed. Keys are exactly the mapped clients.
    clients: HashMap<ClientId, u64>,
    /// Tasks currently parked in `wait`.
    waiters: usize,
}

pub struct Block {
    size: usize,
    state: Mutex<BlockState>,
    changed: Notify,
}

impl Block {
    /// Creates a zero-filled block at version 0.
    pub fn new(size: usize) -> Self {
        Self {
            size,
            state: Mutex::new(BlockState {
                data: vec![0u8; size],
                version: 0,
                clients: HashMap::new(),
                waiters: 0,
            }),
            changed: Notify::new(),
        }
    }

    // Every mutation leaves the state consistent before it can panic, so a
    // poisoned lock is still safe to use.
    fn state(&self) -> MutexGuard<'_, BlockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn version(&self) -> u64 {
        self.state().version
    }

    pub fn waiters(&self) -> usize {
        self.state().waiters
    }

    pub fn mapped_clients(&self) -> usize {
        self.state().clients.len()
    }

    pub fn is_mapped(&self, client: ClientId) -> bool {
        self.state().clients.contains_key(&client)
    }

    /// Maps the block for `client` and returns a copy of the current data.
    pub fn map(&self, client: ClientId) -> Result<Vec<u8>, BlockError> {
        let mut state = self.state();
        if state.clients.contains_key(&client) {
            return Err(BlockError::AlreadyMapped);
        }
        let version = state.version;
        state.clients.insert(client, version);
        Ok(state.data.clone())
    }

    pub fn unmap(&self, client: ClientId) -> Result<(), BlockError> {
        match self.state().clients.remove(&client) {
            Some(_) => Ok(()),
            None => Err(BlockError::NotMapped),
        }
    }

    /// Replaces the block contents and advances the version.
    ///
    /// Rejected with `Stale` unless the writer has seen the current version, so a
    /// concurrent writer's data is never silently overwritten.
    pub fn write(&self, client: ClientId, data: &[u8]) -> Result<(), BlockError> {
        if data.len() != self.size {
            return Err(BlockError::PayloadSize {
                expected: self.size,
                actual: data.len(),
            });
        }

        let mut state = self.state();
        let seen = *state.clients.get(&client).ok_or(BlockError::NotMapped)?;
        if seen != state.version {
            return Err(BlockError::Stale);
        }

        state.version += 1;
        let version = state.version;
        state.clients.insert(client, version);
        state.data.copy_from_slice(data);

        if state.waiters > 0 {
            // Every other mapped copy is now invalid.
            self.changed.notify_waiters();
        }
        Ok(())
    }

    pub fn update(&self, client: ClientId) -> Result<UpdateOutcome, BlockError> {
        let mut state = self.state();
        let seen = *state.clients.get(&client).ok_or(BlockError::NotMapped)?;
        if seen == state.version {
            return Ok(UpdateOutcome::UpToDate);
        }
        let version = state.version;
        state.clients.insert(client, version);
        Ok(UpdateOutcome::Refreshed(state.data.clone()))
    }

    /// Suspends until a write makes the client's copy stale.
    ///
    /// Returns immediately when the copy is already stale. There is no time limit.
    pub async fn wait(&self, client: ClientId) -> Result<WaitOutcome, BlockError> {
        self.wait_inner(client, None).await
    }

    /// Like `wait`, but gives up after `limit` with `WaitOutcome::TimedOut`.
    pub async fn wait_timeout(
        &self,
        client: ClientId,
        limit: Duration,
    ) -> Result<WaitOutcome, BlockError> {
        self.wait_inner(client, Some(limit)).await
    }

    async fn wait_inner(
        &self,
        client: ClientId,
        limit: Option<Duration>,
    ) -> Result<WaitOutcome, BlockError> {
        let notified = self.changed.notified();
        tokio::pin!(notified);

        {
            let mut state = self.state();
            let seen = *state.clients.get(&client).ok_or(BlockError::NotMapped)?;
            // A single check is enough: the version never goes back down.
            if seen != state.version {
                return Ok(WaitOutcome::Invalidated);
            }
            notified.as_mut().enable();
            state.waiters += 1;
        }

        // Deregisters on every exit path, including the future being dropped.
        let _registration = WaiterRegistration { block: self };

        match limit {
            None => {
                notified.await;
                Ok(WaitOutcome::Invalidated)
            }
            Some(limit) => match tokio::time::timeout(limit, notified).await {
                Ok(()) => Ok(WaitOutcome::Invalidated),
                Err(_) => Ok(WaitOutcome::TimedOut),
            },
        }
    }

    /// Drops the client's entry if present. Never fails.
    pub fn clean(&self, client: ClientId) -> bool {
        self.state().clients.remove(&client).is_some()
    }
}

struct WaiterRegistration<'a> {
    block: &'a Block,
}

impl Drop for WaiterRegistration<'_> {
    fn drop(&mut self) {
        let mut state = self.block.state();
        state.waiters = state.waiters.saturating_sub(1);
    }
}
