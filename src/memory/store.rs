use super::block::Block;
use super::types::*;

use anyhow::Result;
use std::ops::RangeInclusive;
use std::time::Duration;

/// The blocks served by one server process.
///
/// Populated once at construction for the inclusive range `[first, last]` and never
/// resized. Shared by every connection handler behind an `Arc`.
pub struct BlockStore {
    first: u32,
    last: u32,
    block_size: usize,
    blocks: Vec<Block>,
}

impl BlockStore {
    pub fn new(first: u32, last: u32, block_size: usize) -> Result<Self> {
        if first > last {
            anyhow::bail!("Invalid block range {}-{}: first id exceeds last id", first, last);
        }
        if block_size == 0 {
            anyhow::bail!("Block size must be greater than zero");
        }

        let blocks: Vec<Block> = (first..=last).map(|_| Block::new(block_size)).collect();

        tracing::debug!(
            "Initialized {} blocks of {} bytes ({}-{})",
            blocks.len(),
            block_size,
            first,
            last
        );

        Ok(Self {
            first,
            last,
            block_size,
            blocks,
        })
    }

    pub fn range(&self) -> RangeInclusive<u32> {
        self.first..=self.last
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    pub fn owns(&self, id: u32) -> bool {
        self.range().contains(&id)
    }

    fn block(&self, id: u32) -> Result<&Block, BlockError> {
        if !self.owns(id) {
            return Err(BlockError::UnknownBlock(id));
        }
        self.blocks
            .get((id - self.first) as usize)
            .ok_or(BlockError::UnknownBlock(id))
    }

    pub fn map_client(&self, client: ClientId, id: u32) -> Result<Vec<u8>, BlockError> {
        self.block(id)?.map(client)
    }

    pub fn unmap_client(&self, client: ClientId, id: u32) -> Result<(), BlockError> {
        self.block(id)?.unmap(client)
    }

    pub fn write_block(&self, client: ClientId, id: u32, data: &[u8]) -> Result<(), BlockError> {
        self.block(id)?.write(client, data)
    }

    pub fn update_block(&self, client: ClientId, id: u32) -> Result<UpdateOutcome, BlockError> {
        self.block(id)?.update(client)
    }

    pub async fn wait_block(&self, client: ClientId, id: u32) -> Result<WaitOutcome, BlockError> {
        self.block(id)?.wait(client).await
    }

    pub async fn wait_block_timeout(
        &self,
        client: ClientId,
        id: u32,
        limit: Duration,
    ) -> Result<WaitOutcome, BlockError> {
        self.block(id)?.wait_timeout(client, limit).await
    }

    /// Removes `client` from every block. Returns how many mappings were dropped.
    pub fn clean_client(&self, client: ClientId) -> usize {
        self.blocks
            .iter()
            .filter(|block| block.clean(client))
            .count()
    }

    pub fn info(&self, id: u32) -> Option<BlockInfo> {
        let block = self.block(id).ok()?;
        Some(BlockInfo {
            id,
            version: block.version(),
            mapped_clients: block.mapped_clients(),
            waiters: block.waiters(),
        })
    }

    /// Number of (block, client) mappings currently held by `client`.
    pub fn mappings_of(&self, client: ClientId) -> usize {
        self.blocks
            .iter()
            .filter(|block| block.is_mapped(client))
            .count()
    }
}
