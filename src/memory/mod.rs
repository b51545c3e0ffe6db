//! Distributed Memory Module
//!
//! Server-side home of the block coherence protocol.
//!
//! ## Core Concepts
//! - **Block**: A fixed-size buffer plus a version counter. Each mapped client records the
//!   last version it observed; equal means its copy is current, lower means stale.
//! - **Write**: The only operation that advances a version. It is rejected for stale clients
//!   and wakes every task suspended in `wait` on that block.
//! - **Locking**: One mutex and one wake-all signal per block, so unrelated blocks never
//!   contend with each other.
//! - **BlockStore**: Owns the contiguous ID range served by this process and routes each
//!   operation to its block; `clean_client` drops a departing client from every block.

pub mod block;
pub mod store;
pub mod types;

#[cfg(test)]
mod tests;
