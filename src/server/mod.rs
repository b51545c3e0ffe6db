//! Block Server Module
//!
//! The concurrent front end of the block store.
//!
//! ## Execution Model
//! - **Listener**: Accepts TCP connections and spawns one task per connection, each holding a
//!   handle to the single shared `BlockStore`.
//! - **ConnectionHandler**: Decodes one request at a time, applies it to the store and writes
//!   the reply, until the peer leaves or breaks the protocol.
//! - **Cleanup**: However the loop ends, the handler drops every mapping its client still holds.
//!
//! A `WAIT` parks only the connection's own task (it does not occupy a runtime worker), so a
//! large number of idle waiters is cheap.

pub mod connection;
pub mod listener;
pub mod types;
