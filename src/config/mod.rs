//! Configuration Module
//!
//! - **`server`**: Positional arguments of the server binary plus `DISTMEM_*` environment overrides.
//! - **`client`**: The line-oriented file that tells a client which server owns which block IDs.

pub mod client;
pub mod server;

#[cfg(test)]
mod tests;
