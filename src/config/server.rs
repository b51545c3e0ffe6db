use crate::memory::types::DEFAULT_BLOCK_SIZE;

use anyhow::Result;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;
use tracing::Level;

pub const ENV_BIND: &str = "DISTMEM_BIND";
pub const ENV_BLOCK_SIZE: &str = "DISTMEM_BLOCK_SIZE";
pub const ENV_STATS_INTERVAL: &str = "DISTMEM_STATS_INTERVAL_SECS";
pub const ENV_LOG: &str = "DISTMEM_LOG";

const DEFAULT_STATS_INTERVAL: Duration = Duration::from_secs(30);

/// Startup parameters of one block server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub port: u16,
    pub first_id: u32,
    pub last_id: u32,
    pub bind_ip: IpAddr,
    pub block_size: usize,
    /// `None` disables the periodic stats log.
    pub stats_interval: Option<Duration>,
    pub log_level: Level,
}

impl ServerConfig {
    /// Parses `<program> <port> <first_id> <last_id>`.
    pub fn from_args(args: &[String]) -> Result<Self> {
        if args.len() != 4 {
            anyhow::bail!("Bad arguments: expected 3, got {}", args.len().saturating_sub(1));
        }

        let port: u16 = args[1]
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid port '{}': {}", args[1], e))?;
        let first_id: u32 = args[2]
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid first block id '{}': {}", args[2], e))?;
        let last_id: u32 = args[3]
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid last block id '{}': {}", args[3], e))?;

        if first_id > last_id {
            anyhow::bail!("First block id {} exceeds last block id {}", first_id, last_id);
        }

        Ok(Self {
            port,
            first_id,
            last_id,
            bind_ip: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            block_size: DEFAULT_BLOCK_SIZE,
            stats_interval: Some(DEFAULT_STATS_INTERVAL),
            log_level: Level::INFO,
        })
    }

    /// Applies `DISTMEM_*` overrides. `lookup` is usually `std::env::var(..).ok()`.
    pub fn with_env<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup(ENV_BIND) {
            self.bind_ip = value
                .trim()
                .parse()
                .map_err(|e| anyhow::anyhow!("Invalid {} '{}': {}", ENV_BIND, value, e))?;
        }

        if let Some(value) = lookup(ENV_BLOCK_SIZE) {
            let size: usize = value
                .trim()
                .parse()
                .map_err(|e| anyhow::anyhow!("Invalid {} '{}': {}", ENV_BLOCK_SIZE, value, e))?;
            if size == 0 {
                anyhow::bail!("{} must be greater than zero", ENV_BLOCK_SIZE);
            }
            self.block_size = size;
        }

        if let Some(value) = lookup(ENV_STATS_INTERVAL) {
            let secs: u64 = value.trim().parse().map_err(|e| {
                anyhow::anyhow!("Invalid {} '{}': {}", ENV_STATS_INTERVAL, value, e)
            })?;
            self.stats_interval = (secs > 0).then(|| Duration::from_secs(secs));
        }

        if let Some(value) = lookup(ENV_LOG) {
            self.log_level = value
                .trim()
                .parse()
                .map_err(|_| anyhow::anyhow!("Invalid {} '{}'", ENV_LOG, value))?;
        }

        Ok(self)
    }

    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_ip, self.port)
    }
}
