//! Client Configuration File
//!
//! Line-oriented `KEY=value` text:
//!
//! ```text
//! # block size in bytes
//! DIMBLOCK=128
//! Address=127.0.0.1
//! Port=5000
//! ID=0-255
//! Address=127.0.0.1
//! Port=5001
//! ID=256-511
//! ```
//!
//! Each `ID=<first>-<last>` line assigns that inclusive range to the most recently
//! declared `Address`/`Port` pair. Lines starting with `#` and blank lines are skipped.

use crate::memory::types::DEFAULT_BLOCK_SIZE;

use anyhow::Result;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::path::Path;

/// An inclusive block-ID range served by one endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockRange {
    pub first: u32,
    pub last: u32,
    pub endpoint: SocketAddr,
}

impl BlockRange {
    pub fn contains(&self, id: u32) -> bool {
        (self.first..=self.last).contains(&id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub block_size: usize,
    pub ranges: Vec<BlockRange>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            ranges: Vec::new(),
        }
    }
}

impl ClientConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Unable to read {}: {}", path.display(), e))?;
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> Result<Self> {
        let mut config = Self::default();
        let mut address: Option<Ipv4Addr> = None;
        let mut port: Option<u16> = None;

        for (index, raw) in text.lines().enumerate() {
            let line_no = index + 1;
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let (key, value) = line
                .split_once('=')
                .ok_or_else(|| anyhow::anyhow!("Line {}: expected KEY=value", line_no))?;
            let value = value.trim();

            match key.trim() {
                "DIMBLOCK" => {
                    let size: usize = value.parse().map_err(|e| {
                        anyhow::anyhow!("Line {}: invalid DIMBLOCK '{}': {}", line_no, value, e)
                    })?;
                    if size == 0 {
                        anyhow::bail!("Line {}: DIMBLOCK must be greater than zero", line_no);
                    }
                    config.block_size = size;
                }
                "Address" => {
                    address = Some(value.parse().map_err(|e| {
                        anyhow::anyhow!("Line {}: invalid Address '{}': {}", line_no, value, e)
                    })?);
                }
                "Port" => {
                    port = Some(value.parse().map_err(|e| {
                        anyhow::anyhow!("Line {}: invalid Port '{}': {}", line_no, value, e)
                    })?);
                }
                "ID" => {
                    let (Some(ip), Some(port)) = (address, port) else {
                        anyhow::bail!("Line {}: ID range before Address and Port", line_no);
                    };
                    let (first, last) = parse_range(value)
                        .ok_or_else(|| anyhow::anyhow!("Line {}: invalid ID range '{}'", line_no, value))?;
                    config.ranges.push(BlockRange {
                        first,
                        last,
                        endpoint: SocketAddr::V4(SocketAddrV4::new(ip, port)),
                    });
                }
                other => {
                    tracing::debug!("Ignoring unknown configuration key '{}' on line {}", other, line_no);
                }
            }
        }

        Ok(config)
    }

    /// Endpoint owning `id`. Later ranges take precedence over earlier ones.
    pub fn endpoint_for(&self, id: u32) -> Option<SocketAddr> {
        self.ranges
            .iter()
            .rev()
            .find(|range| range.contains(id))
            .map(|range| range.endpoint)
    }

    /// Distinct endpoints, in order of first appearance.
    pub fn endpoints(&self) -> Vec<SocketAddr> {
        let mut endpoints: Vec<SocketAddr> = Vec::new();
        for range in &self.ranges {
            if !endpoints.contains(&range.endpoint) {
                endpoints.push(range.endpoint);
            }
        }
        endpoints
    }
}

fn parse_range(value: &str) -> Option<(u32, u32)> {
    let (first, last) = value.split_once('-')?;
    let first: u32 = first.trim().parse().ok()?;
    let last: u32 = last.trim().parse().ok()?;
    (first <= last).then_some((first, last))
}
