//! Configuration module
//!
//! Handles CLI argument parsing, TOML configuration files, and validation.

pub mod cli;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Complete session configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Host every peer socket connects to
    #[serde(default = "default_host")]
    pub host: String,
    /// Send port of the aggregation-service link; its listen port is the
    /// next port up
    #[serde(default = "default_server_port")]
    pub server_port: u16,
    /// First port of the worker range; worker `i` listens on `base + 2i`
    /// and sends on `base + 2i + 1`
    #[serde(default = "default_base_port")]
    pub base_port: u16,
    /// Number of worker peers
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Network types the aggregation service can be asked to load
    #[serde(default)]
    pub nets: Vec<String>,
    /// Socket read chunk size in bytes
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_server_port() -> u16 {
    9000
}

fn default_base_port() -> u16 {
    9100
}

fn default_workers() -> usize {
    2
}

fn default_chunk_size() -> usize {
    1024
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            server_port: default_server_port(),
            base_port: default_base_port(),
            workers: default_workers(),
            nets: Vec::new(),
            chunk_size: default_chunk_size(),
        }
    }
}

impl Config {
    /// Parse a TOML configuration file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        Ok(config)
    }

    /// Validate the configuration before any socket is opened.
    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            bail!("At least one worker is required");
        }
        if self.chunk_size == 0 {
            bail!("Chunk size must be greater than zero");
        }

        // Span math in u64 so an absurd worker count is rejected rather than
        // wrapping or panicking.
        let worker_end = (self.workers as u64)
            .checked_mul(2)
            .and_then(|span| span.checked_add(self.base_port as u64))
            .filter(|&end| end <= u16::MAX as u64 + 1);
        let worker_end = match worker_end {
            Some(end) => end as u32,
            None => bail!(
                "Worker port range starting at {} for {} workers exceeds the maximum port number",
                self.base_port,
                self.workers
            ),
        };
        if self.server_port as u32 + 2 > u16::MAX as u32 + 1 {
            bail!(
                "Server port {} leaves no room for its listen port",
                self.server_port
            );
        }

        // The service pair must not collide with any worker pair.
        let server_range = self.server_port as u32..self.server_port as u32 + 2;
        let worker_range = self.base_port as u32..worker_end;
        if server_range.start < worker_range.end && worker_range.start < server_range.end {
            bail!(
                "Server ports {}-{} overlap the worker port range {}-{}",
                server_range.start,
                server_range.end - 1,
                worker_range.start,
                worker_range.end - 1
            );
        }

        Ok(())
    }
}
