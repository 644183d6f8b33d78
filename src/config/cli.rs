//! CLI argument parsing using clap

use super::Config;
use clap::Parser;
use std::path::PathBuf;

/// FedLink - socket control plane for federated-learning sessions
#[derive(Parser, Debug)]
#[command(name = "fedlink")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// TOML configuration file
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,

    // === Topology overrides ===
    /// Host the peer sockets connect to
    #[arg(long)]
    pub host: Option<String>,

    /// Send port of the aggregation-service link
    #[arg(long)]
    pub server_port: Option<u16>,

    /// First port of the worker range
    #[arg(long)]
    pub base_port: Option<u16>,

    /// Number of worker peers
    #[arg(short = 'w', long)]
    pub workers: Option<usize>,

    // === Session actions ===
    /// Ask every worker to retrain once all peers are connected
    #[arg(long)]
    pub retrain: bool,

    /// Ask the aggregation service to load the named network type
    #[arg(long, value_name = "NET")]
    pub load_model: Option<String>,

    /// Download the current model structure and weights
    #[arg(long)]
    pub download: bool,

    /// Request the current accuracy of one worker by index
    #[arg(long, value_name = "INDEX")]
    pub get_accuracy: Option<usize>,
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Apply CLI overrides on top of the file or default configuration.
    pub fn apply(&self, config: &mut Config) {
        if let Some(host) = &self.host {
            config.host = host.clone();
        }
        if let Some(server_port) = self.server_port {
            config.server_port = server_port;
        }
        if let Some(base_port) = self.base_port {
            config.base_port = base_port;
        }
        if let Some(workers) = self.workers {
            config.workers = workers;
        }
    }
}
