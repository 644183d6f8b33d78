//! FedLink CLI entry point

use anyhow::{Context, Result};
use fedlink::collab::{ConsoleUi, StubModel};
use fedlink::config::{cli::Cli, Config};
use fedlink::session::Session;
use std::sync::Arc;

fn main() -> Result<()> {
    println!("FedLink v{}", env!("CARGO_PKG_VERSION"));
    println!("Socket control plane for federated-learning sessions");
    println!();

    let cli = Cli::parse_args();

    let mut config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };
    cli.apply(&mut config);
    config
        .validate()
        .context("Configuration validation failed")?;

    if let Some(net) = &cli.load_model {
        if !config.nets.is_empty() && !config.nets.contains(net) {
            anyhow::bail!(
                "Unknown network type '{}' (configured: {})",
                net,
                config.nets.join(", ")
            );
        }
    }

    print_configuration(&config);
    println!();

    let runtime = tokio::runtime::Runtime::new().context("Failed to create tokio runtime")?;

    runtime.block_on(async {
        let ui = Arc::new(ConsoleUi::new());
        let session = Session::new(&config, ui, Arc::new(StubModel::new()));

        println!("Connecting to peers...");
        session
            .connect_all()
            .await
            .context("Failed to connect session")?;
        println!("All peers connected");
        println!();

        if cli.retrain {
            session.retrain_all().await.context("Retrain failed")?;
        }
        if let Some(net) = &cli.load_model {
            session
                .load_model(net)
                .await
                .with_context(|| format!("Failed to request model '{}'", net))?;
        }
        if cli.download {
            session
                .download_model()
                .await
                .context("Model download failed")?;
        }
        if let Some(index) = cli.get_accuracy {
            session
                .request_accuracy(index)
                .await
                .with_context(|| format!("Accuracy request for worker {} failed", index))?;
        }

        println!("Listening for peer updates (Ctrl-C to exit)");
        tokio::signal::ctrl_c()
            .await
            .context("Failed to listen for shutdown signal")?;
        println!();
        println!("Shutting down");
        Ok(())
    })
}

/// Print configuration summary
fn print_configuration(config: &Config) {
    println!("Configuration:");
    println!("  Host: {}", config.host);
    println!(
        "  Aggregation service: send {}, listen {}",
        config.server_port,
        config.server_port + 1
    );
    println!(
        "  Workers: {} (ports {}-{})",
        config.workers,
        config.base_port,
        last_worker_port(config)
    );
    println!("  Chunk size: {} bytes", config.chunk_size);
    if !config.nets.is_empty() {
        println!("  Network types: {}", config.nets.join(", "));
    }
}

/// Last port of the worker range. Wider arithmetic: a validated range may end
/// exactly at port 65535, where u16 math would wrap.
fn last_worker_port(config: &Config) -> u32 {
    config.base_port as u32 + 2 * config.workers as u32 - 1
}
