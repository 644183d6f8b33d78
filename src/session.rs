//! Orchestrator session
//!
//! Wires the configured peer links together: the ordered worker registry and
//! the single link to the aggregation service. Every connection is created
//! once at startup, connects synchronously, and lives until process exit.
//! The UI collaborator triggers the outbound operations exposed here.

use crate::collab::{ModelService, UiSink};
use crate::config::Config;
use crate::dispatch::OrchestratorDispatcher;
use crate::peer::{ConnectionRegistry, PeerConnection};
use crate::protocol::{LoadModel, Message, Participation};
use anyhow::{Context, Result};
use std::sync::Arc;

/// One federated-learning session from the orchestrator's point of view.
pub struct Session {
    registry: ConnectionRegistry,
    service: Arc<PeerConnection<OrchestratorDispatcher>>,
    ui: Arc<dyn UiSink>,
}

impl Session {
    /// Build the worker links and the aggregation-service link from config.
    /// Nothing connects yet; call [`connect_all`](Self::connect_all).
    pub fn new(config: &Config, ui: Arc<dyn UiSink>, model: Arc<dyn ModelService>) -> Self {
        let registry = ConnectionRegistry::new(
            &config.host,
            config.base_port,
            config.workers,
            config.chunk_size,
            &ui,
        );
        let dispatcher = Arc::new(OrchestratorDispatcher::new(ui.clone(), model));
        let service = Arc::new(
            PeerConnection::new(
                "aggregation-service",
                &config.host,
                config.server_port,
                config.server_port + 1,
                dispatcher,
            )
            .with_chunk_size(config.chunk_size),
        );

        Self {
            registry,
            service,
            ui,
        }
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    pub fn service(&self) -> &Arc<PeerConnection<OrchestratorDispatcher>> {
        &self.service
    }

    /// Connect every worker link, then the aggregation-service link.
    pub async fn connect_all(&self) -> Result<()> {
        self.registry.connect_all().await?;
        self.service.connect().await?;
        Ok(())
    }

    /// Reset the displayed worker status and fan a retrain request out to
    /// every worker.
    pub async fn retrain_all(&self) -> Result<()> {
        self.ui.report_participation(Participation::Unknown);
        self.ui.report_accuracy("-");
        self.registry.broadcast(&Message::RetrainModel).await
    }

    /// Ask the aggregation service to install the named network type.
    pub async fn load_model(&self, network_type: &str) -> Result<()> {
        self.service
            .send(&Message::LoadModel(LoadModel::Request(
                network_type.to_string(),
            )))
            .await
    }

    /// Request the current accuracy of one worker by index.
    pub async fn request_accuracy(&self, index: usize) -> Result<()> {
        let peer = self
            .registry
            .get(index)
            .with_context(|| format!("no worker at index {}", index))?;
        peer.send(&Message::GetAccuracy).await
    }

    /// Ask the aggregation service for the current model structure. The
    /// dispatcher follows up with a weights request on its own once the
    /// structure arrives.
    pub async fn download_model(&self) -> Result<()> {
        self.service.send(&Message::GetStructure(None)).await
    }
}
