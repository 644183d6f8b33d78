//! Orchestrator-link command handlers
//!
//! The link to the aggregation service carries this dispatcher. It installs
//! model structure and weights into the model service, tracks the pre/post
//! training accuracies, and drives the structure-then-weights download: a
//! `GetStructure` reply is answered with an autonomous `GetWeights` request on
//! the same link, with no further UI action.

use super::{format_accuracy, Dispatch};
use crate::collab::{ModelService, UiSink};
use crate::protocol::{AccuracyReport, LoadModel, Message};
use anyhow::{Context, Result};
use std::sync::{Arc, Mutex};

#[derive(Debug, Default)]
struct TrainingState {
    pre_accuracy: Option<f64>,
    post_accuracy: Option<f64>,
    model_accuracy: Option<f64>,
}

/// Dispatcher for the link to the aggregation service.
pub struct OrchestratorDispatcher {
    ui: Arc<dyn UiSink>,
    model: Arc<dyn ModelService>,
    state: Mutex<TrainingState>,
}

impl OrchestratorDispatcher {
    pub fn new(ui: Arc<dyn UiSink>, model: Arc<dyn ModelService>) -> Self {
        Self {
            ui,
            model,
            state: Mutex::new(TrainingState::default()),
        }
    }

    /// Accuracy pair from the last completed training round.
    pub fn training_accuracy(&self) -> (Option<f64>, Option<f64>) {
        let state = self.state.lock().unwrap();
        (state.pre_accuracy, state.post_accuracy)
    }

    /// Accuracy reported with the last downloaded weight collection.
    pub fn model_accuracy(&self) -> Option<f64> {
        self.state.lock().unwrap().model_accuracy
    }
}

impl Dispatch for OrchestratorDispatcher {
    fn dispatch(&self, msg: Message) -> Result<Option<Message>> {
        let mut state = self.state.lock().unwrap();
        match msg {
            Message::PostAccuracy(AccuracyReport::PrePost { pre, post }) => {
                state.pre_accuracy = Some(pre);
                state.post_accuracy = Some(post);
                self.ui
                    .report_training_accuracy(&format_accuracy(pre), &format_accuracy(post));
                self.ui.enable_controls();
            }
            Message::LoadModel(LoadModel::Ack(_)) => {
                // acknowledgment only
            }
            Message::GetStructure(Some(description)) => {
                self.model
                    .set_architecture(&description)
                    .context("failed to install architecture")?;
                self.ui.report_model_type(&self.model.model_type());
                // Fetch the weights for the structure that just arrived.
                return Ok(Some(Message::GetWeights(None)));
            }
            Message::GetWeights(Some(update)) => {
                state.model_accuracy = Some(update.accuracy);
                self.model
                    .set_weights(update.weights)
                    .context("failed to install weights")?;
                self.ui.report_accuracy(&format_accuracy(update.accuracy));
                if self.ui.input_staged() {
                    self.ui.enable_prediction();
                }
            }
            _ => {}
        }
        Ok(None)
    }
}
