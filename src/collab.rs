//! Collaborator contracts
//!
//! The core owns the transport and the dispatch state machine; everything else
//! is reached through these traits. The UI collaborator receives notifications
//! and never sees errors (absence of updates is the only failure signal). The
//! model service owns architecture, weights, and prediction; the core installs
//! into it but carries no model logic itself.

use crate::protocol::{Participation, WeightTensor};
use anyhow::{Context, Result};
use std::sync::Mutex;

/// Notification surface of the user interface.
///
/// Implementations must tolerate calls from listener tasks running in
/// parallel; the dispatchers hold their own state locks while notifying.
pub trait UiSink: Send + Sync {
    /// Display a formatted accuracy value.
    fn report_accuracy(&self, text: &str);

    /// Display a worker's participation status for the current round.
    fn report_participation(&self, status: Participation);

    /// Display the pre/post accuracy pair around a training round.
    fn report_training_accuracy(&self, pre: &str, post: &str);

    /// Display the type of the currently installed model.
    fn report_model_type(&self, name: &str);

    /// Enable the prediction control.
    fn enable_prediction(&self);

    /// Re-enable controls disabled while a request was outstanding.
    fn enable_controls(&self);

    /// Whether an input is already staged for prediction.
    fn input_staged(&self) -> bool {
        false
    }
}

/// Contract of the model/training service.
pub trait ModelService: Send + Sync {
    /// Install a model architecture from its JSON description.
    fn set_architecture(&self, description: &str) -> Result<()>;

    /// The currently installed architecture description, if any.
    fn architecture(&self) -> Option<String>;

    /// Install a trainable weight collection.
    fn set_weights(&self, weights: Vec<WeightTensor>) -> Result<()>;

    /// The currently installed weight collection.
    fn weights(&self) -> Vec<WeightTensor>;

    /// Predict a class label for a staged input.
    fn predict(&self, input: &[f32]) -> Result<String>;

    /// The declared type of the installed model, `-` when none is installed.
    fn model_type(&self) -> String;
}

/// UI sink for the headless controller binary: renders every notification as
/// a status line.
#[derive(Debug, Default)]
pub struct ConsoleUi;

impl ConsoleUi {
    pub fn new() -> Self {
        Self
    }
}

impl UiSink for ConsoleUi {
    fn report_accuracy(&self, text: &str) {
        println!("Accuracy: {}", text);
    }

    fn report_participation(&self, status: Participation) {
        println!("Server: {}", status.as_label());
    }

    fn report_training_accuracy(&self, pre: &str, post: &str) {
        println!("Pre train: {}  Post train: {}", pre, post);
    }

    fn report_model_type(&self, name: &str) {
        println!("Current model: {}", name);
    }

    fn enable_prediction(&self) {
        println!("Prediction enabled");
    }

    fn enable_controls(&self) {
        println!("Controls re-enabled");
    }
}

/// UI sink that records every notification in order.
///
/// Used by the test suite; also handy when embedding the session without a
/// real interface.
#[derive(Debug, Default)]
pub struct RecordingUi {
    events: Mutex<Vec<String>>,
    staged: bool,
}

impl RecordingUi {
    pub fn new() -> Self {
        Self::default()
    }

    /// A recording sink that reports a staged input.
    pub fn with_staged_input() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
            staged: true,
        }
    }

    /// The notifications received so far, in delivery order.
    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    fn record(&self, event: String) {
        self.events.lock().unwrap().push(event);
    }
}

impl UiSink for RecordingUi {
    fn report_accuracy(&self, text: &str) {
        self.record(format!("accuracy:{}", text));
    }

    fn report_participation(&self, status: Participation) {
        self.record(format!("participation:{}", status.as_label()));
    }

    fn report_training_accuracy(&self, pre: &str, post: &str) {
        self.record(format!("training:{}/{}", pre, post));
    }

    fn report_model_type(&self, name: &str) {
        self.record(format!("model:{}", name));
    }

    fn enable_prediction(&self) {
        self.record("enable-prediction".to_string());
    }

    fn enable_controls(&self) {
        self.record("enable-controls".to_string());
    }

    fn input_staged(&self) -> bool {
        self.staged
    }
}

#[derive(Debug, Default)]
struct StubModelInner {
    architecture: Option<String>,
    model_type: Option<String>,
    weights: Vec<WeightTensor>,
}

/// In-memory model service.
///
/// Holds whatever the dispatchers install and predicts by arg-max over the
/// staged input. Stands in for a real training service in the binary and the
/// tests; it validates the architecture description and extracts the declared
/// `model_type` field from it.
#[derive(Debug, Default)]
pub struct StubModel {
    inner: Mutex<StubModelInner>,
}

impl StubModel {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ModelService for StubModel {
    fn set_architecture(&self, description: &str) -> Result<()> {
        let parsed: serde_json::Value =
            serde_json::from_str(description).context("architecture description is not valid JSON")?;
        let model_type = parsed
            .get("model_type")
            .and_then(|v| v.as_str())
            .map(str::to_string);

        let mut inner = self.inner.lock().unwrap();
        inner.model_type = model_type;
        inner.architecture = Some(description.to_string());
        Ok(())
    }

    fn architecture(&self) -> Option<String> {
        self.inner.lock().unwrap().architecture.clone()
    }

    fn set_weights(&self, weights: Vec<WeightTensor>) -> Result<()> {
        self.inner.lock().unwrap().weights = weights;
        Ok(())
    }

    fn weights(&self) -> Vec<WeightTensor> {
        self.inner.lock().unwrap().weights.clone()
    }

    fn predict(&self, input: &[f32]) -> Result<String> {
        let inner = self.inner.lock().unwrap();
        anyhow::ensure!(!inner.weights.is_empty(), "no model loaded");
        anyhow::ensure!(!input.is_empty(), "empty prediction input");

        let (label, _) = input
            .iter()
            .enumerate()
            .fold((0, f32::MIN), |best, (i, &v)| {
                if v > best.1 {
                    (i, v)
                } else {
                    best
                }
            });
        Ok(format!("class-{}", label))
    }

    fn model_type(&self) -> String {
        self.inner
            .lock()
            .unwrap()
            .model_type
            .clone()
            .unwrap_or_else(|| "-".to_string())
    }
}
