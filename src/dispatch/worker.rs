//! Worker-link command handlers
//!
//! Each worker peer connection carries one of these dispatchers. It holds the
//! worker's last reported accuracy and participation status and forwards both
//! to the UI collaborator.

use super::{format_accuracy, Dispatch};
use crate::collab::UiSink;
use crate::protocol::{AccuracyReport, Message, Participation};
use anyhow::Result;
use std::sync::{Arc, Mutex};

#[derive(Debug, Default)]
struct WorkerLinkState {
    accuracy: Option<f64>,
    participation: Participation,
}

/// Dispatcher for a link to one worker process.
pub struct WorkerDispatcher {
    ui: Arc<dyn UiSink>,
    state: Mutex<WorkerLinkState>,
}

impl WorkerDispatcher {
    pub fn new(ui: Arc<dyn UiSink>) -> Self {
        Self {
            ui,
            state: Mutex::new(WorkerLinkState::default()),
        }
    }

    /// Last accuracy this worker reported, if any.
    pub fn accuracy(&self) -> Option<f64> {
        self.state.lock().unwrap().accuracy
    }

    /// Participation status for the current round.
    pub fn participation(&self) -> Participation {
        self.state.lock().unwrap().participation
    }
}

impl Dispatch for WorkerDispatcher {
    fn dispatch(&self, msg: Message) -> Result<Option<Message>> {
        let mut state = self.state.lock().unwrap();
        match msg {
            Message::PostAccuracy(AccuracyReport::Current(value)) => {
                state.accuracy = Some(value);
                self.ui.report_accuracy(&format_accuracy(value));
            }
            Message::IsParticipant(status) => {
                state.participation = status;
                self.ui.report_participation(status);
            }
            _ => {}
        }
        Ok(None)
    }
}
