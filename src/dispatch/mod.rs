//! Command dispatch
//!
//! Maps an inbound command code to a side-effecting handler. Both link roles
//! share the same command-code space but react to different subsets:
//!
//! | Role              | Handles                                              |
//! |-------------------|------------------------------------------------------|
//! | Worker link       | `PostAccuracy(Current)`, `IsParticipant`             |
//! | Orchestrator link | `PostAccuracy(PrePost)`, `LoadModel(Ack)`, `GetStructure`, `GetWeights` |
//!
//! Codes outside a role's table are ignored, matching the source dispatcher.
//! All dispatcher state is guarded by a mutex scoped around the dispatch
//! block; listener tasks and the caller thread may touch it concurrently.

use crate::protocol::Message;
use anyhow::Result;

pub mod orchestrator;
pub mod worker;

pub use orchestrator::OrchestratorDispatcher;
pub use worker::WorkerDispatcher;

/// A role-specific command dispatcher.
pub trait Dispatch: Send + Sync + 'static {
    /// Handle one inbound message.
    ///
    /// A handler may return a follow-up request; the listener loop issues it
    /// on the same link immediately after the handler returns.
    fn dispatch(&self, msg: Message) -> Result<Option<Message>>;
}

/// Fixed-width accuracy formatting for UI labels, e.g. `0.8734 -> "0.873"`.
pub fn format_accuracy(value: f64) -> String {
    let mut text = value.to_string();
    text.truncate(5);
    text
}
