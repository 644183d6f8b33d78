//! Control-plane protocol
//!
//! This module defines the messages exchanged between the orchestrator and its
//! peers (worker processes and the aggregation service). The wire format uses
//! MessagePack (rmp-serde) for binary serialization with a zlib layer on top;
//! see [`codec`] for the framing rules.
//!
//! # Message Flow
//!
//! ```text
//! Orchestrator                    Worker
//!     |                              |
//!     |------ RETRAIN_MODEL -------->|
//!     |                              |
//!     |<--- IS_PARTICIPANT(status) --|
//!     |<--- POST_ACCURACY(value) ----|
//!     |                              |
//!     |------ GET_ACCURACY --------->|
//!     |<--- POST_ACCURACY(value) ----|
//!
//! Orchestrator                    Aggregation service
//!     |                              |
//!     |------ LOAD_MODEL(net) ------>|
//!     |<----- LOAD_MODEL(ack) -------|
//!     |<- POST_ACCURACY(pre, post) --|
//!     |                              |
//!     |------ GET_STRUCTURE -------->|
//!     |<----- GET_STRUCTURE(arch) ---|
//!     |------ GET_WEIGHTS ---------->|
//!     |<-- GET_WEIGHTS(weights, acc)-|
//! ```
//!
//! There are no correlation identifiers: a response is matched to the most
//! recent outstanding request purely by command code and temporal order, so
//! callers must treat each exchange as synchronous on its own link.

use serde::{Deserialize, Serialize};

pub mod codec;

/// Protocol verbs exchanged between orchestrator and peers.
///
/// This is a closed set; every [`Message`] variant maps to exactly one code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CommandCode {
    PostAccuracy,
    IsParticipant,
    LoadModel,
    GetStructure,
    GetWeights,
    RetrainModel,
    GetAccuracy,
}

/// Participation status reported by a worker for the current round.
///
/// The original wire protocol used a boolean with a `-` sentinel; the three
/// states are modeled explicitly here.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Participation {
    Accepted,
    Refused,
    #[default]
    Unknown,
}

impl Participation {
    /// UI-facing label: `accepted`, `refused`, or `-`.
    pub fn as_label(&self) -> &'static str {
        match self {
            Participation::Accepted => "accepted",
            Participation::Refused => "refused",
            Participation::Unknown => "-",
        }
    }
}

/// Accuracy payload shapes for `PostAccuracy`.
///
/// Worker links report a single current value; the aggregation service reports
/// the pre/post pair around a training round.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum AccuracyReport {
    Current(f64),
    PrePost { pre: f64, post: f64 },
}

/// Payload shapes for `LoadModel`: the request names a network type, the
/// acknowledgment carries the load result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LoadModel {
    Request(String),
    Ack(bool),
}

/// One trainable tensor in a weight collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightTensor {
    pub shape: Vec<usize>,
    pub values: Vec<f32>,
}

/// Weight collection plus the accuracy measured with it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightUpdate {
    pub weights: Vec<WeightTensor>,
    pub accuracy: f64,
}

/// Protocol message: one variant per command code with its exact payload type.
///
/// For `GetStructure` and `GetWeights` a `None` payload is the request and a
/// `Some` payload is the response; payload-less codes are valid requests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Message {
    PostAccuracy(AccuracyReport),
    IsParticipant(Participation),
    LoadModel(LoadModel),
    GetStructure(Option<String>),
    GetWeights(Option<WeightUpdate>),
    RetrainModel,
    GetAccuracy,
}

impl Message {
    /// The command code this message carries.
    pub fn code(&self) -> CommandCode {
        match self {
            Message::PostAccuracy(_) => CommandCode::PostAccuracy,
            Message::IsParticipant(_) => CommandCode::IsParticipant,
            Message::LoadModel(_) => CommandCode::LoadModel,
            Message::GetStructure(_) => CommandCode::GetStructure,
            Message::GetWeights(_) => CommandCode::GetWeights,
            Message::RetrainModel => CommandCode::RetrainModel,
            Message::GetAccuracy => CommandCode::GetAccuracy,
        }
    }
}
