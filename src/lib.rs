//! FedLink - socket control plane for federated-learning sessions
//!
//! FedLink connects an orchestrator to a set of training workers and to an
//! aggregation service over plain TCP, and keeps those links alive for the
//! lifetime of a session.
//!
//! # Architecture
//!
//! - **Framed codec**: MessagePack payloads, zlib-compressed, with a 4-byte
//!   length prefix
//! - **Peer links**: one send socket and one listen socket per peer, with an
//!   always-on listener loop that survives decode failures
//! - **Command dispatch**: per-link handler tables keyed by command code
//! - **Registry**: ordered worker links with deterministic port derivation

pub mod collab;
pub mod config;
pub mod dispatch;
pub mod peer;
pub mod protocol;
pub mod session;

// Re-export commonly used types
pub use config::Config;
pub use protocol::{CommandCode, Message};
pub use session::Session;

/// Result type used throughout FedLink
pub type Result<T> = anyhow::Result<T>;
