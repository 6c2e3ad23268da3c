//! Property Exchange protocol engine
//!
//! The stateful half of the crate: per-key chunk reassembly, the
//! pending-request table, and the request/reply/notify dispatch machine
//! tying them to the codec layers.

mod config;
#[allow(clippy::module_inception)]
mod engine;
mod pending;
mod reassembly;

pub use config::EngineConfig;
pub use engine::{PeEngine, PeNotification, PeReply};
pub use pending::{Completion, RequestError};
pub use reassembly::{ChunkFault, SourceId, StreamKey};
