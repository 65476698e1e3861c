//! Core logic of the relay: conversation building, completion relaying
//! and tool call orchestration.

#![deny(missing_docs)]
#![deny(clippy::missing_safety_doc)]

#[macro_use]
extern crate tracing;

pub mod conversation;
mod error;
mod model_client;
mod orchestrator;
pub mod tool;

pub use conversation::{ChatRequest, Conversation};
pub use error::{Error, ErrorKind};
pub use model_client::{CollectedResponse, ModelClient, TextStream};
pub use orchestrator::Orchestrator;
