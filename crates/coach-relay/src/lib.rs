//! An HTTP relay in front of a chat-completions provider.
//!
//! The crate serves a chat endpoint that builds a short conversation from
//! the request, relays it to the provider, and answers with either the
//! whole reply or a plain-text stream of it. Non-streaming replies may go
//! through one round of local tool calls before the final answer.
//!
//! The `coach-relay` binary wires everything up from [`Settings`]. The
//! library is usable on its own, which is how the tests drive the router
//! with a scripted provider.

#![deny(missing_docs)]

#[macro_use]
extern crate tracing;

mod config;
mod routes;
pub mod tools;

pub use config::Settings;
pub use routes::{AppState, ClientFactory, OpenAIClientFactory, router};

/// Re-exports of [`coach_relay_core`] crate.
pub mod core {
    pub use coach_relay_core::*;
}
