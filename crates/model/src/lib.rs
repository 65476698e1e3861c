//! An abstraction layer for chat completion providers.
//!
//! This crate establishes an unified protocol for the relay to talk to
//! any supported LLM provider, so that the orchestration logic can be
//! written once and tested against fake providers.
//!
//! Types in this crate don't define any behavior, instead they are the
//! constraints that the implementors should adhere to.

#![deny(missing_docs)]

mod error;
mod provider;
mod request;
mod response;

pub use error::*;
pub use provider::*;
pub use request::*;
pub use response::*;
