use coach_relay_model::{ErrorKind, ToolCallDelta};
use serde::{Deserialize, Serialize};

/// The events in a preset response.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum PresetEvent {
    #[serde(rename = "message_delta")]
    MessageDelta(String),
    #[serde(rename = "tool_call_delta")]
    ToolCallDelta(ToolCallDelta),
}

impl PresetEvent {
    /// A complete tool call packed into a single delta.
    #[inline]
    pub fn tool_call(index: u32, id: &str, name: &str, arguments: &str) -> Self {
        Self::ToolCallDelta(ToolCallDelta {
            index,
            id: Some(id.to_owned()),
            name: Some(name.to_owned()),
            arguments: Some(arguments.to_owned()),
        })
    }

    /// An arguments-only continuation of the call at `index`.
    #[inline]
    pub fn arguments(index: u32, fragment: &str) -> Self {
        Self::ToolCallDelta(ToolCallDelta {
            index,
            arguments: Some(fragment.to_owned()),
            ..Default::default()
        })
    }
}

/// Failure modes a preset response can simulate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PresetFailure {
    /// The request is rejected before any event is produced.
    Rejected,
    /// The stream breaks after all preset events were produced.
    Interrupted,
}

/// The preset response for one request.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PresetResponse {
    /// Events in this response.
    pub events: Vec<PresetEvent>,
    /// If set, the response fails instead of completing normally.
    pub failure: Option<PresetFailure>,
}

impl PresetResponse {
    /// Creates a `PresetResponse` with the specified events.
    #[inline]
    pub fn with_events(events: impl Into<Vec<PresetEvent>>) -> Self {
        Self {
            events: events.into(),
            failure: None,
        }
    }

    /// Makes the response fail in the given way.
    #[inline]
    pub fn with_failure(mut self, failure: PresetFailure) -> Self {
        self.failure = Some(failure);
        self
    }

    pub(crate) fn error_kind(&self) -> ErrorKind {
        match self.failure {
            Some(PresetFailure::Rejected) => ErrorKind::Authentication,
            _ => ErrorKind::Network,
        }
    }
}
