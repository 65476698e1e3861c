use std::pin::Pin;
use std::task::{self, Poll};

use serde::{Deserialize, Serialize};

use crate::provider::ModelProviderError;
use crate::request::ToolCallRequest;

/// A streaming response from the model provider.
pub trait ModelStream: Sized + Send + 'static {
    /// The error type that may be returned by the provider.
    type Error: ModelProviderError;

    /// Attempts to pull out the next event from the response.
    ///
    /// # Return value
    ///
    /// There are several possible return values, each indicating a
    /// distinct response state:
    ///
    /// - `Poll::Pending` means that this response is still waiting for
    ///   the next event. Implementations will ensure that the current
    ///   task will be notified when the next event may be ready.
    /// - `Poll::Ready(Ok(Some(event)))` means the response has an event
    ///   to deliver, and may produce further events on subsequent
    ///   `poll_next_event` calls.
    /// - `Poll::Ready(Ok(None))` means the response has completed.
    /// - `Poll::Ready(Err(error))` means an error occurred while
    ///   processing the response.
    ///
    /// Calling this method after completion or an error should always
    /// return `None`.
    fn poll_next_event(
        self: Pin<&mut Self>,
        cx: &mut task::Context<'_>,
    ) -> Poll<Result<Option<ModelResponseEvent>, Self::Error>>;
}

/// The reason why a model response has finished.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModelFinishReason {
    /// The model needs to call a tool.
    ToolCalls,
    /// The model has finished generating text.
    Stop,
}

/// A fragment of a tool call request in a streaming response.
///
/// Every field except `index` may be absent. Usually `id` and `name`
/// arrive once with the first fragment of an index, while `arguments`
/// is spread over many fragments.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ToolCallDelta {
    /// Position of the call in a parallel tool call batch.
    pub index: u32,
    /// The call identifier fragment.
    pub id: Option<String>,
    /// The function name fragment.
    pub name: Option<String>,
    /// The arguments fragment.
    pub arguments: Option<String>,
}

/// The event from a streaming model response.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModelResponseEvent {
    /// The response has been completed.
    Completed(ModelFinishReason),
    /// Received a message delta.
    MessageDelta(String),
    /// Received a fragment of a tool call request.
    ToolCallDelta(ToolCallDelta),
}

/// A fully materialized response from a non-streaming request.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct ModelCompletion {
    /// The text content of the assistant message.
    pub content: Option<String>,
    /// Tool calls requested by the model, in index order.
    pub tool_calls: Vec<ToolCallRequest>,
    /// The reason the model finished generating.
    pub finish_reason: Option<ModelFinishReason>,
}
