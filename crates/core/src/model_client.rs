use std::pin::Pin;
use std::sync::Arc;
use std::task::{Poll, ready};

use coach_relay_model::{
    ModelCompletion, ModelFinishReason, ModelProvider, ModelProviderError,
    ModelRequest, ModelResponseEvent, ModelStream, ToolCallDelta,
};
use futures_util::stream::{self, Stream, StreamExt, TryStreamExt};
use tracing::Instrument;

use crate::Error;

type BoxedError = Box<dyn ModelProviderError>;
type BoxedFuture<T> =
    Pin<Box<dyn Future<Output = Result<T, BoxedError>> + Send>>;
type EventStream =
    Pin<Box<dyn Stream<Item = Result<ModelResponseEvent, BoxedError>> + Send>>;

/// A lazy stream of non-empty text fragments, in the order the provider
/// produced them.
///
/// Dropping the stream closes the underlying provider connection.
pub type TextStream = Pin<Box<dyn Stream<Item = Result<String, Error>> + Send>>;

trait ProviderObject: Send + Sync {
    fn complete(&self, req: &ModelRequest) -> BoxedFuture<ModelCompletion>;

    fn stream(&self, req: &ModelRequest) -> BoxedFuture<EventStream>;
}

struct ProviderObjectImpl<P>(P);

impl<P: ModelProvider + 'static> ProviderObject for ProviderObjectImpl<P> {
    fn complete(&self, req: &ModelRequest) -> BoxedFuture<ModelCompletion> {
        let fut = self.0.complete(req);
        Box::pin(async move {
            fut.await.map_err(|err| Box::new(err) as BoxedError)
        })
    }

    fn stream(&self, req: &ModelRequest) -> BoxedFuture<EventStream> {
        let fut = self.0.stream(req);
        Box::pin(async move {
            let resp = fut.await.map_err(|err| Box::new(err) as BoxedError)?;
            Ok(into_event_stream(resp))
        })
    }
}

fn into_event_stream<S: ModelStream>(resp: S) -> EventStream {
    let mut resp = Box::pin(resp);
    Box::pin(stream::poll_fn(move |cx| {
        let event = ready!(resp.as_mut().poll_next_event(cx));
        let event = event.map_err(|err| Box::new(err) as BoxedError);
        Poll::Ready(event.transpose())
    }))
}

/// A wrapper around a model provider that provides a type-erased interface
/// for the other modules.
///
/// Cloning is cheap, clones share the provider.
#[derive(Clone)]
pub struct ModelClient {
    provider: Arc<dyn ProviderObject>,
}

impl ModelClient {
    /// Creates a client for the provider.
    #[inline]
    pub fn new<P: ModelProvider + 'static>(provider: P) -> Self {
        // We have to erase the type `P`, since `ModelClient` doesn't have a
        // generic parameter and we don't want it either.
        Self {
            provider: Arc::new(ProviderObjectImpl(provider)),
        }
    }

    /// Sends a request and waits for the whole assistant message.
    pub async fn complete(
        &self,
        req: &ModelRequest,
    ) -> Result<ModelCompletion, Error> {
        trace!("sending a completion request: {req:?}");
        self.provider
            .complete(req)
            .instrument(trace_span!("model client complete"))
            .await
            .map_err(|err| {
                error!("completion request failed: {err}");
                Error::provider(err)
            })
    }

    /// Sends a streaming request and returns its text fragments.
    ///
    /// Resolves once the provider accepted the request. Empty fragments
    /// are skipped, other events are ignored.
    ///
    /// # Cancel safety
    ///
    /// Dropping the returned stream stops reading from the provider and
    /// releases the connection.
    pub async fn stream_text(
        &self,
        req: &ModelRequest,
    ) -> Result<TextStream, Error> {
        trace!("sending a streaming request: {req:?}");
        let events = self.open_stream(req).await?;
        let text = events
            .map_err(Error::provider)
            .try_filter_map(|event| {
                let fragment = match event {
                    ModelResponseEvent::MessageDelta(text) if !text.is_empty() => {
                        trace!("streaming chunk: {text:?}");
                        Some(text)
                    }
                    _ => None,
                };
                std::future::ready(Ok(fragment))
            });
        Ok(Box::pin(text))
    }

    /// Sends a streaming request and collects every event of it.
    ///
    /// Text deltas are concatenated, tool call deltas are kept in arrival
    /// order. Nothing is returned before the stream ends.
    pub async fn collect(
        &self,
        req: &ModelRequest,
    ) -> Result<CollectedResponse, Error> {
        trace!("sending a collecting request: {req:?}");
        let mut events = self.open_stream(req).await?;

        let mut collected = CollectedResponse::default();
        while let Some(event) = events.next().await {
            let event = event.map_err(|err| {
                error!("stream broke while collecting: {err}");
                Error::provider(err)
            })?;
            match event {
                ModelResponseEvent::MessageDelta(text) => {
                    collected.content.push_str(&text);
                }
                ModelResponseEvent::ToolCallDelta(delta) => {
                    collected.tool_call_deltas.push(delta);
                }
                ModelResponseEvent::Completed(reason) => {
                    collected.finish_reason = Some(reason);
                }
            }
        }
        trace!("collected a response: {collected:?}");
        Ok(collected)
    }

    async fn open_stream(
        &self,
        req: &ModelRequest,
    ) -> Result<EventStream, Error> {
        self.provider
            .stream(req)
            .instrument(trace_span!("model client stream"))
            .await
            .map_err(|err| {
                error!("streaming request failed: {err}");
                Error::provider(err)
            })
    }
}

/// A streamed response received completely.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CollectedResponse {
    /// The concatenated text deltas.
    pub content: String,
    /// Tool call deltas, in arrival order.
    pub tool_call_deltas: Vec<ToolCallDelta>,
    /// The reason the model finished generating, if reported.
    pub finish_reason: Option<ModelFinishReason>,
}
