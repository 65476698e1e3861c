use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{Context, Poll, ready};

use coach_relay_model::{ErrorKind, ModelResponseEvent, ModelStream};
use pin_project_lite::pin_project;

use crate::Error;
use crate::io::{Sse, SseError};
use crate::proto::{self, ChatCompletionChunk};

struct PartialState {
    sse: Sse,
    id: Option<String>,
    // One chunk may carry several events (e.g. a content delta and a
    // finish reason), they are queued here and handed out one by one.
    pending_events: VecDeque<ModelResponseEvent>,
    done: bool,
}

type PinnedFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;
type NextEvent = Result<(Option<ModelResponseEvent>, PartialState), Error>;

pin_project! {
    pub struct OpenAIStream {
        next_event_fut: Option<PinnedFuture<NextEvent>>,
    }
}

impl OpenAIStream {
    #[inline]
    pub fn from_sse(sse: Sse) -> Self {
        let partial_state = PartialState {
            sse,
            id: None,
            pending_events: Default::default(),
            done: false,
        };
        let next_event_fut = async move { next_event(partial_state).await };
        Self {
            next_event_fut: Some(Box::pin(next_event_fut)),
        }
    }
}

impl ModelStream for OpenAIStream {
    type Error = crate::Error;

    fn poll_next_event(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Result<Option<ModelResponseEvent>, Self::Error>> {
        let this = self.project();
        let Some(next_event_fut) = this.next_event_fut else {
            return Poll::Ready(Ok(None));
        };
        let (event, partial_state) =
            match ready!(next_event_fut.as_mut().poll(cx)) {
                Ok((Some(event), partial_state)) => (event, partial_state),
                Ok((None, _)) => {
                    *this.next_event_fut = None;
                    return Poll::Ready(Ok(None));
                }
                Err(err) => {
                    *this.next_event_fut = None;
                    return Poll::Ready(Err(err));
                }
            };

        // The stream may still have more data to pull, create a new future for
        // the next event.
        let next_event_fut = async move { next_event(partial_state).await };
        *this.next_event_fut = Some(Box::pin(next_event_fut));

        Poll::Ready(Ok(Some(event)))
    }
}

async fn next_event(
    mut partial_state: PartialState,
) -> Result<(Option<ModelResponseEvent>, PartialState), Error> {
    while partial_state.pending_events.is_empty() && !partial_state.done {
        let sse_event = match partial_state.sse.next_event().await {
            Ok(Some(event)) => event,
            Ok(None) => {
                partial_state.done = true;
                break;
            }
            Err(SseError::InvalidPayload) => {
                return Err(Error::new(
                    "invalid event stream payload",
                    ErrorKind::InvalidResponse,
                ));
            }
            Err(SseError::ChunksError(err)) => {
                return Err(Error::new(
                    format!("event stream interrupted: {err:?}"),
                    ErrorKind::Network,
                ));
            }
        };
        trace!("got sse event: {sse_event}");
        if sse_event == "[DONE]" {
            partial_state.done = true;
            break;
        }

        let chunk = serde_json::from_str::<ChatCompletionChunk>(&sse_event)
            .map_err(|err| {
                Error::new(format!("{err}"), ErrorKind::InvalidResponse)
            })?;
        // Chunks without choices (usage reports, content filter preambles)
        // may carry another id or none at all, they are simply skipped.
        if chunk.choices.is_empty() {
            continue;
        }
        if partial_state.id.get_or_insert_with(|| chunk.id.clone()) != &chunk.id
        {
            return Err(Error::new(
                "chunk id mismatch",
                ErrorKind::InvalidResponse,
            ));
        };

        for choice in chunk.choices {
            let pending_events = &mut partial_state.pending_events;
            if let Some(content) = choice.delta.content {
                pending_events.push_back(ModelResponseEvent::MessageDelta(content));
            }
            for tool_call in choice.delta.tool_calls.into_iter().flatten() {
                pending_events.push_back(ModelResponseEvent::ToolCallDelta(
                    proto::into_tool_call_delta(tool_call),
                ));
            }
            if let Some(finish_reason) = choice.finish_reason {
                pending_events.push_back(ModelResponseEvent::Completed(
                    proto::finish_reason(&finish_reason),
                ));
            }
        }
    }

    let event = partial_state.pending_events.pop_front();
    Ok((event, partial_state))
}

#[cfg(test)]
mod tests {
    use std::future::poll_fn;
    use std::pin::pin;

    use bytes::Bytes;
    use coach_relay_model::{ModelFinishReason, ToolCallDelta};

    use super::*;
    use crate::io::Chunks;

    async fn collect_events(
        fixture: &'static [u8],
    ) -> Result<Vec<ModelResponseEvent>, Error> {
        let chunks =
            Chunks::from_vec_deque(vec![Bytes::from_static(fixture)].into());
        let mut stream = pin!(OpenAIStream::from_sse(Sse::new(chunks)));
        let mut events = vec![];
        while let Some(event) =
            poll_fn(|cx| stream.as_mut().poll_next_event(cx)).await?
        {
            events.push(event);
        }
        Ok(events)
    }

    #[tokio::test]
    async fn test_text_events() {
        let events =
            collect_events(include_bytes!("../fixtures/text_response.txt"))
                .await
                .unwrap();
        assert_eq!(
            events,
            vec![
                ModelResponseEvent::MessageDelta(String::new()),
                ModelResponseEvent::MessageDelta("Keep ".to_owned()),
                ModelResponseEvent::MessageDelta("going, ".to_owned()),
                ModelResponseEvent::MessageDelta("you've got this!".to_owned()),
                ModelResponseEvent::Completed(ModelFinishReason::Stop),
            ]
        );
    }

    #[tokio::test]
    async fn test_tool_call_events() {
        let events = collect_events(include_bytes!(
            "../fixtures/tool_call_response.txt"
        ))
        .await
        .unwrap();

        let deltas: Vec<ToolCallDelta> = events
            .iter()
            .filter_map(|event| match event {
                ModelResponseEvent::ToolCallDelta(delta) => Some(delta.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(deltas.len(), 6);
        assert_eq!(deltas[0].id.as_deref(), Some("call_aapl"));
        assert_eq!(deltas[0].name.as_deref(), Some("get_stock_details"));
        assert_eq!(deltas[3].index, 1);
        assert_eq!(deltas[3].id.as_deref(), Some("call_msft"));

        let args: String = deltas
            .iter()
            .filter(|delta| delta.index == 0)
            .filter_map(|delta| delta.arguments.as_deref())
            .collect();
        assert_eq!(args, r#"{"ticker":"AAPL"}"#);

        assert_eq!(
            events.last(),
            Some(&ModelResponseEvent::Completed(ModelFinishReason::ToolCalls))
        );
    }

    #[tokio::test]
    async fn test_invalid_chunk() {
        let err = collect_events(b"data: {\"oops\": true}\n\n")
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidResponse);

        let err = collect_events(concat!(
            "data: {\"id\":\"a\",\"choices\":[{\"delta\":{\"content\":\"x\"}}]}\n\n",
            "data: {\"id\":\"b\",\"choices\":[{\"delta\":{\"content\":\"y\"}}]}\n\n",
        ).as_bytes())
        .await
        .unwrap_err();
        assert_eq!(err.message(), "chunk id mismatch");
    }

    #[tokio::test]
    async fn test_chunks_without_choices() {
        let events = collect_events(concat!(
            "data: {\"id\":\"\",\"choices\":[],\"prompt_filter_results\":[]}\n\n",
            "data: {\"id\":\"a\",\"choices\":[{\"delta\":{\"content\":\"Hi\"},\"finish_reason\":\"stop\"}]}\n\n",
            "data: {\"id\":\"usage\",\"choices\":[]}\n\n",
            "data: [DONE]\n\n",
        ).as_bytes())
        .await
        .unwrap();
        assert_eq!(
            events,
            vec![
                ModelResponseEvent::MessageDelta("Hi".to_owned()),
                ModelResponseEvent::Completed(ModelFinishReason::Stop),
            ]
        );
    }
}
