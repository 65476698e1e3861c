//! A local fake model for testing purpose.

mod preset;

use std::collections::VecDeque;
use std::error::Error as StdError;
use std::fmt::{self, Debug, Display, Formatter};
use std::future::ready;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll, ready};
use std::time::Duration;

use coach_relay_model::{
    ErrorKind, ModelCompletion, ModelFinishReason, ModelProvider,
    ModelProviderError, ModelRequest, ModelResponseEvent, ModelStream,
    ToolCallRequest,
};
use tokio::time::{Sleep, sleep};

pub use preset::*;

#[derive(Debug)]
pub struct Error {
    message: &'static str,
    kind: ErrorKind,
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.message)
    }
}

impl StdError for Error {}

impl ModelProviderError for Error {
    #[inline]
    fn kind(&self) -> ErrorKind {
        self.kind
    }
}

/// How a request reached the provider.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RequestKind {
    Complete,
    Stream,
}

/// A request received by [`TestModelProvider`].
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct RecordedRequest {
    pub kind: RequestKind,
    pub request: ModelRequest,
}

pub struct TestModelStream {
    events: VecDeque<ModelResponseEvent>,
    interrupted: bool,
    finished: bool,
    delay: Duration,
    sleep: Option<Pin<Box<Sleep>>>,
    open_streams: Arc<AtomicUsize>,
}

impl Drop for TestModelStream {
    fn drop(&mut self) {
        self.open_streams.fetch_sub(1, Ordering::SeqCst);
    }
}

impl ModelStream for TestModelStream {
    type Error = crate::Error;

    fn poll_next_event(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Result<Option<ModelResponseEvent>, Self::Error>> {
        // SAFETY: This type does not require to be pinned.
        let this = unsafe { self.get_unchecked_mut() };
        if this.finished {
            return Poll::Ready(Ok(None));
        }

        if let Some(sleep) = &mut this.sleep {
            ready!(sleep.as_mut().poll(cx));
            this.sleep = None;

            if let Some(event) = this.events.pop_front() {
                return Poll::Ready(Ok(Some(event)));
            }
            this.finished = true;
            if this.interrupted {
                return Poll::Ready(Err(Error {
                    message: "stream interrupted",
                    kind: ErrorKind::Network,
                }));
            }
            return Poll::Ready(Ok(None));
        }
        this.sleep = Some(Box::pin(sleep(this.delay)));
        Pin::new(this).poll_next_event(cx)
    }
}

#[derive(Default)]
struct Script {
    responses: VecDeque<PresetResponse>,
    requests: Vec<RecordedRequest>,
}

/// A local fake model for testing purpose.
///
/// Before sending requests, you need to setup the script, which is how
/// the model should respond. Each request, streaming or not, consumes the
/// next preset response in order. If there are no enough responses in the
/// script, an error will be returned.
///
/// Clones share the script and the request log, so a test can keep one
/// handle for assertions while another one is handed to the code under
/// test.
///
/// # Note
///
/// This type is not optimized for production use, there are heavy memory
/// copies involved. You should only use it for testing.
#[derive(Clone, Default)]
pub struct TestModelProvider {
    script: Arc<Mutex<Script>>,
    open_streams: Arc<AtomicUsize>,
    delay: Option<Duration>,
}

impl TestModelProvider {
    #[inline]
    pub fn add_response(&mut self, preset: PresetResponse) {
        self.lock().responses.push_back(preset);
    }

    #[inline]
    pub fn set_delay(&mut self, duration: Duration) {
        self.delay = Some(duration);
    }

    /// Returns all requests received so far.
    #[inline]
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.lock().requests.clone()
    }

    /// Returns the number of streams handed out and not dropped yet.
    #[inline]
    pub fn open_streams(&self) -> usize {
        self.open_streams.load(Ordering::SeqCst)
    }

    fn lock(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn next_response(
        &self,
        kind: RequestKind,
        request: &ModelRequest,
    ) -> Result<PresetResponse, Error> {
        let mut script = self.lock();
        script.requests.push(RecordedRequest {
            kind,
            request: request.clone(),
        });
        let Some(preset) = script.responses.pop_front() else {
            return Err(Error {
                message: "no enough steps",
                kind: ErrorKind::RateLimitExceeded,
            });
        };
        // Interrupted streams still start, materialized requests can't.
        let fails_now = matches!(
            (preset.failure, kind),
            (Some(PresetFailure::Rejected), _)
                | (Some(_), RequestKind::Complete)
        );
        if fails_now {
            return Err(Error {
                message: "preset failure",
                kind: preset.error_kind(),
            });
        }
        Ok(preset)
    }
}

impl ModelProvider for TestModelProvider {
    type Error = crate::Error;
    type Stream = TestModelStream;

    fn complete(
        &self,
        req: &ModelRequest,
    ) -> impl Future<Output = Result<ModelCompletion, Self::Error>> + Send + 'static
    {
        let result = self
            .next_response(RequestKind::Complete, req)
            .map(|preset| materialize(&preset));
        ready(result)
    }

    fn stream(
        &self,
        req: &ModelRequest,
    ) -> impl Future<Output = Result<Self::Stream, Self::Error>> + Send + 'static
    {
        let delay = self.delay.unwrap_or(Duration::from_millis(1));
        let open_streams = Arc::clone(&self.open_streams);
        let result =
            self.next_response(RequestKind::Stream, req).map(|preset| {
                let mut events: VecDeque<_> = preset
                    .events
                    .iter()
                    .map(|event| match event {
                        PresetEvent::MessageDelta(msg) => {
                            ModelResponseEvent::MessageDelta(msg.clone())
                        }
                        PresetEvent::ToolCallDelta(delta) => {
                            ModelResponseEvent::ToolCallDelta(delta.clone())
                        }
                    })
                    .collect();
                let interrupted = preset.failure.is_some();
                open_streams.fetch_add(1, Ordering::SeqCst);
                if !interrupted {
                    events.push_back(ModelResponseEvent::Completed(
                        finish_reason(&preset),
                    ));
                }
                TestModelStream {
                    events,
                    interrupted,
                    finished: false,
                    delay,
                    sleep: None,
                    open_streams,
                }
            });
        ready(result)
    }
}

fn finish_reason(preset: &PresetResponse) -> ModelFinishReason {
    let has_tool_call = preset
        .events
        .iter()
        .any(|event| matches!(event, PresetEvent::ToolCallDelta(_)));
    if has_tool_call {
        ModelFinishReason::ToolCalls
    } else {
        ModelFinishReason::Stop
    }
}

/// Folds preset events into the message a non-streaming request returns.
fn materialize(preset: &PresetResponse) -> ModelCompletion {
    let mut content: Option<String> = None;
    let mut tool_calls: Vec<ToolCallRequest> = vec![];
    for event in &preset.events {
        match event {
            PresetEvent::MessageDelta(delta) => {
                content.get_or_insert_default().push_str(delta);
            }
            PresetEvent::ToolCallDelta(delta) => {
                let idx = match tool_calls
                    .iter()
                    .position(|call| call.index == delta.index)
                {
                    Some(idx) => idx,
                    None => {
                        tool_calls.push(ToolCallRequest {
                            id: String::new(),
                            index: delta.index,
                            name: String::new(),
                            arguments: String::new(),
                        });
                        tool_calls.len() - 1
                    }
                };
                let call = &mut tool_calls[idx];
                if let Some(id) = &delta.id {
                    call.id.push_str(id);
                }
                if let Some(name) = &delta.name {
                    call.name.push_str(name);
                }
                if let Some(arguments) = &delta.arguments {
                    call.arguments.push_str(arguments);
                }
            }
        }
    }
    ModelCompletion {
        content,
        tool_calls,
        finish_reason: Some(finish_reason(preset)),
    }
}

impl Debug for TestModelProvider {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let script = self.lock();
        f.debug_struct("TestModelProvider")
            .field("pending_responses", &script.responses.len())
            .field("requests", &script.requests.len())
            .field("open_streams", &self.open_streams())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::future::poll_fn;
    use std::pin::pin;

    use coach_relay_model::{ModelMessage, ToolCallDelta};

    use super::*;

    fn request(input: &str) -> ModelRequest {
        ModelRequest {
            model: "test".to_owned(),
            messages: vec![ModelMessage::User(input.to_owned())],
            tools: vec![],
        }
    }

    async fn collect_events(
        stream: TestModelStream,
    ) -> Result<Vec<ModelResponseEvent>, Error> {
        let mut stream = pin!(stream);
        let mut events = vec![];
        while let Some(event) =
            poll_fn(|cx| stream.as_mut().poll_next_event(cx)).await?
        {
            events.push(event);
        }
        Ok(events)
    }

    #[tokio::test]
    async fn test_scripted_responses() {
        let mut provider = TestModelProvider::default();
        provider.add_response(PresetResponse::with_events([
            PresetEvent::MessageDelta("Hello, ".to_owned()),
            PresetEvent::MessageDelta("world!".to_owned()),
        ]));
        provider.add_response(PresetResponse::with_events([
            PresetEvent::tool_call(0, "call_1", "get_stock_details", "{\"ti"),
            PresetEvent::arguments(0, "cker\":\"TSLA\"}"),
        ]));

        let stream = provider.stream(&request("Hi")).await.unwrap();
        assert_eq!(provider.open_streams(), 1);
        let events = collect_events(stream).await.unwrap();
        assert_eq!(provider.open_streams(), 0);
        assert_eq!(
            events,
            vec![
                ModelResponseEvent::MessageDelta("Hello, ".to_owned()),
                ModelResponseEvent::MessageDelta("world!".to_owned()),
                ModelResponseEvent::Completed(ModelFinishReason::Stop),
            ]
        );

        let completion = provider.complete(&request("TSLA?")).await.unwrap();
        assert_eq!(completion.content, None);
        assert_eq!(
            completion.tool_calls,
            vec![ToolCallRequest {
                id: "call_1".to_owned(),
                index: 0,
                name: "get_stock_details".to_owned(),
                arguments: "{\"ticker\":\"TSLA\"}".to_owned(),
            }]
        );

        let requests = provider.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].kind, RequestKind::Stream);
        assert_eq!(requests[1].kind, RequestKind::Complete);
        assert_eq!(requests[1].request, request("TSLA?"));

        // The script is exhausted.
        assert!(provider.complete(&request("again")).await.is_err());
    }

    #[tokio::test]
    async fn test_failures() {
        let mut provider = TestModelProvider::default();
        provider.add_response(
            PresetResponse::with_events([PresetEvent::MessageDelta(
                "partial".to_owned(),
            )])
            .with_failure(PresetFailure::Interrupted),
        );
        provider.add_response(
            PresetResponse::with_events([])
                .with_failure(PresetFailure::Rejected),
        );

        let stream = provider.stream(&request("Hi")).await.unwrap();
        let err = collect_events(stream).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Network);

        let err = provider.stream(&request("Hi")).await.err().unwrap();
        assert_eq!(err.kind(), ErrorKind::Authentication);
    }

    #[test]
    fn test_materialize_parallel_calls() {
        let preset = PresetResponse::with_events([
            PresetEvent::tool_call(0, "a", "get_stock_details", "{}"),
            PresetEvent::ToolCallDelta(ToolCallDelta {
                index: 1,
                id: Some("b".to_owned()),
                name: Some("get_stock_details".to_owned()),
                arguments: None,
            }),
            PresetEvent::arguments(1, "{\"ticker\":\"F\"}"),
        ]);
        let completion = materialize(&preset);
        assert_eq!(completion.tool_calls.len(), 2);
        assert_eq!(completion.tool_calls[1].arguments, "{\"ticker\":\"F\"}");
        assert_eq!(
            completion.finish_reason,
            Some(ModelFinishReason::ToolCalls)
        );
    }
}
