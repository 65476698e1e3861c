use coach_relay_model::{
    ModelMessage, ModelRequest, ToolCallRequest, ToolCallResult,
};
use serde_json::Value;
use tracing::Instrument;

use crate::conversation::Conversation;
use crate::model_client::{ModelClient, TextStream};
use crate::tool::{Lookup, Registry, ToolCallAccumulator};
use crate::Error;

/// Drives one chat request to its final reply.
///
/// Without tools a reply is a single completion. With tools, the first
/// completion is streamed and collected, the requested calls are
/// executed, and their results are sent back in one follow-up completion.
/// Only one round of tool calls is served per request.
pub struct Orchestrator<'a> {
    client: &'a ModelClient,
    tools: &'a Registry,
    model: &'a str,
}

impl<'a> Orchestrator<'a> {
    /// Creates an orchestrator for a request targeting `model`.
    #[inline]
    pub fn new(
        client: &'a ModelClient,
        tools: &'a Registry,
        model: &'a str,
    ) -> Self {
        Self {
            client,
            tools,
            model,
        }
    }

    /// Streams the reply as text fragments. Tools are not offered on this
    /// path.
    pub async fn stream(
        &self,
        conversation: &Conversation,
    ) -> Result<TextStream, Error> {
        let req = self.request(conversation, false);
        self.client.stream_text(&req).await
    }

    /// Produces the complete reply text.
    pub async fn reply(
        &self,
        conversation: Conversation,
    ) -> Result<String, Error> {
        if self.tools.is_empty() {
            let req = self.request(&conversation, false);
            let completion = self.client.complete(&req).await?;
            return Ok(completion.content.unwrap_or_default());
        }
        self.reply_with_tools(conversation)
            .instrument(debug_span!("tool orchestration"))
            .await
    }

    async fn reply_with_tools(
        &self,
        mut conversation: Conversation,
    ) -> Result<String, Error> {
        let req = self.request(&conversation, true);
        let collected = self.client.collect(&req).await?;

        let mut accumulator = ToolCallAccumulator::default();
        for delta in collected.tool_call_deltas {
            accumulator
                .push(delta)
                .map_err(|err| Error::invalid_response(err.to_string()))?;
        }
        let calls = accumulator.finish();
        if calls.is_empty() {
            return Ok(collected.content);
        }
        debug!("model requested {} tool call(s)", calls.len());

        let mut results = Vec::with_capacity(calls.len());
        for call in &calls {
            let output = self.invoke(call).await?;
            results.push(ToolCallResult {
                id: call.id.clone(),
                name: call.name.clone(),
                content: output.to_string(),
            });
        }

        let content = Some(collected.content).filter(|text| !text.is_empty());
        conversation.push(ModelMessage::Assistant {
            content,
            tool_calls: calls,
        });
        for result in results {
            conversation.push(ModelMessage::Tool(result));
        }

        let req = self.request(&conversation, true);
        let completion = self.client.complete(&req).await?;
        if !completion.tool_calls.is_empty() {
            warn!(
                "follow-up completion requested {} more tool call(s), ignoring",
                completion.tool_calls.len()
            );
        }
        Ok(completion.content.unwrap_or_default())
    }

    async fn invoke(&self, call: &ToolCallRequest) -> Result<Value, Error> {
        let arguments: Value =
            serde_json::from_str(&call.arguments).map_err(|err| {
                error!("malformed arguments for tool `{}`: {err}", call.name);
                Error::tool_invocation(format!(
                    "invalid arguments for tool `{}`: {err}",
                    call.name
                ))
            })?;
        if !arguments.is_object() {
            error!("non-object arguments for tool `{}`", call.name);
            return Err(Error::tool_invocation(format!(
                "arguments for tool `{}` must be a JSON object",
                call.name
            )));
        }

        let tool = match self.tools.lookup(&call.name) {
            Lookup::Found(tool) => tool,
            Lookup::NotFound => {
                error!("model requested an unknown tool: {}", call.name);
                return Err(Error::tool_invocation(format!(
                    "unknown tool `{}`",
                    call.name
                )));
            }
        };

        debug!("invoking tool `{}` ({}): {arguments}", call.name, call.id);
        tool.execute(arguments).await.map_err(|err| {
            error!("tool `{}` failed: {err}", call.name);
            Error::tool_invocation(format!(
                "tool `{}` failed: {err}",
                call.name
            ))
        })
    }

    fn request(
        &self,
        conversation: &Conversation,
        with_tools: bool,
    ) -> ModelRequest {
        ModelRequest {
            model: self.model.to_owned(),
            messages: conversation.messages().to_vec(),
            tools: if with_tools {
                self.tools.definitions()
            } else {
                vec![]
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use std::future::ready;

    use coach_relay_model::{ModelMessage, Role};
    use coach_relay_test_model::{
        PresetEvent, PresetResponse, RequestKind, TestModelProvider,
    };
    use futures_util::TryStreamExt;
    use schemars::{JsonSchema, schema_for};
    use serde::Deserialize;
    use serde_json::json;

    use super::*;
    use crate::ErrorKind;
    use crate::conversation::ChatRequest;
    use crate::tool::{Error as ToolError, Tool, ToolResult};

    #[derive(Deserialize, JsonSchema)]
    struct QuoteInput {
        ticker: String,
    }

    struct QuoteTool {
        parameter_schema: Value,
    }

    impl Tool for QuoteTool {
        type Input = QuoteInput;

        fn name(&self) -> &str {
            "get_stock_details"
        }

        fn description(&self) -> &str {
            "Returns a fake quote."
        }

        fn parameter_schema(&self) -> &Value {
            &self.parameter_schema
        }

        fn execute(
            &self,
            input: Self::Input,
        ) -> impl Future<Output = ToolResult> + Send + 'static {
            let result = if input.ticker == "NOPE" {
                Err(ToolError::execution_error().with_reason("unknown ticker"))
            } else {
                Ok(json!({ "ticker": input.ticker, "price": 42.5 }))
            };
            ready(result)
        }
    }

    fn registry() -> Registry {
        Registry::default().with_tool(QuoteTool {
            parameter_schema: schema_for!(QuoteInput).to_value(),
        })
    }

    fn conversation(text: &str) -> Conversation {
        let req = ChatRequest {
            message: Some(text.to_owned()),
            ..Default::default()
        };
        Conversation::from_request(&req, "Be kind.")
    }

    fn tool_call_response(calls: &[(u32, &str, &str)]) -> PresetResponse {
        let mut events = vec![PresetEvent::MessageDelta(String::new())];
        for (index, id, ticker) in calls {
            let arguments = format!("{{\"ticker\":\"{ticker}\"}}");
            let (head, tail) = arguments.split_at(5);
            events.push(PresetEvent::tool_call(*index, id, "get_stock_details", head));
            events.push(PresetEvent::arguments(*index, tail));
        }
        PresetResponse::with_events(events)
    }

    fn text_response(text: &str) -> PresetResponse {
        PresetResponse::with_events([PresetEvent::MessageDelta(text.to_owned())])
    }

    #[tokio::test]
    async fn test_reply_without_tool_call() {
        let mut provider = TestModelProvider::default();
        provider.add_response(text_response("You can do it."));
        let client = ModelClient::new(provider.clone());
        let tools = registry();

        let orchestrator = Orchestrator::new(&client, &tools, "gpt-test");
        let reply = orchestrator.reply(conversation("Hi")).await.unwrap();
        assert_eq!(reply, "You can do it.");

        let requests = provider.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].kind, RequestKind::Stream);
        assert_eq!(requests[0].request.model, "gpt-test");
        assert_eq!(requests[0].request.tools.len(), 1);
    }

    #[tokio::test]
    async fn test_reply_with_tool_calls() {
        let mut provider = TestModelProvider::default();
        provider.add_response(tool_call_response(&[
            (0, "call_aapl", "AAPL"),
            (1, "call_msft", "MSFT"),
        ]));
        provider.add_response(text_response("Both look steady."));
        let client = ModelClient::new(provider.clone());
        let tools = registry();

        let orchestrator = Orchestrator::new(&client, &tools, "gpt-test");
        let reply = orchestrator
            .reply(conversation("How are AAPL and MSFT?"))
            .await
            .unwrap();
        assert_eq!(reply, "Both look steady.");

        let requests = provider.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[1].kind, RequestKind::Complete);

        let messages = &requests[1].request.messages;
        let roles: Vec<_> = messages.iter().map(ModelMessage::role).collect();
        assert_eq!(
            roles,
            vec![Role::System, Role::User, Role::Assistant, Role::Tool, Role::Tool]
        );

        let ModelMessage::Assistant {
            content,
            tool_calls,
        } = &messages[2]
        else {
            panic!("expected an assistant message");
        };
        assert_eq!(*content, None);
        assert_eq!(tool_calls.len(), 2);
        assert_eq!(tool_calls[0].arguments, "{\"ticker\":\"AAPL\"}");
        assert_eq!(tool_calls[1].id, "call_msft");

        let ModelMessage::Tool(result) = &messages[4] else {
            panic!("expected a tool message");
        };
        assert_eq!(result.id, "call_msft");
        assert_eq!(result.name, "get_stock_details");
        let content: Value = serde_json::from_str(&result.content).unwrap();
        assert_eq!(content, json!({ "ticker": "MSFT", "price": 42.5 }));
    }

    #[tokio::test]
    async fn test_tool_failures() {
        let cases = [
            PresetResponse::with_events([PresetEvent::tool_call(
                0,
                "call_1",
                "read_file",
                "{\"path\":\"/etc/passwd\"}",
            )]),
            PresetResponse::with_events([PresetEvent::tool_call(
                0,
                "call_1",
                "get_stock_details",
                "{\"ticker\":",
            )]),
            PresetResponse::with_events([PresetEvent::tool_call(
                0,
                "call_1",
                "get_stock_details",
                "[\"AAPL\"]",
            )]),
            tool_call_response(&[(0, "call_1", "NOPE")]),
        ];

        for preset in cases {
            let mut provider = TestModelProvider::default();
            provider.add_response(preset);
            let client = ModelClient::new(provider.clone());
            let tools = registry();

            let orchestrator = Orchestrator::new(&client, &tools, "gpt-test");
            let err = orchestrator.reply(conversation("Hi")).await.unwrap_err();
            assert_eq!(err.kind(), ErrorKind::ToolInvocation);
            // No follow-up is sent.
            assert_eq!(provider.requests().len(), 1);
        }
    }

    #[tokio::test]
    async fn test_out_of_order_deltas() {
        let mut provider = TestModelProvider::default();
        provider.add_response(PresetResponse::with_events([
            PresetEvent::tool_call(1, "call_b", "get_stock_details", "{"),
            PresetEvent::tool_call(0, "call_a", "get_stock_details", "{"),
        ]));
        let client = ModelClient::new(provider);
        let tools = registry();

        let orchestrator = Orchestrator::new(&client, &tools, "gpt-test");
        let err = orchestrator.reply(conversation("Hi")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Provider);
    }

    #[tokio::test]
    async fn test_no_tools() {
        let mut provider = TestModelProvider::default();
        provider.add_response(text_response("Breathe in."));
        provider.add_response(PresetResponse::with_events([
            PresetEvent::MessageDelta("Breathe ".to_owned()),
            PresetEvent::MessageDelta("in.".to_owned()),
        ]));
        let client = ModelClient::new(provider.clone());
        let tools = Registry::default();

        let orchestrator = Orchestrator::new(&client, &tools, "gpt-test");
        let reply = orchestrator.reply(conversation("Hi")).await.unwrap();
        let chunks: Vec<String> = orchestrator
            .stream(&conversation("Hi"))
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();
        assert_eq!(chunks.concat(), reply);

        let requests = provider.requests();
        assert_eq!(requests[0].kind, RequestKind::Complete);
        assert_eq!(requests[1].kind, RequestKind::Stream);
        assert!(requests.iter().all(|r| r.request.tools.is_empty()));
    }
}
